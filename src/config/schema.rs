use crate::error::ConfigError;
use crate::policy::DecisionTable;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the operator signer key. Takes priority
/// over the config file so the key never has to live on disk.
pub const SIGNER_KEY_ENV: &str = "ATTESTOR_SIGNER_KEY";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Path to attestor.toml - where the config was loaded from, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Response-policy thresholds and lookup rows.
    #[serde(default)]
    pub policy: DecisionTable,

    #[serde(default)]
    pub operator: OperatorConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub signer: SignerConfig,
}

impl Config {
    /// Load from `path` (default `attestor.toml` in the working
    /// directory). A missing file yields the defaults; a malformed file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("attestor.toml"));

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            toml::from_str::<Config>(&raw).map_err(|e| ConfigError::Load(e.to_string()))?
        } else {
            Config::default()
        };
        config.config_path = path;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.mode == LedgerMode::Rpc {
            if self.ledger.endpoint.is_empty() {
                return Err(ConfigError::Validation("ledger.endpoint is empty".into()));
            }
            if self.ledger.contract_address.is_empty() {
                return Err(ConfigError::Validation(
                    "ledger.contract_address is empty".into(),
                ));
            }
        }
        if self.gateway.response_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "gateway.response_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the signer key: environment first, then config file.
    /// Missing key is fatal; the operator must not start without an
    /// identity to sign with.
    pub fn signer_key(&self) -> Result<String, ConfigError> {
        if let Ok(key) = std::env::var(SIGNER_KEY_ENV) {
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
            }
        }
        self.signer
            .key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToOwned::to_owned)
            .ok_or(ConfigError::MissingSignerKey)
    }
}

// ── Ledger ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Real JSON-RPC endpoint.
    #[default]
    Rpc,
    /// In-process stub ledger; the demo path, no node required.
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub mode: LedgerMode,
    /// Ledger node endpoint (default: local devnet)
    #[serde(default = "default_ledger_endpoint")]
    pub endpoint: String,
    /// Address of the task contract
    #[serde(default = "default_contract_address")]
    pub contract_address: String,
    /// How long to wait for a transaction confirmation
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Resubscription budget before the source is declared unavailable
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

fn default_ledger_endpoint() -> String {
    "http://localhost:8545".into()
}

fn default_contract_address() -> String {
    "0x4fC92Db7DD04f69e8ed448747F589FFD91622886".into()
}

fn default_confirmation_timeout_secs() -> u64 {
    30
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_backoff_ms() -> u64 {
    1_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::default(),
            endpoint: default_ledger_endpoint(),
            contract_address: default_contract_address(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
        }
    }
}

// ── Classifier ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// "http" (Ollama-style chat endpoint) or "fixed" (constant reply)
    #[serde(default = "default_classifier_backend")]
    pub backend: String,
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// System prompt sent with every classification request
    #[serde(default = "default_prompt_context")]
    pub prompt_context: String,
    /// Reply used by the "fixed" backend
    #[serde(default)]
    pub fixed_reply: String,
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_classifier_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_classifier_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_classifier_backend() -> String {
    "http".into()
}

fn default_classifier_endpoint() -> String {
    "http://localhost:11434".into()
}

fn default_classifier_model() -> String {
    "llama-guard3:lb".into()
}

fn default_prompt_context() -> String {
    "Judge the sentiment of the following text. Answer with a short verdict \
     containing the word 'positive' or 'negative', and flag unsafe content."
        .into()
}

fn default_classifier_timeout_secs() -> u64 {
    300 // local models may be slow
}

fn default_classifier_max_retries() -> u32 {
    2
}

fn default_classifier_backoff_ms() -> u64 {
    500
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: default_classifier_backend(),
            endpoint: default_classifier_endpoint(),
            model: default_classifier_model(),
            prompt_context: default_prompt_context(),
            fixed_reply: String::new(),
            timeout_secs: default_classifier_timeout_secs(),
            max_retries: default_classifier_max_retries(),
            base_backoff_ms: default_classifier_backoff_ms(),
        }
    }
}

// ── Operator ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Worker-pool size (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Task queue depth between the event source and the loop
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Processing passes per task before it is terminally failed
    #[serde(default = "default_max_task_attempts")]
    pub max_task_attempts: u32,
    /// Submission attempts per processing pass
    #[serde(default = "default_submission_attempts")]
    pub submission_attempts: u32,
    #[serde(default = "default_submission_backoff_ms")]
    pub submission_backoff_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    64
}

fn default_max_task_attempts() -> u32 {
    3
}

fn default_submission_attempts() -> u32 {
    3
}

fn default_submission_backoff_ms() -> u64 {
    500
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            max_task_attempts: default_max_task_attempts(),
            submission_attempts: default_submission_attempts(),
            submission_backoff_ms: default_submission_backoff_ms(),
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 3001)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// How long a caller waits for its confirmed response
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    3001
}

fn default_response_timeout_secs() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            response_timeout_secs: default_response_timeout_secs(),
        }
    }
}

// ── Signer ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SignerConfig {
    /// Hex signer key. Prefer the ATTESTOR_SIGNER_KEY environment
    /// variable over writing this field.
    #[serde(default)]
    pub key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.operator.workers, 4);
        assert_eq!(config.gateway.port, 3001);
        assert_eq!(config.ledger.mode, LedgerMode::Rpc);
    }

    #[test]
    fn empty_endpoint_fails_validation_in_rpc_mode() {
        let mut config = Config::default();
        config.ledger.endpoint = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn offline_mode_skips_endpoint_validation() {
        let mut config = Config::default();
        config.ledger.mode = LedgerMode::Offline;
        config.ledger.endpoint = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_response_timeout_rejected() {
        let mut config = Config::default();
        config.gateway.response_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn signer_key_from_config_file() {
        let mut config = Config::default();
        config.signer.key = Some("  0xabc123  ".into());
        assert_eq!(config.signer_key().unwrap(), "0xabc123");
    }

    #[test]
    fn missing_signer_key_is_fatal() {
        let config = Config::default();
        assert!(matches!(
            config.signer_key(),
            Err(ConfigError::MissingSignerKey)
        ));
    }

    #[test]
    fn blank_signer_key_counts_as_missing() {
        let mut config = Config::default();
        config.signer.key = Some("   ".into());
        assert!(matches!(
            config.signer_key(),
            Err(ConfigError::MissingSignerKey)
        ));
    }

    #[test]
    fn ledger_mode_serde_variants() {
        let cases = [(LedgerMode::Rpc, "\"rpc\""), (LedgerMode::Offline, "\"offline\"")];
        for (mode, expected_json) in cases {
            let serialized = serde_json::to_string(&mode).unwrap();
            assert_eq!(serialized, expected_json);

            let deserialized: LedgerMode = serde_json::from_str(expected_json).unwrap();
            assert_eq!(deserialized, mode);
        }
    }

    #[test]
    fn config_toml_round_trip() {
        let mut original = Config::default();
        original.ledger.mode = LedgerMode::Offline;
        original.classifier.backend = "fixed".into();
        original.classifier.fixed_reply = "positive".into();
        original.operator.workers = 8;
        original.policy.strong_signal = 42;

        let toml = toml::to_string(&original).unwrap();
        let decoded: Config = toml::from_str(&toml).unwrap();

        assert_eq!(decoded.ledger.mode, original.ledger.mode);
        assert_eq!(decoded.classifier.backend, "fixed");
        assert_eq!(decoded.operator.workers, 8);
        assert_eq!(decoded.policy.strong_signal, 42);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let decoded: Config = toml::from_str(
            r#"
            [gateway]
            port = 4001
            "#,
        )
        .unwrap();
        assert_eq!(decoded.gateway.port, 4001);
        assert_eq!(decoded.gateway.host, "127.0.0.1");
        assert_eq!(decoded.operator.workers, 4);
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attestor.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.config_path, path);
        assert_eq!(config.gateway.port, 3001);
    }

    #[test]
    fn load_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attestor.toml");
        fs::write(&path, "this is not toml = = =").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Load(_))
        ));
    }
}
