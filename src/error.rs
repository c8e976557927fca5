use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `attestor`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum AttestorError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Ledger client ───────────────────────────────────────────────────
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    // ── Event source ────────────────────────────────────────────────────
    #[error("source: {0}")]
    Source(#[from] SourceError),

    // ── Classifier collaborator ─────────────────────────────────────────
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),

    // ── Submission pipeline ─────────────────────────────────────────────
    #[error("submission: {0}")]
    Submission(#[from] SubmissionError),

    // ── Correlation gateway ─────────────────────────────────────────────
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("signer key missing: set ATTESTOR_SIGNER_KEY or [signer] key in attestor.toml")]
    MissingSignerKey,

    #[error("signer key invalid: {0}")]
    InvalidSignerKey(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Ledger client errors ───────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("call rejected: {0}")]
    Rejected(String),

    #[error("confirmation timed out for {tx_hash}")]
    ConfirmationTimeout { tx_hash: String },

    #[error("event decode failed: {0}")]
    Decode(String),
}

// ─── Event source errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("subscription failed: {0}")]
    Subscribe(String),

    #[error("event source unavailable after {attempts} reconnect attempts")]
    Unavailable { attempts: u32 },
}

// ─── Classifier errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("classifier gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

// ─── Submission pipeline errors ─────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("simulation rejected: {0}")]
    SimulationRejected(String),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("confirmation timed out")]
    ConfirmationTimeout,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

// ─── Gateway errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("timed out waiting for task response")]
    Timeout,

    #[error("creation event missing from receipt for {tx_hash}")]
    MissingCreationEvent { tx_hash: String },

    #[error("internal: {0}")]
    Internal(String),
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ConfirmationTimeout { .. } => GatewayError::Timeout,
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, AttestorError>;
