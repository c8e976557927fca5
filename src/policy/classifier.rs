use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text-judgment collaborator consulted by the response policy. One round
/// trip; may fail or time out.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str, prompt_context: &str) -> Result<String, ClassifierError>;
}

// ─── HTTP classifier (Ollama-style chat endpoint) ───────────────────────────

pub struct HttpClassifier {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn build_request(&self, text: &str, prompt_context: &str) -> ChatRequest {
        let mut messages = Vec::new();
        if !prompt_context.is_empty() {
            messages.push(Message {
                role: "system",
                content: prompt_context.to_string(),
            });
        }
        messages.push(Message {
            role: "user",
            content: text.to_string(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn classify(&self, text: &str, prompt_context: &str) -> Result<String, ClassifierError> {
        let request = self.build_request(text, prompt_context);
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(ClassifierError::Request(format!(
                "classifier returned {status}: {body}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;
        Ok(chat.message.content)
    }
}

// ─── Fixed classifier (offline demo, stub for tests) ────────────────────────

/// Returns the same verdict for every input. Used by the offline demo path
/// and anywhere the decision table is exercised without a live model.
pub struct FixedClassifier {
    reply: String,
}

impl FixedClassifier {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn classify(&self, _text: &str, _prompt_context: &str) -> Result<String, ClassifierError> {
        Ok(self.reply.clone())
    }
}

// ─── Retry wrapper ──────────────────────────────────────────────────────────

/// Classifier wrapper with bounded retry + exponential backoff. After
/// exhaustion the caller marks the task failed; no fallback verdict is
/// invented here.
pub struct ReliableClassifier {
    inner: Box<dyn Classifier>,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl ReliableClassifier {
    pub fn new(inner: Box<dyn Classifier>, max_retries: u32, base_backoff_ms: u64) -> Self {
        Self {
            inner,
            max_retries,
            base_backoff_ms: base_backoff_ms.max(50),
        }
    }
}

#[async_trait]
impl Classifier for ReliableClassifier {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn classify(&self, text: &str, prompt_context: &str) -> Result<String, ClassifierError> {
        let mut backoff_ms = self.base_backoff_ms;
        let mut last = String::new();

        for attempt in 0..=self.max_retries {
            match self.inner.classify(text, prompt_context).await {
                Ok(verdict) => {
                    if attempt > 0 {
                        tracing::info!(attempt, "classifier recovered after retries");
                    }
                    return Ok(verdict);
                }
                Err(e) => {
                    last = e.to_string();
                    if attempt < self.max_retries {
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "classifier call failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = backoff_ms.saturating_mul(2).min(10_000);
                    }
                }
            }
        }

        Err(ClassifierError::Exhausted {
            attempts: self.max_retries + 1,
            last,
        })
    }
}

/// Factory: create the right classifier from config, wrapped with retry.
pub fn create_classifier(config: &ClassifierConfig) -> Box<dyn Classifier> {
    let inner: Box<dyn Classifier> = match config.backend.as_str() {
        "fixed" => Box::new(FixedClassifier::new(&config.fixed_reply)),
        "http" => Box::new(HttpClassifier::new(
            &config.endpoint,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )),
        other => {
            tracing::warn!("Unknown classifier backend '{other}', falling back to http");
            Box::new(HttpClassifier::new(
                &config.endpoint,
                &config.model,
                Duration::from_secs(config.timeout_secs),
            ))
        }
    };
    Box::new(ReliableClassifier::new(
        inner,
        config.max_retries,
        config.base_backoff_ms,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClassifier {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl Classifier for FlakyClassifier {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn classify(&self, _text: &str, _ctx: &str) -> Result<String, ClassifierError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(ClassifierError::Request("connection reset".into()))
            } else {
                Ok("eventually positive".into())
            }
        }
    }

    struct SpyClassifier {
        seen: std::sync::Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl Classifier for SpyClassifier {
        fn name(&self) -> &str {
            "spy"
        }

        async fn classify(&self, text: &str, ctx: &str) -> Result<String, ClassifierError> {
            self.seen
                .lock()
                .unwrap()
                .push((text.to_string(), ctx.to_string()));
            Ok("ok".into())
        }
    }

    #[test]
    fn default_url_trimmed() {
        let c = HttpClassifier::new("http://localhost:11434/", "llama-guard3", Duration::from_secs(1));
        assert_eq!(c.base_url, "http://localhost:11434");
    }

    #[test]
    fn request_serializes_with_context() {
        let c = HttpClassifier::new("http://localhost:11434", "llama-guard3", Duration::from_secs(1));
        let req = c.build_request("is this fine", "judge the sentiment");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"stream\":false"));
        assert!(json.contains("llama-guard3"));
        assert!(json.contains("\"role\":\"system\""));
    }

    #[test]
    fn request_skips_empty_context() {
        let c = HttpClassifier::new("http://localhost:11434", "m", Duration::from_secs(1));
        let req = c.build_request("text", "");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("\"role\":\"system\""));
    }

    #[test]
    fn chat_response_deserializes() {
        let json = r#"{"message":{"role":"assistant","content":"safe"}}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "safe");
    }

    #[tokio::test]
    async fn fixed_classifier_echoes_reply() {
        let c = FixedClassifier::new("always positive");
        assert_eq!(c.classify("anything", "").await.unwrap(), "always positive");
    }

    #[tokio::test]
    async fn reliable_recovers_within_budget() {
        let flaky = FlakyClassifier {
            failures_left: AtomicU32::new(2),
        };
        let reliable = ReliableClassifier::new(Box::new(flaky), 3, 50);
        let verdict = reliable.classify("x", "").await.unwrap();
        assert_eq!(verdict, "eventually positive");
    }

    #[tokio::test]
    async fn reliable_exhausts_and_reports_attempts() {
        let flaky = FlakyClassifier {
            failures_left: AtomicU32::new(10),
        };
        let reliable = ReliableClassifier::new(Box::new(flaky), 2, 50);
        let err = reliable.classify("x", "").await.unwrap_err();
        assert!(
            matches!(err, ClassifierError::Exhausted { attempts: 3, ref last } if last.contains("connection reset"))
        );
    }

    #[tokio::test]
    async fn reliable_passes_text_and_context_through() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let spy = SpyClassifier { seen: seen.clone() };
        let reliable = ReliableClassifier::new(Box::new(spy), 0, 50);
        reliable.classify("the text", "the context").await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], ("the text".into(), "the context".into()));
    }

    #[test]
    fn factory_fixed_backend() {
        let config = ClassifierConfig {
            backend: "fixed".into(),
            fixed_reply: "positive".into(),
            ..ClassifierConfig::default()
        };
        assert_eq!(create_classifier(&config).name(), "fixed");
    }

    #[test]
    fn factory_unknown_falls_back_to_http() {
        let config = ClassifierConfig {
            backend: "xyzzy".into(),
            ..ClassifierConfig::default()
        };
        assert_eq!(create_classifier(&config).name(), "http");
    }
}
