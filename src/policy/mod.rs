//! Response policy: task + classifier verdict → response payload.

mod classifier;
mod decision;

pub use classifier::{
    Classifier, FixedClassifier, HttpClassifier, ReliableClassifier, create_classifier,
};
pub use decision::{DecisionTable, ResponseRow, ScoreRow, Sentiment};

use crate::error::ClassifierError;
use crate::ledger::Task;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The response the operator signs and submits. Shape is fixed by the
/// verifying contract; `is_safe` rides along for consumers but is not part
/// of the signed tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub text_response: String,
    pub game_id: u32,
    pub target_score: u32,
    #[serde(default)]
    pub is_safe: Option<bool>,
}

/// Applies the decision table, consulting the classifier only for the
/// branches that read its verdict.
pub struct ResponsePolicy {
    table: DecisionTable,
    classifier: Arc<dyn Classifier>,
    prompt_context: String,
}

impl ResponsePolicy {
    pub fn new(table: DecisionTable, classifier: Arc<dyn Classifier>, prompt_context: &str) -> Self {
        Self {
            table,
            classifier,
            prompt_context: prompt_context.to_string(),
        }
    }

    pub async fn decide(&self, task: &Task) -> Result<ResponsePayload, ClassifierError> {
        let score = task.score_difference.unwrap_or_default();

        let verdict = if self.table.needs_classifier(&task.contents, score) {
            self.classifier
                .classify(&task.contents, &self.prompt_context)
                .await?
        } else {
            String::new()
        };

        Ok(self.table.evaluate(&task.contents, score, &verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingClassifier {
        calls: Arc<AtomicU32>,
        reply: String,
    }

    #[async_trait]
    impl Classifier for CountingClassifier {
        fn name(&self) -> &str {
            "counting"
        }

        async fn classify(&self, _text: &str, _ctx: &str) -> Result<String, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn policy_with(reply: &str, calls: Arc<AtomicU32>) -> ResponsePolicy {
        ResponsePolicy::new(
            DecisionTable::default(),
            Arc::new(CountingClassifier {
                calls,
                reply: reply.into(),
            }),
            "judge the sentiment",
        )
    }

    fn task(contents: &str, score: Option<u32>) -> Task {
        Task {
            contents: contents.into(),
            created_at_block: 1,
            score_difference: score,
        }
    }

    #[tokio::test]
    async fn quiet_task_skips_classifier() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = policy_with("ignored", calls.clone());

        let payload = policy.decide(&task("", Some(20))).await.unwrap();
        assert_eq!(payload.text_response, "positive momentum");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_branch_consults_classifier_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = policy_with("a positive verdict", calls.clone());

        let payload = policy.decide(&task("gg", Some(12))).await.unwrap();
        assert_eq!(payload.text_response, "a positive verdict");
        assert_eq!(payload.game_id, 1);
        assert_eq!(payload.target_score, 12);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_score_difference_defaults_to_zero() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = policy_with("", calls.clone());

        // Empty contents + score 0 < midpoint: relief branch, no classifier.
        let payload = policy.decide(&task("", None)).await.unwrap();
        assert_eq!(payload.text_response, "relief");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn classifier_error_propagates_without_fallback() {
        struct FailingClassifier;

        #[async_trait]
        impl Classifier for FailingClassifier {
            fn name(&self) -> &str {
                "failing"
            }

            async fn classify(&self, _t: &str, _c: &str) -> Result<String, ClassifierError> {
                Err(ClassifierError::Exhausted {
                    attempts: 3,
                    last: "model offline".into(),
                })
            }
        }

        let policy = ResponsePolicy::new(
            DecisionTable::default(),
            Arc::new(FailingClassifier),
            "",
        );
        let err = policy.decide(&task("gg", Some(12))).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Exhausted { .. }));
    }
}
