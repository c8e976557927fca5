//! Submission pipeline: simulate, submit, confirm, with bounded retry.
//!
//! Simulation runs first so a would-revert call costs nothing. Transport
//! failures and confirmation timeouts retry with exponential backoff;
//! resubmitting the identical signed payload is safe because the contract
//! accepts one response per task index. Contract rejections stop the
//! attempt immediately unless the reason reads as transient.

use crate::error::{LedgerError, SubmissionError};
use crate::ledger::{ContractCall, LedgerClient, Receipt, Task};
use crate::policy::ResponsePayload;
use std::sync::Arc;
use std::time::Duration;

pub struct SubmissionPipeline {
    ledger: Arc<dyn LedgerClient>,
    max_attempts: u32,
    base_backoff: Duration,
    confirmation_timeout: Duration,
}

/// Rejection reasons that may clear on a retry. Everything else is the
/// contract saying no.
fn is_transient_rejection(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("reentran")
        || lower.contains("busy")
        || lower.contains("locked")
        || lower.contains("try again")
}

fn map_ledger_error(err: LedgerError) -> SubmissionError {
    match err {
        LedgerError::Rejected(message) => SubmissionError::SimulationRejected(message),
        LedgerError::ConfirmationTimeout { .. } => SubmissionError::ConfirmationTimeout,
        other => SubmissionError::SubmissionFailed(other.to_string()),
    }
}

impl SubmissionPipeline {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        max_attempts: u32,
        base_backoff: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            max_attempts: max_attempts.max(1),
            base_backoff: base_backoff.max(Duration::from_millis(50)),
            confirmation_timeout,
        }
    }

    pub async fn submit_response(
        &self,
        task: &Task,
        task_index: u32,
        payload: &ResponsePayload,
        signature_hex: &str,
    ) -> Result<Receipt, SubmissionError> {
        let call = ContractCall::respond_to_task(
            task,
            task_index,
            &payload.text_response,
            payload.game_id,
            payload.target_score,
            payload.is_safe,
            signature_hex,
        );

        let mut backoff = self.base_backoff;
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            match self.attempt(&call).await {
                Ok(receipt) => {
                    if attempt > 1 {
                        tracing::info!(task_index, attempt, "submission recovered after retries");
                    }
                    return Ok(receipt);
                }
                Err(SubmissionError::SimulationRejected(message))
                    if !is_transient_rejection(&message) =>
                {
                    return Err(SubmissionError::SimulationRejected(message));
                }
                Err(e) => {
                    last = e.to_string();
                    if attempt < self.max_attempts {
                        tracing::warn!(
                            task_index,
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %e,
                            "submission attempt failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2).min(Duration::from_secs(10));
                    }
                }
            }
        }

        Err(SubmissionError::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }

    async fn attempt(&self, call: &ContractCall) -> Result<Receipt, SubmissionError> {
        self.ledger.read(call).await.map_err(map_ledger_error)?;

        let tx = self.ledger.submit(call).await.map_err(map_ledger_error)?;

        self.ledger
            .await_confirmation(&tx, self.confirmation_timeout)
            .await
            .map_err(map_ledger_error)
    }
}
