use super::correlation::CorrelationTable;
use crate::error::GatewayError;
use crate::ledger::{ContractCall, LedgerClient, TaskResponded};
use std::sync::Arc;
use std::time::Duration;

/// A confirmed create-and-await round trip.
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub transaction_hash: String,
    pub response: TaskResponded,
}

/// Bridges a synchronous caller to the asynchronous confirmation event.
pub struct GatewayService {
    ledger: Arc<dyn LedgerClient>,
    correlation: Arc<CorrelationTable>,
    confirmation_timeout: Duration,
    response_timeout: Duration,
}

impl GatewayService {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        correlation: Arc<CorrelationTable>,
        confirmation_timeout: Duration,
        response_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            correlation,
            confirmation_timeout,
            response_timeout,
        }
    }

    /// Create a task and wait for its confirmed response.
    ///
    /// The waiter is keyed by the task index the creation transaction
    /// itself emitted, never by "most recent log", which cross-delivers
    /// under concurrent callers. A response that lands while we are still
    /// reading the receipt is parked by the correlation table, so the
    /// registration order here is race-free.
    pub async fn create_and_await(
        &self,
        contents: &str,
        score_difference: u32,
    ) -> Result<CreatedTask, GatewayError> {
        let call = ContractCall::create_task(contents, score_difference);

        // Dry-run first, same as the submission path: a would-revert
        // creation should cost the caller nothing.
        self.ledger.read(&call).await?;

        let tx = self.ledger.submit(&call).await?;
        tracing::info!(tx_hash = %tx.hash, "task creation submitted");

        let receipt = self
            .ledger
            .await_confirmation(&tx, self.confirmation_timeout)
            .await?;

        let task_index =
            receipt
                .created_task_index()
                .ok_or_else(|| GatewayError::MissingCreationEvent {
                    tx_hash: tx.hash.clone(),
                })?;

        let waiter = self.correlation.register(task_index);
        tracing::debug!(task_index, "awaiting task response");

        let response = waiter.wait(self.response_timeout).await?;
        Ok(CreatedTask {
            transaction_hash: tx.hash,
            response,
        })
    }
}
