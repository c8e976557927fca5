//! Operator loop: turns the at-least-once task stream into at-most-once
//! signed submissions.
//!
//! Claims each incoming task index against the shared state table, then
//! hands the task to a semaphore-bounded worker so a slow classifier
//! cannot head-of-line block the stream. Failures stay inside their
//! worker; the loop keeps watching.

use crate::error::{AttestorError, SubmissionError};
use crate::ledger::{Receipt, Task, TaskCreated};
use crate::pipeline::SubmissionPipeline;
use crate::policy::ResponsePolicy;
use crate::signing::OperatorSigner;
use crate::state::{FailOutcome, StateTable};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

/// Everything a worker needs, shared by reference.
#[derive(Clone)]
pub struct OperatorContext {
    pub state: Arc<StateTable>,
    pub policy: Arc<ResponsePolicy>,
    pub signer: Arc<OperatorSigner>,
    pub pipeline: Arc<SubmissionPipeline>,
}

pub struct OperatorLoop {
    ctx: OperatorContext,
    workers: usize,
}

impl OperatorLoop {
    pub fn new(ctx: OperatorContext, workers: usize) -> Self {
        Self {
            ctx,
            workers: workers.max(1),
        }
    }

    pub fn spawn(self, tasks: mpsc::Receiver<TaskCreated>) -> JoinHandle<()> {
        tokio::spawn(run(self.ctx, self.workers, tasks))
    }
}

async fn run(ctx: OperatorContext, workers: usize, mut tasks: mpsc::Receiver<TaskCreated>) {
    let pool = Arc::new(Semaphore::new(workers));

    while let Some(created) = tasks.recv().await {
        let task_index = created.task_index;

        // Idempotency against at-least-once delivery: only the first
        // delivery of an index gets a worker.
        if !ctx.state.try_claim(task_index) {
            tracing::debug!(task_index, "duplicate delivery dropped");
            continue;
        }

        tracing::info!(
            task_index,
            contents = %created.task.contents,
            block = created.block_number,
            "new task detected"
        );

        let permit = pool
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore never closed");
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let _permit = permit;
            process_task(&ctx, &created.task, task_index).await;
        });
    }

    tracing::info!("task queue closed, operator loop exiting");
}

/// One task from claim to terminal state. Retries stay inside this worker,
/// so the same index is never processed twice concurrently.
async fn process_task(ctx: &OperatorContext, task: &Task, task_index: u32) {
    loop {
        match respond_once(ctx, task, task_index).await {
            Ok(receipt) => {
                ctx.state.complete(task_index);
                tracing::info!(
                    task_index,
                    tx_hash = %receipt.tx_hash,
                    block = receipt.block_number,
                    "responded to task"
                );
                return;
            }
            Err(e) if is_unretryable(&e) => {
                ctx.state.abandon(task_index);
                tracing::error!(
                    task_index,
                    contents = %task.contents,
                    error = %e,
                    "task failed, not retryable"
                );
                return;
            }
            Err(e) => match ctx.state.fail(task_index) {
                FailOutcome::Retry { attempt } => {
                    tracing::warn!(task_index, attempt, error = %e, "task attempt failed, retrying");
                }
                FailOutcome::Terminal => {
                    tracing::error!(
                        task_index,
                        contents = %task.contents,
                        error = %e,
                        "task failed terminally"
                    );
                    return;
                }
            },
        }
    }
}

async fn respond_once(
    ctx: &OperatorContext,
    task: &Task,
    task_index: u32,
) -> Result<Receipt, AttestorError> {
    let payload = ctx.policy.decide(task).await?;
    let signature = ctx.signer.signature_hex(&payload, &task.contents);
    let receipt = ctx
        .pipeline
        .submit_response(task, task_index, &payload, &signature)
        .await?;
    Ok(receipt)
}

/// A rejected simulation means the contract said no to this exact call;
/// repeating it verbatim cannot help.
fn is_unretryable(err: &AttestorError) -> bool {
    matches!(
        err,
        AttestorError::Submission(SubmissionError::SimulationRejected(_))
    )
}
