//! Event source: the one long-lived subscription driving the operator.
//!
//! Pumps decoded ledger events into two independent consumers: task-created
//! records go into a bounded mpsc queue (back-pressure on the operator
//! loop), task-responded records fan out over a broadcast channel shared by
//! the correlation gateway and anyone else watching confirmations. The
//! pump resubscribes transparently when the transport drops; only after
//! the reconnect budget is spent does it give up, and then loudly.

use crate::error::SourceError;
use crate::ledger::{EventFilter, LedgerClient, LedgerEvent, TaskCreated, TaskResponded};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub struct EventSource {
    ledger: Arc<dyn LedgerClient>,
    max_reconnects: u32,
    base_backoff: Duration,
    queue_depth: usize,
}

/// Consumer ends of the pump. `responses` is the broadcast handle;
/// subscribe before the events you care about can be emitted.
pub struct EventChannels {
    pub tasks: mpsc::Receiver<TaskCreated>,
    pub responses: broadcast::Sender<TaskResponded>,
}

impl EventSource {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        max_reconnects: u32,
        base_backoff: Duration,
        queue_depth: usize,
    ) -> Self {
        Self {
            ledger,
            max_reconnects,
            base_backoff,
            queue_depth: queue_depth.max(1),
        }
    }

    /// Start the pump. The handle resolves with `SourceError` only when
    /// the subscription is truly unrecoverable; the process should treat
    /// that as fatal rather than silently stop watching.
    pub fn spawn(self) -> (EventChannels, JoinHandle<Result<(), SourceError>>) {
        let (task_tx, task_rx) = mpsc::channel(self.queue_depth);
        let (response_tx, _) = broadcast::channel(256);

        let channels = EventChannels {
            tasks: task_rx,
            responses: response_tx.clone(),
        };

        let handle = tokio::spawn(pump(
            self.ledger,
            self.max_reconnects,
            self.base_backoff,
            task_tx,
            response_tx,
        ));

        (channels, handle)
    }
}

async fn pump(
    ledger: Arc<dyn LedgerClient>,
    max_reconnects: u32,
    base_backoff: Duration,
    task_tx: mpsc::Sender<TaskCreated>,
    response_tx: broadcast::Sender<TaskResponded>,
) -> Result<(), SourceError> {
    let mut attempts: u32 = 0;
    let mut backoff = base_backoff;

    loop {
        match ledger.subscribe(EventFilter::all()).await {
            Ok(mut events) => {
                tracing::info!("watching for new tasks");
                attempts = 0;
                backoff = base_backoff;

                while let Some(event) = events.recv().await {
                    match event {
                        LedgerEvent::TaskCreated(created) => {
                            // Blocks when the operator queue is full; that
                            // back-pressure is the delivery/processing seam.
                            if task_tx.send(created).await.is_err() {
                                tracing::info!("task consumer gone, event source exiting");
                                return Ok(());
                            }
                        }
                        LedgerEvent::TaskResponded(responded) => {
                            // No receivers is fine; confirmations are
                            // interesting only while a waiter exists.
                            let _ = response_tx.send(responded);
                        }
                    }
                }
                tracing::warn!("event stream ended, resubscribing");
            }
            Err(e) => {
                tracing::warn!(error = %e, "event subscription failed");
            }
        }

        attempts += 1;
        if attempts > max_reconnects {
            tracing::error!(attempts, "event source exhausted reconnect attempts");
            return Err(SourceError::Unavailable { attempts });
        }

        tracing::info!(
            attempt = attempts,
            backoff_ms = backoff.as_millis() as u64,
            "resubscribing to event stream"
        );
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2).min(Duration::from_secs(30));
    }
}
