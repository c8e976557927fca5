use crate::error::GatewayError;
use crate::ledger::TaskResponded;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Responses kept around for waiters that register just after their
/// confirmation landed. Bounds memory under sustained load.
const RECENT_CAP: usize = 64;

/// Waiter registry keyed by task index.
///
/// One dispatcher drains the responded fan-out and fulfills waiters
/// key-exact, so concurrent callers can never receive each other's
/// confirmation. A response with no waiter yet is parked in a small
/// ring: the gateway learns its task index only from the creation
/// receipt, and the operator can respond in that window.
pub struct CorrelationTable {
    waiters: Mutex<HashMap<u32, oneshot::Sender<TaskResponded>>>,
    recent: Mutex<VecDeque<TaskResponded>>,
}

impl CorrelationTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            waiters: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::new()),
        })
    }

    /// Drain `responses` into the table for as long as the channel lives.
    pub fn spawn_dispatcher(
        self: &Arc<Self>,
        mut responses: broadcast::Receiver<TaskResponded>,
    ) -> JoinHandle<()> {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match responses.recv().await {
                    Ok(responded) => table.fulfill(responded),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "correlation dispatcher lagged behind responses");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("response channel closed, dispatcher exiting");
                        return;
                    }
                }
            }
        })
    }

    /// Register a waiter for `task_index`. If the matching response
    /// already landed it is delivered immediately. The returned waiter
    /// deregisters itself on every exit path, including cancellation.
    pub fn register(self: &Arc<Self>, task_index: u32) -> Waiter {
        let (tx, rx) = oneshot::channel();

        let parked = {
            let mut recent = self.recent.lock().expect("recent lock");
            recent
                .iter()
                .position(|r| r.task_index == task_index)
                .and_then(|at| recent.remove(at))
        };

        if let Some(responded) = parked {
            let _ = tx.send(responded);
        } else {
            self.waiters
                .lock()
                .expect("waiters lock")
                .insert(task_index, tx);
        }

        Waiter {
            table: Arc::clone(self),
            task_index,
            rx: Some(rx),
        }
    }

    fn fulfill(&self, responded: TaskResponded) {
        let waiter = self
            .waiters
            .lock()
            .expect("waiters lock")
            .remove(&responded.task_index);

        match waiter {
            // Send fails only when the waiter gave up; nothing to do.
            Some(tx) => {
                let _ = tx.send(responded);
            }
            None => {
                let mut recent = self.recent.lock().expect("recent lock");
                if recent.len() == RECENT_CAP {
                    recent.pop_front();
                }
                recent.push_back(responded);
            }
        }
    }

    fn deregister(&self, task_index: u32) {
        self.waiters
            .lock()
            .expect("waiters lock")
            .remove(&task_index);
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().expect("waiters lock").len()
    }
}

/// A registered wait for one task's confirmation.
pub struct Waiter {
    table: Arc<CorrelationTable>,
    task_index: u32,
    rx: Option<oneshot::Receiver<TaskResponded>>,
}

impl Waiter {
    pub fn task_index(&self) -> u32 {
        self.task_index
    }

    /// Resolve to the matching confirmation, or time out. Deregistration
    /// happens on drop, so every exit path leaves the registry clean,
    /// caller cancellation included.
    pub async fn wait(mut self, timeout: Duration) -> Result<TaskResponded, GatewayError> {
        let rx = self.rx.take().expect("wait consumes the waiter");
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(responded)) => Ok(responded),
            Ok(Err(_)) => Err(GatewayError::Internal(
                "waiter channel closed before fulfillment".into(),
            )),
            Err(_) => Err(GatewayError::Timeout),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.table.deregister(self.task_index);
    }
}
