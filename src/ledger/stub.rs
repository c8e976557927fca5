use super::{
    ContractCall, EventFilter, LedgerClient, LedgerEvent, Receipt, Task, TaskCreated,
    TaskResponded, TxHandle,
};
use crate::error::LedgerError;
use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Instance-based in-memory ledger. No global statics.
///
/// Assigns task indexes monotonically, enforces one response per task
/// (both at simulation and at submission, like the verifying contract),
/// and emits decoded events to every subscriber. Failure-injection knobs
/// cover the pipeline's retry paths; `replay_task_created` reproduces
/// at-least-once delivery after a reconnect.
pub struct StubLedger {
    state: Mutex<StubState>,
    events: broadcast::Sender<LedgerEvent>,
    responder: String,
}

struct StubState {
    next_index: u32,
    block: u64,
    tasks: HashMap<u32, Task>,
    responded: HashMap<u32, TaskResponded>,
    signatures: HashMap<u32, String>,
    receipts: HashMap<String, Receipt>,
    failing_submits: u32,
    withhold_receipts: bool,
}

fn random_tx_hash() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

impl StubLedger {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(StubState {
                next_index: 0,
                block: 1,
                tasks: HashMap::new(),
                responded: HashMap::new(),
                signatures: HashMap::new(),
                receipts: HashMap::new(),
                failing_submits: 0,
                withhold_receipts: false,
            }),
            events,
            responder: "0x00000000000000000000000000000000000000aa".into(),
        }
    }

    pub fn with_responder(mut self, responder: &str) -> Self {
        self.responder = responder.to_string();
        self
    }

    /// Fail the next `n` submissions with a transport error.
    pub fn fail_next_submits(&self, n: u32) {
        self.state.lock().expect("stub lock").failing_submits = n;
    }

    /// Stop producing receipts, so confirmations time out.
    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().expect("stub lock").withhold_receipts = withhold;
    }

    /// Re-deliver the creation event for `task_index` to all subscribers,
    /// as a reconnecting transport would.
    pub fn replay_task_created(&self, task_index: u32) {
        let event = {
            let state = self.state.lock().expect("stub lock");
            state.tasks.get(&task_index).map(|task| {
                LedgerEvent::TaskCreated(TaskCreated {
                    task_index,
                    task: task.clone(),
                    block_number: task.created_at_block,
                })
            })
        };
        if let Some(event) = event {
            let _ = self.events.send(event);
        }
    }

    /// The response recorded for `task_index`, if one was accepted.
    pub fn response_for(&self, task_index: u32) -> Option<TaskResponded> {
        self.state
            .lock()
            .expect("stub lock")
            .responded
            .get(&task_index)
            .cloned()
    }

    pub fn response_count(&self) -> usize {
        self.state.lock().expect("stub lock").responded.len()
    }

    /// The signature hex submitted with the response for `task_index`.
    pub fn signature_for(&self, task_index: u32) -> Option<String> {
        self.state
            .lock()
            .expect("stub lock")
            .signatures
            .get(&task_index)
            .cloned()
    }

    fn check_respond(state: &StubState, task_index: u32) -> Result<(), LedgerError> {
        if !state.tasks.contains_key(&task_index) {
            return Err(LedgerError::Rejected(format!(
                "unknown task index {task_index}"
            )));
        }
        if state.responded.contains_key(&task_index) {
            return Err(LedgerError::Rejected(format!(
                "task {task_index} already responded"
            )));
        }
        Ok(())
    }

    fn decode_respond_args(
        call: &ContractCall,
    ) -> Result<(u32, String, u32, u32), LedgerError> {
        let index = call.args[1]
            .as_u64()
            .ok_or_else(|| LedgerError::Decode("respondToTask: bad task index".into()))?;
        let payload = &call.args[2];
        let text = payload["textResponse"]
            .as_str()
            .ok_or_else(|| LedgerError::Decode("respondToTask: bad textResponse".into()))?;
        let game_id = payload["gameId"]
            .as_u64()
            .ok_or_else(|| LedgerError::Decode("respondToTask: bad gameId".into()))?;
        let target_score = payload["targetScore"]
            .as_u64()
            .ok_or_else(|| LedgerError::Decode("respondToTask: bad targetScore".into()))?;
        Ok((
            u32::try_from(index).map_err(|_| LedgerError::Decode("task index overflow".into()))?,
            text.to_string(),
            u32::try_from(game_id).map_err(|_| LedgerError::Decode("gameId overflow".into()))?,
            u32::try_from(target_score)
                .map_err(|_| LedgerError::Decode("targetScore overflow".into()))?,
        ))
    }
}

impl Default for StubLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for StubLedger {
    async fn read(&self, call: &ContractCall) -> Result<serde_json::Value, LedgerError> {
        let state = self.state.lock().expect("stub lock");
        match call.function.as_str() {
            "createTask" => Ok(serde_json::Value::Null),
            "respondToTask" => {
                let (index, ..) = Self::decode_respond_args(call)?;
                Self::check_respond(&state, index)?;
                Ok(serde_json::Value::Bool(true))
            }
            other => Err(LedgerError::Rejected(format!("unknown function {other}"))),
        }
    }

    async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> Result<mpsc::Receiver<LedgerEvent>, LedgerError> {
        let (tx, rx) = mpsc::channel(64);
        let mut events = self.events.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if !filter.matches(&event) {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "stub ledger subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(rx)
    }

    async fn submit(&self, call: &ContractCall) -> Result<TxHandle, LedgerError> {
        let (hash, event) = {
            let mut state = self.state.lock().expect("stub lock");

            if state.failing_submits > 0 {
                state.failing_submits -= 1;
                return Err(LedgerError::Transport("injected submit failure".into()));
            }

            state.block += 1;
            let block = state.block;
            let hash = random_tx_hash();

            let event = match call.function.as_str() {
                "createTask" => {
                    let contents = call.args[0]
                        .as_str()
                        .ok_or_else(|| LedgerError::Decode("createTask: bad contents".into()))?
                        .to_string();
                    let score_difference = call.args[1].as_u64().and_then(|v| u32::try_from(v).ok());

                    let task_index = state.next_index;
                    state.next_index += 1;

                    let task = Task {
                        contents,
                        created_at_block: block,
                        score_difference,
                    };
                    state.tasks.insert(task_index, task.clone());

                    LedgerEvent::TaskCreated(TaskCreated {
                        task_index,
                        task,
                        block_number: block,
                    })
                }
                "respondToTask" => {
                    let (task_index, text_response, game_id, target_score) =
                        Self::decode_respond_args(call)?;
                    Self::check_respond(&state, task_index)?;

                    let responded = TaskResponded {
                        task_index,
                        text_response,
                        game_id,
                        target_score,
                        responder: self.responder.clone(),
                        block_number: block,
                    };
                    state.responded.insert(task_index, responded.clone());
                    if let Some(signature) = call.args[3].as_str() {
                        state.signatures.insert(task_index, signature.to_string());
                    }

                    LedgerEvent::TaskResponded(responded)
                }
                other => {
                    return Err(LedgerError::Rejected(format!("unknown function {other}")));
                }
            };

            if !state.withhold_receipts {
                state.receipts.insert(
                    hash.clone(),
                    Receipt {
                        tx_hash: hash.clone(),
                        block_number: block,
                        events: vec![event.clone()],
                    },
                );
            }

            (hash, event)
        };

        let _ = self.events.send(event);
        Ok(TxHandle { hash })
    }

    async fn await_confirmation(
        &self,
        tx: &TxHandle,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(receipt) = self
                .state
                .lock()
                .expect("stub lock")
                .receipts
                .get(&tx.hash)
                .cloned()
            {
                return Ok(receipt);
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::ConfirmationTimeout {
                    tx_hash: tx.hash.clone(),
                });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respond_call(task: &Task, index: u32) -> ContractCall {
        ContractCall::respond_to_task(task, index, "fine", 1, 10, Some(true), "0xsig")
    }

    #[tokio::test]
    async fn create_assigns_monotonic_indexes() {
        let ledger = StubLedger::new();
        let a = ledger
            .submit(&ContractCall::create_task("one", 1))
            .await
            .unwrap();
        let b = ledger
            .submit(&ContractCall::create_task("two", 2))
            .await
            .unwrap();

        let ra = ledger
            .await_confirmation(&a, Duration::from_millis(100))
            .await
            .unwrap();
        let rb = ledger
            .await_confirmation(&b, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(ra.created_task_index(), Some(0));
        assert_eq!(rb.created_task_index(), Some(1));
    }

    #[tokio::test]
    async fn second_response_rejected_at_simulation_and_submit() {
        let ledger = StubLedger::new();
        ledger
            .submit(&ContractCall::create_task("one", 1))
            .await
            .unwrap();

        let task = Task {
            contents: "one".into(),
            created_at_block: 2,
            score_difference: Some(1),
        };
        ledger.submit(&respond_call(&task, 0)).await.unwrap();

        let sim = ledger.read(&respond_call(&task, 0)).await;
        assert!(matches!(sim, Err(LedgerError::Rejected(_))));

        let resubmit = ledger.submit(&respond_call(&task, 0)).await;
        assert!(matches!(resubmit, Err(LedgerError::Rejected(_))));
        assert_eq!(ledger.response_count(), 1);
    }

    #[tokio::test]
    async fn injected_submit_failures_are_transient() {
        let ledger = StubLedger::new();
        ledger.fail_next_submits(1);

        let first = ledger.submit(&ContractCall::create_task("x", 1)).await;
        assert!(matches!(first, Err(LedgerError::Transport(_))));

        let second = ledger.submit(&ContractCall::create_task("x", 1)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn withheld_receipt_times_out() {
        let ledger = StubLedger::new();
        ledger.withhold_receipts(true);

        let tx = ledger
            .submit(&ContractCall::create_task("x", 1))
            .await
            .unwrap();
        let result = ledger
            .await_confirmation(&tx, Duration::from_millis(30))
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::ConfirmationTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn subscription_delivers_and_replays() {
        let ledger = StubLedger::new();
        let mut rx = ledger.subscribe(EventFilter::all()).await.unwrap();

        ledger
            .submit(&ContractCall::create_task("hello", 3))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, LedgerEvent::TaskCreated(ref c) if c.task_index == 0));

        ledger.replay_task_created(0);
        let replayed = rx.recv().await.unwrap();
        assert_eq!(first, replayed);
    }
}
