//! Ledger client seam.
//!
//! The core only consumes four operations (read, subscribe, submit,
//! await-confirmation), so everything behind them (RPC transport,
//! ABI encoding, chain reorg handling) stays out of the operator's way.
//! `RpcLedgerClient` talks JSON-RPC to a real endpoint; `StubLedger` is an
//! instance-based in-memory ledger for tests and the offline demo path.

mod rpc;
mod stub;

pub use rpc::RpcLedgerClient;
pub use stub::StubLedger;

use crate::error::LedgerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// An immutable unit of work published by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub contents: String,
    pub created_at_block: u64,
    #[serde(default)]
    pub score_difference: Option<u32>,
}

/// Decoded `NewTaskCreated` log entry. `task_index` is the only valid
/// correlation key for the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCreated {
    pub task_index: u32,
    pub task: Task,
    pub block_number: u64,
}

/// Decoded `TaskResponded` log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponded {
    pub task_index: u32,
    pub text_response: String,
    pub game_id: u32,
    pub target_score: u32,
    pub responder: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    TaskCreated(TaskCreated),
    TaskResponded(TaskResponded),
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::TaskCreated(_) => EventKind::TaskCreated,
            LedgerEvent::TaskResponded(_) => EventKind::TaskResponded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    TaskResponded,
}

/// Subscription filter. `kind: None` delivers every decoded event.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter {
    pub kind: Option<EventKind>,
    pub from_block: Option<u64>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(kind: EventKind) -> Self {
        Self {
            kind: Some(kind),
            from_block: None,
        }
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        self.kind.is_none_or(|kind| kind == event.kind())
    }
}

/// A contract invocation, already reduced to function name + JSON args.
/// ABI mechanics live behind the client implementation.
#[derive(Debug, Clone, Serialize)]
pub struct ContractCall {
    pub function: String,
    pub args: serde_json::Value,
}

impl ContractCall {
    pub fn create_task(contents: &str, score_difference: u32) -> Self {
        Self {
            function: "createTask".into(),
            args: serde_json::json!([contents, score_difference]),
        }
    }

    pub fn respond_to_task(
        task: &Task,
        task_index: u32,
        text_response: &str,
        game_id: u32,
        target_score: u32,
        is_safe: Option<bool>,
        signature_hex: &str,
    ) -> Self {
        Self {
            function: "respondToTask".into(),
            args: serde_json::json!([
                task,
                task_index,
                { "textResponse": text_response,
                  "gameId": game_id,
                  "targetScore": target_score,
                  "isSafe": is_safe },
                signature_hex,
            ]),
        }
    }
}

/// Handle for a broadcast transaction, pending confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: String,
}

/// Confirmation receipt, carrying the events the transaction itself emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub events: Vec<LedgerEvent>,
}

impl Receipt {
    /// The creation event emitted by this transaction, if any. This is the
    /// only place a caller may learn its assigned `task_index` from;
    /// correlation by "most recent log" cross-delivers under concurrency.
    pub fn created_task_index(&self) -> Option<u32> {
        self.events.iter().find_map(|event| match event {
            LedgerEvent::TaskCreated(created) => Some(created.task_index),
            LedgerEvent::TaskResponded(_) => None,
        })
    }
}

/// The four-operation surface the core consumes.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Dry-run a call against current ledger state without submitting it.
    async fn read(&self, call: &ContractCall) -> Result<serde_json::Value, LedgerError>;

    /// Subscribe to decoded contract events, ordered by task index for
    /// task-created entries. Delivery is at-least-once across reconnects;
    /// the stream ends when the underlying transport drops.
    async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> Result<mpsc::Receiver<LedgerEvent>, LedgerError>;

    /// Sign-and-broadcast a transaction on behalf of the operator identity.
    async fn submit(&self, call: &ContractCall) -> Result<TxHandle, LedgerError>;

    /// Block until the transaction is confirmed or `timeout` elapses.
    async fn await_confirmation(
        &self,
        tx: &TxHandle,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError>;
}
