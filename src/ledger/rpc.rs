use super::{ContractCall, EventFilter, LedgerClient, LedgerEvent, Receipt, TxHandle};
use crate::error::LedgerError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// JSON-RPC ledger client.
///
/// Talks to an operator-facing ledger node over a small JSON-RPC 2.0
/// surface: `ledger_call` (dry-run), `ledger_submit`, `ledger_receipt`,
/// and cursor-based `ledger_events` long-polling for the subscription.
/// Event decoding happens node-side; this client only deserializes.
pub struct RpcLedgerClient {
    endpoint: String,
    contract_address: String,
    client: Client,
    poll_interval: Duration,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct EventBatch {
    events: Vec<LedgerEvent>,
    next_cursor: u64,
}

#[derive(Debug, Deserialize)]
struct RawReceipt {
    tx_hash: String,
    block_number: u64,
    #[serde(default)]
    events: Vec<LedgerEvent>,
}

// Contract-revert errors come back with this JSON-RPC code; everything
// else on the error channel is treated as transport trouble.
const RPC_EXECUTION_REVERTED: i64 = 3;

impl RpcLedgerClient {
    pub fn new(endpoint: &str, contract_address: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            contract_address: contract_address.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            poll_interval: Duration::from_millis(500),
        }
    }

    async fn rpc(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(LedgerError::Transport(format!(
                "ledger node returned {status}: {body}"
            )));
        }

        let decoded: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        if let Some(err) = decoded.error {
            return if err.code == RPC_EXECUTION_REVERTED {
                Err(LedgerError::Rejected(err.message))
            } else {
                Err(LedgerError::Transport(format!(
                    "rpc error {}: {}",
                    err.code, err.message
                )))
            };
        }

        decoded
            .result
            .ok_or_else(|| LedgerError::Decode("rpc response had neither result nor error".into()))
    }

    fn call_params(&self, call: &ContractCall) -> serde_json::Value {
        serde_json::json!({
            "contract": self.contract_address,
            "function": call.function,
            "args": call.args,
        })
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn read(&self, call: &ContractCall) -> Result<serde_json::Value, LedgerError> {
        self.rpc("ledger_call", self.call_params(call)).await
    }

    async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> Result<mpsc::Receiver<LedgerEvent>, LedgerError> {
        let (tx, rx) = mpsc::channel(64);

        let endpoint = self.endpoint.clone();
        let contract = self.contract_address.clone();
        let client = self.client.clone();
        let poll_interval = self.poll_interval;
        let mut cursor = filter.from_block.unwrap_or(0);

        tokio::spawn(async move {
            loop {
                let request = RpcRequest {
                    jsonrpc: "2.0",
                    id: 1,
                    method: "ledger_events",
                    params: serde_json::json!({
                        "contract": contract,
                        "cursor": cursor,
                    }),
                };

                let batch: Result<EventBatch, String> = async {
                    let response = client
                        .post(&endpoint)
                        .json(&request)
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    let decoded: RpcResponse =
                        response.json().await.map_err(|e| e.to_string())?;
                    let result = decoded
                        .result
                        .ok_or_else(|| "empty event batch result".to_string())?;
                    serde_json::from_value(result).map_err(|e| e.to_string())
                }
                .await;

                match batch {
                    Ok(batch) => {
                        cursor = batch.next_cursor;
                        for event in batch.events {
                            if !filter.matches(&event) {
                                continue;
                            }
                            // Receiver gone means the consumer resubscribed
                            // or shut down; end this pump.
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "ledger event poll failed, closing stream");
                        // Dropping tx ends the stream; the event source
                        // owns the resubscribe-with-backoff policy.
                        return;
                    }
                }

                tokio::time::sleep(poll_interval).await;
            }
        });

        Ok(rx)
    }

    async fn submit(&self, call: &ContractCall) -> Result<TxHandle, LedgerError> {
        let result = self.rpc("ledger_submit", self.call_params(call)).await?;
        let hash = result
            .get("tx_hash")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| LedgerError::Decode("submit result missing tx_hash".into()))?;
        Ok(TxHandle { hash: hash.into() })
    }

    async fn await_confirmation(
        &self,
        tx: &TxHandle,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let result = self
                .rpc("ledger_receipt", serde_json::json!({ "tx_hash": tx.hash }))
                .await?;

            if !result.is_null() {
                let raw: RawReceipt =
                    serde_json::from_value(result).map_err(|e| LedgerError::Decode(e.to_string()))?;
                return Ok(Receipt {
                    tx_hash: raw.tx_hash,
                    block_number: raw.block_number,
                    events: raw.events,
                });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::ConfirmationTimeout {
                    tx_hash: tx.hash.clone(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
