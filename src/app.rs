//! Process wiring: construct every component from config, start the
//! event source, operator loop, correlation dispatcher, and gateway, and
//! supervise them until shutdown.

use crate::config::{Config, LedgerMode};
use crate::events::EventSource;
use crate::gateway::{CorrelationTable, GatewayService, run_gateway};
use crate::ledger::{ContractCall, LedgerClient, RpcLedgerClient, StubLedger};
use crate::operator::{OperatorContext, OperatorLoop};
use crate::pipeline::SubmissionPipeline;
use crate::policy::{ResponsePolicy, create_classifier};
use crate::signing::OperatorSigner;
use crate::state::StateTable;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

fn build_ledger(config: &Config, offline: bool, signer: &OperatorSigner) -> Arc<dyn LedgerClient> {
    if offline || config.ledger.mode == LedgerMode::Offline {
        tracing::info!("using in-process stub ledger (offline mode)");
        Arc::new(StubLedger::new().with_responder(signer.address()))
    } else {
        Arc::new(RpcLedgerClient::new(
            &config.ledger.endpoint,
            &config.ledger.contract_address,
        ))
    }
}

/// Run the operator: event source, worker pool, and gateway. Returns when
/// the gateway dies, the event source becomes unavailable, or Ctrl+C.
pub async fn run(config: Config, offline: bool, port_override: Option<u16>) -> Result<()> {
    // No identity, no start.
    let signer = Arc::new(OperatorSigner::from_hex(&config.signer_key()?)?);
    tracing::info!(operator = signer.address(), "operator identity loaded");

    let ledger = build_ledger(&config, offline, &signer);

    // Event source: one subscription, two consumers.
    let source = EventSource::new(
        ledger.clone(),
        config.ledger.max_reconnect_attempts,
        Duration::from_millis(config.ledger.reconnect_backoff_ms),
        config.operator.queue_depth,
    );
    let (channels, source_handle) = source.spawn();

    // Correlation gateway shares the responded fan-out.
    let correlation = CorrelationTable::new();
    let _dispatcher = correlation.spawn_dispatcher(channels.responses.subscribe());

    // Operator loop over the task queue.
    let ctx = OperatorContext {
        state: Arc::new(StateTable::new(config.operator.max_task_attempts)),
        policy: Arc::new(ResponsePolicy::new(
            config.policy.clone(),
            Arc::from(create_classifier(&config.classifier)),
            &config.classifier.prompt_context,
        )),
        signer,
        pipeline: Arc::new(SubmissionPipeline::new(
            ledger.clone(),
            config.operator.submission_attempts,
            Duration::from_millis(config.operator.submission_backoff_ms),
            Duration::from_secs(config.ledger.confirmation_timeout_secs),
        )),
    };
    let _operator = OperatorLoop::new(ctx, config.operator.workers).spawn(channels.tasks);

    let service = Arc::new(GatewayService::new(
        ledger,
        correlation,
        Duration::from_secs(config.ledger.confirmation_timeout_secs),
        Duration::from_secs(config.gateway.response_timeout_secs),
    ));

    let host = config.gateway.host.clone();
    let port = port_override.unwrap_or(config.gateway.port);
    let gateway = tokio::spawn(async move { run_gateway(&host, port, service).await });

    tokio::select! {
        source_result = source_handle => {
            match source_result {
                Ok(Ok(())) => anyhow::bail!("event source stopped unexpectedly"),
                Ok(Err(e)) => Err(e).context("event source unavailable"),
                Err(join_err) => Err(join_err).context("event source panicked"),
            }
        }
        gateway_result = gateway => {
            match gateway_result {
                Ok(result) => result.context("gateway stopped"),
                Err(join_err) => Err(join_err).context("gateway panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, stopping task watcher");
            Ok(())
        }
    }
}

/// One-shot task creation: simulate, submit, confirm, print the receipt.
pub async fn create_task(config: Config, contents: &str, score_difference: u32) -> Result<()> {
    let signer = Arc::new(OperatorSigner::from_hex(&config.signer_key()?)?);
    let ledger = build_ledger(&config, false, &signer);

    let call = ContractCall::create_task(contents, score_difference);
    ledger.read(&call).await.context("task creation would fail")?;

    let tx = ledger.submit(&call).await.context("task submission failed")?;
    println!("Transaction hash: {}", tx.hash);

    let receipt = ledger
        .await_confirmation(
            &tx,
            Duration::from_secs(config.ledger.confirmation_timeout_secs),
        )
        .await
        .context("confirmation failed")?;

    println!("Confirmed in block {}", receipt.block_number);
    if let Some(task_index) = receipt.created_task_index() {
        println!("Assigned task index: {task_index}");
    }
    Ok(())
}
