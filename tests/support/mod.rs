//! Shared wiring for integration tests: a full operator stack over the
//! in-memory stub ledger, with a fixed classifier reply.
#![allow(dead_code)] // not every test binary uses every helper

use attestor::events::EventSource;
use attestor::gateway::{CorrelationTable, GatewayService};
use attestor::ledger::StubLedger;
use attestor::operator::{OperatorContext, OperatorLoop};
use attestor::pipeline::SubmissionPipeline;
use attestor::policy::{DecisionTable, FixedClassifier, ResponsePolicy};
use attestor::signing::OperatorSigner;
use attestor::state::StateTable;
use std::sync::Arc;
use std::time::Duration;

pub const SIGNER_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub struct Harness {
    pub ledger: Arc<StubLedger>,
    pub signer: Arc<OperatorSigner>,
    pub state: Arc<StateTable>,
    pub correlation: Arc<CorrelationTable>,
    pub service: Arc<GatewayService>,
}

/// Spin up event source, operator loop, correlation dispatcher, and
/// gateway service against one stub ledger, the same wiring `app::run`
/// builds, minus the HTTP listener.
pub async fn spawn_stack(classifier_reply: &str) -> Harness {
    let signer = Arc::new(OperatorSigner::from_hex(SIGNER_KEY).unwrap());
    let ledger = Arc::new(StubLedger::new().with_responder(signer.address()));

    let source = EventSource::new(ledger.clone(), 5, Duration::from_millis(20), 64);
    let (channels, _source_handle) = source.spawn();

    let correlation = CorrelationTable::new();
    let _dispatcher = correlation.spawn_dispatcher(channels.responses.subscribe());

    let state = Arc::new(StateTable::new(2));
    let ctx = OperatorContext {
        state: state.clone(),
        policy: Arc::new(ResponsePolicy::new(
            DecisionTable::default(),
            Arc::new(FixedClassifier::new(classifier_reply)),
            "judge the sentiment",
        )),
        signer: signer.clone(),
        pipeline: Arc::new(SubmissionPipeline::new(
            ledger.clone(),
            2,
            Duration::from_millis(50),
            Duration::from_millis(500),
        )),
    };
    let _operator = OperatorLoop::new(ctx, 4).spawn(channels.tasks);

    let service = Arc::new(GatewayService::new(
        ledger.clone(),
        correlation.clone(),
        Duration::from_millis(500),
        Duration::from_secs(2),
    ));

    Harness {
        ledger,
        signer,
        state,
        correlation,
        service,
    }
}

/// Poll until the stub ledger records a response for `task_index`.
pub async fn wait_for_response(ledger: &StubLedger, task_index: u32) -> bool {
    for _ in 0..200 {
        if ledger.response_for(task_index).is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
