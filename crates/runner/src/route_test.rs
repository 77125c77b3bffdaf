//! Routing block tests
//!
//! Each test drives a single `StepRouter` with a hand-rolled step on the
//! other side of the stage channels and asserts the routing result, the
//! forwarded targets and the emitted events.

use std::sync::Arc;
use std::time::Duration;

use rig_events::{EventStorage, Header, MemoryStorage, TestEventEmitter};
use rig_types::{JobId, RunId};
use tokio::time::timeout;

use super::*;

const STAGE: &str = "TestStage";

fn test_timeouts() -> TestRunnerTimeouts {
    TestRunnerTimeouts {
        step_inject: Duration::from_millis(100),
        message: Duration::from_millis(500),
        shutdown: Duration::from_millis(100),
        step_shutdown: Duration::from_millis(100),
    }
}

fn target(id: &str) -> Arc<Target> {
    Arc::new(Target::new(id, format!("host{id}"), format!("host{id}.example.com")))
}

/// All the channel ends a test needs to play both neighbours and the step
struct Stage {
    route_in_tx: mpsc::Sender<Arc<Target>>,
    route_out_rx: mpsc::Receiver<Arc<Target>>,
    step_in_rx: mpsc::Receiver<Arc<Target>>,
    step_out_tx: mpsc::Sender<Arc<Target>>,
    step_err_tx: mpsc::Sender<TargetError>,
    target_err_rx: mpsc::Receiver<TargetError>,
    result_rx: mpsc::Receiver<RouteResult>,
    cancel: CancellationToken,
    storage: Arc<MemoryStorage>,
}

/// Build a router for one stage and spawn it
fn spawn_stage() -> Stage {
    let (route_in_tx, route_in) = mpsc::channel(crate::ROUTING_CHANNEL_SIZE);
    let (route_out, route_out_rx) = mpsc::channel(crate::ROUTING_CHANNEL_SIZE);
    let (step_in, step_in_rx) = mpsc::channel(crate::STEP_INPUT_CHANNEL_SIZE);
    let (step_out_tx, step_out) = mpsc::channel(crate::ROUTING_CHANNEL_SIZE);
    let (step_err_tx, step_err) = mpsc::channel(crate::ROUTING_CHANNEL_SIZE);
    let (target_err, target_err_rx) = mpsc::channel(crate::ROUTING_CHANNEL_SIZE);
    let (result_tx, result_rx) = mpsc::channel(1);

    let storage = Arc::new(MemoryStorage::new());
    let ev = TestEventEmitter::new(
        Header {
            job_id: JobId::new(1),
            run_id: RunId::new(1),
            test_name: "RouteTest".to_string(),
            test_step_label: STAGE.to_string(),
        },
        Arc::clone(&storage) as Arc<dyn EventStorage>,
    );

    let router = StepRouter::new(
        STAGE.to_string(),
        RoutingChannels {
            route_in,
            route_out,
            step_in,
            step_out,
            step_err,
            target_err,
        },
        ev,
        test_timeouts(),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(router.route(cancel.clone(), result_tx));

    Stage {
        route_in_tx,
        route_out_rx,
        step_in_rx,
        step_out_tx,
        step_err_tx,
        target_err_rx,
        result_rx,
        cancel,
        storage,
    }
}

async fn recv_result(result_rx: &mut mpsc::Receiver<RouteResult>) -> RouteResult {
    timeout(Duration::from_secs(2), result_rx.recv())
        .await
        .expect("timeout waiting for routing result")
        .expect("result channel closed")
}

// ============================================================================
// Success paths
// ============================================================================

#[tokio::test]
async fn test_route_forwards_targets_in_fifo_order() {
    let mut stage = spawn_stage();

    // Well-behaved step: forward everything, then release the outputs.
    let mut step_in_rx = stage.step_in_rx;
    let step_out_tx = stage.step_out_tx;
    let step_err_tx = stage.step_err_tx;
    tokio::spawn(async move {
        while let Some(t) = step_in_rx.recv().await {
            step_out_tx.send(t).await.unwrap();
        }
        drop(step_err_tx);
    });

    for id in ["001", "002", "003"] {
        stage.route_in_tx.send(target(id)).await.unwrap();
    }
    drop(stage.route_in_tx);

    let mut forwarded = Vec::new();
    while let Some(t) = stage.route_out_rx.recv().await {
        forwarded.push(t.id.clone());
    }
    assert_eq!(forwarded, vec!["001", "002", "003"]);

    let result = recv_result(&mut stage.result_rx).await;
    assert_eq!(result.label, STAGE);
    assert!(result.err.is_none(), "unexpected error: {:?}", result.err);

    assert_eq!(stage.storage.events_by_name(rig_target::EVENT_TARGET_IN).len(), 3);
    assert_eq!(stage.storage.events_by_name(rig_target::EVENT_TARGET_OUT).len(), 3);
    assert!(stage.storage.events_by_name(rig_target::EVENT_TARGET_ERR).is_empty());
}

#[tokio::test]
async fn test_route_siphons_target_errors_to_fan_in() {
    let mut stage = spawn_stage();

    let mut step_in_rx = stage.step_in_rx;
    let step_out_tx = stage.step_out_tx;
    let step_err_tx = stage.step_err_tx;
    tokio::spawn(async move {
        while let Some(t) = step_in_rx.recv().await {
            if t.id == "002" {
                step_err_tx
                    .send(TargetError::new(t, anyhow::anyhow!("power failure")))
                    .await
                    .unwrap();
            } else {
                step_out_tx.send(t).await.unwrap();
            }
        }
    });

    for id in ["001", "002"] {
        stage.route_in_tx.send(target(id)).await.unwrap();
    }
    drop(stage.route_in_tx);

    let failed = timeout(Duration::from_secs(2), stage.target_err_rx.recv())
        .await
        .expect("timeout waiting for failed target")
        .expect("fan-in channel closed");
    assert_eq!(failed.target.id, "002");

    let result = recv_result(&mut stage.result_rx).await;
    assert!(result.err.is_none(), "unexpected error: {:?}", result.err);

    let err_events = stage.storage.events_by_name(rig_target::EVENT_TARGET_ERR);
    assert_eq!(err_events.len(), 1);
    let payload = err_events[0].data.payload.as_ref().expect("missing payload");
    assert_eq!(payload["Error"], "power failure");
}

#[tokio::test]
async fn test_route_empty_input_closes_cleanly() {
    let mut stage = spawn_stage();

    let mut step_in_rx = stage.step_in_rx;
    let step_out_tx = stage.step_out_tx;
    let step_err_tx = stage.step_err_tx;
    tokio::spawn(async move {
        while let Some(t) = step_in_rx.recv().await {
            step_out_tx.send(t).await.unwrap();
        }
        drop(step_err_tx);
    });

    drop(stage.route_in_tx);

    assert!(stage.route_out_rx.recv().await.is_none());
    let result = recv_result(&mut stage.result_rx).await;
    assert!(result.err.is_none());
    assert!(stage.storage.is_empty());
}

// ============================================================================
// Failure classification
// ============================================================================

#[tokio::test]
async fn test_route_detects_duplicate_target() {
    let mut stage = spawn_stage();

    let mut step_in_rx = stage.step_in_rx;
    let step_out_tx = stage.step_out_tx;
    tokio::spawn(async move {
        if let Some(t) = step_in_rx.recv().await {
            step_out_tx.send(Arc::clone(&t)).await.unwrap();
            step_out_tx.send(t).await.unwrap();
        }
    });

    stage.route_in_tx.send(target("001")).await.unwrap();

    let result = recv_result(&mut stage.result_rx).await;
    assert!(matches!(
        result.err,
        Some(RunnerError::DuplicateTarget { ref target, .. }) if target == "001"
    ));
}

#[tokio::test]
async fn test_route_detects_target_count_mismatch() {
    let mut stage = spawn_stage();

    // Step that swallows its targets and then completes normally.
    let mut step_in_rx = stage.step_in_rx;
    let step_out_tx = stage.step_out_tx;
    let step_err_tx = stage.step_err_tx;
    tokio::spawn(async move {
        while step_in_rx.recv().await.is_some() {}
        drop(step_out_tx);
        drop(step_err_tx);
    });

    for id in ["001", "002"] {
        stage.route_in_tx.send(target(id)).await.unwrap();
    }
    drop(stage.route_in_tx);

    let result = recv_result(&mut stage.result_rx).await;
    assert!(matches!(
        result.err,
        Some(RunnerError::TargetCountMismatch {
            ingress: 2,
            egress: 0,
            ..
        })
    ));
}

#[tokio::test]
async fn test_route_detects_step_closing_channels() {
    let mut stage = spawn_stage();

    // Step that abandons all of its channel ends immediately.
    drop(stage.step_in_rx);
    drop(stage.step_out_tx);
    drop(stage.step_err_tx);

    for id in ["001", "002"] {
        stage.route_in_tx.send(target(id)).await.unwrap();
    }

    let result = recv_result(&mut stage.result_rx).await;
    assert!(matches!(
        result.err,
        Some(RunnerError::StepClosedChannels { .. })
    ));
    assert_eq!(stage.storage.events_by_name(rig_target::EVENT_TARGET_IN_ERR).len(), 1);
}

#[tokio::test]
async fn test_route_detects_injection_timeout() {
    let mut stage = spawn_stage();

    // The step holds its channels but never reads: the first target sits
    // in the input buffer, the second cannot be delivered within
    // step_inject.
    for id in ["001", "002"] {
        stage.route_in_tx.send(target(id)).await.unwrap();
    }

    let result = recv_result(&mut stage.result_rx).await;
    assert!(matches!(
        result.err,
        Some(RunnerError::InjectionFailed { ref target, .. }) if target == "002"
    ));
}

#[tokio::test]
async fn test_route_aborts_on_cancellation() {
    let mut stage = spawn_stage();

    stage.cancel.cancel();

    let result = recv_result(&mut stage.result_rx).await;
    assert!(matches!(
        result.err,
        Some(RunnerError::RoutingCancelled { .. })
    ));
}
