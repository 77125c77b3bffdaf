//! Per-stage routing blocks
//!
//! One routing block per pipeline stage. Each block runs two concurrent
//! halves joined by a shared child cancellation scope:
//!
//! - `route_in` accepts targets from the previous stage, buffers them FIFO
//!   and injects them into the test step one at a time;
//! - `route_out` drains the step's output and error channels, emits the
//!   egress events and forwards targets to the next stage (or the failed
//!   target fan-in).
//!
//! Whichever half fails first cancels the other; the supervisor reports a
//! single `RouteResult` to the pipeline.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rig_events::{Emitter, EventData, EventError, TestEventEmitter};
use rig_target::{
    ErrPayload, Target, TargetError, EVENT_TARGET_ERR, EVENT_TARGET_IN, EVENT_TARGET_IN_ERR,
    EVENT_TARGET_OUT,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::timeouts::TestRunnerTimeouts;
use crate::writer::{InjectionChannels, InjectionResult, TargetWriter, WriteError};

/// The channel ends a routing block owns
///
/// `route_in`/`route_out` connect the block to its neighbours; `step_in`,
/// `step_out` and `step_err` connect it to its test step; `target_err` is
/// the shared fan-in to the pipeline for failed targets.
pub(crate) struct RoutingChannels {
    pub route_in: mpsc::Receiver<Arc<Target>>,
    pub route_out: mpsc::Sender<Arc<Target>>,
    pub step_in: mpsc::Sender<Arc<Target>>,
    pub step_out: mpsc::Receiver<Arc<Target>>,
    pub step_err: mpsc::Receiver<TargetError>,
    pub target_err: mpsc::Sender<TargetError>,
}

/// Final result of one routing block
#[derive(Debug)]
pub(crate) struct RouteResult {
    /// Step label the block belongs to
    pub label: String,

    /// The routing failure, if any
    pub err: Option<RunnerError>,
}

/// Routing block for one pipeline stage
pub(crate) struct StepRouter {
    label: String,
    channels: RoutingChannels,
    ev: TestEventEmitter,
    timeouts: TestRunnerTimeouts,
}

impl StepRouter {
    pub(crate) fn new(
        label: String,
        channels: RoutingChannels,
        ev: TestEventEmitter,
        timeouts: TestRunnerTimeouts,
    ) -> Self {
        Self {
            label,
            channels,
            ev,
            timeouts,
        }
    }

    /// Run both routing halves to completion and report the outcome
    ///
    /// The result must be accepted by the pipeline within the `message`
    /// timeout; anything else means the supervisor is wedged and the
    /// accounting invariant cannot be upheld.
    pub(crate) async fn route(self, cancel: CancellationToken, result_tx: mpsc::Sender<RouteResult>) {
        tracing::debug!(step = %self.label, "starting routing block");

        let internal = cancel.child_token();
        let RoutingChannels {
            route_in,
            route_out,
            step_in,
            step_out,
            step_err,
            target_err,
        } = self.channels;

        let ingress = RouteIn {
            label: self.label.clone(),
            cancel: internal.clone(),
            route_in,
            step_in,
            ev: self.ev.clone(),
            writer: TargetWriter::new(self.timeouts),
        };
        let egress = RouteOut {
            label: self.label.clone(),
            cancel: internal.clone(),
            route_out,
            step_out,
            step_err,
            target_err,
            ev: self.ev,
            writer: TargetWriter::new(self.timeouts),
            message_timeout: self.timeouts.message,
        };

        let ingress_cancel = internal.clone();
        let ingress_task = tokio::spawn(async move {
            let res = ingress.run().await;
            if res.is_err() {
                ingress_cancel.cancel();
            }
            res
        });
        let egress_cancel = internal;
        let egress_task = tokio::spawn(async move {
            let res = egress.run().await;
            if res.is_err() {
                egress_cancel.cancel();
            }
            res
        });

        let ingress_res = join_half(ingress_task).await;
        let egress_res = join_half(egress_task).await;

        let err = match (ingress_res, egress_res) {
            (Ok(ingress), Ok(egress)) if ingress != egress => {
                Some(RunnerError::TargetCountMismatch {
                    step: self.label.clone(),
                    ingress,
                    egress,
                })
            }
            (Ok(_), Ok(_)) => None,
            // Prefer the error that caused the cancellation of the sibling.
            (Err(in_err), Err(out_err)) => {
                Some(if in_err.is_cancellation() && !out_err.is_cancellation() {
                    out_err
                } else {
                    in_err
                })
            }
            (Err(half_err), Ok(_)) | (Ok(_), Err(half_err)) => Some(half_err),
        };

        tracing::debug!(step = %self.label, error = ?err, "routing block finished");

        tokio::select! {
            res = result_tx.send(RouteResult { label: self.label.clone(), err }) => {
                if res.is_err() {
                    panic!("could not send routing block result for step '{}'", self.label);
                }
            }
            _ = sleep(self.timeouts.message) => {
                panic!("timeout while sending routing block result for step '{}'", self.label);
            }
        }
    }
}

/// Resolve a routing half, propagating panics from its task
async fn join_half(task: JoinHandle<Result<usize, RunnerError>>) -> Result<usize, RunnerError> {
    match task.await {
        Ok(res) => res,
        Err(join_err) if join_err.is_panic() => std::panic::resume_unwind(join_err.into_panic()),
        Err(join_err) => panic!("routing task aborted: {join_err}"),
    }
}

/// Ingress half: previous stage -> step input
struct RouteIn {
    label: String,
    cancel: CancellationToken,
    route_in: mpsc::Receiver<Arc<Target>>,
    step_in: mpsc::Sender<Arc<Target>>,
    ev: TestEventEmitter,
    writer: TargetWriter,
}

impl RouteIn {
    /// Returns the number of targets injected into the step
    async fn run(mut self) -> Result<usize, RunnerError> {
        tracing::debug!(step = %self.label, "initializing route_in");

        // Targets queued for injection. Strictly FIFO: push_back on
        // arrival, pop_front on injection.
        let mut buffer: VecDeque<Arc<Target>> = VecDeque::new();
        // Ingress time per admitted target id; doubles as the ingress count.
        let mut ingress: HashMap<String, DateTime<Utc>> = HashMap::new();
        let (result_tx, mut result_rx) = mpsc::channel::<InjectionResult>(1);
        // Injection tasks get their own token so a cancelled routing scope
        // still lets the loop below reap the in-flight injection.
        let writer_cancel = CancellationToken::new();
        let mut in_flight: Option<JoinHandle<()>> = None;
        let mut input_open = true;
        let mut err: Option<RunnerError> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    err = Some(RunnerError::RoutingCancelled {
                        step: self.label.clone(),
                    });
                }
                Some(result) = result_rx.recv() => {
                    tracing::debug!(step = %self.label, target = %result.target, "received injection result");
                    if let Some(handle) = in_flight.take() {
                        let _ = handle.await;
                    }
                    match result.err {
                        Some(WriteError::Closed) => {
                            err = Some(RunnerError::StepClosedChannels {
                                step: self.label.clone(),
                                target: result.target.id.clone(),
                            });
                            emit_or_warn(
                                &self.ev,
                                &self.label,
                                EventData::for_target(EVENT_TARGET_IN_ERR, Arc::clone(&result.target)),
                            )
                            .await;
                        }
                        Some(WriteError::Timeout(timeout)) => {
                            err = Some(RunnerError::InjectionFailed {
                                step: self.label.clone(),
                                target: result.target.id.clone(),
                                timeout,
                            });
                            emit_or_warn(
                                &self.ev,
                                &self.label,
                                EventData::for_target(EVENT_TARGET_IN_ERR, Arc::clone(&result.target)),
                            )
                            .await;
                        }
                        None => {
                            emit_or_warn(
                                &self.ev,
                                &self.label,
                                EventData::for_target(EVENT_TARGET_IN, Arc::clone(&result.target)),
                            )
                            .await;
                        }
                    }
                }
                maybe_target = self.route_in.recv(), if input_open => {
                    match maybe_target {
                        Some(target) => {
                            tracing::debug!(step = %self.label, target = %target, "received target in input");
                            buffer.push_back(target);
                        }
                        None => {
                            tracing::debug!(step = %self.label, "routing input channel closed");
                            input_open = false;
                        }
                    }
                }
            }

            if err.is_some() {
                break;
            }
            if in_flight.is_some() {
                continue;
            }
            let Some(target) = buffer.pop_front() else {
                if input_open {
                    continue;
                }
                tracing::debug!(step = %self.label, "input drained, closing step input channel");
                break;
            };

            tracing::debug!(step = %self.label, target = %target, "writing target into test step");
            ingress.insert(target.id.clone(), Utc::now());
            let injection = InjectionChannels {
                step_in: self.step_in.clone(),
                result: result_tx.clone(),
            };
            let writer = self.writer;
            let injection_cancel = writer_cancel.clone();
            in_flight = Some(tokio::spawn(async move {
                writer
                    .write_target_with_result(&injection_cancel, target, &injection)
                    .await;
            }));
        }

        // Stop any in-flight injection and wait for it, regardless of how
        // the loop ended. Dropping `self` afterwards closes step_in.
        writer_cancel.cancel();
        if let Some(handle) = in_flight.take() {
            let _ = handle.await;
        }

        match err {
            Some(route_err) => {
                tracing::debug!(step = %self.label, error = %route_err, "route_in failed");
                Err(route_err)
            }
            None => Ok(ingress.len()),
        }
    }
}

/// Egress half: step outputs -> next stage / failed target fan-in
struct RouteOut {
    label: String,
    cancel: CancellationToken,
    route_out: mpsc::Sender<Arc<Target>>,
    step_out: mpsc::Receiver<Arc<Target>>,
    step_err: mpsc::Receiver<TargetError>,
    target_err: mpsc::Sender<TargetError>,
    ev: TestEventEmitter,
    writer: TargetWriter,
    message_timeout: Duration,
}

impl RouteOut {
    /// Returns the number of targets that left the step
    async fn run(mut self) -> Result<usize, RunnerError> {
        tracing::debug!(step = %self.label, "initializing route_out");

        // Egress time per target id; doubles as the egress count and the
        // duplicate detector.
        let mut egress: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut out_open = true;
        let mut err_open = true;
        let mut err: Option<RunnerError> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    err = Some(RunnerError::RoutingCancelled {
                        step: self.label.clone(),
                    });
                }
                maybe_target = self.step_out.recv(), if out_open => {
                    match maybe_target {
                        None => {
                            tracing::debug!(step = %self.label, "step output channel closed");
                            out_open = false;
                        }
                        Some(target) => {
                            if egress.contains_key(&target.id) {
                                err = Some(RunnerError::DuplicateTarget {
                                    step: self.label.clone(),
                                    target: target.id.clone(),
                                });
                            } else {
                                if let Err(emit_err) =
                                    emit_out_event(&self.ev, &target, None).await
                                {
                                    tracing::warn!(
                                        step = %self.label,
                                        target = %target,
                                        error = %emit_err,
                                        "could not emit out event for target"
                                    );
                                }
                                egress.insert(target.id.clone(), Utc::now());
                                if let Err(write_err) = self
                                    .writer
                                    .write_target(
                                        &self.cancel,
                                        &self.route_out,
                                        Arc::clone(&target),
                                        self.message_timeout,
                                    )
                                    .await
                                {
                                    panic!(
                                        "could not forward target {target} out of step '{}': {write_err}",
                                        self.label
                                    );
                                }
                            }
                        }
                    }
                }
                maybe_error = self.step_err.recv(), if err_open => {
                    match maybe_error {
                        None => {
                            tracing::debug!(step = %self.label, "step error channel closed");
                            err_open = false;
                        }
                        Some(target_error) => {
                            let target = Arc::clone(&target_error.target);
                            if egress.contains_key(&target.id) {
                                err = Some(RunnerError::DuplicateTarget {
                                    step: self.label.clone(),
                                    target: target.id.clone(),
                                });
                            } else {
                                if let Err(emit_err) =
                                    emit_out_event(&self.ev, &target, Some(&target_error.err)).await
                                {
                                    tracing::warn!(
                                        step = %self.label,
                                        target = %target,
                                        error = %emit_err,
                                        "could not emit err event for target"
                                    );
                                }
                                egress.insert(target.id.clone(), Utc::now());
                                if let Err(write_err) = self
                                    .writer
                                    .write_target_error(
                                        &self.cancel,
                                        &self.target_err,
                                        target_error,
                                        self.message_timeout,
                                    )
                                    .await
                                {
                                    panic!(
                                        "could not forward target error for {target} to the test runner: {write_err}"
                                    );
                                }
                            }
                        }
                    }
                }
            }

            if err.is_some() {
                break;
            }
            if !out_open && !err_open {
                tracing::debug!(step = %self.label, "step outputs closed, closing routing output");
                break;
            }
        }

        match err {
            Some(route_err) => {
                tracing::debug!(step = %self.label, error = %route_err, "route_out failed");
                Err(route_err)
            }
            None => Ok(egress.len()),
        }
    }
}

/// Emit the egress event for a target, best effort
///
/// A per-target error becomes a `TargetErr` event carrying the message as
/// a JSON payload; success becomes `TargetOut`. Only the `TargetErr`
/// emission failure is propagated so the caller can log it; the success
/// path warns internally.
async fn emit_out_event(
    ev: &TestEventEmitter,
    target: &Arc<Target>,
    err: Option<&anyhow::Error>,
) -> Result<(), EventError> {
    match err {
        Some(step_err) => {
            let payload = ErrPayload {
                error: step_err.to_string(),
            };
            let data = match serde_json::to_value(&payload) {
                Ok(value) => {
                    EventData::for_target(EVENT_TARGET_ERR, Arc::clone(target)).with_payload(value)
                }
                Err(encode_err) => {
                    tracing::warn!(
                        target = %target,
                        error = %encode_err,
                        "could not encode target error payload"
                    );
                    EventData::for_target(EVENT_TARGET_ERR, Arc::clone(target))
                }
            };
            ev.emit(data).await
        }
        None => {
            if let Err(emit_err) = ev
                .emit(EventData::for_target(EVENT_TARGET_OUT, Arc::clone(target)))
                .await
            {
                tracing::warn!(
                    target = %target,
                    error = %emit_err,
                    "could not emit TargetOut event"
                );
            }
            Ok(())
        }
    }
}

/// Emit an event, logging instead of failing
async fn emit_or_warn(ev: &TestEventEmitter, label: &str, data: EventData) {
    let name = data.event_name.clone();
    if let Err(emit_err) = ev.emit(data).await {
        tracing::warn!(step = %label, event = %name, error = %emit_err, "could not emit event");
    }
}

#[cfg(test)]
#[path = "route_test.rs"]
mod route_test;
