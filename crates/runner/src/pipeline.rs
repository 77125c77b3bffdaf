//! Pipeline orchestration
//!
//! `Pipeline` owns the channel topology of a run: it wires N routing
//! blocks and N steps together, launches them, and supervises their result
//! streams until the run terminates.
//!
//! # Termination protocol
//!
//! - Normal: every routing block and every step reports success; channel
//!   closure cascades from the drained injector, nothing is cancelled.
//! - Error or external signal: the shared child token is cancelled, then
//!   routing blocks get the `shutdown` window and steps the
//!   `step_shutdown` window to report. Steps still outstanding after that
//!   are `StepsNeverReturned`.

use std::sync::Arc;

use rig_events::{EventStorage, Header, TestEventEmitter};
use rig_target::{Target, TargetError};
use rig_test::{StepChannels, StepContext, Test, TestStepBundle};
use rig_types::{JobId, RunId};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::route::{RouteResult, RoutingChannels, StepRouter};
use crate::state::State;
use crate::timeouts::TestRunnerTimeouts;
use crate::{ROUTING_CHANNEL_SIZE, STEP_INPUT_CHANNEL_SIZE};

/// Final result of one step task
#[derive(Debug)]
pub(crate) struct StepResult {
    /// Step label
    pub label: String,

    /// The step failure, if any
    pub err: Option<RunnerError>,
}

/// Everything `init` builds for `run` to launch and supervise
struct PipelineChannels {
    routing_result_tx: mpsc::Sender<RouteResult>,
    routing_result_rx: mpsc::Receiver<RouteResult>,
    step_result_tx: mpsc::Sender<StepResult>,
    step_result_rx: mpsc::Receiver<StepResult>,
    target_err_rx: mpsc::Receiver<TargetError>,
    target_out_rx: mpsc::Receiver<Arc<Target>>,
    routers: Vec<StepRouter>,
    steps: Vec<(TestStepBundle, StepChannels)>,
}

/// The ordered chain of stages with shared error and completion sinks
pub(crate) struct Pipeline {
    bundles: Vec<TestStepBundle>,
    test_name: String,
    job_id: JobId,
    run_id: RunId,
    timeouts: TestRunnerTimeouts,
    storage: Arc<dyn EventStorage>,
    ctrl: Option<PipelineChannels>,
}

impl Pipeline {
    pub(crate) fn new(
        test: &Test,
        job_id: JobId,
        run_id: RunId,
        timeouts: TestRunnerTimeouts,
        storage: Arc<dyn EventStorage>,
    ) -> Self {
        Self {
            bundles: test.test_steps_bundles.clone(),
            test_name: test.name.clone(),
            job_id,
            run_id,
            timeouts,
            storage,
            ctrl: None,
        }
    }

    /// Build the channel topology
    ///
    /// Returns the sender the external injector feeds the first stage
    /// with; dropping it is the end-of-input signal for the whole
    /// pipeline.
    pub(crate) fn init(&mut self) -> mpsc::Sender<Arc<Target>> {
        tracing::debug!(stages = self.bundles.len(), "setting up pipeline channels");

        let total = self.bundles.len().max(1);
        let (input_tx, mut prev_rx) = mpsc::channel::<Arc<Target>>(ROUTING_CHANNEL_SIZE);
        let (target_err_tx, target_err_rx) = mpsc::channel::<TargetError>(ROUTING_CHANNEL_SIZE);
        let (routing_result_tx, routing_result_rx) = mpsc::channel::<RouteResult>(total);
        let (step_result_tx, step_result_rx) = mpsc::channel::<StepResult>(total);

        let mut routers = Vec::with_capacity(self.bundles.len());
        let mut steps = Vec::with_capacity(self.bundles.len());

        for bundle in &self.bundles {
            let label = bundle.test_step_label.clone();
            let (step_in_tx, step_in_rx) = mpsc::channel::<Arc<Target>>(STEP_INPUT_CHANNEL_SIZE);
            let (step_out_tx, step_out_rx) = mpsc::channel::<Arc<Target>>(ROUTING_CHANNEL_SIZE);
            let (step_err_tx, step_err_rx) = mpsc::channel::<TargetError>(ROUTING_CHANNEL_SIZE);
            let (route_out_tx, route_out_rx) = mpsc::channel::<Arc<Target>>(ROUTING_CHANNEL_SIZE);

            let ev = TestEventEmitter::new(
                Header {
                    job_id: self.job_id,
                    run_id: self.run_id,
                    test_name: self.test_name.clone(),
                    test_step_label: label.clone(),
                },
                Arc::clone(&self.storage),
            );

            routers.push(StepRouter::new(
                label,
                RoutingChannels {
                    route_in: prev_rx,
                    route_out: route_out_tx,
                    step_in: step_in_tx,
                    step_out: step_out_rx,
                    step_err: step_err_rx,
                    target_err: target_err_tx.clone(),
                },
                ev,
                self.timeouts,
            ));
            steps.push((
                bundle.clone(),
                StepChannels {
                    step_in: step_in_rx,
                    step_out: step_out_tx,
                    step_err: step_err_tx,
                },
            ));

            // This stage's routing output is the next stage's input; the
            // last one is the completed-target stream.
            prev_rx = route_out_rx;
        }

        self.ctrl = Some(PipelineChannels {
            routing_result_tx,
            routing_result_rx,
            step_result_tx,
            step_result_rx,
            target_err_rx,
            target_out_rx: prev_rx,
            routers,
            steps,
        });

        input_tx
    }

    /// Launch every stage and supervise the run to completion
    ///
    /// Successful targets leaving the last stage are forwarded on
    /// `completed_tx` as they arrive.
    pub(crate) async fn run(
        mut self,
        cancel: CancellationToken,
        pause: CancellationToken,
        completed_tx: mpsc::Sender<Arc<Target>>,
    ) -> Result<(), RunnerError> {
        let PipelineChannels {
            routing_result_tx,
            mut routing_result_rx,
            step_result_tx,
            mut step_result_rx,
            mut target_err_rx,
            mut target_out_rx,
            routers,
            steps,
        } = self.ctrl.take().expect("pipeline run called before init");

        // The pipeline cancels its own child scope; the caller's token
        // stays untouched so external cancellation remains observable.
        let run_cancel = cancel.child_token();

        for (bundle, channels) in steps {
            self.spawn_step(
                bundle,
                channels,
                run_cancel.clone(),
                pause.clone(),
                step_result_tx.clone(),
            );
        }
        for router in routers {
            tokio::spawn(router.route(run_cancel.clone(), routing_result_tx.clone()));
        }
        // Workers hold the only remaining clones; the result channels now
        // close once every worker has reported.
        drop(routing_result_tx);
        drop(step_result_tx);

        let total = self.bundles.len();
        let mut state = State::new();
        let mut remaining_routing = total;
        let mut remaining_steps = total;
        let mut routing_open = true;
        let mut steps_open = true;
        let mut err_open = true;
        let mut out_open = true;
        let mut primary: Option<RunnerError> = None;
        let mut cancelled = false;
        let mut paused = false;

        tracing::info!(stages = total, "running pipeline");

        while primary.is_none()
            && !cancelled
            && !paused
            && (remaining_routing > 0 || out_open || err_open)
        {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("cancellation requested, terminating pipeline");
                    cancelled = true;
                }
                _ = pause.cancelled() => {
                    tracing::info!("pause requested, quiescing pipeline");
                    paused = true;
                }
                maybe_result = step_result_rx.recv(), if steps_open => match maybe_result {
                    Some(result) => {
                        remaining_steps -= 1;
                        state.set_step(&result.label, result.err.clone());
                        if let Some(step_err) = result.err {
                            tracing::debug!(step = %result.label, error = %step_err, "step failed");
                            if primary.is_none() {
                                primary = Some(step_err);
                            }
                        }
                    }
                    None => steps_open = false,
                },
                maybe_result = routing_result_rx.recv(), if routing_open => match maybe_result {
                    Some(result) => {
                        remaining_routing -= 1;
                        state.set_routing(&result.label, result.err.clone());
                        if let Some(routing_err) = result.err {
                            tracing::debug!(step = %result.label, error = %routing_err, "routing failed");
                            if primary.is_none() && !routing_err.is_cancellation() {
                                primary = Some(routing_err);
                            }
                        }
                    }
                    None => {
                        // Every routing block posts a result before releasing
                        // its sender; an early close means one died mid-run.
                        if remaining_routing > 0 {
                            panic!(
                                "routing result channel closed with {remaining_routing} routing blocks outstanding"
                            );
                        }
                        routing_open = false;
                    }
                },
                maybe_error = target_err_rx.recv(), if err_open => match maybe_error {
                    Some(target_error) => {
                        tracing::debug!(
                            target = %target_error.target,
                            error = %target_error.err,
                            "target failed"
                        );
                        state.set_target(&target_error.target.id, Some(format!("{:#}", target_error.err)));
                    }
                    None => err_open = false,
                },
                maybe_target = target_out_rx.recv(), if out_open => match maybe_target {
                    Some(target) => {
                        state.set_target(&target.id, None);
                        tokio::select! {
                            res = completed_tx.send(Arc::clone(&target)) => {
                                if res.is_err() {
                                    tracing::debug!(target = %target, "completed channel dropped");
                                }
                            }
                            _ = sleep(self.timeouts.message) => {
                                panic!("could not deliver completed target {target}");
                            }
                        }
                    }
                    None => out_open = false,
                },
            }
        }

        if primary.is_some() || cancelled || paused {
            // Error termination: cancel everything, then give workers their
            // shutdown windows to report.
            run_cancel.cancel();

            let deadline = Instant::now() + self.timeouts.shutdown;
            while remaining_routing > 0 {
                match timeout_at(deadline, routing_result_rx.recv()).await {
                    Ok(Some(result)) => {
                        remaining_routing -= 1;
                        state.set_routing(&result.label, result.err.clone());
                        if let Some(routing_err) = result.err {
                            if primary.is_none() && !routing_err.is_cancellation() {
                                primary = Some(routing_err);
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            let deadline = Instant::now() + self.timeouts.step_shutdown;
            collect_step_results(
                deadline,
                &mut step_result_rx,
                &mut state,
                &mut primary,
                &mut remaining_steps,
            )
            .await;
        } else if remaining_steps > 0 {
            // Normal termination with steps still running: their input is
            // drained and closed, so give them a chance to return on their
            // own before resorting to cancellation.
            let deadline = Instant::now() + self.timeouts.step_shutdown;
            collect_step_results(
                deadline,
                &mut step_result_rx,
                &mut state,
                &mut primary,
                &mut remaining_steps,
            )
            .await;

            if remaining_steps > 0 {
                run_cancel.cancel();
                let deadline = Instant::now() + self.timeouts.step_shutdown;
                collect_step_results(
                    deadline,
                    &mut step_result_rx,
                    &mut state,
                    &mut primary,
                    &mut remaining_steps,
                )
                .await;
            }
        }

        let incomplete_routing = state.incomplete_routing(&self.bundles);
        if !incomplete_routing.is_empty() {
            tracing::warn!(
                blocks = ?incomplete_routing,
                "routing blocks did not complete within the shutdown window"
            );
        }

        let incomplete_steps = state.incomplete_steps(&self.bundles);
        let result = if incomplete_steps.is_empty() {
            match primary {
                Some(primary_err) => Err(primary_err),
                None => Ok(()),
            }
        } else {
            let never_returned = RunnerError::StepsNeverReturned {
                steps: incomplete_steps,
            };
            match primary {
                Some(primary_err) => {
                    tracing::warn!(error = %never_returned, "steps outstanding at termination");
                    Err(primary_err)
                }
                None => Err(never_returned),
            }
        };

        tracing::info!(
            completed_targets = state.completed_targets().len(),
            error = ?result.as_ref().err(),
            "pipeline terminated"
        );
        result
    }

    /// Launch one step inside a wrapper that classifies its exit
    fn spawn_step(
        &self,
        bundle: TestStepBundle,
        channels: StepChannels,
        cancel: CancellationToken,
        pause: CancellationToken,
        result_tx: mpsc::Sender<StepResult>,
    ) {
        let label = bundle.test_step_label.clone();
        tracing::debug!(step = %label, "launching test step");

        let ctx = StepContext {
            cancel,
            pause,
            job_id: self.job_id,
            run_id: self.run_id,
            label: label.clone(),
        };
        let step_task =
            tokio::spawn(async move { bundle.test_step.run(ctx, channels, &bundle.parameters).await });

        tokio::spawn(async move {
            let err = match step_task.await {
                Ok(Ok(())) => None,
                Ok(Err(step_err)) => Some(RunnerError::StepFailed {
                    step: label.clone(),
                    reason: format!("{step_err:#}"),
                }),
                Err(join_err) if join_err.is_panic() => Some(RunnerError::StepPanic {
                    step: label.clone(),
                    message: panic_message(join_err.into_panic()),
                }),
                Err(join_err) => Some(RunnerError::StepFailed {
                    step: label.clone(),
                    reason: format!("step task aborted: {join_err}"),
                }),
            };
            if result_tx.send(StepResult { label, err }).await.is_err() {
                tracing::debug!("pipeline terminated before step result could be delivered");
            }
        });
    }
}

/// Drain step results until `remaining` hits zero or the deadline expires
async fn collect_step_results(
    deadline: Instant,
    step_result_rx: &mut mpsc::Receiver<StepResult>,
    state: &mut State,
    primary: &mut Option<RunnerError>,
    remaining: &mut usize,
) {
    while *remaining > 0 {
        match timeout_at(deadline, step_result_rx.recv()).await {
            Ok(Some(result)) => {
                *remaining -= 1;
                state.set_step(&result.label, result.err.clone());
                if let Some(step_err) = result.err {
                    tracing::debug!(step = %result.label, error = %step_err, "step failed");
                    if primary.is_none() {
                        *primary = Some(step_err);
                    }
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
}

/// Render a panic payload as text
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
