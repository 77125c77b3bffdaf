//! The test step contract

use std::sync::Arc;

use async_trait::async_trait;
use rig_target::{Target, TargetError};
use rig_types::{JobId, RunId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::param::TestStepParameters;

/// Run-scoped context handed to a step's `run`
///
/// `cancel` is terminal; `pause` requests graceful quiescence for external
/// checkpointing. Steps must react to both promptly.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Terminal cancellation signal
    pub cancel: CancellationToken,

    /// One-shot pause signal
    pub pause: CancellationToken,

    /// Job this run belongs to
    pub job_id: JobId,

    /// Run within the job
    pub run_id: RunId,

    /// Label of this step within the pipeline
    pub label: String,
}

/// The channel ends a step owns for the duration of its `run`
///
/// `step_in` is closed by the routing block once no more targets will
/// arrive. Dropping `step_out`/`step_err` is how a step signals that it
/// will produce no further output.
#[derive(Debug)]
pub struct StepChannels {
    /// Targets to process, closed by the routing block
    pub step_in: mpsc::Receiver<Arc<Target>>,

    /// Successful targets out
    pub step_out: mpsc::Sender<Arc<Target>>,

    /// Per-target failures out
    pub step_err: mpsc::Sender<TargetError>,
}

/// A user-supplied transformation stage
///
/// Implementations are shared across runs behind an `Arc` and must not
/// keep per-run state in `&self`.
#[async_trait]
pub trait TestStep: Send + Sync {
    /// Stable name of the step implementation
    fn name(&self) -> &'static str;

    /// Drive the step until `step_in` closes or the run is cancelled
    ///
    /// A returned error is a whole-step failure and aborts the pipeline;
    /// per-target failures go to `step_err` instead.
    async fn run(
        &self,
        ctx: StepContext,
        channels: StepChannels,
        params: &TestStepParameters,
    ) -> anyhow::Result<()>;
}
