//! Example step - forwards every target

use async_trait::async_trait;
use rig_test::{StepChannels, StepContext, TestStep, TestStepParameters};

/// Pass-through step
///
/// Forwards every target to `step_out` unchanged. Takes no parameters.
/// Useful as a pipeline placeholder and as the well-behaved stage in the
/// runner's scenario suite.
#[derive(Debug, Default)]
pub struct ExampleStep;

impl ExampleStep {
    /// Create an example step
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestStep for ExampleStep {
    fn name(&self) -> &'static str {
        "Example"
    }

    async fn run(
        &self,
        ctx: StepContext,
        mut channels: StepChannels,
        _params: &TestStepParameters,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    tracing::debug!(step = %ctx.label, "cancellation requested, returning");
                    return Ok(());
                }
                _ = ctx.pause.cancelled() => {
                    tracing::debug!(step = %ctx.label, "pause requested, returning");
                    return Ok(());
                }
                maybe_target = channels.step_in.recv() => {
                    let Some(target) = maybe_target else {
                        tracing::debug!(step = %ctx.label, "input channel closed, returning");
                        return Ok(());
                    };
                    tracing::debug!(step = %ctx.label, target = %target, "forwarding target");
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => return Ok(()),
                        res = channels.step_out.send(target) => {
                            if res.is_err() {
                                // Routing side went away; nothing left to do.
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}
