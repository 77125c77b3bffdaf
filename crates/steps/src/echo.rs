//! Echo step - logs a message per target

use anyhow::Context;
use async_trait::async_trait;
use rig_test::{StepChannels, StepContext, TestStep, TestStepParameters};

/// Step that logs a configured message for every target it sees
///
/// # Parameters
///
/// - `message` (exactly one value, required): the text to log.
#[derive(Debug, Default)]
pub struct EchoStep;

impl EchoStep {
    /// Create an echo step
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestStep for EchoStep {
    fn name(&self) -> &'static str {
        "Echo"
    }

    async fn run(
        &self,
        ctx: StepContext,
        mut channels: StepChannels,
        params: &TestStepParameters,
    ) -> anyhow::Result<()> {
        let message = params
            .get_one("message")
            .context("echo step requires a 'message' parameter")?
            .as_str()
            .to_string();

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Ok(()),
                _ = ctx.pause.cancelled() => return Ok(()),
                maybe_target = channels.step_in.recv() => {
                    let Some(target) = maybe_target else {
                        return Ok(());
                    };
                    tracing::info!(step = %ctx.label, target = %target, "{message}");
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => return Ok(()),
                        res = channels.step_out.send(target) => {
                            if res.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}
