//! Deliberately broken steps
//!
//! Each step here violates the step contract in one specific way. The
//! runner's scenario suite drives them through a real pipeline to verify
//! that every misbehavior surfaces as its own clearly-typed error.

use async_trait::async_trait;
use rig_test::{StepChannels, StepContext, TestStep, TestStepParameters};

/// Panics as soon as it is run
#[derive(Debug, Default)]
pub struct PanicStep;

impl PanicStep {
    /// Create a panicking step
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestStep for PanicStep {
    fn name(&self) -> &'static str {
        "Panic"
    }

    async fn run(
        &self,
        _ctx: StepContext,
        _channels: StepChannels,
        _params: &TestStepParameters,
    ) -> anyhow::Result<()> {
        panic!("panic step always panics");
    }
}

/// Forwards every target correctly, releases its outputs, then never returns
///
/// Ignores cancellation on purpose: the targets all make it through the
/// pipeline, but the step task itself stays alive forever.
#[derive(Debug, Default)]
pub struct NoReturnStep;

impl NoReturnStep {
    /// Create a no-return step
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestStep for NoReturnStep {
    fn name(&self) -> &'static str {
        "NoReturn"
    }

    async fn run(
        &self,
        ctx: StepContext,
        channels: StepChannels,
        _params: &TestStepParameters,
    ) -> anyhow::Result<()> {
        let StepChannels {
            mut step_in,
            step_out,
            step_err,
        } = channels;

        while let Some(target) = step_in.recv().await {
            tracing::debug!(step = %ctx.label, target = %target, "forwarding target");
            if step_out.send(target).await.is_err() {
                break;
            }
        }

        // Outputs released, accounting balances; the task itself hangs.
        drop(step_out);
        drop(step_err);
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Consumes targets without forwarding them and never returns
///
/// Keeps its output channels open so the routing block stays blocked on
/// them until the run is cancelled from outside.
#[derive(Debug, Default)]
pub struct HangingStep;

impl HangingStep {
    /// Create a hanging step
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestStep for HangingStep {
    fn name(&self) -> &'static str {
        "Hanging"
    }

    async fn run(
        &self,
        ctx: StepContext,
        mut channels: StepChannels,
        _params: &TestStepParameters,
    ) -> anyhow::Result<()> {
        while let Some(target) = channels.step_in.recv().await {
            tracing::debug!(step = %ctx.label, target = %target, "swallowing target");
        }

        // `channels` stays owned by this future: step_out/step_err remain
        // open while the task hangs.
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Drops all of its channel ends immediately and returns
///
/// The routing block still holds targets to deliver, so the next
/// injection hits a closed channel.
#[derive(Debug, Default)]
pub struct ChannelsStep;

impl ChannelsStep {
    /// Create a channel-dropping step
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestStep for ChannelsStep {
    fn name(&self) -> &'static str {
        "Channels"
    }

    async fn run(
        &self,
        ctx: StepContext,
        channels: StepChannels,
        _params: &TestStepParameters,
    ) -> anyhow::Result<()> {
        tracing::debug!(step = %ctx.label, "dropping all channel ends");
        drop(channels);
        Ok(())
    }
}
