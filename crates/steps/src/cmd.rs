//! Cmd step - runs an external command per target

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use rig_target::TargetError;
use rig_test::{StepChannels, StepContext, TestStep, TestStepParameters};
use tokio::process::Command;

/// Step that executes an external command once per target
///
/// # Parameters
///
/// - `executable` (exactly one value, required): the program to run;
/// - `args` (zero or more values): arguments passed to the program.
///
/// A non-zero exit status is a per-target failure; failing to spawn the
/// program or being cancelled mid-command is a whole-step failure.
#[derive(Debug, Default)]
pub struct CmdStep;

impl CmdStep {
    /// Create a cmd step
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestStep for CmdStep {
    fn name(&self) -> &'static str {
        "Cmd"
    }

    async fn run(
        &self,
        ctx: StepContext,
        mut channels: StepChannels,
        params: &TestStepParameters,
    ) -> anyhow::Result<()> {
        let executable = params
            .get_one("executable")
            .context("cmd step requires an 'executable' parameter")?
            .as_str()
            .to_string();
        let args: Vec<String> = params
            .get("args")
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();

        loop {
            // Pause is checked before cancel: a paused run also cancels
            // the pipeline scope, but the step should quiesce cleanly.
            let target = tokio::select! {
                biased;
                _ = ctx.pause.cancelled() => {
                    return Ok(());
                }
                _ = ctx.cancel.cancelled() => {
                    return Err(anyhow!("cmd step cancelled"));
                }
                maybe_target = channels.step_in.recv() => {
                    match maybe_target {
                        Some(target) => target,
                        None => return Ok(()),
                    }
                }
            };

            tracing::debug!(
                step = %ctx.label,
                target = %target,
                executable = %executable,
                "running command"
            );

            let mut child = Command::new(&executable)
                .args(&args)
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("could not spawn '{executable}'"))?;

            tokio::select! {
                biased;
                _ = ctx.pause.cancelled() => {
                    let _ = child.start_kill();
                    return Ok(());
                }
                _ = ctx.cancel.cancelled() => {
                    let _ = child.start_kill();
                    return Err(anyhow!(
                        "cmd step cancelled while running '{executable}' for target {target}"
                    ));
                }
                status = child.wait() => {
                    let status = status.with_context(|| format!("waiting for '{executable}'"))?;
                    if status.success() {
                        if channels.step_out.send(target).await.is_err() {
                            return Ok(());
                        }
                    } else {
                        let err = TargetError::new(
                            target,
                            anyhow!("'{executable}' exited with {status}"),
                        );
                        if channels.step_err.send(err).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
