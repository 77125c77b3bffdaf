//! Test runner - public entrypoint

use std::sync::Arc;

use rig_events::{EventStorage, NullStorage};
use rig_target::Target;
use rig_test::Test;
use rig_types::{JobId, RunId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RunnerError};
use crate::pipeline::Pipeline;
use crate::timeouts::TestRunnerTimeouts;
use crate::writer::TargetWriter;

/// Runs a test's step pipeline over a list of targets
///
/// # Example
///
/// ```ignore
/// use rig_runner::TestRunner;
/// use tokio_util::sync::CancellationToken;
///
/// let runner = TestRunner::new();
/// let cancel = CancellationToken::new();
/// let pause = CancellationToken::new();
/// runner.run(cancel, pause, &test, targets, job_id, run_id).await?;
/// ```
pub struct TestRunner {
    timeouts: TestRunnerTimeouts,
    storage: Arc<dyn EventStorage>,
}

impl TestRunner {
    /// Create a runner with default timeouts, discarding events
    pub fn new() -> Self {
        Self::with_timeouts(TestRunnerTimeouts::default())
    }

    /// Create a runner with custom timeouts
    pub fn with_timeouts(timeouts: TestRunnerTimeouts) -> Self {
        Self {
            timeouts,
            storage: Arc::new(NullStorage::new()),
        }
    }

    /// Use `storage` as the event sink for subsequent runs
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn EventStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// The timeouts this runner applies
    #[inline]
    pub fn timeouts(&self) -> TestRunnerTimeouts {
        self.timeouts
    }

    /// Run `test` over `targets`
    ///
    /// Injects every target into the pipeline in order, drains completed
    /// targets until the pipeline terminates, and returns the pipeline's
    /// error. `cancel` is terminal; `pause` requests graceful quiescence.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        pause: CancellationToken,
        test: &Test,
        targets: Vec<Target>,
        job_id: JobId,
        run_id: RunId,
    ) -> Result<()> {
        if test.test_steps_bundles.is_empty() {
            return Err(RunnerError::NoStepsToRun);
        }

        tracing::info!(
            %job_id,
            %run_id,
            test = %test.name,
            targets = targets.len(),
            stages = test.test_steps_bundles.len(),
            "setting up pipeline"
        );

        let mut pipeline = Pipeline::new(test, job_id, run_id, self.timeouts, Arc::clone(&self.storage));
        let input_tx = pipeline.init();
        let (completed_tx, mut completed_rx) = mpsc::channel::<Arc<Target>>(1);

        // Sequentially inject every target, then close the input channel.
        // Injection stops quietly once the run is over.
        let injection_cancel = CancellationToken::new();
        let injector_cancel = injection_cancel.clone();
        let writer = TargetWriter::new(self.timeouts);
        let message_timeout = self.timeouts.message;
        tokio::spawn(async move {
            for target in targets {
                let target = Arc::new(target);
                if let Err(write_err) = writer
                    .write_target(&injector_cancel, &input_tx, Arc::clone(&target), message_timeout)
                    .await
                {
                    tracing::debug!(
                        target = %target,
                        error = %write_err,
                        "could not inject target into first routing block"
                    );
                }
            }
            // input_tx drops here, signalling end of input to the pipeline.
        });

        tracing::info!("running pipeline");
        let mut pipeline_task = tokio::spawn(pipeline.run(cancel, pause, completed_tx));

        // Drain completed targets while waiting for the pipeline to return.
        let result = loop {
            tokio::select! {
                join_res = &mut pipeline_task => {
                    break match join_res {
                        Ok(run_res) => run_res,
                        Err(join_err) if join_err.is_panic() => {
                            std::panic::resume_unwind(join_err.into_panic())
                        }
                        Err(join_err) => panic!("pipeline task aborted: {join_err}"),
                    };
                }
                Some(target) = completed_rx.recv() => {
                    tracing::info!(target = %target, "test runner completed target");
                }
            }
        };

        injection_cancel.cancel();
        tracing::debug!(error = ?result.as_ref().err(), "test runner terminated");
        result
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}
