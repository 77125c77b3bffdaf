//! Bounded-time target writes
//!
//! `TargetWriter` performs every send the routing layer does, each bounded
//! by an explicit timeout or abandoned on cancellation. A send abandoned by
//! cancellation is not an error; a send that outlives its timeout is.

use std::sync::Arc;
use std::time::Duration;

use rig_target::{Target, TargetError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::timeouts::TestRunnerTimeouts;

/// Why a bounded-time send did not deliver its value
#[derive(Debug, Clone, Error)]
pub(crate) enum WriteError {
    /// The receiver did not accept the value within the timeout
    #[error("timeout ({0:?}) while writing target")]
    Timeout(Duration),

    /// The receiving end was dropped
    #[error("channel closed while writing target")]
    Closed,
}

/// Outcome of one asynchronous injection into a step
#[derive(Debug)]
pub(crate) struct InjectionResult {
    /// The target that was being injected
    pub target: Arc<Target>,

    /// The send failure, if any
    pub err: Option<WriteError>,
}

/// Channel ends an injection task writes to
#[derive(Debug)]
pub(crate) struct InjectionChannels {
    /// The step's input channel
    pub step_in: mpsc::Sender<Arc<Target>>,

    /// Where the injection outcome is reported back to `route_in`
    pub result: mpsc::Sender<InjectionResult>,
}

/// Helper performing bounded-time sends into pipeline channels
#[derive(Debug, Clone, Copy)]
pub(crate) struct TargetWriter {
    timeouts: TestRunnerTimeouts,
}

impl TargetWriter {
    pub(crate) fn new(timeouts: TestRunnerTimeouts) -> Self {
        Self { timeouts }
    }

    /// Send `target` on `ch`, giving up after `timeout`
    ///
    /// Cancellation abandons the send and returns `Ok`: the caller is
    /// shutting down and the value is intentionally dropped.
    pub(crate) async fn write_target(
        &self,
        cancel: &CancellationToken,
        ch: &mpsc::Sender<Arc<Target>>,
        target: Arc<Target>,
        timeout: Duration,
    ) -> Result<(), WriteError> {
        tracing::debug!(target = %target, ?timeout, "writing target");
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(target = %target, "termination requested while writing target");
                Ok(())
            }
            res = ch.send(Arc::clone(&target)) => {
                res.map_err(|_| WriteError::Closed)
            }
            _ = sleep(timeout) => Err(WriteError::Timeout(timeout)),
        }
    }

    /// Inject `target` into a step and report the outcome
    ///
    /// The injection itself is bounded by the `step_inject` timeout; the
    /// result post is bounded by the `message` timeout. Failing to post the
    /// result means the routing block is wedged, which violates the
    /// accounting invariant - there is nothing left to do but abort.
    pub(crate) async fn write_target_with_result(
        &self,
        cancel: &CancellationToken,
        target: Arc<Target>,
        channels: &InjectionChannels,
    ) {
        let err = self
            .write_target(cancel, &channels.step_in, Arc::clone(&target), self.timeouts.step_inject)
            .await
            .err();

        tokio::select! {
            _ = cancel.cancelled() => {}
            res = channels.result.send(InjectionResult { target: Arc::clone(&target), err }) => {
                if res.is_err() {
                    panic!("routing block dropped the injection result channel for target {target}");
                }
            }
            _ = sleep(self.timeouts.message) => {
                panic!(
                    "timeout while writing injection result for target {target} after {:?}",
                    self.timeouts.message
                );
            }
        }
    }

    /// Send a per-target failure on `ch`, giving up after `timeout`
    pub(crate) async fn write_target_error(
        &self,
        cancel: &CancellationToken,
        ch: &mpsc::Sender<TargetError>,
        target_error: TargetError,
        timeout: Duration,
    ) -> Result<(), WriteError> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            res = ch.send(target_error) => {
                res.map_err(|_| WriteError::Closed)
            }
            _ = sleep(timeout) => Err(WriteError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
