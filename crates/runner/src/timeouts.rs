//! Runner timeout configuration

use std::time::Duration;

/// Default maximum wait for a step to accept one target
pub const DEFAULT_STEP_INJECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum wait for any intra-pipeline control message
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default window after cancellation for routing blocks to return
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default window after cancellation for steps to return
pub const DEFAULT_STEP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// The four timeouts that bound every blocking operation in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRunnerTimeouts {
    /// Maximum wait for a step to accept one target on its input channel
    pub step_inject: Duration,

    /// Maximum wait for intra-pipeline control messages (result posts,
    /// inter-stage forwards)
    pub message: Duration,

    /// Window after cancellation during which routing blocks must return
    pub shutdown: Duration,

    /// Window after cancellation during which steps must return
    pub step_shutdown: Duration,
}

impl Default for TestRunnerTimeouts {
    fn default() -> Self {
        Self {
            step_inject: DEFAULT_STEP_INJECT_TIMEOUT,
            message: DEFAULT_MESSAGE_TIMEOUT,
            shutdown: DEFAULT_SHUTDOWN_TIMEOUT,
            step_shutdown: DEFAULT_STEP_SHUTDOWN_TIMEOUT,
        }
    }
}
