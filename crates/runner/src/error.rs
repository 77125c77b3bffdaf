//! Runner error taxonomy
//!
//! Every failure class the pipeline can observe has its own variant, so
//! callers can match on what actually went wrong. Internal control-channel
//! send timeouts are deliberately not represented here: they are violated
//! invariants (a wedged supervisor) and panic with a diagnostic instead.

use std::time::Duration;

use thiserror::Error;

/// Pipeline and step failures surfaced by the test runner
#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    /// The test has no step bundles
    #[error("no steps to run for test")]
    NoStepsToRun,

    /// A routing block was aborted by cancellation
    ///
    /// Not a failure by itself; it accompanies whatever terminated the
    /// pipeline and never becomes the primary error.
    #[error("routing for step '{step}' aborted: termination requested")]
    RoutingCancelled {
        /// Step label the routing block belongs to
        step: String,
    },

    /// A step did not accept a target within the injection timeout
    #[error("step '{step}' did not accept target '{target}' within {timeout:?}")]
    InjectionFailed {
        /// Step label
        step: String,
        /// Id of the target being injected
        target: String,
        /// The injection timeout that expired
        timeout: Duration,
    },

    /// A step abandoned its channel ends while targets were still being
    /// delivered to it
    #[error("step '{step}' closed its channels while target '{target}' was being delivered")]
    StepClosedChannels {
        /// Step label
        step: String,
        /// Id of the target whose delivery failed
        target: String,
    },

    /// A step returned the same target more than once
    #[error("step '{step}' returned target '{target}' multiple times")]
    DuplicateTarget {
        /// Step label
        step: String,
        /// Id of the duplicated target
        target: String,
    },

    /// A step completed without returning all injected targets
    #[error("step '{step}' completed but did not return all injected targets ({ingress}!={egress})")]
    TargetCountMismatch {
        /// Step label
        step: String,
        /// Number of targets injected into the step
        ingress: usize,
        /// Number of targets returned by the step
        egress: usize,
    },

    /// A step panicked
    #[error("step '{step}' panicked: {message}")]
    StepPanic {
        /// Step label
        step: String,
        /// The panic payload, rendered as text
        message: String,
    },

    /// A step returned a whole-step error
    #[error("step '{step}' failed: {reason}")]
    StepFailed {
        /// Step label
        step: String,
        /// The step's own error, rendered as text
        reason: String,
    },

    /// One or more steps did not return within the shutdown window
    #[error("test steps did not return after shutdown: [{}]", steps.join(", "))]
    StepsNeverReturned {
        /// Labels of the steps that never returned
        steps: Vec<String>,
    },
}

impl RunnerError {
    /// Whether this error only reports a reaction to cancellation
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::RoutingCancelled { .. })
    }
}

/// Result type for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RunnerError::InjectionFailed {
            step: "FirstStage".to_string(),
            target: "001".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("FirstStage"));
        assert!(err.to_string().contains("001"));

        let err = RunnerError::StepsNeverReturned {
            steps: vec!["StageOne".to_string(), "StageTwo".to_string()],
        };
        assert!(err.to_string().contains("StageOne, StageTwo"));

        let err = RunnerError::TargetCountMismatch {
            step: "StageOne".to_string(),
            ingress: 5,
            egress: 3,
        };
        assert!(err.to_string().contains("5!=3"));
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(RunnerError::RoutingCancelled {
            step: "StageOne".to_string()
        }
        .is_cancellation());
        assert!(!RunnerError::NoStepsToRun.is_cancellation());
    }
}
