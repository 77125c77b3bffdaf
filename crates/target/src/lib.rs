//! Targets - devices under test
//!
//! A `Target` is the immutable descriptor of one unit under test. Targets
//! are created by an external injector, flow through the test pipeline as
//! `Arc<Target>`, and are marked completed (success or per-target error) by
//! the test runner.
//!
//! The module also defines the names of the lifecycle events the routing
//! layer emits as targets move in and out of test steps.

mod target;

pub use target::{ErrPayload, Target, TargetError};

/// Event emitted when a target was successfully injected into a test step
pub const EVENT_TARGET_IN: &str = "TargetIn";

/// Event emitted when injecting a target into a test step failed
pub const EVENT_TARGET_IN_ERR: &str = "TargetInErr";

/// Event emitted when a target left a test step successfully
pub const EVENT_TARGET_OUT: &str = "TargetOut";

/// Event emitted when a test step reported a per-target failure
pub const EVENT_TARGET_ERR: &str = "TargetErr";
