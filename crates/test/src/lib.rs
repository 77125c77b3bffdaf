//! Test definitions and the test step contract
//!
//! A `Test` is an ordered list of `TestStepBundle`s; each bundle pairs a
//! user-supplied [`TestStep`] implementation with a label and parameters.
//! The runner drives targets through the steps; steps only ever see their
//! own channel ends.
//!
//! # Step contract
//!
//! - read targets from `step_in` until it closes;
//! - for each target, send exactly one of: the target on `step_out`
//!   (success) or a [`rig_target::TargetError`] on `step_err` (failure);
//! - release `step_out`/`step_err` (drop them) on completion, and only
//!   then - a step that abandons its channel ends while targets are still
//!   being delivered violates the contract;
//! - honor cancellation promptly.

mod bundle;
mod param;
mod step;

pub use bundle::{Test, TestStepBundle};
pub use param::{Param, ParameterError, TestStepParameters};
pub use step::{StepChannels, StepContext, TestStep};
