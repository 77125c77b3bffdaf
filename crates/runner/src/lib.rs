//! Test runner - the streaming test pipeline core
//!
//! Drives a list of targets through an ordered pipeline of test steps,
//! enforcing delivery, ordering, timeout, cancellation and accounting
//! invariants in the face of misbehaving steps.
//!
//! # Architecture
//!
//! ```text
//! [Injector] ──→ RoutingBlock₁ ──→ TestStep₁ ──→ RoutingBlock₂ ──→ … ──→ completed
//!                     │                                │
//!                     └────────── target_err ──────────┴──→ [TestRunner]
//! ```
//!
//! Each stage is a pair (routing block, test step) joined by three
//! channels: `step_in`, `step_out` and `step_err`. The routing block feeds
//! the step one target at a time and drains both step outputs, emitting a
//! lifecycle event at every boundary crossing. Failed targets are siphoned
//! from any stage straight to the runner through a shared fan-in channel.
//!
//! # Key design
//!
//! - **Channel-based**: all coordination is `tokio::sync::mpsc`; channel
//!   closure (dropping the sender) is the only end-of-stream signal.
//! - **Hierarchical cancellation**: the pipeline owns a root
//!   `CancellationToken`; each routing block derives a child, so "not yet
//!   cancelled" and "cancelled but unresponsive" stay distinguishable.
//! - **Single-in-flight injection**: at most one target is being delivered
//!   to a step at any time, which bounds concurrency into the step and
//!   makes injection timeouts attributable.
//! - **Typed failure taxonomy**: every step misbehavior (panic, abandoned
//!   channels, never returning, duplicate targets) surfaces as its own
//!   [`RunnerError`] variant.
//! - **Best-effort events**: event emission failures are logged, never
//!   propagated.

mod error;
mod pipeline;
mod route;
mod runner;
mod state;
mod timeouts;
mod writer;

pub use error::{Result, RunnerError};
pub use runner::TestRunner;
pub use state::State;
pub use timeouts::{
    TestRunnerTimeouts, DEFAULT_MESSAGE_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT,
    DEFAULT_STEP_INJECT_TIMEOUT, DEFAULT_STEP_SHUTDOWN_TIMEOUT,
};

/// Buffer size for inter-stage and step output channels
pub(crate) const ROUTING_CHANNEL_SIZE: usize = 32;

/// Buffer size for step input channels
///
/// Kept at 1: the single-in-flight injection discipline never needs a
/// deeper buffer, and a shallow buffer keeps step acceptance observable
/// through the injection timeout.
pub(crate) const STEP_INPUT_CHANNEL_SIZE: usize = 1;
