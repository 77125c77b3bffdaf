//! Bundled test steps
//!
//! Step implementations shipped with the framework:
//!
//! - [`ExampleStep`] - pass-through step that forwards every target;
//! - [`EchoStep`] - logs a configured message for every target;
//! - [`CmdStep`] - runs an external command once per target.
//!
//! The `misbehaving` module holds deliberately broken steps (panicking,
//! hanging, channel-dropping) used to exercise the runner's failure
//! handling. They are exported like any other step so integration suites
//! outside this crate can drive them through a real pipeline.

mod cmd;
mod echo;
mod example;
pub mod misbehaving;

pub use cmd::CmdStep;
pub use echo::EchoStep;
pub use example::ExampleStep;
