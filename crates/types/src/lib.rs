//! Shared identifier types
//!
//! Lightweight, Copy identifiers used across the framework. Jobs are
//! submitted by the job manager; each execution of a job's test gets a
//! fresh run id. Both are opaque to the pipeline core and only appear in
//! logs and event headers.

mod ids;

pub use ids::{JobId, RunId};
