//! Target descriptor and per-target failure report

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Descriptor of one unit under test
///
/// Identity is by `id`; `name` and `fqdn` are informational and appear in
/// logs and events. Targets are immutable once created and are shared
/// across pipeline stages behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Unique, stable identifier of the target
    #[serde(rename = "ID")]
    pub id: String,

    /// Human-readable name
    #[serde(rename = "Name")]
    pub name: String,

    /// Fully qualified domain name
    #[serde(rename = "FQDN")]
    pub fqdn: String,
}

impl Target {
    /// Create a new target descriptor
    pub fn new(id: impl Into<String>, name: impl Into<String>, fqdn: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fqdn: fqdn.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// A per-target failure reported by a test step
///
/// Distinct from a whole-step failure: the step keeps running and the
/// target is siphoned to the test runner through the error fan-in channel.
#[derive(Debug)]
pub struct TargetError {
    /// The target that failed
    pub target: Arc<Target>,

    /// What went wrong, as reported by the step
    pub err: anyhow::Error,
}

impl TargetError {
    /// Create a new per-target failure report
    pub fn new(target: Arc<Target>, err: anyhow::Error) -> Self {
        Self { target, err }
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target {} failed: {}", self.target, self.err)
    }
}

/// JSON payload attached to a `TargetErr` event
///
/// Serializes as `{"Error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrPayload {
    /// The failure message reported by the step
    #[serde(rename = "Error")]
    pub error: String,
}
