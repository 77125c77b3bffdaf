//! Event data model

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rig_target::Target;
use rig_types::{JobId, RunId};
use serde::{Deserialize, Serialize};

/// Name of an event
///
/// The routing layer only emits the four target lifecycle names defined in
/// `rig_target`; step plugins may define their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventName(String);

impl EventName {
    /// Create an event name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run-scoped context attached to every stored event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Job the run belongs to
    pub job_id: JobId,

    /// Run within the job
    pub run_id: RunId,

    /// Name of the test being run
    pub test_name: String,

    /// Label of the test step the event originated from
    pub test_step_label: String,
}

/// The event itself: a name, an optional target and an optional payload
#[derive(Debug, Clone)]
pub struct EventData {
    /// Event name
    pub event_name: EventName,

    /// Target the event refers to, if any
    pub target: Option<Arc<Target>>,

    /// Free-form JSON payload, if any
    pub payload: Option<serde_json::Value>,
}

impl EventData {
    /// Create an event with no target and no payload
    pub fn new(event_name: impl Into<EventName>) -> Self {
        Self {
            event_name: event_name.into(),
            target: None,
            payload: None,
        }
    }

    /// Create an event referring to a target
    pub fn for_target(event_name: impl Into<EventName>, target: Arc<Target>) -> Self {
        Self {
            event_name: event_name.into(),
            target: Some(target),
            payload: None,
        }
    }

    /// Attach a JSON payload
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl From<&str> for EventData {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An event as persisted by a storage backend
#[derive(Debug, Clone)]
pub struct StoredEvent {
    /// Run-scoped context
    pub header: Header,

    /// The event data
    pub data: EventData,

    /// When the event was emitted
    pub emit_time: DateTime<Utc>,
}
