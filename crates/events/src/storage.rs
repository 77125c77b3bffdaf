//! Event storage backends
//!
//! The pipeline core only knows `Arc<dyn EventStorage>`. `MemoryStorage`
//! keeps events in process memory and is what the test suites assert
//! against; `NullStorage` discards everything.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::event::StoredEvent;

/// Event storage errors
#[derive(Debug, Error)]
pub enum EventError {
    /// The backend rejected or failed to persist the event
    #[error("could not store event: {0}")]
    Store(String),
}

/// Result type for event storage operations
pub type Result<T> = std::result::Result<T, EventError>;

/// A backend that persists emitted events
///
/// Implementations must be cheap to call from the routing hot path;
/// emission is best-effort and callers log failures instead of
/// propagating them.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Persist one event
    async fn store_event(&self, event: StoredEvent) -> Result<()>;
}

/// In-memory event storage
///
/// Events are appended under a mutex; queries clone the matching records.
/// Intended for tests and local runs, not for durability.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    events: Mutex<Vec<StoredEvent>>,
}

impl MemoryStorage {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored events, in emission order
    pub fn events(&self) -> Vec<StoredEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Stored events with the given event name
    pub fn events_by_name(&self, name: &str) -> Vec<StoredEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|ev| ev.data.event_name.as_str() == name)
            .cloned()
            .collect()
    }

    /// Stored events referring to the given target id
    pub fn events_for_target(&self, target_id: &str) -> Vec<StoredEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|ev| {
                ev.data
                    .target
                    .as_ref()
                    .is_some_and(|t| t.id == target_id)
            })
            .cloned()
            .collect()
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStorage for MemoryStorage {
    async fn store_event(&self, event: StoredEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Storage that discards every event
#[derive(Debug, Default)]
pub struct NullStorage;

impl NullStorage {
    /// Create a discarding store
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventStorage for NullStorage {
    async fn store_event(&self, _event: StoredEvent) -> Result<()> {
        Ok(())
    }
}
