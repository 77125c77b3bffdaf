//! Event emission

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::event::{EventData, Header, StoredEvent};
use crate::storage::{EventStorage, Result};

/// Something that accepts test events
///
/// Emitter failures never fail the pipeline; callers log and move on.
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Emit one event
    async fn emit(&self, data: EventData) -> Result<()>;
}

/// Emitter bound to a run-scoped header
///
/// Created once per pipeline stage; stamps the emit time and forwards the
/// completed record to the storage backend.
#[derive(Clone)]
pub struct TestEventEmitter {
    header: Header,
    storage: Arc<dyn EventStorage>,
}

impl TestEventEmitter {
    /// Create an emitter that attaches `header` to every event
    pub fn new(header: Header, storage: Arc<dyn EventStorage>) -> Self {
        Self { header, storage }
    }

    /// The header attached to events from this emitter
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }
}

#[async_trait]
impl Emitter for TestEventEmitter {
    async fn emit(&self, data: EventData) -> Result<()> {
        self.storage
            .store_event(StoredEvent {
                header: self.header.clone(),
                data,
                emit_time: Utc::now(),
            })
            .await
    }
}
