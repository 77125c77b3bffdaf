//! Test events - structured records of the target lifecycle
//!
//! The routing layer emits an event every time a target crosses a test step
//! boundary: `TargetIn`, `TargetInErr`, `TargetOut`, `TargetErr`. Events are
//! delivered to an [`EventStorage`] backend behind a trait object, so the
//! pipeline never depends on a concrete store.
//!
//! # Architecture
//!
//! ```text
//! [RoutingBlock] ──→ TestEventEmitter ──→ Arc<dyn EventStorage>
//!                    (binds Header,        ├──→ MemoryStorage (tests)
//!                     stamps emit time)    └──→ NullStorage   (discard)
//! ```
//!
//! Emission is best-effort: storage failures are logged by callers and
//! never fail the pipeline.

mod emitter;
mod event;
mod storage;

pub use emitter::{Emitter, TestEventEmitter};
pub use event::{EventData, EventName, Header, StoredEvent};
pub use storage::{EventError, EventStorage, MemoryStorage, NullStorage};
