//! cdc-core: captura de cambios a nivel campo y outbox durable.
//!
//! Flujo: mutación -> `change::normalize` -> `change::diff` -> (¿vacío? fin)
//! -> `payload::build_payload` -> `EventPublisher` (append + notify) -> el
//! evento queda sin reclamar -> `BatchDispatcher::claim` -> consumidor ->
//! `mark_processed`.
//!
//! Los backends en memoria (`InMemoryEventLog`, `InMemoryDispatcher`,
//! `BroadcastNotifier`) tienen paridad de contrato con los de Postgres de
//! `cdc-persistence`.
pub mod capture;
pub mod change;
pub mod constants;
pub mod dispatch;
pub mod errors;
pub mod event;
pub mod notify;
pub mod payload;
pub mod publisher;
pub mod registry;

pub use capture::{change_payload, CaptureOutcome, ChangeCapture};
pub use change::{Diff, NormalizedChange, Operation, RawRecord, TrackedEntityChange};
pub use dispatch::{BatchDispatcher, BatchId, ExecutionQuery, ExecutionRecord, InMemoryDispatcher, StaleBatch};
pub use errors::{BroadcastError, CaptureError, StoreError};
pub use event::{EventLog, EventLogEntry, InMemoryEventLog, NewEvent};
pub use notify::{BroadcastNotifier, NoopNotifier, Notification, Notifier};
pub use payload::{build_payload, ChangePayload, FieldValues};
pub use publisher::EventPublisher;
pub use registry::TrackingRegistry;
