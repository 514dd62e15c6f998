//! cdcflow
//!
//! Fachada del workspace:
//! - `cdc-core`: normalizador, diff, payload, publicador y dispatcher, con
//!   backends en memoria.
//! - `cdc-persistence` (reexportado como `persistence`): backend Postgres.
//!
//! Uso típico en memoria:
//!
//! ```
//! use std::sync::Arc;
//! use cdcflow::{BatchDispatcher, BatchId, ChangeCapture, EventPublisher, InMemoryDispatcher, InMemoryEventLog,
//!               NoopNotifier, TrackedEntityChange, TrackingRegistry};
//!
//! let log = Arc::new(InMemoryEventLog::new());
//! let capture = ChangeCapture::new(TrackingRegistry::new().track("dept", ["deptno", "loc"]),
//!                                  EventPublisher::new(Arc::clone(&log), NoopNotifier));
//! let row = serde_json::json!({"deptno": "10", "loc": "NY"}).as_object().cloned().unwrap();
//! capture.on_mutation("dept", &TrackedEntityChange::create("10", row), chrono::Utc::now()).unwrap();
//!
//! let dispatcher = InMemoryDispatcher::new(log);
//! let batch = BatchId::generate();
//! assert_eq!(dispatcher.claim(10, &batch).unwrap().len(), 1);
//! assert_eq!(dispatcher.mark_processed(&batch).unwrap(), 1);
//! ```

pub use cdc_core::*;
pub use cdc_persistence as persistence;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_messages() {
        let e = CaptureError::UnregisteredEntity("dept".into());
        assert!(e.to_string().contains("dept"));
        let s = StoreError::InvalidBatch("empty batch id".into());
        assert!(s.to_string().contains("empty batch id"));
    }
}
