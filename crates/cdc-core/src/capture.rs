//! Pipeline de captura: normalizador -> diff -> payload -> publicador.
//!
//! Corre de forma síncrona dentro de la mutación que lo origina. Cualquier
//! `Err` debe abortar esa mutación.
use chrono::{DateTime, Utc};
use log::debug;

use crate::change::{diff, normalize_change, TrackedEntityChange};
use crate::errors::CaptureError;
use crate::event::{EventLog, EventLogEntry};
use crate::notify::Notifier;
use crate::payload::{build_payload, ChangePayload};
use crate::publisher::EventPublisher;
use crate::registry::TrackingRegistry;

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Ningún campo trackeado cambió: no hubo publish ni fila en el log.
    NoChange,
    Published(EventLogEntry),
}

impl CaptureOutcome {
    pub fn entry(&self) -> Option<&EventLogEntry> {
        match self {
            CaptureOutcome::NoChange => None,
            CaptureOutcome::Published(e) => Some(e),
        }
    }
}

/// Parte pura del pipeline: devuelve el payload o `None` si no hubo cambio.
pub fn change_payload(tracked_fields: &[String], change: &TrackedEntityChange) -> Result<Option<ChangePayload>, CaptureError> {
    let normalized = normalize_change(change, tracked_fields);
    let d = diff(&normalized);
    if d.is_empty() {
        debug!("capture:no-change record={} op={}", change.record_id, change.operation);
        return Ok(None);
    }
    build_payload(&normalized, &d)
}

pub struct ChangeCapture<L, N> {
    registry: TrackingRegistry,
    publisher: EventPublisher<L, N>,
}

impl<L: EventLog, N: Notifier> ChangeCapture<L, N> {
    pub fn new(registry: TrackingRegistry, publisher: EventPublisher<L, N>) -> Self { Self { registry, publisher } }

    pub fn registry(&self) -> &TrackingRegistry { &self.registry }

    pub fn publisher(&self) -> &EventPublisher<L, N> { &self.publisher }

    /// Hook por mutación de fila.
    pub fn on_mutation(&self,
                       entity_name: &str,
                       change: &TrackedEntityChange,
                       now: DateTime<Utc>)
                       -> Result<CaptureOutcome, CaptureError> {
        let tracked = self.registry
                          .tracked_fields(entity_name)
                          .ok_or_else(|| CaptureError::UnregisteredEntity(entity_name.to_string()))?;
        let payload = change_payload(tracked, change)?;
        let published = self.publisher
                             .publish(entity_name, change.operation, payload.as_ref(), &change.record_id, now)?;
        Ok(published.map_or(CaptureOutcome::NoChange, CaptureOutcome::Published))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::RawRecord;
    use crate::event::InMemoryEventLog;
    use crate::notify::BroadcastNotifier;
    use serde_json::json;

    fn raw(v: serde_json::Value) -> RawRecord { v.as_object().cloned().unwrap() }

    fn capture() -> ChangeCapture<InMemoryEventLog, BroadcastNotifier> {
        let registry = TrackingRegistry::new().track("dept", ["deptno", "dname", "loc"]);
        ChangeCapture::new(registry, EventPublisher::new(InMemoryEventLog::new(), BroadcastNotifier::default()))
    }

    #[test]
    fn unchanged_update_writes_nothing_and_broadcasts_nothing() {
        let cap = capture();
        let mut rx = cap.publisher().notifier().subscribe();
        let r = raw(json!({"deptno": "10", "dname": "SALES", "loc": "NY", "note": "a"}));
        let mut touched = r.clone();
        touched.insert("note".into(), json!("b"));
        let out = cap.on_mutation("dept", &TrackedEntityChange::update("10", r, touched), Utc::now()).unwrap();
        assert_eq!(out, CaptureOutcome::NoChange);
        assert!(cap.publisher().log().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn update_publishes_changed_fields_only() {
        let cap = capture();
        let before = raw(json!({"deptno": "10", "dname": "X", "loc": "NY"}));
        let after = raw(json!({"deptno": "10", "dname": "Y", "loc": "NY"}));
        let out = cap.on_mutation("dept", &TrackedEntityChange::update("10", before, after), Utc::now()).unwrap();
        let entry = out.entry().unwrap();
        let p = entry.change_payload().unwrap();
        assert_eq!(p.new_values.get("dname"), Some(&Some("Y".to_string())));
        assert_eq!(p.old_values.as_ref().unwrap().get("dname"), Some(&Some("X".to_string())));
        assert!(!entry.payload.to_string().contains("deptno"));
    }

    #[test]
    fn unregistered_entity_fails_the_mutation() {
        let cap = capture();
        let err = cap.on_mutation("emp", &TrackedEntityChange::create("1", raw(json!({"empno": "1"}))), Utc::now())
                     .unwrap_err();
        assert_eq!(err, CaptureError::UnregisteredEntity("emp".into()));
    }

    #[test]
    fn serialization_failure_leaves_log_untouched() {
        let cap = capture();
        let change = TrackedEntityChange::create("10", raw(json!({"deptno": "10", "loc": ["NY", "SF"]})));
        assert!(matches!(cap.on_mutation("dept", &change, Utc::now()), Err(CaptureError::Serialization { .. })));
        assert!(cap.publisher().log().is_empty());
    }

    #[test]
    fn per_record_order_follows_mutation_order() {
        let cap = capture();
        let a = raw(json!({"deptno": "10", "dname": "A"}));
        let b = raw(json!({"deptno": "10", "dname": "B"}));
        let c = raw(json!({"deptno": "10", "dname": "C"}));
        cap.on_mutation("dept", &TrackedEntityChange::create("10", a.clone()), Utc::now()).unwrap();
        cap.on_mutation("dept", &TrackedEntityChange::update("10", a, b.clone()), Utc::now()).unwrap();
        cap.on_mutation("dept", &TrackedEntityChange::update("10", b, c.clone()), Utc::now()).unwrap();
        cap.on_mutation("dept", &TrackedEntityChange::delete("10", c), Utc::now()).unwrap();
        let ops: Vec<String> = cap.publisher().log().all().iter().map(|e| e.operation.to_string()).collect();
        assert_eq!(ops, vec!["create", "update", "update", "delete"]);
    }
}
