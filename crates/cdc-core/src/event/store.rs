use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{EventLogEntry, NewEvent};
use crate::errors::{CaptureError, StoreError};

/// Log durable append-only de eventos de cambio.
pub trait EventLog {
    /// Agrega un evento y devuelve la entrada completa (con `id`).
    fn append(&self, event: NewEvent) -> Result<EventLogEntry, CaptureError>;
    fn get(&self, id: u64) -> Result<Option<EventLogEntry>, StoreError>;
    /// Entradas con `from <= id <= to` (sin `to`: hasta el final), ascendente.
    fn by_id_range(&self, from: u64, to: Option<u64>, limit: usize) -> Result<Vec<EventLogEntry>, StoreError>;
    /// Entradas con `from <= created_at < to`, ascendente por `id`.
    fn by_created_range(&self,
                        from: DateTime<Utc>,
                        to: DateTime<Utc>,
                        limit: usize)
                        -> Result<Vec<EventLogEntry>, StoreError>;
}

impl<L: EventLog + ?Sized> EventLog for Arc<L> {
    fn append(&self, event: NewEvent) -> Result<EventLogEntry, CaptureError> { (**self).append(event) }
    fn get(&self, id: u64) -> Result<Option<EventLogEntry>, StoreError> { (**self).get(id) }
    fn by_id_range(&self, from: u64, to: Option<u64>, limit: usize) -> Result<Vec<EventLogEntry>, StoreError> {
        (**self).by_id_range(from, to, limit)
    }
    fn by_created_range(&self,
                        from: DateTime<Utc>,
                        to: DateTime<Utc>,
                        limit: usize)
                        -> Result<Vec<EventLogEntry>, StoreError> {
        (**self).by_created_range(from, to, limit)
    }
}

/// Log en memoria. Los ids arrancan en 1 (paridad con BIGSERIAL).
#[derive(Default)]
pub struct InMemoryEventLog {
    inner: RwLock<Vec<EventLogEntry>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.inner.read().len() }

    pub fn is_empty(&self) -> bool { self.inner.read().is_empty() }

    pub fn all(&self) -> Vec<EventLogEntry> { self.inner.read().clone() }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, event: NewEvent) -> Result<EventLogEntry, CaptureError> {
        let mut vec = self.inner.write();
        let id = vec.len() as u64 + 1;
        let entry = EventLogEntry::from_new(id, event);
        vec.push(entry.clone());
        Ok(entry)
    }

    fn get(&self, id: u64) -> Result<Option<EventLogEntry>, StoreError> {
        if id == 0 {
            return Ok(None);
        }
        Ok(self.inner.read().get((id - 1) as usize).cloned())
    }

    fn by_id_range(&self, from: u64, to: Option<u64>, limit: usize) -> Result<Vec<EventLogEntry>, StoreError> {
        let start = from.saturating_sub(1) as usize;
        let guard = self.inner.read();
        Ok(guard.iter()
                .skip(start)
                .take_while(|e| to.map_or(true, |t| e.id <= t))
                .take(limit)
                .cloned()
                .collect())
    }

    fn by_created_range(&self,
                        from: DateTime<Utc>,
                        to: DateTime<Utc>,
                        limit: usize)
                        -> Result<Vec<EventLogEntry>, StoreError> {
        Ok(self.inner
               .read()
               .iter()
               .filter(|e| e.created_at >= from && e.created_at < to)
               .take(limit)
               .cloned()
               .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Operation;
    use serde_json::json;

    fn ev(record: &str) -> NewEvent {
        NewEvent { entity_name: "dept".into(),
                   operation: Operation::Create,
                   payload: json!({"newValues": {"deptno": record}}),
                   record_id: record.into(),
                   created_at: Utc::now() }
    }

    #[test]
    fn ids_are_contiguous_from_one() {
        let log = InMemoryEventLog::new();
        for i in 0..5 {
            let e = log.append(ev(&i.to_string())).unwrap();
            assert_eq!(e.id, i + 1);
        }
        let ids: Vec<u64> = log.by_id_range(1, None, usize::MAX).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn id_range_is_inclusive_and_limited() {
        let log = InMemoryEventLog::new();
        for i in 0..10 {
            log.append(ev(&i.to_string())).unwrap();
        }
        let ids: Vec<u64> = log.by_id_range(3, Some(6), 10).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
        assert_eq!(log.by_id_range(3, None, 2).unwrap().len(), 2);
        assert!(log.get(0).unwrap().is_none());
        assert_eq!(log.get(10).unwrap().unwrap().record_id, "9");
        assert!(log.get(11).unwrap().is_none());
    }

    #[test]
    fn created_range_filters_by_time() {
        let log = InMemoryEventLog::new();
        let t0 = Utc::now();
        let mut old = ev("old");
        old.created_at = t0 - chrono::Duration::hours(2);
        log.append(old).unwrap();
        log.append(ev("new")).unwrap();
        let recent = log.by_created_range(t0 - chrono::Duration::minutes(1), t0 + chrono::Duration::minutes(1), 10)
                        .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].record_id, "new");
    }
}
