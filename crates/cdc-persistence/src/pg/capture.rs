//! Captura de cambios dentro de la transacción de la mutación.
//!
//! Orden dentro de la transacción del llamador:
//! 1. mutación de la entidad (la hace el llamador),
//! 2. normalizar + diff + payload (puro, sin I/O),
//! 3. append en `cdc_event_log` (si falla, falla todo),
//! 4. `pg_notify` en un savepoint (si falla, sólo `warn!`).
use cdc_core::constants::DEFAULT_CHANNEL;
use cdc_core::{change_payload, CaptureError, CaptureOutcome, NewEvent, TrackedEntityChange, TrackingRegistry};
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::Connection;
use log::{debug, warn};

use super::event_log::append_in_tx;
use super::notifier::notify_in_savepoint;
use crate::error::PersistenceError;

pub struct PgChangeCapture {
    registry: TrackingRegistry,
    channel: String,
}

impl PgChangeCapture {
    pub fn new(registry: TrackingRegistry) -> Self { Self::with_channel(registry, DEFAULT_CHANNEL) }

    pub fn with_channel(registry: TrackingRegistry, channel: impl Into<String>) -> Self {
        Self { registry, channel: channel.into() }
    }

    pub fn registry(&self) -> &TrackingRegistry { &self.registry }

    /// Hook por mutación, con la conexión de la transacción en curso.
    pub fn capture_in_tx(&self,
                         conn: &mut PgConnection,
                         entity_name: &str,
                         change: &TrackedEntityChange,
                         now: DateTime<Utc>)
                         -> Result<CaptureOutcome, CaptureError> {
        let tracked = self.registry
                          .tracked_fields(entity_name)
                          .ok_or_else(|| CaptureError::UnregisteredEntity(entity_name.to_string()))?;
        let Some(payload) = change_payload(tracked, change)? else {
            return Ok(CaptureOutcome::NoChange);
        };
        let event = NewEvent::new(entity_name, change.operation, &payload, &change.record_id, now)?;
        let entry = append_in_tx(conn, &event)?;
        debug!("capture_in_tx:appended entity={entity_name} id={}", entry.id);

        match entry.live_message() {
            Ok(msg) => {
                if let Err(e) = notify_in_savepoint(conn, &self.channel, &msg) {
                    warn!("pg_notify failed channel={} event_id={} err={e}", self.channel, entry.id);
                }
            }
            Err(e) => warn!("broadcast skipped event_id={} err={e}", entry.id),
        }
        Ok(CaptureOutcome::Published(entry))
    }

    /// Corre `mutate` y la captura en una sola transacción. `mutate` aplica la
    /// mutación de la entidad y devuelve el par before/after resultante.
    /// Cualquier error (de la mutación, del diff o del append) revierte todo.
    pub fn mutate<F>(&self, conn: &mut PgConnection, entity_name: &str, mutate: F) -> Result<CaptureOutcome, CaptureError>
        where F: FnOnce(&mut PgConnection) -> Result<TrackedEntityChange, PersistenceError>
    {
        conn.transaction::<_, PersistenceError, _>(|tx| {
                let change = mutate(tx)?;
                Ok(self.capture_in_tx(tx, entity_name, &change, Utc::now())?)
            })
            .map_err(CaptureError::from)
    }
}
