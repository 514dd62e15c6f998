//! Entradas del log durable de eventos de cambio.
//!
//! Rol en el sistema:
//! - El `EventPublisher` agrega una entrada por cada mutación con diff no vacío.
//! - Las entradas son inmutables; el orden por `id` es el orden canónico de
//!   replay.
//! - Los workers del `BatchDispatcher` sólo las leen.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change::Operation;
use crate::errors::CaptureError;
use crate::payload::ChangePayload;

/// Evento listo para append (el `id` lo asigna el log).
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub entity_name: String,
    pub operation: Operation,
    pub payload: Value,
    pub record_id: String,
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(entity_name: &str,
               operation: Operation,
               payload: &ChangePayload,
               record_id: &str,
               created_at: DateTime<Utc>)
               -> Result<Self, CaptureError> {
        Ok(Self { entity_name: entity_name.to_string(),
                  operation,
                  payload: payload.to_value()?,
                  record_id: record_id.to_string(),
                  created_at })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    pub id: u64, // asignado por el log al insertar, creciente
    pub entity_name: String,
    pub operation: Operation,
    pub payload: Value, // opaco para el log
    pub record_id: String,
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn from_new(id: u64, event: NewEvent) -> Self {
        Self { id,
               entity_name: event.entity_name,
               operation: event.operation,
               payload: event.payload,
               record_id: event.record_id,
               created_at: event.created_at }
    }

    /// Interpreta el payload como `ChangePayload`.
    pub fn change_payload(&self) -> Result<ChangePayload, serde_json::Error> { ChangePayload::from_value(self.payload.clone()) }

    /// Mensaje que se difunde por el canal en vivo.
    pub fn live_message(&self) -> Result<String, CaptureError> {
        let msg = LiveMessage { event_id: self.id,
                                entity: &self.entity_name,
                                operation: self.operation,
                                record_id: &self.record_id,
                                payload: &self.payload };
        serde_json::to_string(&msg).map_err(|e| CaptureError::Serialization { field: "*".into(), reason: e.to_string() })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveMessage<'a> {
    event_id: u64,
    entity: &'a str,
    operation: Operation,
    record_id: &'a str,
    payload: &'a Value,
}
