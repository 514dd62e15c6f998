//! Contabilidad de ejecuciones (claims) de eventos.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::StoreError;

/// Identificador de la instancia/corrida que reclama eventos.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(StoreError::InvalidBatch("empty batch id".into()));
        }
        Ok(Self(id))
    }

    /// Batch id aleatorio (uuid v4) para workers sin identidad propia.
    pub fn generate() -> Self { Self(Uuid::new_v4().to_string()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Registro de ejecución: un evento reclamado por un batch.
///
/// `processed` es monótono (false -> true). Mientras exista el registro el
/// evento no es visible para otro claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: u64,
    pub processed: bool,
    pub batch_id: BatchId,
    pub event_id: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Filtro para consultas de monitoreo sobre ejecuciones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionQuery {
    pub batch_id: Option<BatchId>,
    pub processed: Option<bool>,
    pub modified_before: Option<DateTime<Utc>>,
}

impl ExecutionQuery {
    pub fn all() -> Self { Self::default() }

    pub fn batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn processed(mut self, processed: bool) -> Self {
        self.processed = Some(processed);
        self
    }

    pub fn modified_before(mut self, t: DateTime<Utc>) -> Self {
        self.modified_before = Some(t);
        self
    }

    pub fn matches(&self, r: &ExecutionRecord) -> bool {
        self.batch_id.as_ref().map_or(true, |b| *b == r.batch_id)
        && self.processed.map_or(true, |p| p == r.processed)
        && self.modified_before.map_or(true, |t| r.modified_at < t)
    }
}

/// Resumen de un batch con claims sin procesar más viejos que el umbral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleBatch {
    pub batch_id: BatchId,
    pub pending: usize,
    pub oldest_modified_at: DateTime<Utc>,
}
