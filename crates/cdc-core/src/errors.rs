//! Errores del núcleo CDC.
//!
//! `NoChange` y `ClaimConflict` no son errores: el primero es un
//! resultado (`CaptureOutcome::NoChange`) y el segundo se manifiesta como un
//! claim más chico o vacío.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallos del camino de captura (mutación -> log). Cualquiera de ellos debe
/// abortar la mutación que lo originó.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CaptureError {
    /// Un valor trackeado no puede embeberse en el payload.
    #[error("field `{field}` cannot be embedded in payload: {reason}")]
    Serialization { field: String, reason: String },
    /// El append durable falló; el log y la mutación van acoplados.
    #[error("durable append failed: {0}")]
    Durability(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("entity not registered for tracking: {0}")]
    UnregisteredEntity(String),
}

/// Fallo del canal en vivo. Sólo se reporta; nunca revierte el append.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BroadcastError {
    #[error("no live subscribers on channel {0}")]
    NoSubscribers(String),
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// Fallos de lectura del log y de la contabilidad de ejecuciones.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid batch id: {0}")]
    InvalidBatch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_messages() {
        let e = CaptureError::Serialization { field: "loc".into(), reason: "object".into() };
        assert_eq!(e.to_string(), "field `loc` cannot be embedded in payload: object");
        assert_eq!(CaptureError::UnknownOperation("TRUNCATE".into()).to_string(), "unknown operation: TRUNCATE");
    }
}
