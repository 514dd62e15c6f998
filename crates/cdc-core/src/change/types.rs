//! Tipos de la mutación entrante (`TrackedEntityChange`) y de la operación.
//!
//! Un `TrackedEntityChange` se construye por cada mutación de fila, lo consume
//! el pipeline de captura y se descarta. Nunca se persiste tal cual.
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CaptureError;

/// Registro crudo tal como lo entrega el hook del store (campo -> valor JSON).
pub type RawRecord = Map<String, Value>;

/// Registro normalizado: sólo campos trackeados, en orden de declaración.
pub type Record = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Representación estable (minúsculas) usada en el log durable.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Operation {
    type Err = CaptureError;

    /// Acepta `insert` como sinónimo de `create`. Cualquier otra operación
    /// (p.ej. `truncate`) es un error de integración fatal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "insert" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(CaptureError::UnknownOperation(s.to_string())),
        }
    }
}

/// Mutación de una fila trackeada.
///
/// Invariantes de forma (las aplica el normalizador, no el constructor):
/// - `Create` no tiene `before`.
/// - `Delete` no tiene `after`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntityChange {
    pub operation: Operation,
    pub before: Option<RawRecord>,
    pub after: Option<RawRecord>,
    pub record_id: String,
}

impl TrackedEntityChange {
    pub fn create(record_id: impl Into<String>, after: RawRecord) -> Self {
        Self { operation: Operation::Create, before: None, after: Some(after), record_id: record_id.into() }
    }

    pub fn update(record_id: impl Into<String>, before: RawRecord, after: RawRecord) -> Self {
        Self { operation: Operation::Update, before: Some(before), after: Some(after), record_id: record_id.into() }
    }

    pub fn delete(record_id: impl Into<String>, before: RawRecord) -> Self {
        Self { operation: Operation::Delete, before: Some(before), after: None, record_id: record_id.into() }
    }

    /// Construye la mutación a partir de la forma cruda del hook del store,
    /// donde la operación llega como texto.
    pub fn from_hook(operation: &str,
                     before: Option<RawRecord>,
                     after: Option<RawRecord>,
                     record_id: impl Into<String>)
                     -> Result<Self, CaptureError> {
        let operation = operation.parse::<Operation>()?;
        Ok(Self { operation, before, after, record_id: record_id.into() })
    }
}
