//! Normalizador: recorta before/after a los campos trackeados.
//!
//! - El orden del resultado es el orden de declaración de los campos
//!   trackeados, no el del registro crudo.
//! - Los valores se copian sin transformar; la igualdad la decide el diff.
//! - `Create` descarta cualquier `before` y `Delete` cualquier `after`.

use super::types::{Operation, RawRecord, Record, TrackedEntityChange};

/// Par (before', after') restringido a campos trackeados.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedChange {
    pub operation: Operation,
    pub before: Option<Record>,
    pub after: Option<Record>,
}

pub fn normalize(operation: Operation,
                 before: Option<&RawRecord>,
                 after: Option<&RawRecord>,
                 tracked_fields: &[String])
                 -> NormalizedChange {
    let before = match operation {
        Operation::Create => None,
        Operation::Update | Operation::Delete => before.map(|r| restrict(r, tracked_fields)),
    };
    let after = match operation {
        Operation::Delete => None,
        Operation::Create | Operation::Update => after.map(|r| restrict(r, tracked_fields)),
    };
    NormalizedChange { operation, before, after }
}

/// Atajo sobre una `TrackedEntityChange` completa.
pub fn normalize_change(change: &TrackedEntityChange, tracked_fields: &[String]) -> NormalizedChange {
    normalize(change.operation, change.before.as_ref(), change.after.as_ref(), tracked_fields)
}

fn restrict(raw: &RawRecord, tracked_fields: &[String]) -> Record {
    tracked_fields.iter()
                  .filter_map(|field| raw.get(field).map(|v| (field.clone(), v.clone())))
                  .collect()
}
