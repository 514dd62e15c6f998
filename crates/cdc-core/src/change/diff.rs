//! Motor de diff.
//!
//! Un campo trackeado cuenta como cambiado si está en after' y:
//! - no estaba en before' (primera aparición), o
//! - su texto difiere del de before'.
//!
//! Reescribir un campo con su valor actual no es un cambio. En `Delete` el
//! conjunto cambiado es el registro completo previo al borrado. Si el
//! conjunto queda vacío el resultado es `Diff::NoChange` y el pipeline se
//! detiene: sin payload, sin publish, sin fila en el log.

use super::normalizer::NormalizedChange;
use super::text::text_of;
use super::types::Operation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    NoChange,
    /// Campos cambiados en orden de declaración.
    Changed(Vec<String>),
}

impl Diff {
    pub fn is_empty(&self) -> bool { matches!(self, Diff::NoChange) }

    pub fn fields(&self) -> &[String] {
        match self {
            Diff::NoChange => &[],
            Diff::Changed(fields) => fields,
        }
    }
}

pub fn diff(change: &NormalizedChange) -> Diff {
    let changed: Vec<String> = match change.operation {
        Operation::Delete => change.before.as_ref().map(|b| b.keys().cloned().collect()).unwrap_or_default(),
        Operation::Create | Operation::Update => {
            let Some(after) = change.after.as_ref() else {
                return Diff::NoChange;
            };
            after.iter()
                 .filter(|(field, value)| match change.before.as_ref().and_then(|b| b.get(*field)) {
                     None => true,
                     Some(prev) => text_of(prev) != text_of(value),
                 })
                 .map(|(field, _)| field.clone())
                 .collect()
        }
    };
    if changed.is_empty() {
        Diff::NoChange
    } else {
        Diff::Changed(changed)
    }
}
