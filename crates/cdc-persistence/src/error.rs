//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas, y éstas a los
//! tipos de error del núcleo.

use cdc_core::{CaptureError, StoreError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("migration error: {0}")]
    Migration(String),
    /// Fallo del pipeline de captura dentro de una transacción.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::AlreadyInTransaction => Self::Unknown("already in transaction".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::QueryBuilderError(e) => Self::Unknown(format!("query builder: {e}")),
            DieselError::RollbackTransaction => Self::Unknown("rollback transaction".into()),
            DieselError::NotInTransaction => Self::Unknown("not in transaction".into()),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

/// En el camino de captura, todo fallo de base es un fallo de durabilidad: la
/// mutación no puede aceptarse sin su fila en el log. Los errores de captura
/// envueltos vuelven tal cual.
impl From<PersistenceError> for CaptureError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Capture(e) => e,
            other => CaptureError::Durability(other.to_string()),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self { StoreError::Storage(err.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_directly() {
        assert!(matches!(PersistenceError::from(DieselError::NotFound), PersistenceError::NotFound));
    }

    #[test]
    fn converts_into_core_errors() {
        let c: CaptureError = PersistenceError::TransientIo("pool".into()).into();
        assert_eq!(c, CaptureError::Durability("transient IO / connection pool error: pool".into()));
        let s: StoreError = PersistenceError::NotFound.into();
        assert_eq!(s, StoreError::Storage("not found".into()));
        let back: CaptureError = PersistenceError::from(CaptureError::UnknownOperation("x".into())).into();
        assert_eq!(back, CaptureError::UnknownOperation("x".into()));
    }
}
