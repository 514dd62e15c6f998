//! Implementaciones Postgres (Diesel) de los traits del núcleo.
//!
//! Objetivo general del módulo:
//! - Proveer la capa durable (Postgres) con paridad de contrato respecto a
//!   los backends en memoria de `cdc-core`.
//! - Aislar completamente el mapeo dominio <-> filas de DB del núcleo.
//!
//! Contenido:
//! - `event_log`: `PgEventLog` append-only sobre `cdc_event_log` (orden total
//!   por `id` BIGSERIAL) y `append_in_tx` para anexar dentro de la
//!   transacción de la mutación.
//! - `notifier`: `pg_notify` best-effort (`PgNotifier`, `notify_in_savepoint`).
//! - `capture`: `PgChangeCapture`, pipeline de captura dentro de la
//!   transacción del llamador.
//! - `dispatcher`: `PgBatchDispatcher`, claim con `FOR UPDATE SKIP LOCKED` +
//!   unicidad sobre `cdc_execution.event_id`.
//! - Reintento con backoff para errores transitorios.

mod capture;
mod dispatcher;
mod event_log;
mod notifier;

pub use capture::PgChangeCapture;
pub use dispatcher::PgBatchDispatcher;
pub use event_log::{append_in_tx, EventRow, NewEventRow, PgEventLog};
pub use notifier::{notify_in_savepoint, PgNotifier};

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use log::warn;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Notas operativas:
/// - El pool se construye con `min_idle` y `max_size`.
/// - Al construirlo se corren las migraciones pendientes (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o
/// simularlo sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
/// Clonar comparte el mismo pool.
#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // Algunos mensajes llegan como Unknown con texto; best-effort sin
        // acoplar a SQLSTATE.
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Errores tras los cuales repetir una escritura no puede duplicarla: el
/// servidor confirmó el rollback. Un corte de conexión a mitad de commit no
/// entra acá (el commit pudo haberse aplicado).
fn is_replay_safe(e: &PersistenceError) -> bool { matches!(e, PersistenceError::SerializationConflict) }

/// Retry simple con backoff lineal corto (hasta 3 reintentos: 15ms, 30ms,
/// 45ms). Sólo repite la unidad de trabajo provista por `f`.
pub(crate) fn with_retry<F, T>(f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    with_retry_when(is_retryable, f)
}

/// Como `with_retry`, para escrituras no idempotentes: sólo repite si el
/// fallo garantiza que nada se aplicó.
pub(crate) fn with_write_retry<F, T>(f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    with_retry_when(is_replay_safe, f)
}

fn with_retry_when<F, T>(retryable: fn(&PersistenceError) -> bool, mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Convierte un límite de usuario a `LIMIT` SQL.
pub(crate) fn sql_limit(limit: usize) -> i64 { i64::try_from(limit).unwrap_or(i64::MAX) }

/// Id de evento como BIGINT; `None` si no entra (no existe tal fila).
pub(crate) fn sql_id(id: u64) -> Option<i64> { i64::try_from(id).ok() }

/// Construye un pool Postgres r2d2 a partir de URL.
///
/// - Si `min_size > max_size`, usa `min_size = max_size`.
/// - Ejecuta migraciones inmediatamente tras el primer `get()`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee `DbConfig` y construye un pool ya
/// migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_transient_errors_then_gives_up() {
        let calls = Cell::new(0);
        let r: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::SerializationConflict)
        });
        assert!(r.is_err());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let calls = Cell::new(0);
        let r: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::CheckViolation("operation".into()))
        });
        assert!(r.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recovers_after_transient_failure() {
        let calls = Cell::new(0);
        let r = with_retry(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 2 { Err(PersistenceError::TransientIo("pool".into())) } else { Ok(42) }
        });
        assert_eq!(r.unwrap(), 42);
    }

    #[test]
    fn write_retry_does_not_replay_ambiguous_commits() {
        let calls = Cell::new(0);
        let r: Result<(), _> = with_write_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::TransientIo("connection closed during commit".into()))
        });
        assert!(r.is_err());
        assert_eq!(calls.get(), 1);

        let calls = Cell::new(0);
        let r = with_write_retry(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(PersistenceError::SerializationConflict) } else { Ok(7) }
        });
        assert_eq!(r.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn limit_conversion_saturates() {
        assert_eq!(sql_limit(10), 10);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }

    #[test]
    fn ids_beyond_bigint_have_no_row() {
        assert_eq!(sql_id(42), Some(42));
        assert_eq!(sql_id(i64::MAX as u64), Some(i64::MAX));
        assert_eq!(sql_id(u64::MAX), None);
        assert_eq!(sql_id(i64::MAX as u64 + 1), None);
    }
}
