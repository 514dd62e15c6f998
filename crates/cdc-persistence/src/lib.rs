//! cdc-persistence
//!
//! Backend Postgres (Diesel + r2d2) para el outbox de cambios de `cdc-core`.
//!
//! Módulos:
//! - `pg`: `PgEventLog` (append-only), `PgBatchDispatcher` (claim con
//!   `SKIP LOCKED`), `PgNotifier` y `PgChangeCapture` para capturar dentro
//!   de la transacción de la mutación.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: configuración desde `.env` / variables de entorno.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, CdcConfig, DbConfig};
pub use error::PersistenceError;
pub use pg::{append_in_tx, build_dev_pool_from_env, build_pool, notify_in_savepoint, ConnectionProvider, PgBatchDispatcher,
             PgChangeCapture, PgEventLog, PgNotifier, PgPool, PoolProvider};
