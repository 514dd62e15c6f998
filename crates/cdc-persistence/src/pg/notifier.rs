//! Canal en vivo sobre `pg_notify`.
//!
//! Dentro de una transacción la notificación sólo se entrega al hacer commit,
//! así que un rollback de la mutación también descarta la notificación.
use cdc_core::{BroadcastError, Notifier};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;

use super::ConnectionProvider;
use crate::error::PersistenceError;

fn pg_notify(conn: &mut PgConnection, channel: &str, message: &str) -> QueryResult<usize> {
    diesel::sql_query("SELECT pg_notify($1, $2)").bind::<Text, _>(channel)
                                                 .bind::<Text, _>(message)
                                                 .execute(conn)
}

/// Notifica dentro de un SAVEPOINT de la transacción en curso: si falla, se
/// revierte sólo el savepoint y la transacción del llamador sigue usable.
pub fn notify_in_savepoint(conn: &mut PgConnection, channel: &str, message: &str) -> Result<(), PersistenceError> {
    conn.transaction::<_, PersistenceError, _>(|sp| {
            pg_notify(sp, channel, message)?;
            Ok(())
        })
}

/// `Notifier` autónomo: toma una conexión del pool y notifica en autocommit
/// (entrega inmediata).
pub struct PgNotifier<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgNotifier<P> {
    pub fn new(provider: P) -> Self { Self { provider } }
}

impl<P: ConnectionProvider> Notifier for PgNotifier<P> {
    fn notify(&self, channel: &str, message: &str) -> Result<(), BroadcastError> {
        let mut conn = self.provider.connection().map_err(|e| BroadcastError::Unavailable(e.to_string()))?;
        pg_notify(&mut conn, channel, message).map(|_| ())
                                              .map_err(|e| BroadcastError::Unavailable(e.to_string()))
    }
}
