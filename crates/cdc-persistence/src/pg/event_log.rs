//! Log durable sobre `cdc_event_log` (append-only, sin updates ni deletes).
use cdc_core::{CaptureError, EventLog, EventLogEntry, NewEvent, Operation, StoreError};
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::debug;
use serde_json::Value;

use super::{sql_id, sql_limit, with_retry, with_write_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::cdc_event_log;

/// Fila para insertar en `cdc_event_log`; `id` lo asigna BIGSERIAL.
#[derive(Insertable, Debug)]
#[diesel(table_name = cdc_event_log)]
pub struct NewEventRow<'a> {
    pub entity_name: &'a str,
    pub operation: &'a str,
    pub payload: &'a Value,
    pub record_id: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Fila mapeada de `cdc_event_log` para lecturas (DSL y SQL crudo).
#[derive(Queryable, QueryableByName, Selectable, Debug)]
#[diesel(table_name = cdc_event_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventRow {
    pub id: i64,
    pub entity_name: String,
    pub operation: String,
    pub payload: Value,
    pub record_id: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for EventLogEntry {
    type Error = PersistenceError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let operation = row.operation
                           .parse::<Operation>()
                           .map_err(|e| PersistenceError::Unknown(format!("event {}: {e}", row.id)))?;
        Ok(EventLogEntry { id: row.id as u64,
                           entity_name: row.entity_name,
                           operation,
                           payload: row.payload,
                           record_id: row.record_id,
                           created_at: row.created_at })
    }
}

pub(crate) fn rows_to_entries(rows: Vec<EventRow>) -> Result<Vec<EventLogEntry>, PersistenceError> {
    rows.into_iter().map(EventLogEntry::try_from).collect()
}

/// Anexa un evento usando la conexión (y transacción) del llamador.
///
/// Si el llamador está dentro de la transacción de la mutación de la entidad,
/// un error aquí la revierte completa.
pub fn append_in_tx(conn: &mut PgConnection, event: &NewEvent) -> Result<EventLogEntry, PersistenceError> {
    let row: EventRow = diesel::insert_into(cdc_event_log::table).values(NewEventRow { entity_name: &event.entity_name,
                                                                                     operation: event.operation.as_str(),
                                                                                     payload: &event.payload,
                                                                                     record_id: &event.record_id,
                                                                                     created_at: event.created_at })
                                                                 .returning(EventRow::as_returning())
                                                                 .get_result(conn)?;
    EventLogEntry::try_from(row)
}

/// Implementación Postgres de `EventLog`. Cada `append` corre en su propia
/// transacción; para acoplarlo a una mutación usar `append_in_tx` o
/// `PgChangeCapture`.
///
/// El `append` sólo se repite ante conflictos de serialización. Si la
/// conexión se corta durante el commit el error sube como `Durability` y el
/// evento puede haber quedado escrito: el llamador no debe reintentarlo a
/// ciegas.
pub struct PgEventLog<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgEventLog<P> {
    pub fn new(provider: P) -> Self { Self { provider } }
}

impl<P: ConnectionProvider> EventLog for PgEventLog<P> {
    fn append(&self, event: NewEvent) -> Result<EventLogEntry, CaptureError> {
        debug!("append:start entity={} op={}", event.entity_name, event.operation);
        let entry = with_write_retry(|| {
            let mut conn = with_retry(|| self.provider.connection())?;
            conn.build_transaction()
                .read_write()
                .run(|tx| append_in_tx(tx, &event))
        })?;
        debug!("append:done entity={} id={}", entry.entity_name, entry.id);
        Ok(entry)
    }

    fn get(&self, id: u64) -> Result<Option<EventLogEntry>, StoreError> {
        let Some(id) = sql_id(id) else {
            return Ok(None);
        };
        let row: Option<EventRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            cdc_event_log::table.find(id)
                                .select(EventRow::as_select())
                                .first(&mut conn)
                                .optional()
                                .map_err(PersistenceError::from)
        })?;
        Ok(row.map(EventLogEntry::try_from).transpose()?)
    }

    fn by_id_range(&self, from: u64, to: Option<u64>, limit: usize) -> Result<Vec<EventLogEntry>, StoreError> {
        let Some(from) = sql_id(from) else {
            return Ok(Vec::new());
        };
        // un `to` fuera de BIGINT no acota nada
        let to = to.and_then(sql_id);
        let rows: Vec<EventRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let mut query = cdc_event_log::table.filter(cdc_event_log::id.ge(from))
                                                .select(EventRow::as_select())
                                                .order(cdc_event_log::id.asc())
                                                .limit(sql_limit(limit))
                                                .into_boxed();
            if let Some(to) = to {
                query = query.filter(cdc_event_log::id.le(to));
            }
            query.load(&mut conn).map_err(PersistenceError::from)
        })?;
        Ok(rows_to_entries(rows)?)
    }

    fn by_created_range(&self,
                        from: DateTime<Utc>,
                        to: DateTime<Utc>,
                        limit: usize)
                        -> Result<Vec<EventLogEntry>, StoreError> {
        let rows: Vec<EventRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            cdc_event_log::table.filter(cdc_event_log::created_at.ge(from))
                                .filter(cdc_event_log::created_at.lt(to))
                                .select(EventRow::as_select())
                                .order(cdc_event_log::id.asc())
                                .limit(sql_limit(limit))
                                .load(&mut conn)
                                .map_err(PersistenceError::from)
        })?;
        Ok(rows_to_entries(rows)?)
    }
}
