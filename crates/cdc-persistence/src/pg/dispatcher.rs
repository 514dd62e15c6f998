//! Dispatcher Postgres sobre `cdc_execution`.
//!
//! Exclusividad del claim:
//! - `FOR UPDATE OF e SKIP LOCKED` evita que dos claims concurrentes vean los
//!   mismos candidatos;
//! - la restricción UNIQUE sobre `cdc_execution.event_id` con
//!   `ON CONFLICT DO NOTHING` descarta cualquier candidato que otro batch
//!   haya alcanzado a insertar. Perder la carrera sólo achica el resultado.
use cdc_core::{BatchDispatcher, BatchId, EventLogEntry, ExecutionQuery, ExecutionRecord, StaleBatch, StoreError};
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, min};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text, Timestamptz};
use log::{debug, info};

use super::event_log::{rows_to_entries, EventRow};
use super::{sql_limit, with_retry, with_write_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::cdc_execution;

const CLAIM_SQL: &str = r#"
WITH candidates AS (
    SELECT e.id
      FROM cdc_event_log e
     WHERE NOT EXISTS (SELECT 1 FROM cdc_execution x WHERE x.event_id = e.id)
     ORDER BY e.id
     LIMIT $1
       FOR UPDATE OF e SKIP LOCKED
), claimed AS (
    INSERT INTO cdc_execution (batch_id, event_id, processed, created_at, modified_at)
    SELECT $2, c.id, false, $3, $3 FROM candidates c
    ON CONFLICT (event_id) DO NOTHING
    RETURNING event_id
)
SELECT e.id, e.entity_name, e.operation, e.payload, e.record_id, e.created_at
  FROM cdc_event_log e
  JOIN claimed c ON c.event_id = e.id
 ORDER BY e.id
"#;

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = cdc_execution)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ExecutionRow {
    id: i64,
    batch_id: String,
    event_id: i64,
    processed: bool,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = PersistenceError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let batch_id = BatchId::new(row.batch_id).map_err(|e| PersistenceError::Unknown(format!("execution {}: {e}", row.id)))?;
        Ok(ExecutionRecord { id: row.id as u64,
                             processed: row.processed,
                             batch_id,
                             event_id: row.event_id as u64,
                             created_at: row.created_at,
                             modified_at: row.modified_at })
    }
}

pub struct PgBatchDispatcher<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgBatchDispatcher<P> {
    pub fn new(provider: P) -> Self { Self { provider } }
}

impl<P: ConnectionProvider> BatchDispatcher for PgBatchDispatcher<P> {
    fn claim(&self, limit: usize, batch_id: &BatchId) -> Result<Vec<EventLogEntry>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        debug!("claim:start batch={batch_id} limit={limit}");
        // Un commit ambiguo no se repite: los eventos que hubiera tomado quedan
        // a nombre del batch y vuelven con `abandon`.
        let rows: Vec<EventRow> = with_write_retry(|| {
            let mut conn = with_retry(|| self.provider.connection())?;
            conn.build_transaction().read_write().run(|tx| {
                                                     diesel::sql_query(CLAIM_SQL).bind::<BigInt, _>(sql_limit(limit))
                                                                                 .bind::<Text, _>(batch_id.as_str())
                                                                                 .bind::<Timestamptz, _>(Utc::now())
                                                                                 .load::<EventRow>(tx)
                                                                                 .map_err(PersistenceError::from)
                                                 })
        })?;
        let entries = rows_to_entries(rows)?;
        info!("claim batch={batch_id} claimed={}", entries.len());
        Ok(entries)
    }

    fn mark_processed(&self, batch_id: &BatchId) -> Result<usize, StoreError> {
        let updated = with_write_retry(|| {
            let mut conn = with_retry(|| self.provider.connection())?;
            diesel::update(cdc_execution::table.filter(cdc_execution::batch_id.eq(batch_id.as_str()))
                                               .filter(cdc_execution::processed.eq(false)))
                .set((cdc_execution::processed.eq(true), cdc_execution::modified_at.eq(Utc::now())))
                .execute(&mut conn)
                .map_err(PersistenceError::from)
        })?;
        info!("mark_processed batch={batch_id} updated={updated}");
        Ok(updated)
    }

    fn abandon(&self, batch_id: Option<&BatchId>, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let released = with_write_retry(|| {
            let mut conn = with_retry(|| self.provider.connection())?;
            let stale = cdc_execution::table.filter(cdc_execution::processed.eq(false))
                                            .filter(cdc_execution::modified_at.lt(older_than));
            let deleted = match batch_id {
                Some(b) => diesel::delete(stale.filter(cdc_execution::batch_id.eq(b.as_str()))).execute(&mut conn),
                None => diesel::delete(stale).execute(&mut conn),
            };
            deleted.map_err(PersistenceError::from)
        })?;
        info!("abandon batch={} released={released}", batch_id.map_or("*", BatchId::as_str));
        Ok(released)
    }

    fn executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows: Vec<ExecutionRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let mut q = cdc_execution::table.select(ExecutionRow::as_select())
                                            .order(cdc_execution::id.asc())
                                            .into_boxed();
            if let Some(b) = &query.batch_id {
                q = q.filter(cdc_execution::batch_id.eq(b.as_str().to_string()));
            }
            if let Some(p) = query.processed {
                q = q.filter(cdc_execution::processed.eq(p));
            }
            if let Some(t) = query.modified_before {
                q = q.filter(cdc_execution::modified_at.lt(t));
            }
            q.load(&mut conn).map_err(PersistenceError::from)
        })?;
        let records = rows.into_iter()
                          .map(ExecutionRecord::try_from)
                          .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn stale_batches(&self, older_than: DateTime<Utc>) -> Result<Vec<StaleBatch>, StoreError> {
        let groups: Vec<(String, i64, Option<DateTime<Utc>>)> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            cdc_execution::table.filter(cdc_execution::processed.eq(false))
                                .filter(cdc_execution::modified_at.lt(older_than))
                                .group_by(cdc_execution::batch_id)
                                .select((cdc_execution::batch_id, count_star(), min(cdc_execution::modified_at)))
                                .order(cdc_execution::batch_id.asc())
                                .load(&mut conn)
                                .map_err(PersistenceError::from)
        })?;
        let mut out = Vec::with_capacity(groups.len());
        for (batch, pending, oldest) in groups {
            let Some(oldest_modified_at) = oldest else { continue };
            out.push(StaleBatch { batch_id: BatchId::new(batch)?, pending: pending as usize, oldest_modified_at });
        }
        Ok(out)
    }
}
