use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use parking_lot::Mutex;

use super::{BatchId, ExecutionQuery, ExecutionRecord, StaleBatch};
use crate::errors::StoreError;
use crate::event::{EventLog, EventLogEntry};

/// Reparto de eventos del log entre workers independientes.
///
/// Estados de un evento respecto del consumo:
/// `Unclaimed -> Claimed(batch) -> Processed`, o
/// `Claimed(batch) -> Unclaimed` vía `abandon`. `Processed` es terminal.
pub trait BatchDispatcher {
    /// Reclama hasta `limit` eventos sin registro de ejecución, en orden
    /// ascendente de `id`. Dos claims concurrentes nunca devuelven el mismo
    /// evento; perder una carrera sólo achica el resultado.
    fn claim(&self, limit: usize, batch_id: &BatchId) -> Result<Vec<EventLogEntry>, StoreError>;

    /// Marca como procesados todos los registros del batch. Devuelve cuántos
    /// pasaron de false a true (0 si el batch no existe o fue abandonado).
    fn mark_processed(&self, batch_id: &BatchId) -> Result<usize, StoreError>;

    /// Borra los registros no procesados con `modified_at < older_than`
    /// (opcionalmente sólo de un batch) para que sus eventos vuelvan a ser
    /// reclamables. Devuelve cuántos se liberaron.
    fn abandon(&self, batch_id: Option<&BatchId>, older_than: DateTime<Utc>) -> Result<usize, StoreError>;

    fn executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Batches con claims pendientes más viejos que `older_than`.
    fn stale_batches(&self, older_than: DateTime<Utc>) -> Result<Vec<StaleBatch>, StoreError> {
        let pending = self.executions(&ExecutionQuery::all().processed(false).modified_before(older_than))?;
        let mut grouped: BTreeMap<BatchId, StaleBatch> = BTreeMap::new();
        for r in pending {
            grouped.entry(r.batch_id.clone())
                   .and_modify(|s| {
                       s.pending += 1;
                       s.oldest_modified_at = s.oldest_modified_at.min(r.modified_at);
                   })
                   .or_insert(StaleBatch { batch_id: r.batch_id, pending: 1, oldest_modified_at: r.modified_at });
        }
        Ok(grouped.into_values().collect())
    }
}

/// Página de lectura del log al buscar eventos sin reclamar.
const SCAN_PAGE: usize = 256;

/// Piso del scan de claims: todo evento con `id < floor` tiene registro de
/// ejecución. `epoch` cambia con cada `abandon` que libera algo; un claim
/// sólo sube el piso si no hubo abandon desde que empezó su scan.
#[derive(Debug, Clone, Copy)]
struct ScanFloor {
    floor: u64,
    epoch: u64,
}

/// Dispatcher en memoria sobre cualquier `EventLog`.
///
/// El claim es una escritura condicional por evento (`DashMap::entry`): la
/// clave es el `event_id`, así que sólo un claimant puede crear su registro.
/// No hay lock global; batches distintos sólo compiten por el shard.
/// El scan arranca en el piso, no en el principio del log.
pub struct InMemoryDispatcher<L> {
    log: L,
    claims: DashMap<u64, ExecutionRecord>,
    next_id: AtomicU64,
    scan: Mutex<ScanFloor>,
}

impl<L: EventLog> InMemoryDispatcher<L> {
    pub fn new(log: L) -> Self {
        Self { log,
               claims: DashMap::new(),
               next_id: AtomicU64::new(1),
               scan: Mutex::new(ScanFloor { floor: 1, epoch: 0 }) }
    }

    pub fn log(&self) -> &L { &self.log }

    fn try_claim(&self, event_id: u64, batch_id: &BatchId) -> bool {
        if self.claims.contains_key(&event_id) {
            return false;
        }
        match self.claims.entry(event_id) {
            Entry::Vacant(slot) => {
                let now = Utc::now();
                slot.insert(ExecutionRecord { id: self.next_id.fetch_add(1, Ordering::Relaxed),
                                              processed: false,
                                              batch_id: batch_id.clone(),
                                              event_id,
                                              created_at: now,
                                              modified_at: now });
                true
            }
            Entry::Occupied(_) => false,
        }
    }
}

impl<L: EventLog> BatchDispatcher for InMemoryDispatcher<L> {
    fn claim(&self, limit: usize, batch_id: &BatchId) -> Result<Vec<EventLogEntry>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        debug!("claim:start batch={batch_id} limit={limit}");
        let start = *self.scan.lock();
        let mut claimed = Vec::with_capacity(limit);
        let mut cursor = start.floor;
        // fin del prefijo contiguo de eventos con registro visto en este scan
        let mut covered = Some(start.floor);
        'scan: loop {
            let page = self.log.by_id_range(cursor, None, SCAN_PAGE)?;
            let Some(last) = page.last() else { break };
            cursor = last.id + 1;
            for event in page {
                let taken = self.try_claim(event.id, batch_id);
                covered = covered.filter(|_| taken || self.claims.contains_key(&event.id)).map(|_| event.id + 1);
                if taken {
                    claimed.push(event);
                    if claimed.len() == limit {
                        break 'scan;
                    }
                }
            }
        }
        if let Some(end) = covered {
            let mut scan = self.scan.lock();
            if scan.epoch == start.epoch && end > scan.floor {
                scan.floor = end;
            }
        }
        debug!("claim:done batch={batch_id} count={}", claimed.len());
        Ok(claimed)
    }

    fn mark_processed(&self, batch_id: &BatchId) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut flipped = 0;
        for mut r in self.claims.iter_mut() {
            if r.batch_id == *batch_id && !r.processed {
                r.processed = true;
                r.modified_at = now;
                flipped += 1;
            }
        }
        debug!("mark_processed batch={batch_id} flipped={flipped}");
        Ok(flipped)
    }

    fn abandon(&self, batch_id: Option<&BatchId>, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut released = 0usize;
        let mut lowest = u64::MAX;
        self.claims.retain(|_, r| {
                       let stale = !r.processed
                                   && r.modified_at < older_than
                                   && batch_id.map_or(true, |b| *b == r.batch_id);
                       if stale {
                           released += 1;
                           lowest = lowest.min(r.event_id);
                       }
                       !stale
                   });
        if released > 0 {
            let mut scan = self.scan.lock();
            scan.floor = scan.floor.min(lowest);
            scan.epoch += 1;
            info!("abandon released={released} batch={:?} older_than={older_than}", batch_id.map(BatchId::as_str));
        }
        Ok(released)
    }

    fn executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>, StoreError> {
        let mut out: Vec<ExecutionRecord> =
            self.claims.iter().filter(|r| query.matches(r.value())).map(|r| r.value().clone()).collect();
        out.sort_by_key(|r| r.id);
        Ok(out)
    }
}
