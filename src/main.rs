//! Demo del pipeline completo en memoria: mutaciones de `dept` -> log ->
//! canal en vivo -> claim por batch -> confirmación.
//!
//! Con `--features pg_demo` y `DATABASE_URL` corre además la captura
//! transaccional contra Postgres.
use std::error::Error;
use std::sync::Arc;

use cdcflow::{BatchDispatcher, BatchId, BroadcastNotifier, ChangeCapture, EventPublisher, InMemoryDispatcher, InMemoryEventLog,
              RawRecord, TrackedEntityChange, TrackingRegistry};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

fn dept(deptno: &str, dname: &str, loc: &str) -> RawRecord {
    let mut row = RawRecord::new();
    row.insert("deptno".into(), json!(deptno));
    row.insert("dname".into(), json!(dname));
    row.insert("loc".into(), json!(loc));
    row
}

fn registry() -> TrackingRegistry { TrackingRegistry::new().track("dept", ["deptno", "dname", "loc"]) }

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let log = Arc::new(InMemoryEventLog::new());
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut live = notifier.subscribe();
    let listener = tokio::spawn(async move {
        let mut seen = 0usize;
        while let Ok(n) = live.recv().await {
            info!(channel = %n.channel, message = %n.message, "live");
            seen += 1;
        }
        seen
    });

    let capture = ChangeCapture::new(registry(), EventPublisher::new(Arc::clone(&log), Arc::clone(&notifier)));
    let sales = dept("10", "SALES", "NEW YORK");
    let moved = dept("10", "SALES", "BOSTON");
    let changes = [TrackedEntityChange::create("10", sales.clone()),
                   TrackedEntityChange::update("10", sales.clone(), sales),
                   TrackedEntityChange::update("10", dept("10", "SALES", "NEW YORK"), moved.clone()),
                   TrackedEntityChange::delete("10", moved)];
    for change in &changes {
        let outcome = capture.on_mutation("dept", change, Utc::now())?;
        match outcome.entry() {
            Some(e) => info!(id = e.id, operation = %e.operation, "published"),
            None => info!(operation = %change.operation, "no tracked field changed"),
        }
    }
    drop(capture);
    drop(notifier);
    let seen = listener.await?;
    info!(seen, "live channel closed");

    let dispatcher = InMemoryDispatcher::new(Arc::clone(&log));
    let batch = BatchId::generate();
    for event in dispatcher.claim(10, &batch)? {
        println!("{}", serde_json::to_string(&event)?);
    }
    let done = dispatcher.mark_processed(&batch)?;
    info!(batch = %batch, done, "batch processed");
    if !dispatcher.claim(10, &BatchId::generate())?.is_empty() {
        warn!("processed events were handed out again");
    }

    #[cfg(feature = "pg_demo")]
    pg_demo::run()?;

    Ok(())
}

#[cfg(feature = "pg_demo")]
mod pg_demo {
    use std::error::Error;

    use cdcflow::persistence::{build_dev_pool_from_env, CdcConfig, PgBatchDispatcher, PgChangeCapture, PoolProvider};
    use cdcflow::{BatchDispatcher, BatchId, TrackedEntityChange};
    use tracing::info;

    pub fn run() -> Result<(), Box<dyn Error>> {
        let cfg = CdcConfig::from_env()?;
        let pool = build_dev_pool_from_env()?;
        let capture = PgChangeCapture::with_channel(super::registry(), cfg.channel.clone());
        let mut conn = pool.get()?;
        // Sin tabla de entidad: la mutación sólo produce el par before/after.
        let row = super::dept("20", "RESEARCH", "DALLAS");
        let outcome = capture.mutate(&mut conn, "dept", |_| Ok(TrackedEntityChange::create("20", row)))?;
        info!(event = ?outcome.entry().map(|e| e.id), "pg capture");

        let dispatcher = PgBatchDispatcher::new(PoolProvider { pool });
        let batch = BatchId::generate();
        let claimed = dispatcher.claim(cfg.claim_limit, &batch)?;
        info!(batch = %batch, claimed = claimed.len(), "pg claim");
        dispatcher.mark_processed(&batch)?;
        Ok(())
    }
}
