//! Operación del outbox desde la terminal: reclamar, confirmar y liberar
//! batches, e inspeccionar el log. Requiere `DATABASE_URL`.
//!
//! La salida es una línea JSON por registro.
use std::error::Error;

use cdc_core::{BatchDispatcher, BatchId, EventLog, ExecutionQuery};
use cdc_persistence::{build_dev_pool_from_env, CdcConfig, PgBatchDispatcher, PgEventLog, PoolProvider};
use chrono::{Duration, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::info;

#[derive(clap::Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
struct CdcCli {
    #[command(subcommand)]
    command: CdcCommand,
}

#[derive(clap::Subcommand, Clone, Debug)]
enum CdcCommand {
    /// Reclama eventos sin procesar para un batch
    Claim {
        /// Batch id; si se omite se genera uno
        #[arg(short, long)]
        batch: Option<String>,
        /// Máximo de eventos (default `CDC_CLAIM_LIMIT`)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Marca como procesados los eventos de un batch
    Mark {
        #[arg(short, long)]
        batch: String,
    },
    /// Libera claims sin procesar más viejos que el umbral
    Abandon {
        /// Sólo este batch
        #[arg(short, long)]
        batch: Option<String>,
        /// Antigüedad mínima en segundos (default `CDC_STALE_AFTER_SECS`)
        #[arg(long)]
        older_than_secs: Option<i64>,
    },
    /// Lista eventos del log por rango de id
    Events {
        #[arg(long, default_value_t = 1)]
        from: u64,
        #[arg(long)]
        to: Option<u64>,
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
    /// Lista registros de ejecución
    #[clap(aliases = &["execs"])]
    Executions {
        #[arg(short, long)]
        batch: Option<String>,
        #[arg(long)]
        processed: Option<bool>,
    },
    /// Batches con claims pendientes más viejos que el umbral
    Stale {
        #[arg(long)]
        older_than_secs: Option<i64>,
    },
}

fn print_lines<T: Serialize>(items: &[T]) -> Result<(), serde_json::Error> {
    for item in items {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let cli = CdcCli::parse();
    let cfg = CdcConfig::from_env()?;
    let provider = PoolProvider { pool: build_dev_pool_from_env()? };
    let dispatcher = PgBatchDispatcher::new(provider.clone());
    let threshold = |secs: Option<i64>| Utc::now() - Duration::seconds(secs.unwrap_or(cfg.stale_after_secs));

    match cli.command {
        CdcCommand::Claim { batch, limit } => {
            let batch = match batch {
                Some(b) => BatchId::new(b)?,
                None => BatchId::generate(),
            };
            let events = dispatcher.claim(limit.unwrap_or(cfg.claim_limit), &batch)?;
            info!(batch = %batch, claimed = events.len(), "claim");
            print_lines(&events)?;
        }
        CdcCommand::Mark { batch } => {
            let batch = BatchId::new(batch)?;
            let updated = dispatcher.mark_processed(&batch)?;
            println!("{}", serde_json::json!({ "batchId": batch, "processed": updated }));
        }
        CdcCommand::Abandon { batch, older_than_secs } => {
            let batch = batch.map(BatchId::new).transpose()?;
            let released = dispatcher.abandon(batch.as_ref(), threshold(older_than_secs))?;
            println!("{}", serde_json::json!({ "batchId": batch, "released": released }));
        }
        CdcCommand::Events { from, to, limit } => {
            let log = PgEventLog::new(provider);
            print_lines(&log.by_id_range(from, to, limit)?)?;
        }
        CdcCommand::Executions { batch, processed } => {
            let mut query = ExecutionQuery::all();
            if let Some(b) = batch {
                query = query.batch(BatchId::new(b)?);
            }
            if let Some(p) = processed {
                query = query.processed(p);
            }
            print_lines(&dispatcher.executions(&query)?)?;
        }
        CdcCommand::Stale { older_than_secs } => {
            print_lines(&dispatcher.stale_batches(threshold(older_than_secs))?)?;
        }
    }
    Ok(())
}
