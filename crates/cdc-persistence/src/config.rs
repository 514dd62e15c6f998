//! Carga de configuración desde variables de entorno.
//!
//! Conexión: `DATABASE_URL` (obligatoria), `DATABASE_MIN_CONNECTIONS` (2),
//! `DATABASE_MAX_CONNECTIONS` (16).
//!
//! Operación CDC: `CDC_CHANNEL` (`cdc_events`), `CDC_CLAIM_LIMIT` (100),
//! `CDC_STALE_AFTER_SECS` (300), `CDC_TRACKING_FILE` (registro JSON opcional).

use std::env;
use std::path::PathBuf;

use cdc_core::constants::{DEFAULT_CHANNEL, DEFAULT_CLAIM_LIMIT, DEFAULT_STALE_AFTER_SECS};
use cdc_core::TrackingRegistry;
use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() { Lazy::force(&DOTENV_LOADED); }

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, PersistenceError> {
    match env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| PersistenceError::Config(format!("{key} inválido: {v}"))),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        init_dotenv();
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        Ok(Self { url,
                  min_connections: parsed_or("DATABASE_MIN_CONNECTIONS", 2)?,
                  max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 16)? })
    }
}

#[derive(Debug, Clone)]
pub struct CdcConfig {
    pub channel: String,
    pub claim_limit: usize,
    pub stale_after_secs: i64,
    pub tracking_file: Option<PathBuf>,
}

impl Default for CdcConfig {
    fn default() -> Self {
        Self { channel: DEFAULT_CHANNEL.to_string(),
               claim_limit: DEFAULT_CLAIM_LIMIT,
               stale_after_secs: DEFAULT_STALE_AFTER_SECS,
               tracking_file: None }
    }
}

impl CdcConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        init_dotenv();
        let defaults = Self::default();
        let channel = env::var("CDC_CHANNEL").unwrap_or(defaults.channel);
        if !is_valid_channel(&channel) {
            return Err(PersistenceError::Config(format!("CDC_CHANNEL inválido: {channel}")));
        }
        Ok(Self { channel,
                  claim_limit: parsed_or("CDC_CLAIM_LIMIT", defaults.claim_limit)?,
                  stale_after_secs: parsed_or("CDC_STALE_AFTER_SECS", defaults.stale_after_secs)?,
                  tracking_file: env::var("CDC_TRACKING_FILE").ok().map(PathBuf::from) })
    }

    /// Lee el registro de tracking de `tracking_file`; sin archivo devuelve
    /// un registro vacío.
    pub fn load_registry(&self) -> Result<TrackingRegistry, PersistenceError> {
        let Some(path) = &self.tracking_file else {
            return Ok(TrackingRegistry::new());
        };
        let text = std::fs::read_to_string(path).map_err(|e| PersistenceError::Config(format!("{}: {e}", path.display())))?;
        TrackingRegistry::from_json_str(&text).map_err(|e| PersistenceError::Config(format!("{}: {e}", path.display())))
    }
}

/// Nombres de canal aceptados por `pg_notify`: identificador simple, hasta 63
/// bytes.
pub fn is_valid_channel(channel: &str) -> bool {
    !channel.is_empty()
    && channel.len() <= 63
    && channel.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
