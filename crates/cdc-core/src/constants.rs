//! Constantes del núcleo CDC.
//!
//! Las claves del payload forman parte del contrato con los consumidores:
//! cambiarlas rompe a quien lea el log o escuche el canal.

/// Canal en vivo por defecto.
pub const DEFAULT_CHANNEL: &str = "cdc_events";

/// Clave del mapa de valores nuevos en el payload.
pub const NEW_VALUES_KEY: &str = "newValues";

/// Clave del mapa de valores previos en el payload.
pub const OLD_VALUES_KEY: &str = "oldValues";

/// Límite de claim por defecto para workers que no indican uno.
pub const DEFAULT_CLAIM_LIMIT: usize = 100;

/// Umbral de abandono por defecto (segundos sin `modified_at`).
pub const DEFAULT_STALE_AFTER_SECS: i64 = 300;
