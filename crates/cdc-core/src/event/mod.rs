//! Log durable de eventos: entradas y trait `EventLog`.

mod store;
mod types;

pub use store::{EventLog, InMemoryEventLog};
pub use types::{EventLogEntry, NewEvent};
