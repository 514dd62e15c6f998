//! Dispatcher de batches: claim exclusivo, marcado y abandono.

mod dispatcher;
mod types;

pub use dispatcher::{BatchDispatcher, InMemoryDispatcher};
pub use types::{BatchId, ExecutionQuery, ExecutionRecord, StaleBatch};
