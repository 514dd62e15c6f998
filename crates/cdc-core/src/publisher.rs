//! Publicador de eventos: append durable y luego difusión en vivo.
//!
//! - Sin payload no hay nada que hacer (`Ok(None)`), no es un error.
//! - Si el append falla, el error sube y la mutación debe revertirse.
//! - Si sólo falla la difusión, se registra con `warn!` y el append queda.
use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::change::Operation;
use crate::constants::DEFAULT_CHANNEL;
use crate::errors::CaptureError;
use crate::event::{EventLog, EventLogEntry, NewEvent};
use crate::notify::Notifier;
use crate::payload::ChangePayload;

pub struct EventPublisher<L, N> {
    log: L,
    notifier: N,
    channel: String,
}

impl<L: EventLog, N: Notifier> EventPublisher<L, N> {
    pub fn new(log: L, notifier: N) -> Self { Self::with_channel(log, notifier, DEFAULT_CHANNEL) }

    pub fn with_channel(log: L, notifier: N, channel: impl Into<String>) -> Self {
        Self { log, notifier, channel: channel.into() }
    }

    pub fn log(&self) -> &L { &self.log }

    pub fn notifier(&self) -> &N { &self.notifier }

    pub fn channel(&self) -> &str { &self.channel }

    pub fn publish(&self,
                   entity_name: &str,
                   operation: Operation,
                   payload: Option<&ChangePayload>,
                   record_id: &str,
                   now: DateTime<Utc>)
                   -> Result<Option<EventLogEntry>, CaptureError> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        debug!("publish:start entity={entity_name} op={operation} record={record_id}");
        let event = NewEvent::new(entity_name, operation, payload, record_id, now)?;
        let entry = self.log.append(event)?;

        match entry.live_message() {
            Ok(msg) => {
                if let Err(e) = self.notifier.notify(&self.channel, &msg) {
                    warn!("broadcast failed channel={} event_id={} err={e}", self.channel, entry.id);
                }
            }
            Err(e) => warn!("broadcast skipped event_id={} err={e}", entry.id),
        }
        debug!("publish:done entity={entity_name} event_id={}", entry.id);
        Ok(Some(entry))
    }
}
