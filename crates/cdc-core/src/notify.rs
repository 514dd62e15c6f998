//! Canal de notificación en vivo.
//!
//! El núcleo sólo publica; nunca se suscribe. La entrega es best-effort: sin
//! confirmación ni acks. Quien necesite durabilidad lee el log.
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::errors::BroadcastError;

pub trait Notifier {
    fn notify(&self, channel: &str, message: &str) -> Result<(), BroadcastError>;
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, channel: &str, message: &str) -> Result<(), BroadcastError> { (**self).notify(channel, message) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub message: String,
}

/// Canal en memoria sobre `tokio::sync::broadcast`. Los receptores lentos
/// pierden mensajes (lag) en vez de frenar al publicador.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> { self.sender.subscribe() }
}

impl Default for BroadcastNotifier {
    fn default() -> Self { Self::new(1024) }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, channel: &str, message: &str) -> Result<(), BroadcastError> {
        self.sender
            .send(Notification { channel: channel.to_string(), message: message.to_string() })
            .map(|_| ())
            .map_err(|_| BroadcastError::NoSubscribers(channel.to_string()))
    }
}

/// Notifier que descarta todo (despliegues que sólo consumen el log).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _channel: &str, _message: &str) -> Result<(), BroadcastError> { Ok(()) }
}
