use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Post-transition audit hooks. The engine broadcasts every committed event
/// on its court's channel; subscribers (audit logs, notification fan-out)
/// observe transitions without being part of the booking contract.
pub struct AuditHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for AuditHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to transitions for one court. Creates the channel if needed.
    pub fn subscribe(&self, court_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(court_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Emit a committed event. No-op if nobody is listening.
    pub fn send(&self, court_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&court_id) {
            let _ = sender.send(event.clone());
        }
    }
}
