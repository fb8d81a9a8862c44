use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-room broadcast of committed events. Slow subscribers lag, they never
/// hold up a commit.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, room_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Close a room's channel. Subscribers drain what was sent, then see `Closed`.
    pub fn remove(&self, room_id: &Ulid) {
        self.channels.remove(room_id);
    }
}
