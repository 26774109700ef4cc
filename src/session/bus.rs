use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::session::SessionEvent;

/// Buffered events per session before a slow subscriber lags.
const CHANNEL_CAPACITY: usize = 16;

/// In-process fan-out of session events, keyed by session id.
#[derive(Clone, Default)]
pub struct SessionBus {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<SessionEvent>>>>,
}

impl SessionBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<SessionEvent> {
        self.channels
            .lock()
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Delivers `event` to the session's subscribers. Returns how many
    /// received it; zero when nobody is listening.
    pub fn publish(&self, session_id: Uuid, event: SessionEvent) -> usize {
        let channels = self.channels.lock();
        match channels.get(&session_id) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Forgets channels nobody subscribes to any more.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.lock();
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }
}
