//! In-process notification hub
//!
//! Fan-out for per-job progress channels. SQLite has no LISTEN/NOTIFY, so
//! both progress channel backends route notifications through a broadcast
//! registry keyed by channel name (`job_progress_<job_id>`). Subscribers
//! only see payloads published after they subscribe; the persistent
//! snapshot covers the catch-up case.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tokio::sync::broadcast;

/// Buffered payloads per channel before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 64;

/// Registry of per-job broadcast channels
#[derive(Debug, Default)]
pub struct NotificationHub {
    channels: RwLock<HashMap<String, broadcast::Sender<Value>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends a payload to all current subscribers of `channel`
    ///
    /// Channels without subscribers are pruned rather than buffered; a
    /// consumer arriving later reads the stored snapshot instead.
    pub fn notify(&self, channel: &str, payload: Value) {
        let mut channels = self.channels.write().expect("notification hub poisoned");
        if let Some(sender) = channels.get(channel) {
            if sender.receiver_count() == 0 {
                channels.remove(channel);
            } else {
                // Err means the last receiver dropped between the check and
                // the send; nothing to deliver either way.
                let _ = sender.send(payload);
            }
        }
    }

    /// Subscribes to `channel`, creating it on first use
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Value> {
        let mut channels = self.channels.write().expect("notification hub poisoned");
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Number of live channels (for tests and diagnostics)
    pub fn channel_count(&self) -> usize {
        self.channels.read().expect("notification hub poisoned").len()
    }
}
