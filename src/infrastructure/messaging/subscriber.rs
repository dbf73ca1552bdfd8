//! Broadcast-backed progress subscriber

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use crate::interfaces::messaging::ProgressSubscriber;

/// Subscriber over one job's broadcast channel
///
/// Dropping the subscriber drops its receiver, which unsubscribes it and
/// lets the hub prune the channel.
pub struct BroadcastSubscriber {
    receiver: broadcast::Receiver<Value>,
}

impl BroadcastSubscriber {
    pub fn new(receiver: broadcast::Receiver<Value>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl ProgressSubscriber for BroadcastSubscriber {
    async fn next_message(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Ok(Ok(payload)) => return Some(payload),
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    // Intermediate updates were dropped; the next recv
                    // yields the most recent buffered payload.
                    debug!("Progress subscriber lagged, skipped {} updates", missed);
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_) => return None,
            }
        }
    }
}
