//! Channel-backed event publisher for in-memory setups.
//!
//! Wraps a Tokio MPSC channel so the rest of the pipeline can publish
//! without caring whether a real broker is attached. The receiving half is
//! shared behind a mutex, letting a single consumer (the dev-mode drain
//! loop, or a test making assertions) pull events out in order.
//!
//! Events are lost on restart; use the Redis publisher when anything
//! downstream actually depends on delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use super::EventPublisher;
use crate::errors::PublishError;

/// One published event as seen by the consuming side.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// MPSC channel-based publisher implementation.
pub struct MpscEventPublisher {
    sender: mpsc::Sender<PublishedEvent>,
    receiver: Arc<Mutex<mpsc::Receiver<PublishedEvent>>>,
}

impl MpscEventPublisher {
    /// Create a publisher with the given channel capacity. Publishing
    /// blocks once the buffer is full, so size it for bursts.
    pub fn new(buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Pull the next published event. Returns `None` once all senders are
    /// gone and the buffer is drained.
    pub async fn pull(&self) -> Option<PublishedEvent> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Non-blocking pull for draining in tests.
    pub async fn try_pull(&self) -> Option<PublishedEvent> {
        let mut receiver = self.receiver.lock().await;
        receiver.try_recv().ok()
    }
}

#[async_trait]
impl EventPublisher for MpscEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        self.sender
            .send(PublishedEvent {
                topic: topic.to_string(),
                payload: payload.clone(),
            })
            .await
            .map_err(|e| PublishError::ChannelClosed {
                details: e.to_string(),
            })?;
        trace!(topic, "Published event to channel");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl Clone for MpscEventPublisher {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}
