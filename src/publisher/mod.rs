//! Event publisher abstraction for the pub/sub transport.
//!
//! The notification pipeline only ever needs one capability from the
//! transport: `publish(topic, payload)`. Delivery guarantees downstream of a
//! successful publish are the transport's business; this subsystem promises
//! at-least-once publishing with idempotent local bookkeeping, nothing more.
//!
//! Two implementations are provided and can be swapped per deployment:
//!
//! - [`MpscEventPublisher`] for single-instance and test setups, backed by a
//!   Tokio channel
//! - [`RedisEventPublisher`] for production, backed by Redis `PUBLISH`

use async_trait::async_trait;

use crate::errors::PublishError;

mod mpsc;
mod redis;

pub use mpsc::{MpscEventPublisher, PublishedEvent};
pub use redis::RedisEventPublisher;

/// Capability to publish an event payload on a named topic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `payload` on `topic`. An `Ok` return means the transport
    /// accepted the event; it says nothing about downstream delivery.
    async fn publish(&self, topic: &str, payload: &serde_json::Value)
    -> Result<(), PublishError>;

    /// Check whether the transport is reachable. Used for startup checks
    /// and monitoring.
    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn EventPublisher) {}
        fn _assert_sendable(_: Arc<dyn EventPublisher>) {}
    }
}
