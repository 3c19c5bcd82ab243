//! Redis-backed event publisher for multi-instance deployments.
//!
//! Publishes event payloads as JSON strings on a Redis pub/sub channel.
//! Redis pub/sub is fire-and-forget: a successful `PUBLISH` only means the
//! broker accepted the event. The pipeline's notification flags provide the
//! idempotent bookkeeping on top of that.

use async_trait::async_trait;
use deadpool_redis::{Pool, redis::AsyncCommands};
use tracing::{debug, trace, warn};

use super::EventPublisher;
use crate::errors::PublishError;

/// Redis `PUBLISH` implementation of the event publisher.
pub struct RedisEventPublisher {
    pool: Pool,
}

impl RedisEventPublisher {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| PublishError::SerializationFailed { source: e })?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PublishError::RedisConnectionFailed {
                details: e.to_string(),
            })?;

        let receivers: i64 = conn.publish(topic, body).await.map_err(|e| {
            PublishError::RedisOperationFailed {
                operation: "publish".to_string(),
                source: e,
            }
        })?;

        if receivers == 0 {
            // Fire-and-forget: nobody subscribed right now. The audit log
            // still has the event.
            debug!(topic, "Published event with no active subscribers");
        } else {
            trace!(topic, receivers, "Published event");
        }

        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        match self.pool.get().await {
            Ok(mut conn) => {
                match deadpool_redis::redis::cmd("PING")
                    .query_async::<String>(&mut conn)
                    .await
                {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = ?e, "Redis publisher health check failed");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = ?e, "Redis publisher connection unavailable");
                false
            }
        }
    }
}
