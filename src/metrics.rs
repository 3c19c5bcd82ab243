//! Metrics publishing for pipeline observability.
//!
//! A small cadence-compatible trait so job components can emit counters and
//! timings without caring whether a statsd sink is configured. Deployments
//! without `STATSD_HOST` fall back to the no-op publisher.

use async_trait::async_trait;
use cadence::{BufferedUdpMetricSink, Counted, CountedExt, QueuingMetricSink, StatsdClient, Timed};
use std::net::UdpSocket;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("error-duepulse-metrics-1 Statsd sink creation failed: {details}")]
    SinkCreationFailed { details: String },
}

/// Trait for publishing metrics with counter and timing support.
#[async_trait]
pub trait MetricsPublisher: Send + Sync {
    /// Increment a counter by 1
    async fn incr(&self, key: &str);

    /// Increment a counter by a specific value
    async fn count(&self, key: &str, value: u64);

    /// Record a timing in milliseconds
    async fn time(&self, key: &str, millis: u64);
}

/// No-op implementation for development and testing
#[derive(Debug, Clone, Default)]
pub struct NoOpMetricsPublisher;

impl NoOpMetricsPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsPublisher for NoOpMetricsPublisher {
    async fn incr(&self, _key: &str) {}
    async fn count(&self, _key: &str, _value: u64) {}
    async fn time(&self, _key: &str, _millis: u64) {}
}

/// Statsd-backed metrics publisher using cadence
pub struct StatsdMetricsPublisher {
    client: StatsdClient,
}

impl StatsdMetricsPublisher {
    pub fn new(host: &str, prefix: &str) -> Result<Self, MetricsError> {
        let socket = UdpSocket::bind("[::]:0").map_err(|e| MetricsError::SinkCreationFailed {
            details: e.to_string(),
        })?;
        socket
            .set_nonblocking(true)
            .map_err(|e| MetricsError::SinkCreationFailed {
                details: e.to_string(),
            })?;

        let buffered_sink =
            BufferedUdpMetricSink::from(host, socket).map_err(|e| {
                MetricsError::SinkCreationFailed {
                    details: e.to_string(),
                }
            })?;
        let queuing_sink = QueuingMetricSink::builder()
            .with_error_handler(|error| {
                error!("Failed to send metric via sink: {}", error);
            })
            .build(buffered_sink);
        let client = StatsdClient::from_sink(prefix, queuing_sink);

        debug!(host, prefix, "Statsd metrics publisher created");
        Ok(Self { client })
    }
}

#[async_trait]
impl MetricsPublisher for StatsdMetricsPublisher {
    async fn incr(&self, key: &str) {
        if let Err(e) = self.client.incr(key) {
            error!("Failed to send metric {}: {}", key, e);
        }
    }

    async fn count(&self, key: &str, value: u64) {
        if let Err(e) = self.client.count(key, value) {
            error!("Failed to send metric {}: {}", key, e);
        }
    }

    async fn time(&self, key: &str, millis: u64) {
        if let Err(e) = self.client.time(key, millis) {
            error!("Failed to send metric {}: {}", key, e);
        }
    }
}
