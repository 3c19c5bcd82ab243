use crate::errors::ConfigError;
use crate::jobs::SchedulerConfig;
use std::time::Duration;

type Result<T> = std::result::Result<T, ConfigError>;

/// HTTP server port configuration.
///
/// Wraps a u16 port number for the trigger endpoint server.
#[derive(Clone, Debug)]
pub struct HttpPort(u16);

impl TryFrom<String> for HttpPort {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        value
            .parse::<u16>()
            .map(Self)
            .map_err(|_| ConfigError::InvalidPortNumber { port: value })
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

/// Look-ahead horizon for the due-soon check, in hours.
///
/// Bounded to one year; a zero horizon would make the detector select
/// nothing but tasks due today, which is still valid, so only zero-width
/// parses are rejected as malformed input.
#[derive(Clone, Debug)]
pub struct HorizonHours(u32);

impl Default for HorizonHours {
    fn default() -> Self {
        Self(24)
    }
}

impl TryFrom<String> for HorizonHours {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        let hours = value
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidHorizon {
                value: value.clone(),
            })?;

        if hours == 0 || hours > 8760 {
            return Err(ConfigError::InvalidHorizon { value });
        }

        Ok(Self(hours))
    }
}

impl HorizonHours {
    pub fn as_hours(&self) -> u32 {
        self.0
    }
}

/// Polling interval for one scheduler loop, in seconds.
#[derive(Clone, Debug)]
pub struct PollInterval(Duration);

impl TryFrom<String> for PollInterval {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        let secs = value
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidInterval {
                value: value.clone(),
            })?;

        if secs == 0 {
            return Err(ConfigError::InvalidInterval { value });
        }

        Ok(Self(Duration::from_secs(secs)))
    }
}

impl PollInterval {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

/// Service configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub database_url: String,
    pub http_port: HttpPort,
    /// Optional Redis connection; enables the Redis event publisher.
    pub redis_url: Option<String>,
    /// Topic due-soon events are published on.
    pub due_soon_topic: String,
    pub horizon_hours: HorizonHours,
    pub due_soon_interval: PollInterval,
    pub recurring_interval: PollInterval,
    pub reset_interval: PollInterval,
    /// Optional statsd endpoint; enables the cadence metrics publisher.
    pub statsd_host: Option<String>,
    pub metrics_prefix: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Required Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection string
    ///
    /// # Optional Environment Variables
    ///
    /// - `HTTP_PORT` (default 8080)
    /// - `REDIS_URL`: enables Redis event publishing when set
    /// - `DUE_SOON_TOPIC` (default `tasks.due_soon`)
    /// - `DUE_SOON_HORIZON_HOURS` (default 24)
    /// - `DUE_SOON_INTERVAL_SECONDS` (default 300)
    /// - `RECURRING_INTERVAL_SECONDS` (default 3600)
    /// - `RESET_INTERVAL_SECONDS` (default 3600)
    /// - `STATSD_HOST`: enables statsd metrics when set, e.g. `localhost:8125`
    /// - `METRICS_PREFIX` (default `duepulse`)
    pub fn new() -> Result<Self> {
        let version = version()?;

        let database_url = require_env("DATABASE_URL")?;
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let redis_url = optional_env("REDIS_URL");

        let due_soon_topic = default_env("DUE_SOON_TOPIC", "tasks.due_soon");
        if due_soon_topic.trim().is_empty() || due_soon_topic.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidTopic {
                details: format!("{due_soon_topic:?}"),
            });
        }

        let horizon_hours: HorizonHours = default_env("DUE_SOON_HORIZON_HOURS", "24").try_into()?;
        let due_soon_interval: PollInterval =
            default_env("DUE_SOON_INTERVAL_SECONDS", "300").try_into()?;
        let recurring_interval: PollInterval =
            default_env("RECURRING_INTERVAL_SECONDS", "3600").try_into()?;
        let reset_interval: PollInterval =
            default_env("RESET_INTERVAL_SECONDS", "3600").try_into()?;

        let statsd_host = optional_env("STATSD_HOST");
        let metrics_prefix = default_env("METRICS_PREFIX", "duepulse");

        Ok(Self {
            version,
            database_url,
            http_port,
            redis_url,
            due_soon_topic,
            horizon_hours,
            due_soon_interval,
            recurring_interval,
            reset_interval,
            statsd_host,
            metrics_prefix,
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            horizon_hours: self.horizon_hours.as_hours(),
            due_soon_interval: self.due_soon_interval.as_duration(),
            recurring_interval: self.recurring_interval.as_duration(),
            reset_interval: self.reset_interval.as_duration(),
        }
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired {
        var_name: name.to_string(),
    })
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or(default_value.to_string())
}

/// Retrieves the service version from compile-time environment variables.
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotAvailable)
}
