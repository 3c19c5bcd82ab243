//! # duepulse
//!
//! duepulse is the recurring-task scheduling and due-notification service of
//! a todo-list backend. It advances recurring task templates into concrete
//! task instances on a schedule, detects tasks approaching their due date
//! exactly once per occurrence, and publishes notification events with
//! idempotent local bookkeeping under partial failure.
//!
//! ## Architecture Overview
//!
//! The pipeline is built from small, separately testable components:
//!
//! ### Recurrence Resolution
//! - Pure calendar arithmetic mapping a pattern (daily/weekly/monthly/yearly)
//!   plus a date to the next occurrence, with short-month and leap-day
//!   clipping
//!
//! ### Jobs
//! - **Due-soon check**: detector selects candidates, dispatcher publishes
//!   one event per task and flips the notification flag as the commit point
//! - **Recurring advance**: one task instance per due template per cycle,
//!   instance insert and template advance in one transaction
//! - **Notification reset**: re-arms flags on tasks overdue by more than one
//!   day so escalation can fire again
//!
//! ### Driver
//! - Interval loops plus synchronous HTTP triggers for external cron
//!   systems, drop-if-busy per job
//!
//! ## Configuration
//!
//! The service is configured via environment variables. Key variables:
//! - `DATABASE_URL`: PostgreSQL connection (required)
//! - `REDIS_URL`: Redis connection (optional, enables Redis publishing)
//! - `DUE_SOON_HORIZON_HOURS`: due-soon look-ahead window (default 24)
//!
//! ## Error Handling
//!
//! All error strings use the format: `error-duepulse-<domain>-<number> <message>`
//!
//! ## Examples
//!
//! ```rust,ignore
//! use duepulse::{config::Config, jobs::SchedulerDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load configuration from environment
//!     let config = Config::new()?;
//!
//!     // Set up storage, publisher, and job components
//!     // ... setup code ...
//!
//!     let driver = SchedulerDriver::new(
//!         detector, dispatcher, advancer, resetter, config.scheduler_config(),
//!     );
//!     driver.run_due_soon_loop(cancel_token).await?;
//!
//!     Ok(())
//! }
//! ```

/// Configuration management for the duepulse service.
///
/// Environment-variable driven configuration with validated newtype
/// wrappers for ports, horizons, and polling intervals.
pub mod config;

/// Error types for every domain, coded `error-duepulse-<domain>-<number>`.
///
/// Public because storage and publisher traits surface these types to
/// external implementations.
pub mod errors;

/// HTTP trigger endpoints for external cron systems.
pub mod http;

/// Background jobs: due-soon dispatch, recurring advance, flag reset, and
/// the scheduler driver that runs them.
pub mod jobs;

/// Metrics collection for pipeline observability.
pub mod metrics;

/// Event publisher abstractions for the pub/sub transport, with in-memory
/// and Redis implementations.
pub mod publisher;

/// Recurrence pattern resolution: pure next-occurrence calendar arithmetic.
pub mod recurrence;

/// Storage layer traits and implementations for tasks, recurring templates,
/// and the audit event log, with PostgreSQL backing.
pub mod storage;
