//! HTTP trigger surface for the scheduling pipeline.
//!
//! Exposes the three background jobs as synchronous endpoints for an
//! external cron system:
//!
//! - `POST /triggers/due-soon-check?hours=24`
//! - `POST /triggers/notification-reset`
//! - `POST /triggers/recurring-tasks`
//!
//! Each endpoint runs one cycle of its job and reports a status plus the
//! affected-item counts. Per-item failures inside a cycle are absorbed by
//! the jobs and only lower the counts; an endpoint returns a server error
//! only when the whole job fails before touching anything.

pub mod context;
pub mod handle_triggers;
pub mod server;

pub use context::WebContext;
pub use server::build_router;
