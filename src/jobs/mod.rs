//! Background jobs of the scheduling pipeline.
//!
//! Three independently-schedulable jobs make up the pipeline:
//!
//! - **Due-soon check**: the [`detector`] selects candidate tasks and the
//!   [`dispatcher`] publishes one notification per candidate, flipping the
//!   task's notification flag as the commit point.
//! - **Recurring advance**: the [`advancer`] materializes one task instance
//!   per due template and moves the template's next due date forward.
//! - **Notification reset**: the [`resetter`] re-arms notification flags on
//!   tasks overdue by more than one day so escalation can fire again.
//!
//! The [`driver`] owns the interval loops and the drop-if-busy guard shared
//! with the HTTP trigger surface. Every job takes its `now` as an explicit
//! argument; nothing in this module reads ambient state.
//!
//! Each job processes its batch with per-item isolation: one task or
//! template failing mid-cycle never aborts its siblings, and each item's
//! writes form a single commit unit so cancellation between items leaves no
//! partial state behind.

pub mod advancer;
pub mod detector;
pub mod dispatcher;
pub mod driver;
pub mod manager;
pub mod resetter;

pub use advancer::{AdvanceCycle, RecurringTaskAdvancer};
pub use detector::DueSoonDetector;
pub use dispatcher::{DispatchCycle, DispatchResult, NotificationDispatcher};
pub use driver::{JobRun, SchedulerConfig, SchedulerDriver};
pub use manager::spawn_cancellable_task;
pub use resetter::NotificationFlagResetter;
