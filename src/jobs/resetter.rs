//! Notification flag reset for overdue escalation.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{info, instrument};

use crate::errors::StorageError;
use crate::storage::task::TaskStorage;

/// Re-arms notification flags on overdue tasks.
///
/// A task overdue by strictly more than one day gets its flag cleared so the
/// dispatcher may notify about it again. Being reset and re-detected within
/// the same polling tick is intended behavior, not a race: that is exactly
/// the escalation path.
///
/// This is a single batch update. Unlike the dispatcher and advancer it has
/// no per-item isolation; a failure leaves every flag unchanged.
pub struct NotificationFlagResetter {
    tasks: Arc<dyn TaskStorage>,
}

impl NotificationFlagResetter {
    pub fn new(tasks: Arc<dyn TaskStorage>) -> Self {
        Self { tasks }
    }

    /// Clear flags on tasks due before yesterday, returning the count.
    #[instrument(skip(self), fields(job = "notification_reset"))]
    pub async fn reset_overdue(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let cutoff = overdue_cutoff(now);
        let reset = self.tasks.clear_notified_before(cutoff).await?;

        if reset > 0 {
            info!(reset, %cutoff, "Cleared notification flags for escalation");
        }
        Ok(reset)
    }
}

/// Due dates strictly before this are "more than one day overdue".
fn overdue_cutoff(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
        .checked_sub_days(Days::new(1))
        .unwrap_or(NaiveDate::MIN)
}
