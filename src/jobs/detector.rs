//! Due-soon candidate selection.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

use crate::storage::StorageResult;
use crate::storage::task::{TaskInstance, TaskStorage};

/// Read-only selector for tasks approaching their due date.
///
/// A task is a candidate when it is incomplete, has a due date between
/// today and the end of the look-ahead horizon, and has not been notified
/// for its current due date. Tasks already overdue are not candidates here;
/// they re-enter the pipeline through the flag resetter.
///
/// Selection has no side effects, so running it twice without a dispatcher
/// cycle in between returns the same set.
pub struct DueSoonDetector {
    tasks: Arc<dyn TaskStorage>,
}

impl DueSoonDetector {
    pub fn new(tasks: Arc<dyn TaskStorage>) -> Self {
        Self { tasks }
    }

    #[instrument(skip(self), fields(job = "due_soon_check"))]
    pub async fn find_due_soon(
        &self,
        now: DateTime<Utc>,
        horizon_hours: u32,
    ) -> StorageResult<Vec<TaskInstance>> {
        let today = now.date_naive();
        let horizon_end = (now + Duration::hours(i64::from(horizon_hours))).date_naive();

        let candidates = self.tasks.list_due_soon(today, horizon_end).await?;
        debug!(
            count = candidates.len(),
            %today,
            %horizon_end,
            "Selected due-soon candidates"
        );
        Ok(candidates)
    }
}
