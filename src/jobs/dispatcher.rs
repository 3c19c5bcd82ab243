//! Due-soon notification dispatch.
//!
//! For each candidate the dispatcher runs a fixed step sequence: build the
//! event payload, publish it, append the audit row, then set the task's
//! notification flag. The flag write is the commit point; anything failing
//! before it leaves the task eligible for retry on the next poll, which is
//! what gives the pipeline its at-least-once publish semantics.
//!
//! Each task is dispatched independently. One task failing never blocks the
//! rest of the batch.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, error, instrument, warn};

use crate::metrics::MetricsPublisher;
use crate::publisher::EventPublisher;
use crate::storage::event_log::{DueSoonEvent, EventLogStorage, TaskEvent};
use crate::storage::task::{TaskInstance, TaskStorage};

/// Outcome of dispatching one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Published, logged, and flagged.
    Notified,
    /// The transport rejected the event. Nothing was persisted, so the task
    /// stays eligible and is retried on the next poll cycle.
    PublishFailed,
    /// The event went out but a local write after the publish failed. The
    /// publish is never rolled back; a duplicate external notification
    /// would be worse than a missing audit row.
    LoggingFailed,
}

/// Tally of one dispatch cycle over a candidate batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchCycle {
    pub candidates: usize,
    pub notified: u64,
    pub publish_failed: u64,
    pub logging_failed: u64,
}

impl DispatchCycle {
    /// Events actually accepted by the transport this cycle.
    pub fn events_published(&self) -> u64 {
        self.notified + self.logging_failed
    }
}

pub struct NotificationDispatcher {
    tasks: Arc<dyn TaskStorage>,
    event_log: Arc<dyn EventLogStorage>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<dyn MetricsPublisher>,
    topic: String,
}

impl NotificationDispatcher {
    pub fn new(
        tasks: Arc<dyn TaskStorage>,
        event_log: Arc<dyn EventLogStorage>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<dyn MetricsPublisher>,
        topic: String,
    ) -> Self {
        Self {
            tasks,
            event_log,
            publisher,
            metrics,
            topic,
        }
    }

    /// Dispatch one due-soon notification.
    ///
    /// Step order matters: publish first, audit second, flag last. If the
    /// flag write itself fails the task will be re-published next cycle;
    /// that is reported as [`DispatchResult::LoggingFailed`] and logged
    /// loudly, since it is the one path that can produce a duplicate
    /// external notification.
    #[instrument(skip(self, task), fields(task.id = task.id, task.user = task.user_id))]
    pub async fn dispatch(&self, task: &TaskInstance, now: DateTime<Utc>) -> DispatchResult {
        let event = DueSoonEvent {
            task_id: task.id,
            user_id: task.user_id,
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date,
            priority_id: task.priority_id,
            hours_until_due: task
                .due_date
                .map(|due| hours_until_due(due, now))
                .unwrap_or(0),
        };

        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize due-soon payload");
                return DispatchResult::PublishFailed;
            }
        };

        if let Err(e) = self.publisher.publish(&self.topic, &payload).await {
            warn!(
                error = %e,
                "Due-soon publish failed; task stays eligible for retry"
            );
            self.metrics.incr("due_soon.publish_failed").await;
            return DispatchResult::PublishFailed;
        }

        let mut result = DispatchResult::Notified;

        if let Err(e) = self
            .event_log
            .append(task.id, &TaskEvent::DueSoon(event))
            .await
        {
            error!(error = %e, "Audit append failed after publish");
            result = DispatchResult::LoggingFailed;
        }

        if let Err(e) = self.tasks.mark_notified(task.id).await {
            error!(
                error = %e,
                "Failed to set notification flag; a duplicate publish is possible next cycle"
            );
            self.metrics.incr("due_soon.flag_write_failed").await;
            return DispatchResult::LoggingFailed;
        }

        self.metrics.incr("due_soon.published").await;
        debug!(hours_until_due = payload["hours_until_due"].as_i64(), "Due-soon notification dispatched");
        result
    }
}

/// Whole hours from `now` until midnight UTC of the due date. Negative once
/// the due date has begun.
fn hours_until_due(due: NaiveDate, now: DateTime<Utc>) -> i64 {
    (due.and_time(NaiveTime::MIN).and_utc() - now).num_hours()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{PublishError, StorageError};
    use crate::metrics::NoOpMetricsPublisher;
    use crate::publisher::MpscEventPublisher;
    use crate::storage::StorageResult;
    use crate::storage::event_log::{EventKind, EventLogEntry};
    use crate::storage::memory::MemoryStore;
    use crate::storage::task::NewTaskInstance;
    use async_trait::async_trait;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        date(y, m, d).and_hms_opt(12, 0, 0).unwrap().and_utc()
    }

    fn dispatcher_over(
        store: &Arc<MemoryStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> NotificationDispatcher {
        NotificationDispatcher::new(
            store.clone(),
            store.clone(),
            publisher,
            Arc::new(NoOpMetricsPublisher::new()),
            "tasks.due_soon".to_string(),
        )
    }

    async fn seed_task(store: &MemoryStore, due: NaiveDate) -> TaskInstance {
        store
            .insert_task(NewTaskInstance {
                user_id: 7,
                title: "Pay rent".to_string(),
                description: Some("Transfer before noon".to_string()),
                priority_id: Some(1),
                due_date: Some(due),
                template_id: None,
            })
            .await
    }

    /// Publisher that always fails, for transient-transport tests.
    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(
            &self,
            _topic: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), PublishError> {
            Err(PublishError::ChannelClosed {
                details: "transport down".to_string(),
            })
        }
    }

    /// Event log that fails every append, delegating reads to the store.
    struct FailingEventLog(Arc<MemoryStore>);

    #[async_trait]
    impl EventLogStorage for FailingEventLog {
        async fn append(&self, _task_id: i64, _event: &TaskEvent) -> StorageResult<()> {
            Err(StorageError::InvalidInput {
                details: "append rejected".to_string(),
            })
        }

        async fn list_for_task(&self, task_id: i64) -> StorageResult<Vec<EventLogEntry>> {
            self.0.list_for_task(task_id).await
        }
    }

    #[tokio::test]
    async fn test_successful_dispatch_publishes_logs_and_flags() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(MpscEventPublisher::new(10));
        let dispatcher = dispatcher_over(&store, publisher.clone());

        let now = noon(2025, 3, 10);
        let task = seed_task(&store, date(2025, 3, 11)).await;

        let result = dispatcher.dispatch(&task, now).await;
        assert_eq!(result, DispatchResult::Notified);

        // Published with the full payload shape.
        let event = publisher.pull().await.unwrap();
        assert_eq!(event.topic, "tasks.due_soon");
        assert_eq!(event.payload["task_id"], task.id);
        assert_eq!(event.payload["user_id"], 7);
        assert_eq!(event.payload["title"], "Pay rent");
        assert_eq!(event.payload["due_date"], "2025-03-11");
        assert_eq!(event.payload["priority_id"], 1);
        assert_eq!(event.payload["hours_until_due"], 12);

        // Logged.
        let events = store.list_for_task(task.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventKind::DueSoon);

        // Flagged.
        assert!(store.get_task(task.id).await.unwrap().notified);
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_flag_unset() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_over(&store, Arc::new(FailingPublisher));

        let task = seed_task(&store, date(2025, 3, 11)).await;
        let result = dispatcher.dispatch(&task, noon(2025, 3, 10)).await;

        assert_eq!(result, DispatchResult::PublishFailed);
        assert!(!store.get_task(task.id).await.unwrap().notified);
        assert!(store.list_for_task(task.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logging_failure_still_sets_flag() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(MpscEventPublisher::new(10));
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            Arc::new(FailingEventLog(store.clone())),
            publisher.clone(),
            Arc::new(NoOpMetricsPublisher::new()),
            "tasks.due_soon".to_string(),
        );

        let task = seed_task(&store, date(2025, 3, 11)).await;
        let result = dispatcher.dispatch(&task, noon(2025, 3, 10)).await;

        assert_eq!(result, DispatchResult::LoggingFailed);
        // The publish happened and must not be retried.
        assert!(publisher.pull().await.is_some());
        assert!(store.get_task(task.id).await.unwrap().notified);
    }

    #[test]
    fn test_hours_until_due_is_measured_to_midnight() {
        let now = noon(2025, 3, 10);
        assert_eq!(hours_until_due(date(2025, 3, 11), now), 12);
        assert_eq!(hours_until_due(date(2025, 3, 12), now), 36);
        // The due date already started.
        assert_eq!(hours_until_due(date(2025, 3, 10), now), -12);
    }
}
