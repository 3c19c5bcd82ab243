//! Scheduler driver: interval loops and the synchronous trigger surface.
//!
//! The driver owns the three jobs and enforces the single rule they share:
//! no job starts a new cycle while its previous cycle is still in flight.
//! Triggers landing on a busy job are dropped, not queued. Different jobs
//! run concurrently; they write disjoint fields, so there is nothing to
//! serialize between them.
//!
//! Each job runs on a fixed interval when the in-process loops are spawned,
//! and the same entry points are exposed synchronously for an external cron
//! system through the HTTP layer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::advancer::{AdvanceCycle, RecurringTaskAdvancer};
use super::detector::DueSoonDetector;
use super::dispatcher::{DispatchCycle, DispatchResult, NotificationDispatcher};
use super::resetter::NotificationFlagResetter;
use crate::errors::StorageError;

/// Intervals and horizon for the in-process loops.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Look-ahead horizon for the due-soon check, in hours.
    pub horizon_hours: u32,
    pub due_soon_interval: Duration,
    pub recurring_interval: Duration,
    pub reset_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_hours: 24,
            due_soon_interval: Duration::from_secs(300),
            recurring_interval: Duration::from_secs(3600),
            reset_interval: Duration::from_secs(3600),
        }
    }
}

/// Result of asking a job to run a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRun<T> {
    Completed(T),
    /// The job's previous cycle was still in flight; this run was dropped.
    Skipped,
}

/// Drop-if-busy guard for one job.
#[derive(Default)]
struct JobSlot {
    busy: Mutex<()>,
}

impl JobSlot {
    fn try_acquire(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.busy.try_lock().ok()
    }
}

pub struct SchedulerDriver {
    detector: DueSoonDetector,
    dispatcher: NotificationDispatcher,
    advancer: RecurringTaskAdvancer,
    resetter: NotificationFlagResetter,
    config: SchedulerConfig,
    due_soon_slot: JobSlot,
    recurring_slot: JobSlot,
    reset_slot: JobSlot,
}

impl SchedulerDriver {
    pub fn new(
        detector: DueSoonDetector,
        dispatcher: NotificationDispatcher,
        advancer: RecurringTaskAdvancer,
        resetter: NotificationFlagResetter,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            detector,
            dispatcher,
            advancer,
            resetter,
            config,
            due_soon_slot: JobSlot::default(),
            recurring_slot: JobSlot::default(),
            reset_slot: JobSlot::default(),
        }
    }

    /// Run one due-soon check cycle: select candidates, dispatch each one
    /// independently, tally the outcomes.
    pub async fn run_due_soon_check(
        &self,
        now: DateTime<Utc>,
        horizon_hours: u32,
    ) -> Result<JobRun<DispatchCycle>, StorageError> {
        let Some(_guard) = self.due_soon_slot.try_acquire() else {
            warn!(job = "due_soon_check", "Previous cycle still in flight, dropping run");
            return Ok(JobRun::Skipped);
        };

        let candidates = self.detector.find_due_soon(now, horizon_hours).await?;
        let mut cycle = DispatchCycle {
            candidates: candidates.len(),
            ..DispatchCycle::default()
        };

        for task in &candidates {
            match self.dispatcher.dispatch(task, now).await {
                DispatchResult::Notified => cycle.notified += 1,
                DispatchResult::PublishFailed => cycle.publish_failed += 1,
                DispatchResult::LoggingFailed => cycle.logging_failed += 1,
            }
        }

        Ok(JobRun::Completed(cycle))
    }

    /// Run one recurring advance cycle.
    pub async fn run_recurring_advance(
        &self,
        now: DateTime<Utc>,
    ) -> Result<JobRun<AdvanceCycle>, StorageError> {
        let Some(_guard) = self.recurring_slot.try_acquire() else {
            warn!(job = "recurring_advance", "Previous cycle still in flight, dropping run");
            return Ok(JobRun::Skipped);
        };

        let cycle = self.advancer.advance_due_templates(now).await?;
        Ok(JobRun::Completed(cycle))
    }

    /// Run one notification flag reset cycle.
    pub async fn run_notification_reset(
        &self,
        now: DateTime<Utc>,
    ) -> Result<JobRun<u64>, StorageError> {
        let Some(_guard) = self.reset_slot.try_acquire() else {
            warn!(job = "notification_reset", "Previous cycle still in flight, dropping run");
            return Ok(JobRun::Skipped);
        };

        let reset = self.resetter.reset_overdue(now).await?;
        Ok(JobRun::Completed(reset))
    }

    /// Interval loop for the due-soon check.
    pub async fn run_due_soon_loop(&self, cancel_token: CancellationToken) -> anyhow::Result<()> {
        info!(
            interval_secs = self.config.due_soon_interval.as_secs(),
            horizon_hours = self.config.horizon_hours,
            "Starting due-soon check loop"
        );

        while !cancel_token.is_cancelled() {
            tokio::select! {
                () = tokio::time::sleep(self.config.due_soon_interval) => {
                    match self
                        .run_due_soon_check(Utc::now(), self.config.horizon_hours)
                        .await
                    {
                        Ok(JobRun::Completed(cycle)) => {
                            if cycle.candidates > 0 {
                                info!(
                                    candidates = cycle.candidates,
                                    published = cycle.events_published(),
                                    publish_failed = cycle.publish_failed,
                                    "Due-soon check cycle completed"
                                );
                            }
                        }
                        Ok(JobRun::Skipped) => {}
                        Err(e) => error!(error = ?e, "Due-soon check cycle failed"),
                    }
                }
                () = cancel_token.cancelled() => break,
            }
        }

        info!("Due-soon check loop stopped");
        Ok(())
    }

    /// Interval loop for the recurring advance.
    pub async fn run_recurring_loop(&self, cancel_token: CancellationToken) -> anyhow::Result<()> {
        info!(
            interval_secs = self.config.recurring_interval.as_secs(),
            "Starting recurring advance loop"
        );

        while !cancel_token.is_cancelled() {
            tokio::select! {
                () = tokio::time::sleep(self.config.recurring_interval) => {
                    match self.run_recurring_advance(Utc::now()).await {
                        Ok(JobRun::Completed(_)) | Ok(JobRun::Skipped) => {}
                        Err(e) => error!(error = ?e, "Recurring advance cycle failed"),
                    }
                }
                () = cancel_token.cancelled() => break,
            }
        }

        info!("Recurring advance loop stopped");
        Ok(())
    }

    /// Interval loop for the notification flag reset.
    pub async fn run_reset_loop(&self, cancel_token: CancellationToken) -> anyhow::Result<()> {
        info!(
            interval_secs = self.config.reset_interval.as_secs(),
            "Starting notification reset loop"
        );

        while !cancel_token.is_cancelled() {
            tokio::select! {
                () = tokio::time::sleep(self.config.reset_interval) => {
                    match self.run_notification_reset(Utc::now()).await {
                        Ok(JobRun::Completed(_)) | Ok(JobRun::Skipped) => {}
                        Err(e) => error!(error = ?e, "Notification reset cycle failed"),
                    }
                }
                () = cancel_token.cancelled() => break,
            }
        }

        info!("Notification reset loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoOpMetricsPublisher;
    use crate::publisher::MpscEventPublisher;
    use crate::storage::memory::MemoryStore;
    use crate::storage::task::NewTaskInstance;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn driver_over(store: &Arc<MemoryStore>) -> SchedulerDriver {
        let publisher = Arc::new(MpscEventPublisher::new(100));
        let metrics = Arc::new(NoOpMetricsPublisher::new());
        SchedulerDriver::new(
            DueSoonDetector::new(store.clone()),
            NotificationDispatcher::new(
                store.clone(),
                store.clone(),
                publisher,
                metrics.clone(),
                "tasks.due_soon".to_string(),
            ),
            RecurringTaskAdvancer::new(store.clone(), store.clone(), metrics),
            NotificationFlagResetter::new(store.clone()),
            SchedulerConfig::default(),
        )
    }

    #[test]
    fn test_job_slot_drops_while_held() {
        let slot = JobSlot::default();
        let guard = slot.try_acquire();
        assert!(guard.is_some());
        assert!(slot.try_acquire().is_none());
        drop(guard);
        assert!(slot.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_jobs_use_independent_slots() {
        let store = Arc::new(MemoryStore::new());
        let driver = driver_over(&store);
        let now = NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();

        // Hold the due-soon slot and verify the other jobs still run.
        let _held = driver.due_soon_slot.try_acquire().unwrap();

        let run = driver.run_due_soon_check(now, 24).await.unwrap();
        assert_eq!(run, JobRun::Skipped);

        assert!(matches!(
            driver.run_recurring_advance(now).await.unwrap(),
            JobRun::Completed(_)
        ));
        assert!(matches!(
            driver.run_notification_reset(now).await.unwrap(),
            JobRun::Completed(0)
        ));
    }

    #[tokio::test]
    async fn test_due_soon_cycle_tallies_outcomes() {
        let store = Arc::new(MemoryStore::new());
        let driver = driver_over(&store);
        let now = NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();

        for _ in 0..3 {
            store
                .insert_task(NewTaskInstance {
                    user_id: 1,
                    title: "t".to_string(),
                    description: None,
                    priority_id: None,
                    due_date: NaiveDate::from_ymd_opt(2025, 3, 11),
                    template_id: None,
                })
                .await;
        }

        let run = driver.run_due_soon_check(now, 24).await.unwrap();
        let JobRun::Completed(cycle) = run else {
            panic!("expected completed cycle");
        };
        assert_eq!(cycle.candidates, 3);
        assert_eq!(cycle.notified, 3);
        assert_eq!(cycle.events_published(), 3);

        // Everything is flagged now, so a second cycle finds nothing.
        let run = driver.run_due_soon_check(now, 24).await.unwrap();
        let JobRun::Completed(cycle) = run else {
            panic!("expected completed cycle");
        };
        assert_eq!(cycle.candidates, 0);
    }
}
