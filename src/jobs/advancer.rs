//! Recurring template advancement.
//!
//! Every cycle, each active template whose `next_due_at` has arrived gets
//! exactly one concrete task instance, and the template either moves to its
//! next occurrence or retires when that occurrence would pass the end date.
//! Instance insert and template mutation commit together, so a template can
//! never produce a duplicate instance across retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::StorageError;
use crate::metrics::MetricsPublisher;
use crate::recurrence::{RecurrencePattern, next_occurrence};
use crate::storage::event_log::{EventLogStorage, TaskEvent};
use crate::storage::task::NewTaskInstance;
use crate::storage::template::{TemplateAdvance, TemplateStorage};

/// Tally of one advance cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceCycle {
    /// Templates that were due this cycle.
    pub due_templates: usize,
    /// Instances actually created.
    pub tasks_created: u64,
    /// Templates that reached their end date and were deactivated.
    pub retired: u64,
    /// Templates skipped because of a bad pattern or a storage failure;
    /// they stay due and are retried next cycle.
    pub failed: u64,
}

pub struct RecurringTaskAdvancer {
    templates: Arc<dyn TemplateStorage>,
    event_log: Arc<dyn EventLogStorage>,
    metrics: Arc<dyn MetricsPublisher>,
}

impl RecurringTaskAdvancer {
    pub fn new(
        templates: Arc<dyn TemplateStorage>,
        event_log: Arc<dyn EventLogStorage>,
        metrics: Arc<dyn MetricsPublisher>,
    ) -> Self {
        Self {
            templates,
            event_log,
            metrics,
        }
    }

    /// Advance every due template, isolating failures per template.
    ///
    /// Returns an error only when the candidate query itself fails; in that
    /// case zero templates were touched.
    #[instrument(skip(self), fields(job = "recurring_advance"))]
    pub async fn advance_due_templates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<AdvanceCycle, StorageError> {
        let started = std::time::Instant::now();
        let today = now.date_naive();
        let due = self.templates.list_due_templates(today).await?;

        let mut cycle = AdvanceCycle {
            due_templates: due.len(),
            ..AdvanceCycle::default()
        };

        for template in due {
            let pattern = match template.recurrence.parse::<RecurrencePattern>() {
                Ok(pattern) => pattern,
                Err(e) => {
                    error!(
                        template_id = template.id,
                        error = %e,
                        "Skipping template with unknown recurrence pattern"
                    );
                    cycle.failed += 1;
                    continue;
                }
            };

            let next = next_occurrence(pattern, template.next_due_at);
            let advance = match template.end_date {
                Some(end) if next > end => TemplateAdvance::Retire,
                _ => TemplateAdvance::Next(next),
            };

            let instance = NewTaskInstance {
                user_id: template.user_id,
                title: template.title.clone(),
                description: template.description.clone(),
                priority_id: template.priority_id,
                due_date: Some(template.next_due_at),
                template_id: Some(template.id),
            };

            let task_id = match self
                .templates
                .materialize(template.id, &instance, advance)
                .await
            {
                Ok(task_id) => task_id,
                Err(e) => {
                    error!(
                        template_id = template.id,
                        error = %e,
                        "Failed to materialize instance; template will retry next cycle"
                    );
                    cycle.failed += 1;
                    continue;
                }
            };

            cycle.tasks_created += 1;
            if advance == TemplateAdvance::Retire {
                cycle.retired += 1;
                info!(
                    template_id = template.id,
                    end_date = ?template.end_date,
                    "Template reached its end date and was retired"
                );
            }
            debug!(
                template_id = template.id,
                task_id,
                due = %template.next_due_at,
                "Materialized recurring task"
            );

            // The instance is already committed; losing this audit row is
            // preferable to undoing the advance.
            let created = TaskEvent::Created {
                title: instance.title.clone(),
                due_date: instance.due_date,
                template_id: instance.template_id,
            };
            if let Err(e) = self.event_log.append(task_id, &created).await {
                warn!(task_id, error = %e, "Failed to append created event");
            }
        }

        self.metrics
            .count("recurring.tasks_created", cycle.tasks_created)
            .await;
        self.metrics
            .time("recurring.cycle_ms", started.elapsed().as_millis() as u64)
            .await;
        if cycle.due_templates > 0 {
            info!(
                due_templates = cycle.due_templates,
                tasks_created = cycle.tasks_created,
                retired = cycle.retired,
                failed = cycle.failed,
                "Recurring advance cycle completed"
            );
        }

        Ok(cycle)
    }
}
