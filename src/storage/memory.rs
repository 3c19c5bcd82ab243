//! Shared in-memory store for tests and single-process development.
//!
//! One store implements every storage trait so the advancer's cross-table
//! commit unit (insert instance + advance template) can be mirrored under a
//! single write lock, the same all-or-nothing visibility the PostgreSQL
//! implementation gets from a transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use super::StorageResult;
use super::event_log::{EventLogEntry, EventLogStorage, TaskEvent};
use super::task::{NewTaskInstance, TaskInstance, TaskStorage};
use super::template::{RecurringTaskTemplate, TemplateAdvance, TemplateStorage};
use crate::errors::StorageError;

#[derive(Default)]
struct Tables {
    tasks: HashMap<i64, TaskInstance>,
    templates: HashMap<i64, RecurringTaskTemplate>,
    events: Vec<EventLogEntry>,
    next_task_id: i64,
    next_template_id: i64,
    next_event_id: i64,
}

/// In-memory implementation of all storage traits.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task row (seeding helper; the flags default to false).
    pub async fn insert_task(&self, new: NewTaskInstance) -> TaskInstance {
        let mut tables = self.inner.write().await;
        tables.next_task_id += 1;
        let task = TaskInstance {
            id: tables.next_task_id,
            user_id: new.user_id,
            title: new.title,
            description: new.description,
            priority_id: new.priority_id,
            due_date: new.due_date,
            completed: false,
            notified: false,
            template_id: new.template_id,
            created_at: Utc::now(),
        };
        tables.tasks.insert(task.id, task.clone());
        task
    }

    /// Insert a template row, assigning a fresh id.
    pub async fn insert_template(&self, template: RecurringTaskTemplate) -> RecurringTaskTemplate {
        let mut tables = self.inner.write().await;
        tables.next_template_id += 1;
        let template = RecurringTaskTemplate {
            id: tables.next_template_id,
            ..template
        };
        tables.templates.insert(template.id, template.clone());
        template
    }

    pub async fn get_task(&self, id: i64) -> Option<TaskInstance> {
        self.inner.read().await.tasks.get(&id).cloned()
    }

    pub async fn get_template(&self, id: i64) -> Option<RecurringTaskTemplate> {
        self.inner.read().await.templates.get(&id).cloned()
    }

    pub async fn set_notified(&self, task_id: i64, notified: bool) {
        if let Some(task) = self.inner.write().await.tasks.get_mut(&task_id) {
            task.notified = notified;
        }
    }

    pub async fn set_completed(&self, task_id: i64, completed: bool) {
        if let Some(task) = self.inner.write().await.tasks.get_mut(&task_id) {
            task.completed = completed;
        }
    }

    /// Reschedule a task (what the CRUD layer's update operation would do).
    pub async fn set_due_date(&self, task_id: i64, due_date: Option<NaiveDate>) {
        if let Some(task) = self.inner.write().await.tasks.get_mut(&task_id) {
            task.due_date = due_date;
        }
    }

    pub async fn task_count(&self) -> usize {
        self.inner.read().await.tasks.len()
    }
}

#[async_trait]
impl TaskStorage for MemoryStore {
    async fn list_due_soon(
        &self,
        today: NaiveDate,
        horizon_end: NaiveDate,
    ) -> StorageResult<Vec<TaskInstance>> {
        let tables = self.inner.read().await;
        Ok(tables
            .tasks
            .values()
            .filter(|t| {
                !t.completed
                    && !t.notified
                    && t.due_date
                        .is_some_and(|due| due >= today && due <= horizon_end)
            })
            .cloned()
            .collect())
    }

    async fn mark_notified(&self, task_id: i64) -> StorageResult<()> {
        let mut tables = self.inner.write().await;
        match tables.tasks.get_mut(&task_id) {
            Some(task) => {
                task.notified = true;
                Ok(())
            }
            None => Err(StorageError::NotFound {
                details: format!("task {task_id}"),
            }),
        }
    }

    async fn clear_notified_before(&self, cutoff: NaiveDate) -> StorageResult<u64> {
        let mut tables = self.inner.write().await;
        let mut cleared = 0;
        for task in tables.tasks.values_mut() {
            if task.notified && task.due_date.is_some_and(|due| due < cutoff) {
                task.notified = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[async_trait]
impl TemplateStorage for MemoryStore {
    async fn list_due_templates(
        &self,
        today: NaiveDate,
    ) -> StorageResult<Vec<RecurringTaskTemplate>> {
        let tables = self.inner.read().await;
        let mut due: Vec<_> = tables
            .templates
            .values()
            .filter(|t| t.active && t.next_due_at <= today)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_due_at);
        Ok(due)
    }

    async fn materialize(
        &self,
        template_id: i64,
        instance: &NewTaskInstance,
        advance: TemplateAdvance,
    ) -> StorageResult<i64> {
        let mut tables = self.inner.write().await;

        // Check the template first: if it is gone or paused the instance
        // must not be inserted either.
        if !tables
            .templates
            .get(&template_id)
            .is_some_and(|t| t.active)
        {
            return Err(StorageError::NotFound {
                details: format!("active template {template_id}"),
            });
        }

        tables.next_task_id += 1;
        let task = TaskInstance {
            id: tables.next_task_id,
            user_id: instance.user_id,
            title: instance.title.clone(),
            description: instance.description.clone(),
            priority_id: instance.priority_id,
            due_date: instance.due_date,
            completed: false,
            notified: false,
            template_id: instance.template_id,
            created_at: Utc::now(),
        };
        let task_id = task.id;
        tables.tasks.insert(task_id, task);

        let template = tables
            .templates
            .get_mut(&template_id)
            .ok_or_else(|| StorageError::NotFound {
                details: format!("template {template_id}"),
            })?;
        match advance {
            TemplateAdvance::Next(next_due_at) => template.next_due_at = next_due_at,
            TemplateAdvance::Retire => template.active = false,
        }

        Ok(task_id)
    }

    async fn set_active(&self, template_id: i64, active: bool) -> StorageResult<()> {
        let mut tables = self.inner.write().await;
        match tables.templates.get_mut(&template_id) {
            Some(template) => {
                template.active = active;
                Ok(())
            }
            None => Err(StorageError::NotFound {
                details: format!("template {template_id}"),
            }),
        }
    }
}

#[async_trait]
impl EventLogStorage for MemoryStore {
    async fn append(&self, task_id: i64, event: &TaskEvent) -> StorageResult<()> {
        let payload = event
            .payload()
            .map_err(|e| StorageError::PayloadSerializationFailed { source: e })?;

        let mut tables = self.inner.write().await;
        tables.next_event_id += 1;
        let entry = EventLogEntry {
            id: tables.next_event_id,
            task_id,
            event_type: event.kind(),
            event_data: payload,
            created_at: Utc::now(),
        };
        tables.events.push(entry);
        Ok(())
    }

    async fn list_for_task(&self, task_id: i64) -> StorageResult<Vec<EventLogEntry>> {
        let tables = self.inner.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::event_log::EventKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_task(due: Option<NaiveDate>) -> NewTaskInstance {
        NewTaskInstance {
            user_id: 1,
            title: "task".to_string(),
            description: None,
            priority_id: None,
            due_date: due,
            template_id: None,
        }
    }

    fn template(next_due_at: NaiveDate, end_date: Option<NaiveDate>) -> RecurringTaskTemplate {
        RecurringTaskTemplate {
            id: 0,
            user_id: 1,
            title: "recurring".to_string(),
            description: None,
            priority_id: None,
            recurrence: "daily".to_string(),
            start_date: date(2025, 1, 1),
            end_date,
            next_due_at,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_due_soon_selection_criteria() {
        let store = MemoryStore::new();
        let today = date(2025, 3, 10);
        let horizon_end = date(2025, 3, 11);

        let in_window = store.insert_task(new_task(Some(date(2025, 3, 11)))).await;
        let overdue = store.insert_task(new_task(Some(date(2025, 3, 9)))).await;
        let far_future = store.insert_task(new_task(Some(date(2025, 3, 20)))).await;
        let no_due = store.insert_task(new_task(None)).await;
        let done = store.insert_task(new_task(Some(date(2025, 3, 10)))).await;
        store.set_completed(done.id, true).await;
        let already_notified = store.insert_task(new_task(Some(date(2025, 3, 10)))).await;
        store.set_notified(already_notified.id, true).await;

        let due = store.list_due_soon(today, horizon_end).await.unwrap();
        let ids: Vec<i64> = due.iter().map(|t| t.id).collect();
        assert!(ids.contains(&in_window.id));
        assert!(!ids.contains(&overdue.id));
        assert!(!ids.contains(&far_future.id));
        assert!(!ids.contains(&no_due.id));
        assert!(!ids.contains(&done.id));
        assert!(!ids.contains(&already_notified.id));
    }

    #[tokio::test]
    async fn test_mark_notified_and_missing_task() {
        let store = MemoryStore::new();
        let task = store.insert_task(new_task(Some(date(2025, 3, 10)))).await;

        store.mark_notified(task.id).await.unwrap();
        assert!(store.get_task(task.id).await.unwrap().notified);

        let err = store.mark_notified(9999).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_clear_notified_boundary_is_strict() {
        let store = MemoryStore::new();
        let cutoff = date(2025, 3, 9); // today 2025-03-10, cutoff = today - 1

        let two_days_over = store.insert_task(new_task(Some(date(2025, 3, 8)))).await;
        let one_day_over = store.insert_task(new_task(Some(date(2025, 3, 9)))).await;
        store.set_notified(two_days_over.id, true).await;
        store.set_notified(one_day_over.id, true).await;

        let cleared = store.clear_notified_before(cutoff).await.unwrap();
        assert_eq!(cleared, 1);
        assert!(!store.get_task(two_days_over.id).await.unwrap().notified);
        assert!(store.get_task(one_day_over.id).await.unwrap().notified);
    }

    #[tokio::test]
    async fn test_materialize_advances_template() {
        let store = MemoryStore::new();
        let tpl = store
            .insert_template(template(date(2025, 1, 10), None))
            .await;

        let task_id = store
            .materialize(
                tpl.id,
                &NewTaskInstance {
                    template_id: Some(tpl.id),
                    ..new_task(Some(date(2025, 1, 10)))
                },
                TemplateAdvance::Next(date(2025, 1, 11)),
            )
            .await
            .unwrap();

        let task = store.get_task(task_id).await.unwrap();
        assert_eq!(task.due_date, Some(date(2025, 1, 10)));
        assert_eq!(task.template_id, Some(tpl.id));

        let tpl = store.get_template(tpl.id).await.unwrap();
        assert_eq!(tpl.next_due_at, date(2025, 1, 11));
        assert!(tpl.active);
    }

    #[tokio::test]
    async fn test_materialize_retire_keeps_next_due_at() {
        let store = MemoryStore::new();
        let tpl = store
            .insert_template(template(date(2025, 1, 31), Some(date(2025, 1, 31))))
            .await;

        store
            .materialize(
                tpl.id,
                &new_task(Some(date(2025, 1, 31))),
                TemplateAdvance::Retire,
            )
            .await
            .unwrap();

        let tpl = store.get_template(tpl.id).await.unwrap();
        assert!(!tpl.active);
        assert_eq!(tpl.next_due_at, date(2025, 1, 31));
    }

    #[tokio::test]
    async fn test_materialize_paused_template_creates_nothing() {
        let store = MemoryStore::new();
        let tpl = store
            .insert_template(template(date(2025, 1, 10), None))
            .await;
        store.set_active(tpl.id, false).await.unwrap();

        let err = store
            .materialize(
                tpl.id,
                &new_task(Some(date(2025, 1, 10))),
                TemplateAdvance::Next(date(2025, 1, 11)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert_eq!(store.task_count().await, 0);
    }

    #[tokio::test]
    async fn test_event_append_and_list() {
        let store = MemoryStore::new();
        let task = store.insert_task(new_task(Some(date(2025, 3, 10)))).await;

        store
            .append(
                task.id,
                &TaskEvent::Created {
                    title: task.title.clone(),
                    due_date: task.due_date,
                    template_id: None,
                },
            )
            .await
            .unwrap();
        store
            .append(
                task.id,
                &TaskEvent::Completed {
                    completed_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let events = store.list_for_task(task.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventKind::Created);
        assert_eq!(events[1].event_type, EventKind::Completed);
        assert!(store.list_for_task(9999).await.unwrap().is_empty());
    }
}
