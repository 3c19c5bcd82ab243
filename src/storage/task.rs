use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

use super::StorageResult;
use crate::errors::StorageError;

/// A concrete todo item as the scheduling pipeline sees it.
///
/// Task instances are created either by direct user action (out of scope
/// here) or by the recurring-task advancer. The pipeline itself only ever
/// touches two fields: the dispatcher owns `notified` and the flag resetter
/// re-arms it; everything else is read-only from this subsystem's point of
/// view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: i64,
    /// Owner of the task. Always carried explicitly; nothing in this
    /// subsystem infers identity from ambient state.
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority_id: Option<i64>,
    /// Calendar due date. Tasks without one are invisible to the due-soon
    /// pipeline.
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    /// True only after a due-soon event for the current due date has been
    /// published. Guards against duplicate notifications.
    pub notified: bool,
    /// Back-reference to the recurring template that produced this instance,
    /// if any. Deleting the template nulls this out but keeps the task.
    pub template_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Field set for a task row about to be inserted by the advancer.
#[derive(Debug, Clone)]
pub struct NewTaskInstance {
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub template_id: Option<i64>,
}

/// Storage operations the due-soon pipeline needs on task instances.
#[async_trait]
pub trait TaskStorage: Send + Sync {
    /// Incomplete, not-yet-notified tasks with a due date inside
    /// `[today, horizon_end]`. Already-overdue tasks are excluded here;
    /// overdue escalation goes through the flag resetter instead.
    async fn list_due_soon(
        &self,
        today: NaiveDate,
        horizon_end: NaiveDate,
    ) -> StorageResult<Vec<TaskInstance>>;

    /// Set the notification flag. This is the dispatcher's commit point:
    /// once it succeeds the task drops out of due-soon selection.
    async fn mark_notified(&self, task_id: i64) -> StorageResult<()>;

    /// Clear the notification flag on every notified task whose due date is
    /// strictly before `cutoff`, returning the number of rows touched.
    async fn clear_notified_before(&self, cutoff: NaiveDate) -> StorageResult<u64>;
}

#[async_trait]
impl<T: TaskStorage + ?Sized> TaskStorage for std::sync::Arc<T> {
    async fn list_due_soon(
        &self,
        today: NaiveDate,
        horizon_end: NaiveDate,
    ) -> StorageResult<Vec<TaskInstance>> {
        self.as_ref().list_due_soon(today, horizon_end).await
    }

    async fn mark_notified(&self, task_id: i64) -> StorageResult<()> {
        self.as_ref().mark_notified(task_id).await
    }

    async fn clear_notified_before(&self, cutoff: NaiveDate) -> StorageResult<u64> {
        self.as_ref().clear_notified_before(cutoff).await
    }
}

/// PostgreSQL implementation of task storage.
pub struct PostgresTaskStorage {
    pool: PgPool,
}

impl PostgresTaskStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize the tasks schema. The templates table must exist first
    /// because of the back-reference foreign key.
    pub async fn initialize_schema(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                priority_id BIGINT,
                due_date DATE,
                completed BOOLEAN NOT NULL DEFAULT FALSE,
                notified BOOLEAN NOT NULL DEFAULT FALSE,
                template_id BIGINT REFERENCES recurring_task_templates(id) ON DELETE SET NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed { source: e })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_tasks_due_soon
            ON tasks (due_date)
            WHERE completed = FALSE AND notified = FALSE AND due_date IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed { source: e })?;

        Ok(())
    }
}

#[async_trait]
impl TaskStorage for PostgresTaskStorage {
    #[instrument(skip(self), fields(db.operation = "list_due_soon"))]
    async fn list_due_soon(
        &self,
        today: NaiveDate,
        horizon_end: NaiveDate,
    ) -> StorageResult<Vec<TaskInstance>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, user_id, title, description, priority_id, due_date,
                   completed, notified, template_id, created_at
            FROM tasks
            WHERE completed = FALSE
              AND notified = FALSE
              AND due_date IS NOT NULL
              AND due_date >= $1
              AND due_date <= $2
            "#,
        )
        .bind(today)
        .bind(horizon_end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = ?e, "Failed to query due-soon tasks");
            StorageError::QueryFailed { source: e }
        })?;

        debug!(count = rows.len(), "Selected due-soon candidates");
        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    #[instrument(skip(self), fields(db.operation = "mark_notified", task.id = task_id))]
    async fn mark_notified(&self, task_id: i64) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET notified = TRUE WHERE id = $1
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = ?e, task_id, "Failed to set notification flag");
            StorageError::QueryFailed { source: e }
        })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                details: format!("task {task_id}"),
            });
        }

        Ok(())
    }

    #[instrument(skip(self), fields(db.operation = "clear_notified_before", cutoff = %cutoff))]
    async fn clear_notified_before(&self, cutoff: NaiveDate) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET notified = FALSE
            WHERE notified = TRUE
              AND due_date IS NOT NULL
              AND due_date < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = ?e, "Failed to clear notification flags");
            StorageError::QueryFailed { source: e }
        })?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: i64,
    user_id: i64,
    title: String,
    description: Option<String>,
    priority_id: Option<i64>,
    due_date: Option<NaiveDate>,
    completed: bool,
    notified: bool,
    template_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> TaskInstance {
        TaskInstance {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            priority_id: self.priority_id,
            due_date: self.due_date,
            completed: self.completed,
            notified: self.notified,
            template_id: self.template_id,
            created_at: self.created_at,
        }
    }
}
