//! Storage for recurring task templates.
//!
//! A template describes a task that should rematerialize on a schedule. The
//! advancer is the only writer of `next_due_at` and the only automatic
//! writer of `active`; user-facing pause/resume goes through `set_active`.
//! Materializing an instance and moving the template forward happen in one
//! transaction so a crash mid-cycle can never produce a duplicate instance
//! on the next poll.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

use super::StorageResult;
use super::task::NewTaskInstance;
use crate::errors::StorageError;

/// A recurring task template.
///
/// The `recurrence` tag is stored as text and parsed at the point of use so
/// that one template with a bad tag fails alone instead of poisoning the
/// whole advance cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringTaskTemplate {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority_id: Option<i64>,
    /// One of `daily`, `weekly`, `monthly`, `yearly`.
    pub recurrence: String,
    pub start_date: NaiveDate,
    /// Once `next_due_at` would pass this date the template retires.
    pub end_date: Option<NaiveDate>,
    /// The due date of the next instance this template will produce.
    /// Invariant: >= `start_date`, and <= `end_date` while active.
    pub next_due_at: NaiveDate,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The template mutation applied together with an instance insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateAdvance {
    /// Move `next_due_at` forward to the given date.
    Next(NaiveDate),
    /// The next occurrence would pass `end_date`; deactivate instead and
    /// leave `next_due_at` at its last in-range value.
    Retire,
}

#[async_trait]
pub trait TemplateStorage: Send + Sync {
    /// Active templates whose `next_due_at` is on or before `today`.
    async fn list_due_templates(
        &self,
        today: NaiveDate,
    ) -> StorageResult<Vec<RecurringTaskTemplate>>;

    /// Insert the materialized task instance and apply the template advance
    /// as a single commit unit. Returns the id of the created task. On any
    /// failure neither write is visible, so the template stays due and is
    /// retried on the next cycle.
    async fn materialize(
        &self,
        template_id: i64,
        instance: &NewTaskInstance,
        advance: TemplateAdvance,
    ) -> StorageResult<i64>;

    /// Pause or resume a template.
    async fn set_active(&self, template_id: i64, active: bool) -> StorageResult<()>;
}

#[async_trait]
impl<T: TemplateStorage + ?Sized> TemplateStorage for std::sync::Arc<T> {
    async fn list_due_templates(
        &self,
        today: NaiveDate,
    ) -> StorageResult<Vec<RecurringTaskTemplate>> {
        self.as_ref().list_due_templates(today).await
    }

    async fn materialize(
        &self,
        template_id: i64,
        instance: &NewTaskInstance,
        advance: TemplateAdvance,
    ) -> StorageResult<i64> {
        self.as_ref()
            .materialize(template_id, instance, advance)
            .await
    }

    async fn set_active(&self, template_id: i64, active: bool) -> StorageResult<()> {
        self.as_ref().set_active(template_id, active).await
    }
}

/// PostgreSQL implementation of template storage.
pub struct PostgresTemplateStorage {
    pool: PgPool,
}

impl PostgresTemplateStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recurring_task_templates (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                priority_id BIGINT,
                recurrence TEXT NOT NULL,
                start_date DATE NOT NULL,
                end_date DATE,
                next_due_at DATE NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed { source: e })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_templates_next_due
            ON recurring_task_templates (next_due_at)
            WHERE active = TRUE
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed { source: e })?;

        Ok(())
    }
}

#[async_trait]
impl TemplateStorage for PostgresTemplateStorage {
    #[instrument(skip(self), fields(db.operation = "list_due_templates", today = %today))]
    async fn list_due_templates(
        &self,
        today: NaiveDate,
    ) -> StorageResult<Vec<RecurringTaskTemplate>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, user_id, title, description, priority_id, recurrence,
                   start_date, end_date, next_due_at, active, created_at
            FROM recurring_task_templates
            WHERE active = TRUE AND next_due_at <= $1
            ORDER BY next_due_at ASC
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = ?e, "Failed to query due templates");
            StorageError::QueryFailed { source: e }
        })?;

        debug!(count = rows.len(), "Selected due templates");
        Ok(rows.into_iter().map(TemplateRow::into_template).collect())
    }

    #[instrument(skip(self, instance), fields(db.operation = "materialize", template.id = template_id))]
    async fn materialize(
        &self,
        template_id: i64,
        instance: &NewTaskInstance,
        advance: TemplateAdvance,
    ) -> StorageResult<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::ConnectionFailed { source: e })?;

        let task_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tasks (user_id, title, description, priority_id, due_date, template_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(instance.user_id)
        .bind(&instance.title)
        .bind(&instance.description)
        .bind(instance.priority_id)
        .bind(instance.due_date)
        .bind(instance.template_id)
        .fetch_one(tx.as_mut())
        .await
        .map_err(|e| {
            error!(error = ?e, template_id, "Failed to insert materialized task");
            StorageError::QueryFailed { source: e }
        })?;

        let result = match advance {
            TemplateAdvance::Next(next_due_at) => sqlx::query(
                r#"
                UPDATE recurring_task_templates
                SET next_due_at = $2
                WHERE id = $1 AND active = TRUE
                "#,
            )
            .bind(template_id)
            .bind(next_due_at)
            .execute(tx.as_mut())
            .await,
            TemplateAdvance::Retire => sqlx::query(
                r#"
                UPDATE recurring_task_templates
                SET active = FALSE
                WHERE id = $1 AND active = TRUE
                "#,
            )
            .bind(template_id)
            .execute(tx.as_mut())
            .await,
        }
        .map_err(|e| {
            error!(error = ?e, template_id, "Failed to advance template");
            StorageError::QueryFailed { source: e }
        })?;

        if result.rows_affected() == 0 {
            // Template vanished or was paused mid-cycle; drop the instance
            // with the transaction.
            return Err(StorageError::NotFound {
                details: format!("active template {template_id}"),
            });
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionFailed { source: e })?;

        Ok(task_id)
    }

    #[instrument(skip(self), fields(db.operation = "set_active", template.id = template_id))]
    async fn set_active(&self, template_id: i64, active: bool) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE recurring_task_templates SET active = $2 WHERE id = $1
            "#,
        )
        .bind(template_id)
        .bind(active)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed { source: e })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                details: format!("template {template_id}"),
            });
        }

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    user_id: i64,
    title: String,
    description: Option<String>,
    priority_id: Option<i64>,
    recurrence: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    next_due_at: NaiveDate,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TemplateRow {
    fn into_template(self) -> RecurringTaskTemplate {
        RecurringTaskTemplate {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            priority_id: self.priority_id,
            recurrence: self.recurrence,
            start_date: self.start_date,
            end_date: self.end_date,
            next_due_at: self.next_due_at,
            active: self.active,
            created_at: self.created_at,
        }
    }
}
