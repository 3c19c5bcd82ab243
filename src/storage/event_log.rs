//! Append-only audit log of task lifecycle events.
//!
//! Every lifecycle transition (created, updated, completed, deleted,
//! due_soon) is recorded as an immutable row keyed by the originating task,
//! independent of whatever the pub/sub transport does with the published
//! event. Payloads are written through the typed [`TaskEvent`] union so the
//! shape of each event kind is checked at compile time instead of drifting
//! inside an open JSON map.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, instrument};

use super::StorageResult;
use crate::errors::StorageError;

/// The five lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Completed,
    Deleted,
    DueSoon,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Completed => "completed",
            EventKind::Deleted => "deleted",
            EventKind::DueSoon => "due_soon",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventKind::Created),
            "updated" => Some(EventKind::Updated),
            "completed" => Some(EventKind::Completed),
            "deleted" => Some(EventKind::Deleted),
            "due_soon" => Some(EventKind::DueSoon),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload published (and logged) when a task enters the due-soon window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueSoonEvent {
    pub task_id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority_id: Option<i64>,
    /// Whole hours from the cycle's `now` to midnight UTC of the due date.
    pub hours_until_due: i64,
}

/// Typed per-kind payloads for the audit log.
///
/// Serialized untagged: the kind is stored in its own column, so only the
/// variant body lands in `event_data`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TaskEvent {
    Created {
        title: String,
        due_date: Option<NaiveDate>,
        template_id: Option<i64>,
    },
    Updated {
        title: String,
        due_date: Option<NaiveDate>,
        completed: bool,
    },
    Completed {
        completed_at: DateTime<Utc>,
    },
    Deleted {
        title: String,
    },
    DueSoon(DueSoonEvent),
}

impl TaskEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TaskEvent::Created { .. } => EventKind::Created,
            TaskEvent::Updated { .. } => EventKind::Updated,
            TaskEvent::Completed { .. } => EventKind::Completed,
            TaskEvent::Deleted { .. } => EventKind::Deleted,
            TaskEvent::DueSoon(_) => EventKind::DueSoon,
        }
    }

    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// One persisted audit row.
#[derive(Debug, Clone, Serialize)]
pub struct EventLogEntry {
    pub id: i64,
    pub task_id: i64,
    pub event_type: EventKind,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventLogStorage: Send + Sync {
    /// Append one event for a task. Rows are never updated or deleted except
    /// by cascade when the task itself is deleted.
    async fn append(&self, task_id: i64, event: &TaskEvent) -> StorageResult<()>;

    /// All events for a task, oldest first.
    async fn list_for_task(&self, task_id: i64) -> StorageResult<Vec<EventLogEntry>>;
}

#[async_trait]
impl<T: EventLogStorage + ?Sized> EventLogStorage for std::sync::Arc<T> {
    async fn append(&self, task_id: i64, event: &TaskEvent) -> StorageResult<()> {
        self.as_ref().append(task_id, event).await
    }

    async fn list_for_task(&self, task_id: i64) -> StorageResult<Vec<EventLogEntry>> {
        self.as_ref().list_for_task(task_id).await
    }
}

/// PostgreSQL implementation of the audit log.
pub struct PostgresEventLogStorage {
    pool: PgPool,
}

impl PostgresEventLogStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_events (
                id BIGSERIAL PRIMARY KEY,
                task_id BIGINT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                event_type TEXT NOT NULL,
                event_data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed { source: e })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_task_events_task
            ON task_events (task_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed { source: e })?;

        Ok(())
    }
}

#[async_trait]
impl EventLogStorage for PostgresEventLogStorage {
    #[instrument(skip(self, event), fields(db.operation = "append_event", task.id = task_id, event.kind = %event.kind()))]
    async fn append(&self, task_id: i64, event: &TaskEvent) -> StorageResult<()> {
        let payload = event
            .payload()
            .map_err(|e| StorageError::PayloadSerializationFailed { source: e })?;

        sqlx::query(
            r#"
            INSERT INTO task_events (task_id, event_type, event_data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(task_id)
        .bind(event.kind().as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = ?e, task_id, "Failed to append audit event");
            StorageError::QueryFailed { source: e }
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(db.operation = "list_events", task.id = task_id))]
    async fn list_for_task(&self, task_id: i64) -> StorageResult<Vec<EventLogEntry>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, task_id, event_type, event_data, created_at
            FROM task_events
            WHERE task_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed { source: e })?;

        rows.into_iter().map(EventRow::into_entry).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    task_id: i64,
    event_type: String,
    event_data: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn into_entry(self) -> StorageResult<EventLogEntry> {
        let event_type =
            EventKind::parse(&self.event_type).ok_or_else(|| StorageError::InvalidInput {
                details: format!("unknown event type {}", self.event_type),
            })?;

        Ok(EventLogEntry {
            id: self.id,
            task_id: self.task_id,
            event_type,
            event_data: self.event_data,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trip() {
        for kind in [
            EventKind::Created,
            EventKind::Updated,
            EventKind::Completed,
            EventKind::Deleted,
            EventKind::DueSoon,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("renamed"), None);
    }

    #[test]
    fn test_due_soon_payload_shape() {
        let event = TaskEvent::DueSoon(DueSoonEvent {
            task_id: 7,
            user_id: 3,
            title: "Water the plants".to_string(),
            description: None,
            due_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            priority_id: Some(2),
            hours_until_due: 12,
        });

        assert_eq!(event.kind(), EventKind::DueSoon);
        let payload = event.payload().unwrap();
        assert_eq!(payload["task_id"], 7);
        assert_eq!(payload["user_id"], 3);
        assert_eq!(payload["due_date"], "2025-06-01");
        assert_eq!(payload["hours_until_due"], 12);
        // The kind lives in its own column, not in the payload.
        assert!(payload.get("event_type").is_none());
    }

    #[test]
    fn test_update_lifecycle_payloads() {
        let updated = TaskEvent::Updated {
            title: "Weekly report".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 2, 1),
            completed: false,
        };
        assert_eq!(updated.kind(), EventKind::Updated);
        assert_eq!(updated.payload().unwrap()["completed"], false);

        let deleted = TaskEvent::Deleted {
            title: "Weekly report".to_string(),
        };
        assert_eq!(deleted.kind(), EventKind::Deleted);
        assert_eq!(deleted.payload().unwrap()["title"], "Weekly report");
    }

    #[test]
    fn test_created_payload_carries_back_reference() {
        let event = TaskEvent::Created {
            title: "Weekly report".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 1, 10),
            template_id: Some(42),
        };

        assert_eq!(event.kind(), EventKind::Created);
        let payload = event.payload().unwrap();
        assert_eq!(payload["template_id"], 42);
        assert_eq!(payload["due_date"], "2025-01-10");
    }
}
