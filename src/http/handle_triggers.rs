use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::http::WebContext;
use crate::jobs::JobRun;

#[derive(Debug, Deserialize)]
pub(super) struct DueSoonCheckQuery {
    /// Look-ahead horizon in hours; defaults to the configured horizon.
    pub hours: Option<u32>,
}

pub(super) async fn handle_due_soon_check(
    State(context): State<WebContext>,
    Query(params): Query<DueSoonCheckQuery>,
) -> impl IntoResponse {
    let hours = params
        .hours
        .unwrap_or_else(|| context.config.horizon_hours.as_hours());

    match context.driver.run_due_soon_check(Utc::now(), hours).await {
        Ok(JobRun::Completed(cycle)) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "events_published": cycle.events_published(),
                "hours_threshold": hours,
            })),
        )
            .into_response(),
        Ok(JobRun::Skipped) => (
            StatusCode::OK,
            Json(json!({
                "status": "skipped",
                "events_published": 0,
                "hours_threshold": hours,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = ?e, "Due-soon check trigger failed");
            let error = json!({
                "error": "DueSoonCheckFailed",
                "message": e.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
        }
    }
}

pub(super) async fn handle_notification_reset(
    State(context): State<WebContext>,
) -> impl IntoResponse {
    match context.driver.run_notification_reset(Utc::now()).await {
        Ok(JobRun::Completed(reset)) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "tasks_reset": reset,
            })),
        )
            .into_response(),
        Ok(JobRun::Skipped) => (
            StatusCode::OK,
            Json(json!({
                "status": "skipped",
                "tasks_reset": 0,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = ?e, "Notification reset trigger failed");
            let error = json!({
                "error": "NotificationResetFailed",
                "message": e.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
        }
    }
}

pub(super) async fn handle_recurring_tasks(
    State(context): State<WebContext>,
) -> impl IntoResponse {
    match context.driver.run_recurring_advance(Utc::now()).await {
        Ok(JobRun::Completed(cycle)) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "due_recurring_tasks_found": cycle.due_templates,
                "tasks_created": cycle.tasks_created,
            })),
        )
            .into_response(),
        Ok(JobRun::Skipped) => (
            StatusCode::OK,
            Json(json!({
                "status": "skipped",
                "due_recurring_tasks_found": 0,
                "tasks_created": 0,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = ?e, "Recurring task trigger failed");
            let error = json!({
                "error": "RecurringTaskProcessingFailed",
                "message": e.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
        }
    }
}
