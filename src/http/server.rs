use std::time::Duration;

use axum::{Router, routing::post};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::http::{
    context::WebContext,
    handle_triggers::{handle_due_soon_check, handle_notification_reset, handle_recurring_tasks},
};

pub fn build_router(web_context: WebContext) -> Router {
    Router::new()
        .route("/triggers/due-soon-check", post(handle_due_soon_check))
        .route(
            "/triggers/notification-reset",
            post(handle_notification_reset),
        )
        .route("/triggers/recurring-tasks", post(handle_recurring_tasks))
        .layer(TraceLayer::new_for_http())
        // Trigger cycles are synchronous; bound them so a wedged store
        // cannot hold cron connections open forever.
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .with_state(web_context)
}
