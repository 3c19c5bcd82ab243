//! Task lifecycle helpers for consistent background loop handling.

use std::future::Future;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

/// Spawn a background task with cancellation support.
///
/// The task is handed the application's cancellation token; when the task
/// fails unexpectedly the token is cancelled so the rest of the application
/// shuts down instead of limping along without one of its loops.
pub fn spawn_cancellable_task<F, Fut>(
    tracker: &TaskTracker,
    app_token: CancellationToken,
    task_builder: F,
) where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let task_token = app_token.clone();
    let cancel_token = app_token.clone();

    tracker.spawn(async move {
        tokio::select! {
            result = task_builder(cancel_token.clone()) => {
                match result {
                    Ok(()) => {
                        info!("Background task completed");
                    }
                    Err(e) => {
                        error!(error = ?e, "Background task failed unexpectedly");
                        task_token.cancel();
                    }
                }
            }
            () = task_token.cancelled() => {
                info!("Background task shutting down gracefully");
            }
        }
    });
}
