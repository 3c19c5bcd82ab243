use anyhow::Result;
use deadpool_redis::Runtime;
use duepulse::{
    config::Config,
    http::{context::WebContext, server::build_router},
    jobs::{
        DueSoonDetector, NotificationDispatcher, NotificationFlagResetter, RecurringTaskAdvancer,
        SchedulerDriver, spawn_cancellable_task,
    },
    metrics::{MetricsPublisher, NoOpMetricsPublisher, StatsdMetricsPublisher},
    publisher::{EventPublisher, MpscEventPublisher, RedisEventPublisher},
    storage::{
        event_log::{EventLogStorage, PostgresEventLogStorage},
        task::{PostgresTaskStorage, TaskStorage},
        template::{PostgresTemplateStorage, TemplateStorage},
    },
};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let version = duepulse::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    let config = Config::new()?;

    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "duepulse=info,tower_http=info,sqlx=warn".into()),
    );

    // Configure output format based on environment
    let fmt_layer = if std::env::var("JSON_LOGS").is_ok() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!(version = %version, "Starting duepulse application");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    // Schema bootstrap. Templates first: the tasks table carries the
    // back-reference foreign key, and the event log references tasks.
    let template_storage = PostgresTemplateStorage::new(pool.clone());
    template_storage.initialize_schema().await?;
    let task_storage = PostgresTaskStorage::new(pool.clone());
    task_storage.initialize_schema().await?;
    let event_log_storage = PostgresEventLogStorage::new(pool.clone());
    event_log_storage.initialize_schema().await?;

    let template_storage: Arc<dyn TemplateStorage> = Arc::new(template_storage);
    let task_storage: Arc<dyn TaskStorage> = Arc::new(task_storage);
    let event_log_storage: Arc<dyn EventLogStorage> = Arc::new(event_log_storage);

    // Create task tracker and cancellation token first
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    // Select the event publisher: Redis when configured, otherwise an
    // in-memory channel drained into the log (single-instance dev mode).
    let publisher: Arc<dyn EventPublisher> = if let Some(redis_url) = &config.redis_url {
        let redis_pool = deadpool_redis::Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| anyhow::anyhow!("Failed to create Redis pool: {e}"))?;
        let publisher = RedisEventPublisher::new(redis_pool);
        if !publisher.is_healthy().await {
            tracing::warn!("Redis publisher unhealthy at startup; publishes will retry per cycle");
        } else {
            tracing::info!("Redis event publisher enabled");
        }
        Arc::new(publisher)
    } else {
        tracing::info!("Redis not configured; events will be drained to the log");
        let publisher = MpscEventPublisher::new(1024);
        let drain = publisher.clone();
        spawn_cancellable_task(&tracker, token.clone(), |cancel_token| async move {
            loop {
                tokio::select! {
                    event = drain.pull() => {
                        match event {
                            Some(event) => {
                                tracing::info!(topic = %event.topic, payload = %event.payload, "Event published");
                            }
                            None => break,
                        }
                    }
                    () = cancel_token.cancelled() => break,
                }
            }
            Ok(())
        });
        Arc::new(publisher)
    };

    let metrics: Arc<dyn MetricsPublisher> = if let Some(host) = &config.statsd_host {
        tracing::info!(host = %host, "Statsd metrics enabled");
        Arc::new(StatsdMetricsPublisher::new(host, &config.metrics_prefix)?)
    } else {
        Arc::new(NoOpMetricsPublisher::new())
    };

    let driver = Arc::new(SchedulerDriver::new(
        DueSoonDetector::new(task_storage.clone()),
        NotificationDispatcher::new(
            task_storage.clone(),
            event_log_storage.clone(),
            publisher,
            metrics.clone(),
            config.due_soon_topic.clone(),
        ),
        RecurringTaskAdvancer::new(template_storage, event_log_storage, metrics),
        NotificationFlagResetter::new(task_storage),
        config.scheduler_config(),
    ));

    // Spawn the three scheduler loops
    {
        let driver = driver.clone();
        spawn_cancellable_task(&tracker, token.clone(), |cancel_token| async move {
            driver.run_due_soon_loop(cancel_token).await
        });
    }
    {
        let driver = driver.clone();
        spawn_cancellable_task(&tracker, token.clone(), |cancel_token| async move {
            driver.run_recurring_loop(cancel_token).await
        });
    }
    {
        let driver = driver.clone();
        spawn_cancellable_task(&tracker, token.clone(), |cancel_token| async move {
            driver.run_reset_loop(cancel_token).await
        });
    }

    // Start HTTP server
    let port = *config.http_port.as_ref();
    let router = build_router(WebContext::new(config, driver));
    spawn_cancellable_task(&tracker, token.clone(), move |cancel_token| async move {
        let listener = TcpListener::bind(format!("0.0.0.0:{port}"))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to port {port}: {e}"))?;

        tracing::info!(port, "HTTP server listening");

        let shutdown_token = cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

        Ok(())
    });

    // Shut everything down on ctrl-c
    let shutdown_token = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown_token.cancel();
        }
    });

    tracker.close();
    tracker.wait().await;

    tracing::info!("All tasks completed, application shutting down");

    Ok(())
}
