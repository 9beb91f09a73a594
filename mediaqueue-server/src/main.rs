//! Thin bin crate (spec §2.1): loads `ServerConfig`, connects and
//! migrates the Postgres pool, constructs every core subsystem, spawns
//! each long-lived loop named in §5 as its own `tokio::spawn`ed task,
//! and serves the minimal axum surface named in §6 (health check plus
//! the websocket upgrade).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mediaqueue_core::database::postgres::{self, PostgresStores};
use mediaqueue_core::database::{ClientStore, PresetStore, TaskStore, WatchfolderStore, WebhookStore};
use mediaqueue_core::{
    CancellationRegistry, ClientDescriptor, EventBus, Registrar, Scheduler, SchedulerConfig,
    TaskService, WatchfolderScanner, WebhookEngine,
};
use mediaqueue_core::broadcast::BroadcastBus;
use mediaqueue_server::{build_app, config, AppState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::ServerConfig::load().context("failed to load server configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediaqueue_server=info,mediaqueue_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(bind_addr = %cfg.bind_addr, "server configuration loaded");

    let pool = postgres::connect_and_migrate(&cfg.database_url, cfg.db_max_connections).await?;
    tracing::info!("database connected and migrations applied");

    let stores = PostgresStores::new(pool.clone());
    let tasks_store: Arc<dyn TaskStore> = Arc::new(stores.tasks);
    let clients_store: Arc<dyn ClientStore> = Arc::new(stores.clients);
    let watchfolders_store: Arc<dyn WatchfolderStore> = Arc::new(stores.watchfolders);
    let webhooks_store: Arc<dyn WebhookStore> = Arc::new(stores.webhooks);
    let presets_store: Arc<dyn PresetStore> = Arc::new(stores.presets);

    let events = EventBus::new();
    let cancellation = Arc::new(CancellationRegistry::new());
    let shutdown = CancellationToken::new();

    let identifier = cfg.resolved_identifier();
    let labels = cfg.labels();

    let task_service = TaskService::new(tasks_store.clone(), events.clone(), identifier.clone());

    let webhook_engine = WebhookEngine::new(
        webhooks_store,
        events.clone(),
        "mediaqueue-server",
        env!("CARGO_PKG_VERSION"),
    );
    tokio::spawn(webhook_engine.run(events.clone(), shutdown.clone()));

    let self_session = Uuid::new_v4();
    // The spawned local/cluster consumer loops run independently of this
    // binding; kept alive for the rest of `main` so its drop-count
    // accessors remain reachable if a future admin surface needs them.
    let (_broadcast_bus, peers) =
        BroadcastBus::spawn(events.clone(), Some(pool.clone()), self_session, shutdown.clone());

    let scheduler = Scheduler::new(
        tasks_store.clone(),
        task_service.clone(),
        cancellation.clone(),
        SchedulerConfig {
            max_concurrent_tasks: cfg.max_concurrent_tasks as usize,
            client_labels: labels.clone(),
            ffmpeg_binary_name: cfg.ffmpeg_path.clone(),
            tick_period: Duration::from_millis(cfg.scheduler_tick_ms),
        },
    );
    tokio::spawn(scheduler.run(shutdown.clone()));

    let descriptor = ClientDescriptor {
        identifier: identifier.clone(),
        session: self_session,
        cluster_seed: Uuid::new_v4(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ffmpeg_path: cfg.ffmpeg_path.clone(),
        max_concurrent_tasks: cfg.max_concurrent_tasks,
        labels: labels.clone(),
    };
    let registrar = Registrar::new(
        clients_store,
        tasks_store,
        task_service.clone(),
        events.clone(),
        descriptor,
        Duration::from_millis(cfg.registrar_tick_ms),
    );
    let registrar_shutdown = shutdown.clone();
    tokio::spawn(async move { registrar.run(registrar_shutdown).await });

    let active_folders = watchfolders_store.list_active().await?;
    tracing::info!(count = active_folders.len(), "spawning watchfolder pollers");
    for folder in active_folders {
        let scanner = WatchfolderScanner::new(
            watchfolders_store.clone(),
            presets_store.clone(),
            task_service.clone(),
            labels.clone(),
        );
        let interval = Duration::from_secs(folder.interval_seconds.max(1));
        let folder_shutdown = shutdown.clone();
        tokio::spawn(async move { scanner.run(folder.uuid, interval, folder_shutdown).await });
    }

    let state = AppState { pool: pool.clone(), peers };
    let app = build_app(state);

    let addr = cfg.bind_socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
