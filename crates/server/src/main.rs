use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelhaul_core::{
    load_config, load_config_or_default, validate_config, ArtifactStore, BinaryUpdateManager,
    GithubReleaseFeed, JobExecutor, JobRegistry, JobScheduler, LocalArtifactStore, ReleaseFeed,
    YtDlpExecutor,
};
use reelhaul_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("reelhaul {} starting", VERSION);

    // An explicit config path must exist; the default one may be absent.
    let config = match std::env::var("REELHAUL_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        Err(_) => {
            let path = PathBuf::from("config.toml");
            load_config_or_default(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?
        }
    };

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Downloader binary: {:?}", config.binary.path);
    info!("Output directory: {:?}", config.storage.output_dir);

    // Job registry shared by the service, scheduler and updater
    let registry = Arc::new(JobRegistry::new(config.scheduler.max_finished_jobs));

    // Executor
    let store: Arc<dyn ArtifactStore> = Arc::new(LocalArtifactStore::new(config.storage.clone()));
    let executor: Arc<dyn JobExecutor> = Arc::new(YtDlpExecutor::new(
        config.executor.clone(),
        config.binary.path.clone(),
        store,
    ));

    // Scheduler
    let scheduler = Arc::new(JobScheduler::new(
        config.scheduler.clone(),
        Arc::clone(&registry),
        executor,
    ));
    scheduler.start().await;

    // Binary updater
    let updater = if config.updater.enabled {
        let feed: Arc<dyn ReleaseFeed> = Arc::new(
            GithubReleaseFeed::new(&config.updater).context("Failed to create release feed")?,
        );
        let manager = Arc::new(BinaryUpdateManager::new(
            config.binary.clone(),
            config.updater.clone(),
            Arc::clone(&registry),
            feed,
        ));
        manager.start().await;
        Some(manager)
    } else {
        info!("Binary updater disabled in config");
        None
    };

    // Create app state
    let state = Arc::new(AppState::new(
        registry,
        Arc::clone(&scheduler),
        updater.clone(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    if let Some(ref manager) = updater {
        manager.stop().await;
        info!("Binary updater stopped");
    }

    scheduler.stop().await;
    info!("Scheduler stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
