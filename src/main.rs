use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geoloc::api::create_api_router;
use geoloc::auth::AuthService;
use geoloc::config::Config;
use geoloc::ranges::{feed_jobs, spawn_autoupdate, spawn_refresh};
use geoloc::service::{connect_storage, Services};
use geoloc::stats::SystemClock;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::load()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage = connect_storage(&config.database).await?;
    info!("Database initialized successfully");

    let services = Services::new(storage, &config, Arc::new(SystemClock));
    for family in services.ingester.bootstrap().await? {
        if family.records == 0 {
            warn!(family = %family.family, "Range table is empty; lookups will fall back to unknown");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let flush_task = services.stats.start_flush_task(
        Duration::from_millis(config.stats.flush_interval_ms.max(1)),
        shutdown_rx.clone(),
    );
    if services.stats.is_enabled() {
        info!(
            retention_days = config.stats.history_retention_days,
            "📊 Usage statistics enabled"
        );
    }

    let autoupdate_task = if config.ingest.autoupdate {
        let jobs = feed_jobs(&config.ingest).context("invalid feed configuration")?;
        if jobs.is_empty() {
            warn!("Autoupdate is on but no feed URLs are configured");
            None
        } else {
            Some(spawn_autoupdate(
                Arc::clone(&services.ingester),
                jobs,
                Arc::clone(&services.resolver),
                config.ingest.clone(),
                shutdown_rx.clone(),
            ))
        }
    } else {
        None
    };

    let refresh_task = if config.ingest.refresh_interval_secs > 0 {
        Some(spawn_refresh(
            Arc::clone(&services.ingester),
            Arc::clone(&services.resolver),
            Duration::from_secs(config.ingest.refresh_interval_secs),
            shutdown_rx.clone(),
        ))
    } else {
        None
    };

    // Initialize auth service
    let auth_service = Arc::new(AuthService::new(&config.auth));
    if auth_service.is_enabled() {
        info!("🔐 API key authentication enabled");
    } else {
        info!("🔓 Authentication is disabled - all API requests are allowed");
    }

    let router = create_api_router(services.app_state(&config), auth_service);

    // Start API server
    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    })
    .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = flush_task.await {
        warn!(error = %e, "Stats flush task ended abnormally");
    }
    for task in [autoupdate_task, refresh_task].into_iter().flatten() {
        let _ = task.await;
    }

    Ok(())
}
