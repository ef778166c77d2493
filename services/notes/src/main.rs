use anyhow::{Context, Result};
use notes_service::{
    select_backend, start_api_server, AppState, PasswordSource, PgNoteStore, Settings,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&settings.service.log_level);

    info!(
        port = %settings.port,
        storage = %settings.storage.mode,
        db_host = %settings.database.host,
        ssl = settings.database.requires_encrypted_transport,
        "Starting notes service"
    );

    if settings.database.password_source == PasswordSource::Default {
        warn!("Neither DB_PASSWORD nor DB_PASS is set, using the built-in default password");
    }

    if let Some(port) = &settings.service.metrics_port {
        init_metrics(port)?;
    }

    // Does not connect; a bad DB_PORT or unreachable host fails per request
    let note_store = PgNoteStore::new(&settings.database);

    if settings.service.run_migrations {
        note_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let uploads = select_backend(&settings)
        .await
        .context("Failed to initialize upload backend")?;

    let state = AppState {
        settings: Arc::new(settings),
        notes: Arc::new(note_store),
        uploads,
    };

    start_api_server(state, shutdown_signal()).await?;

    info!("Notes service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: &str) -> Result<()> {
    let port: u16 = port
        .parse()
        .with_context(|| format!("Invalid metrics port {:?}", port))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
