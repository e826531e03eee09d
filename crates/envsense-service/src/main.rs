//! Envsense Service - HTTP API for I2C environmental sensors.
//!
//! Run with: `cargo run -p envsense-service`

use std::path::PathBuf;

use axum::{ServiceExt, extract::Request};
use clap::Parser;
use tracing::{info, warn};

use envsense_core::SensorStore;
use envsense_service::{AppState, Config};
use envsense_store::Store;

/// Envsense Service - HTTP REST API for environmental sensors.
#[derive(Parser, Debug)]
#[command(name = "envsense-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Task database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Serve the task API only, without touching the I2C bus.
    #[arg(long)]
    no_sensors: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("envsense_service=info".parse()?)
                .add_directive("envsense_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    config.validate()?;

    // Open the task database
    let tasks = Store::open(&config.storage.path)?;

    // Bind sensors; the initial refresh talks to the bus, so keep it off the runtime
    let sensors = if args.no_sensors {
        info!("Sensor access disabled");
        SensorStore::empty()
    } else {
        let sensor_configs = config.sensors.clone();
        tokio::task::spawn_blocking(move || SensorStore::bootstrap(&sensor_configs)).await?
    };
    if sensors.is_empty() && !args.no_sensors {
        warn!("No sensors registered; sensor endpoints will return empty results");
    } else {
        info!("{} sensor(s) registered", sensors.len());
    }

    let bind = config.server.bind.clone();
    let state = AppState::new(sensors, tasks, config);
    let app = envsense_service::app(state);

    info!("Starting server on {}", bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
