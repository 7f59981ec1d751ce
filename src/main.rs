//! # IMU Bridge
//!
//! Stream BNO055/BMP280 telemetry from a serial link to WebSocket dashboards.
//!
//! The bridge reads records from the sensor board, merges every decoded
//! reading into one snapshot and pushes that snapshot as JSON to each
//! connected browser.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use imu_bridge::config::{Config, LoggingConfig};
use imu_bridge::ingest::IngestionLoop;
use imu_bridge::server::{self, AppState, ClientRegistry, SessionSettings};
use imu_bridge::telemetry::TelemetryStore;
use imu_bridge::transport::SerialConnector;

/// Configuration read when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "imu-bridge.log";

/// Main entry point for the IMU bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, else `config/default.toml`, else defaults)
///    - Set up logging to stdout and optionally a daily rolling file
///    - Bind the HTTP/WebSocket listener
///
/// 2. **Run**
///    - Ingestion loop: open sensor, decode, merge, broadcast, reconnect
///    - Server: accept dashboards on `server.path`
///
/// 3. **Shutdown** (Ctrl+C, or the sensor never opening)
///    - Stop ingestion and the listener
///    - Close every client session
///
/// # Errors
///
/// Returns error if:
/// - Configuration cannot be loaded or is invalid
/// - The listener cannot be bound
/// - The sensor could not be opened within `reconnect.max_startup_attempts`
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(std::env::args().nth(1), Path::new(DEFAULT_CONFIG_PATH))?;
    let _log_guard = init_logging(&config.logging)?;

    info!("IMU Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Sensor: {} at {} baud ({:?} protocol)",
        config.serial.port, config.serial.baud_rate, config.serial.protocol
    );

    let store = Arc::new(TelemetryStore::new());
    let registry = Arc::new(ClientRegistry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingestion = IngestionLoop::new(
        SerialConnector::new(config.serial.clone()),
        config.serial.protocol,
        Arc::clone(&store),
        Arc::clone(&registry),
        config.reconnect.clone(),
    );

    let state = AppState {
        store: Arc::clone(&store),
        registry: Arc::clone(&registry),
        link: ingestion.subscribe_state(),
        stats: ingestion.stats(),
        settings: SessionSettings::from(&config.server),
    };
    let router = server::build_router(state, &config.server.path);

    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Dashboards connect to ws://{}{}", addr, config.server.path);

    let mut ingest_task = tokio::spawn(ingestion.run(shutdown_rx.clone()));
    let server_task = tokio::spawn(server::serve(listener, router, shutdown_rx));

    info!("Press Ctrl+C to exit");

    let mut startup_error = None;
    tokio::select! {
        result = &mut ingest_task => {
            match result {
                Ok(Ok(())) => warn!("Ingestion stopped unexpectedly"),
                Ok(Err(e)) => {
                    error!("Ingestion failed: {}", e);
                    startup_error = Some(anyhow::Error::new(e));
                }
                Err(e) => error!("Ingestion task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    let _ = shutdown_tx.send(true);
    let closed = registry.close_all();
    info!("Closed {} client sessions", closed);

    if !ingest_task.is_finished() {
        if let Err(e) = ingest_task.await {
            error!("Ingestion task panicked: {}", e);
        }
    }
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{}", e),
        Err(e) => error!("Server task panicked: {}", e),
    }

    match startup_error {
        Some(e) => Err(e.context("Sensor unavailable")),
        None => Ok(()),
    }
}

/// Load `path` if given, else `default_path` if it exists, else built-in defaults
fn load_config(path: Option<String>, default_path: &Path) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(&path).with_context(|| format!("Failed to load config from {}", path));
    }

    if default_path.exists() {
        return Config::load(default_path)
            .with_context(|| format!("Failed to load config from {}", default_path.display()));
    }

    Ok(Config::default())
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `logging.level`. The returned guard must
/// stay alive for buffered file output to be flushed.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log filter")?;

    if logging.dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    }

    let appender = tracing_appender::rolling::daily(&logging.dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}
