//! Gatewatch runtime
//!
//! Orchestrates the full service:
//! - Opens the SQLite record store (schema applied on open)
//! - Loads the resume cursor
//! - Spawns the Jetstream client and the ingestion task
//! - Serves the stats API until CTRL+C or an ingestion failure
//!
//! Usage:
//!   cargo run --release --bin gatewatch
//!
//! Environment variables:
//!   GATEWATCH_DB_PATH - SQLite database path (default: :memory:)
//!   GATEWATCH_CURSOR_PATH - Resume cursor file (default: cursor.txt)
//!   PORT - HTTP port (default: 3000)
//!   JETSTREAM_URL - Jetstream subscribe endpoint
//!   RUST_LOG - Log filter (default: info)
//!   STREAMER_CHANNEL_BUFFER - Channel size (default: 10000)

use dotenv::dotenv;
use gatewatch::api::{build_app, AppState};
use gatewatch::persistence::{load_cursor, save_cursor};
use gatewatch::pipeline::{
    config::PipelineConfig,
    db::{RecordStore, SqliteRecordStore},
    ingestion::start_pipeline_ingestion,
    types::IncomingEvent,
    PipelineResult,
};
use gatewatch::streamer_core::{run_with_reconnect, RuntimeConfig};
use log::{error, info, warn};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    let runtime_config = RuntimeConfig::from_env()?;
    env_logger::Builder::new()
        .parse_filters(&runtime_config.rust_log)
        .init();

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("⚠️  rustls crypto provider already installed");
    }

    info!("🚀 Gatewatch");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Arc::new(PipelineConfig::from_env());

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Cursor file: {}", config.cursor_path);
    info!("   ├─ Jetstream: {}", runtime_config.jetstream_url);
    info!("   ├─ Log filter: {}", runtime_config.rust_log);
    info!("   ├─ Channel buffer: {} events", config.channel_buffer);
    info!("   └─ HTTP: {}", config.socket_addr());

    // Initialize store
    info!("🔧 Initializing database...");
    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::open(&config.db_path)?);
    info!("✅ Database initialized");

    let cursor = Arc::new(AtomicI64::new(load_cursor(&config.cursor_path)?));

    // Create event channel
    let (tx, rx) = mpsc::channel::<IncomingEvent>(config.channel_buffer);

    // Task 1: Jetstream client
    let client_cursor = cursor.clone();
    let client: JoinHandle<()> = tokio::spawn(async move {
        if let Err(e) = run_with_reconnect(&runtime_config, client_cursor, tx).await {
            error!("❌ Jetstream client stopped: {}", e);
        }
    });

    // Task 2: Ingestion
    let (ingestion_done_tx, ingestion_done_rx) = oneshot::channel::<()>();
    let ingestion_store = store.clone();
    let ingestion_cursor = cursor.clone();
    let ingestion: JoinHandle<PipelineResult<_>> = tokio::spawn(async move {
        let result = start_pipeline_ingestion(rx, ingestion_store, ingestion_cursor).await;
        let _ = ingestion_done_tx.send(());
        result
    });
    info!("✅ Jetstream client and ingestion spawned");

    // HTTP server, stopped by CTRL+C or ingestion exit
    let app = build_app(AppState {
        store: store.clone(),
        config: config.clone(),
    });
    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    info!("🌐 Listening on http://{}", listener.local_addr()?);
    info!("🔄 Press CTRL+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        info!("");
                        info!("⚠️  Received CTRL+C, shutting down...");
                    }
                    Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
                },
                _ = ingestion_done_rx => warn!("⚠️  Ingestion stopped, shutting down..."),
            }
        })
        .await?;

    // Cleanup: stopping the client drops tx, which closes the channel and
    // lets ingestion drain what is already buffered
    client.abort();
    let _ = client.await;

    let mut exit_error: Option<Box<dyn std::error::Error>> = None;
    match ingestion.await {
        Ok(Ok(summary)) => info!(
            "✅ Ingestion drained (stored: {}, dropped: {})",
            summary.stored, summary.dropped
        ),
        Ok(Err(e)) => {
            error!("❌ Ingestion failed: {}", e);
            exit_error = Some(e.into());
        }
        Err(e) => {
            error!("❌ Ingestion task panicked: {}", e);
            exit_error = Some(e.into());
        }
    }

    let final_cursor = cursor.load(Ordering::SeqCst);
    save_cursor(&config.cursor_path, final_cursor)?;
    info!("💾 Cursor saved: {}", final_cursor);

    info!("✅ Gatewatch stopped");
    match exit_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
