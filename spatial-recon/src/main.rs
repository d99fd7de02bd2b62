//! Spatial reconciliation daemon (spatial-recon) - Main entry point
//!
//! Reads AR change reports as JSON lines on stdin, records them against one
//! session of one building, and syncs accepted changes on the configured
//! cadence. The building-model side is a logging updater; real deployments
//! embed the library with their own `BimUpdater`.
//!
//! Input line format:
//!
//! ```json
//! {"equipment_id":"AHU-1","change_type":"move","old_position":{"x":0,"y":0,"z":0},
//!  "new_position":{"x":1.5,"y":0,"z":0},"confidence":0.9}
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use spatial_common::db::SqliteStore;
use spatial_common::events::SpatialEvent;
use spatial_common::models::{ARChange, ChangeType};
use spatial_common::{Point3D, Quaternion};
use spatial_recon::sync::LoggingUpdater;
use spatial_recon::{BuildingContext, ReconConfig, Stores};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for spatial-recon
#[derive(Parser, Debug)]
#[command(name = "spatial-recon")]
#[command(about = "Reconciles AR-observed equipment changes with the building model")]
#[command(version)]
struct Args {
    /// Config file (overrides SPATIAL_RECON_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// AR session the stdin changes belong to
    #[arg(short, long, default_value = "stdin", env = "SPATIAL_RECON_SESSION")]
    session: String,

    /// Log filter, e.g. "debug" or "spatial_recon=trace"
    #[arg(long, env = "SPATIAL_RECON_LOG")]
    log_level: Option<String>,

    /// SQLite database for regions and anchors (overrides database_path)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,
}

/// One change report on stdin
#[derive(Debug, Deserialize)]
struct ChangeInput {
    equipment_id: String,
    change_type: ChangeType,
    confidence: f64,
    #[serde(default)]
    old_position: Option<Point3D>,
    #[serde(default)]
    new_position: Option<Point3D>,
    #[serde(default)]
    old_rotation: Option<Quaternion>,
    #[serde(default)]
    new_rotation: Option<Quaternion>,
    #[serde(default)]
    anchor_id: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl ChangeInput {
    fn into_change(self, session_id: &str) -> ARChange {
        let mut change = ARChange::new(session_id, self.equipment_id, self.change_type, self.confidence);
        change.old_position = self.old_position;
        change.new_position = self.new_position;
        change.old_rotation = self.old_rotation;
        change.new_rotation = self.new_rotation;
        change.anchor_id = self.anchor_id;
        if let Some(timestamp) = self.timestamp {
            change.timestamp = timestamp;
        }
        change
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        ReconConfig::default()
            .write(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    // Config first so its logging section can seed the filter
    let config_path = ReconConfig::resolve_path(args.config.as_deref());
    let config = ReconConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(log_filter(args.log_level.as_deref(), &config.logging.level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting spatial-recon v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }
    info!("Building: {}", config.building.id);

    let database = args.database.clone().or_else(|| config.database_path.clone());
    let stores = match &database {
        Some(path) => {
            let store = SqliteStore::open(path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            info!("Database: {}", path.display());
            Stores::shared(Arc::new(store))
        }
        None => {
            info!("No database configured; state is in-memory only");
            Stores::default()
        }
    };

    let context = BuildingContext::with_stores(&config, Arc::new(LoggingUpdater), stores)
        .context("Failed to build reconciliation context")?;
    let (regions, anchors) = context.restore().await.context("Failed to restore state")?;
    info!("Restored {} region(s) and {} anchor(s)", regions, anchors);

    let event_logger = spawn_event_logger(&context);

    context.start().await.context("Failed to start sync engine")?;
    context
        .sync()
        .register_session(&args.session)
        .await
        .context("Failed to register session")?;

    read_changes(&context, &args.session).await?;

    // Flush whatever is still queued before shutting down
    let report = context.sync().sync_session(&args.session).await?;
    debug!("Final flush: {:?}", report);
    let status = context.sync().get_sync_status(&args.session).await?;
    info!(
        "Session {} done: {} applied, {} rejected, {} pending",
        status.session_id, status.applied, status.rejected, status.pending
    );

    context.close().await;
    context.sync().unregister_session(&args.session).await?;
    event_logger.abort();

    info!("Shutdown complete");
    Ok(())
}

/// `--log-level`, then `RUST_LOG`, then the config's `logging.level`
fn log_filter(cli_level: Option<&str>, config_level: &str) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(expand_level(level));
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(expand_level(config_level)))
}

/// Bare levels apply to this workspace's crates only
fn expand_level(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("spatial_recon={level},spatial_common={level}")
    }
}

async fn read_changes(context: &BuildingContext, session_id: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
        };
        let Some(line) = line else {
            info!("End of input");
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input: ChangeInput = match serde_json::from_str(line) {
            Ok(input) => input,
            Err(e) => {
                warn!("Skipping malformed change report: {}", e);
                continue;
            }
        };
        let mut change = input.into_change(session_id);
        match context.sync().record_change(&mut change).await {
            Ok(outcome) => info!(
                "Recorded {} {} ({:?} lane{})",
                change.change_type,
                change.equipment_id,
                outcome.lane,
                if outcome.critical { ", critical" } else { "" }
            ),
            Err(e) => warn!("Change for {} not recorded: {}", change.equipment_id, e),
        }
    }
}

fn spawn_event_logger(context: &BuildingContext) -> tokio::task::JoinHandle<()> {
    let mut rx = context.events().subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Event logger lagged; {} event(s) skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &SpatialEvent) {
    match serde_json::to_string(event) {
        Ok(json) => debug!(target: "spatial_recon::events", "{}", json),
        Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
    }
}
