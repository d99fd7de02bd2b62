//! Building context integration tests
//!
//! Wires every component through one context, including SQLite persistence
//! across restarts and configuration resolution.
//!
//! Note: tests that set SPATIAL_RECON_CONFIG are marked #[serial].

mod helpers;

use helpers::{wait_until, RecordingUpdater};
use serial_test::serial;
use spatial_common::db::SqliteStore;
use spatial_common::models::{AnchorState, ARChange, ConfidenceLevel, ScanType, ScannedRegion};
use spatial_common::{Bounds2D, Point2D, Point3D, Quaternion};
use spatial_recon::config::CONFIG_ENV_VAR;
use spatial_recon::{BuildingContext, ReconConfig, Stores};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(building: &str) -> ReconConfig {
    let mut config = ReconConfig::default();
    config.building.id = building.to_string();
    config.coverage.total_area = 1000.0;
    config
}

#[tokio::test]
async fn test_change_flows_through_every_component() {
    let mut config = config("HQ");
    config.sync.sync_interval_secs = 1;
    config.sync.time_threshold_secs = 0;

    let updater = Arc::new(RecordingUpdater::default());
    let context = BuildingContext::new(&config, updater.clone()).unwrap();
    context.start().await.unwrap();
    context.sync().register_session("tablet-1").await.unwrap();

    let anchor = context
        .anchors()
        .create_anchor(Point3D::ORIGIN, Point3D::new(5.0, 5.0, 0.0), Quaternion::IDENTITY, 0.95)
        .await
        .unwrap();

    let mut change = ARChange::moved(
        "tablet-1",
        "VAV-12",
        Point3D::ORIGIN,
        Point3D::new(0.5, 0.0, 0.0),
        0.92,
    )
    .with_anchor(&anchor.id);
    context.sync().record_change(&mut change).await.unwrap();

    let synced = wait_until(Duration::from_secs(5), || {
        let updater = Arc::clone(&updater);
        async move { updater.applied().len() == 1 }
    })
    .await;
    assert!(synced, "change never reached the building model");
    assert_eq!(
        updater.applied()[0].new_position,
        Some(Point3D::new(5.5, 5.0, 0.0))
    );

    let record = context.confidence().get_record("VAV-12").await.unwrap();
    assert_eq!(record.position.level, ConfidenceLevel::High);

    context.close().await;
}

#[tokio::test]
async fn test_sqlite_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("recon.db");
    let config = config("HQ");

    let anchor_id = {
        let store = Arc::new(SqliteStore::open(&db_path).await.unwrap());
        let context = BuildingContext::with_stores(
            &config,
            Arc::new(RecordingUpdater::default()),
            Stores::shared(store),
        )
        .unwrap();

        let bounds = Bounds2D::new(Point2D::new(0.0, 0.0), Point2D::new(10.0, 10.0));
        context
            .coverage()
            .add_scanned_region(ScannedRegion::rectangle("HQ", bounds, ScanType::Lidar))
            .await
            .unwrap();
        let anchor = context
            .anchors()
            .create_anchor(Point3D::ORIGIN, Point3D::new(1.0, 2.0, 0.0), Quaternion::IDENTITY, 0.9)
            .await
            .unwrap();
        context.anchors().update_anchor_confidence(&anchor.id, 0.1).await.unwrap();
        anchor.id
    };

    let store = Arc::new(SqliteStore::open(&db_path).await.unwrap());
    let context = BuildingContext::with_stores(
        &config,
        Arc::new(RecordingUpdater::default()),
        Stores::shared(store),
    )
    .unwrap();
    assert_eq!(context.restore().await.unwrap(), (1, 1));

    assert!((context.coverage().get_coverage_percentage().await - 10.0).abs() < 1e-9);
    let anchor = context.anchors().get_anchor(&anchor_id).await.unwrap();
    assert_eq!(anchor.state, AnchorState::Lost);
}

#[tokio::test]
async fn test_other_buildings_not_restored() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("recon.db");
    let store = Arc::new(SqliteStore::open(&db_path).await.unwrap());

    let hq = BuildingContext::with_stores(
        &config("HQ"),
        Arc::new(RecordingUpdater::default()),
        Stores::shared(Arc::clone(&store)),
    )
    .unwrap();
    hq.anchors()
        .create_anchor(Point3D::ORIGIN, Point3D::ORIGIN, Quaternion::IDENTITY, 0.9)
        .await
        .unwrap();

    let annex = BuildingContext::with_stores(
        &config("ANNEX"),
        Arc::new(RecordingUpdater::default()),
        Stores::shared(store),
    )
    .unwrap();
    assert_eq!(annex.restore().await.unwrap(), (0, 0));
}

#[test]
#[serial]
fn test_config_from_environment() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("recon.toml");
    std::fs::write(
        &path,
        r#"
        [building]
        id = "WAREHOUSE"
        floor_height = 4.5

        [sync]
        batch_size = 10
        "#,
    )
    .unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &path);
    let resolved = ReconConfig::resolve_path(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved.as_deref(), Some(path.as_path()));
    let config = ReconConfig::load(resolved.as_deref()).unwrap();
    assert_eq!(config.building.id, "WAREHOUSE");
    assert_eq!(config.building.translator.floor_height, 4.5);
    assert_eq!(config.sync.batch_size, 10);
    assert_eq!(config.sync.sync_interval_secs, 30);
}

#[test]
#[serial]
fn test_cli_path_beats_environment() {
    let temp_dir = TempDir::new().unwrap();
    let cli = temp_dir.path().join("cli.toml");

    std::env::set_var(CONFIG_ENV_VAR, temp_dir.path().join("env.toml"));
    let resolved = ReconConfig::resolve_path(Some(cli.as_path()));
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(cli));
}

#[test]
fn test_missing_file_loads_defaults_and_invalid_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    assert_eq!(ReconConfig::load(Some(missing.as_path())).unwrap(), ReconConfig::default());

    let invalid = temp_dir.path().join("invalid.toml");
    std::fs::write(&invalid, "[sync]\nbatch_size = 0\n").unwrap();
    assert!(ReconConfig::load(Some(invalid.as_path())).is_err());
}

#[test]
fn test_default_config_round_trips_through_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("written.toml");
    let mut config = config("HQ");
    config.database_path = Some(temp_dir.path().join("recon.db"));

    config.write(&path).unwrap();
    assert_eq!(ReconConfig::load(Some(path.as_path())).unwrap(), config);
}
