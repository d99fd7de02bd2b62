//! SQLite-backed region and anchor store
//!
//! Rows carry the indexed keys as columns and the full model as a JSON
//! document, so model fields can evolve without schema migrations.

use super::{AnchorStore, RegionStore};
use crate::models::{ScannedRegion, SpatialAnchor};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

/// Durable store on top of a SQLite connection pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and ensure the schema exists
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new spatial database: {}", db_path.display());
        } else {
            info!("Opened existing spatial database: {}", db_path.display());
        }

        // WAL allows concurrent readers alongside the single writer
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database (single connection, never recycled)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables if they don't exist (idempotent)
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scanned_regions (
                id TEXT PRIMARY KEY,
                building_id TEXT NOT NULL,
                scan_date TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scanned_regions_building ON scanned_regions(building_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS spatial_anchors (
                id TEXT PRIMARY KEY,
                building_id TEXT NOT NULL,
                state TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_spatial_anchors_building ON spatial_anchors(building_id)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Spatial store schema ready");
        Ok(())
    }
}

#[async_trait]
impl RegionStore for SqliteStore {
    async fn save_region(&self, region: &ScannedRegion) -> Result<()> {
        let data = serde_json::to_string(region)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO scanned_regions (id, building_id, scan_date, data, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(&region.id)
        .bind(&region.building_id)
        .bind(region.scan_date.to_rfc3339())
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_regions(&self, building_id: &str) -> Result<Vec<ScannedRegion>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM scanned_regions WHERE building_id = ? ORDER BY scan_date ASC",
        )
        .bind(building_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(data,)| serde_json::from_str::<ScannedRegion>(&data).map_err(Error::from))
            .collect()
    }

    async fn delete_region(&self, region_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scanned_regions WHERE id = ?")
            .bind(region_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AnchorStore for SqliteStore {
    async fn save_anchor(&self, anchor: &SpatialAnchor) -> Result<()> {
        let data = serde_json::to_string(anchor)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO spatial_anchors (id, building_id, state, data, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(&anchor.id)
        .bind(&anchor.building_id)
        .bind(anchor.state.as_str())
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_anchors(&self, building_id: &str) -> Result<Vec<SpatialAnchor>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM spatial_anchors WHERE building_id = ? ORDER BY id ASC")
                .bind(building_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(data,)| serde_json::from_str::<SpatialAnchor>(&data).map_err(Error::from))
            .collect()
    }

    async fn delete_anchor(&self, anchor_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM spatial_anchors WHERE id = ?")
            .bind(anchor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
