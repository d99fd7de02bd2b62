//! Optional durability for scanned regions and spatial anchors
//!
//! The reconciliation components are in-memory; a store only mirrors their
//! state so it survives restarts. Components treat a missing store as
//! "in-memory only" and never call a store while holding their own lock.

mod memory;
#[cfg(feature = "sqlx")]
mod sqlite;

pub use memory::InMemoryStore;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteStore;

use crate::models::{ScannedRegion, SpatialAnchor};
use crate::Result;
use async_trait::async_trait;

/// Persistence for scanned regions
#[async_trait]
pub trait RegionStore: Send + Sync {
    /// Insert or replace a region
    async fn save_region(&self, region: &ScannedRegion) -> Result<()>;

    /// All regions stored for a building
    async fn load_regions(&self, building_id: &str) -> Result<Vec<ScannedRegion>>;

    /// Delete a region; deleting an unknown ID is not an error
    async fn delete_region(&self, region_id: &str) -> Result<()>;
}

/// Persistence for spatial anchors
#[async_trait]
pub trait AnchorStore: Send + Sync {
    /// Insert or replace an anchor
    async fn save_anchor(&self, anchor: &SpatialAnchor) -> Result<()>;

    /// All anchors stored for a building
    async fn load_anchors(&self, building_id: &str) -> Result<Vec<SpatialAnchor>>;

    /// Delete an anchor; deleting an unknown ID is not an error
    async fn delete_anchor(&self, anchor_id: &str) -> Result<()>;
}
