//! In-process store, used in tests and when no database is configured

use super::{AnchorStore, RegionStore};
use crate::models::{ScannedRegion, SpatialAnchor};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// HashMap-backed region and anchor store
#[derive(Default)]
pub struct InMemoryStore {
    regions: RwLock<HashMap<String, ScannedRegion>>,
    anchors: RwLock<HashMap<String, SpatialAnchor>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn region_count(&self) -> usize {
        self.regions.read().await.len()
    }

    pub async fn anchor_count(&self) -> usize {
        self.anchors.read().await.len()
    }
}

#[async_trait]
impl RegionStore for InMemoryStore {
    async fn save_region(&self, region: &ScannedRegion) -> Result<()> {
        self.regions
            .write()
            .await
            .insert(region.id.clone(), region.clone());
        Ok(())
    }

    async fn load_regions(&self, building_id: &str) -> Result<Vec<ScannedRegion>> {
        let regions = self.regions.read().await;
        let mut found: Vec<ScannedRegion> = regions
            .values()
            .filter(|r| r.building_id == building_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.scan_date.cmp(&b.scan_date));
        Ok(found)
    }

    async fn delete_region(&self, region_id: &str) -> Result<()> {
        self.regions.write().await.remove(region_id);
        Ok(())
    }
}

#[async_trait]
impl AnchorStore for InMemoryStore {
    async fn save_anchor(&self, anchor: &SpatialAnchor) -> Result<()> {
        self.anchors
            .write()
            .await
            .insert(anchor.id.clone(), anchor.clone());
        Ok(())
    }

    async fn load_anchors(&self, building_id: &str) -> Result<Vec<SpatialAnchor>> {
        let anchors = self.anchors.read().await;
        Ok(anchors
            .values()
            .filter(|a| a.building_id == building_id)
            .cloned()
            .collect())
    }

    async fn delete_anchor(&self, anchor_id: &str) -> Result<()> {
        self.anchors.write().await.remove(anchor_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Bounds2D, Point2D};
    use crate::models::ScanType;

    #[tokio::test]
    async fn test_regions_are_scoped_by_building() {
        let store = InMemoryStore::new();
        let bounds = Bounds2D::new(Point2D::new(0.0, 0.0), Point2D::new(2.0, 2.0));
        let a = ScannedRegion::rectangle("B1", bounds, ScanType::Lidar);
        let b = ScannedRegion::rectangle("B2", bounds, ScanType::Lidar);
        store.save_region(&a).await.unwrap();
        store.save_region(&b).await.unwrap();

        let loaded = store.load_regions("B1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, a.id);

        store.delete_region(&a.id).await.unwrap();
        store.delete_region("missing").await.unwrap();
        assert_eq!(store.region_count().await, 1);
    }
}
