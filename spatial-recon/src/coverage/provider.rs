//! Building geometry source for the coverage tracker

use async_trait::async_trait;
use spatial_common::{Bounds2D, Result};

/// Supplies the floor area and outline of a building
///
/// Implemented by whatever owns the building model (BIM service, site
/// database). The tracker only asks; it never caches beyond the last refresh.
#[async_trait]
pub trait GeometryProvider: Send + Sync {
    /// Total floor area in square meters
    async fn total_area(&self, building_id: &str) -> Result<f64>;

    /// Floor-plan bounding box, if the building has a known outline
    async fn footprint(&self, building_id: &str) -> Result<Option<Bounds2D>>;
}

/// Fixed geometry, typically taken from the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticGeometry {
    pub total_area: f64,
    pub footprint: Option<Bounds2D>,
}

impl StaticGeometry {
    pub fn new(total_area: f64, footprint: Option<Bounds2D>) -> Self {
        Self { total_area, footprint }
    }
}

#[async_trait]
impl GeometryProvider for StaticGeometry {
    async fn total_area(&self, _building_id: &str) -> Result<f64> {
        Ok(self.total_area)
    }

    async fn footprint(&self, _building_id: &str) -> Result<Option<Bounds2D>> {
        Ok(self.footprint)
    }
}
