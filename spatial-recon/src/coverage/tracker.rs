//! Coverage Tracker
//!
//! Records which parts of a building have been physically scanned and
//! answers coverage questions over them. Geometry is deliberately coarse:
//! containment and merging work on bounding boxes, and gap detection works
//! on a 1 m grid.

use super::gaps::unscanned_areas;
use super::GeometryProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spatial_common::db::RegionStore;
use spatial_common::events::{EventBus, SpatialEvent};
use spatial_common::models::{ConfidenceLevel, ScannedRegion};
use spatial_common::{time, uuid_utils, Bounds2D, Error, Point2D, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Most floors reported by `get_coverage_by_floor`
pub const MAX_FLOORS: i32 = 500;

/// Coverage tracking parameters (`[coverage]` config section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageSettings {
    /// Total floor area in square meters; 0 means unknown
    pub total_area: f64,
    /// Floor-plan outline; defaults to a square of equal area at the origin
    pub footprint: Option<Bounds2D>,
    /// Vertex distance under which two regions are treated as overlapping (m)
    pub overlap_tolerance: f64,
    /// Cell edge length for gap detection (m)
    pub gap_cell_size: f64,
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            total_area: 0.0,
            footprint: None,
            overlap_tolerance: 0.10,
            gap_cell_size: 1.0,
        }
    }
}

/// Point-in-time view of a building's coverage
#[derive(Debug, Clone, Serialize)]
pub struct CoverageMap {
    pub building_id: String,
    pub total_area: f64,
    pub footprint: Option<Bounds2D>,
    /// Ordered by scan date
    pub regions: Vec<ScannedRegion>,
    pub coverage_percentage: f64,
}

struct CoverageState {
    regions: HashMap<String, ScannedRegion>,
    total_area: f64,
    footprint: Option<Bounds2D>,
    floor_height: f64,
}

impl CoverageState {
    fn coverage_percentage(&self) -> f64 {
        if self.total_area <= 0.0 {
            return 0.0;
        }
        let scanned: f64 = self.regions.values().map(|r| r.area()).sum();
        (scanned / self.total_area * 100.0).clamp(0.0, 100.0)
    }

    fn effective_footprint(&self) -> Option<Bounds2D> {
        self.footprint.or_else(|| {
            (self.total_area > 0.0).then(|| {
                let side = self.total_area.sqrt();
                Bounds2D::new(Point2D::new(0.0, 0.0), Point2D::new(side, side))
            })
        })
    }

    fn overlapping(&self, region: &ScannedRegion, tolerance: f64) -> Vec<String> {
        let mut ids: Vec<String> = self
            .regions
            .values()
            .filter(|existing| vertices_touch(&existing.boundary, &region.boundary, tolerance))
            .map(|existing| existing.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Scanned-region bookkeeping for one building
pub struct CoverageTracker {
    building_id: String,
    settings: CoverageSettings,
    state: RwLock<CoverageState>,
    store: Option<Arc<dyn RegionStore>>,
    events: Option<Arc<EventBus>>,
}

impl CoverageTracker {
    /// # Arguments
    /// * `building_id` - Building every added region must belong to
    /// * `settings` - Initial geometry and tolerances
    /// * `floor_height` - Storey height used for per-floor breakdowns (m)
    pub fn new(
        building_id: impl Into<String>,
        settings: CoverageSettings,
        floor_height: f64,
    ) -> Result<Self> {
        let building_id = building_id.into();
        if building_id.trim().is_empty() {
            return Err(Error::validation("building ID must not be empty"));
        }
        validate_total_area(settings.total_area)?;
        validate_floor_height(floor_height)?;
        if settings.overlap_tolerance.is_nan() || settings.overlap_tolerance < 0.0 {
            return Err(Error::validation("overlap tolerance must be non-negative"));
        }
        if settings.gap_cell_size.is_nan() || settings.gap_cell_size <= 0.0 {
            return Err(Error::validation("gap cell size must be positive"));
        }

        let state = CoverageState {
            regions: HashMap::new(),
            total_area: settings.total_area,
            footprint: settings.footprint,
            floor_height,
        };
        Ok(Self {
            building_id,
            settings,
            state: RwLock::new(state),
            store: None,
            events: None,
        })
    }

    /// Mirror region changes into `store`
    pub fn with_store(mut self, store: Arc<dyn RegionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn building_id(&self) -> &str {
        &self.building_id
    }

    /// Store a scanned region, merging it with any region it overlaps
    ///
    /// # Returns
    /// ID of the stored region. When overlaps were found this is the ID of
    /// the new merged region, not the submitted one.
    ///
    /// # Errors
    /// `Validation` if the region belongs to another building, has fewer
    /// than three vertices, carries non-finite numbers, or reuses the ID of
    /// a stored region.
    pub async fn add_scanned_region(&self, mut region: ScannedRegion) -> Result<String> {
        self.validate_region(&region)?;
        if region.id.trim().is_empty() {
            region.id = uuid_utils::generate_id();
        }

        let (stored, merged_from, coverage) = {
            let mut state = self.state.write().await;
            if state.regions.contains_key(&region.id) {
                return Err(Error::validation(format!(
                    "region '{}' already exists; stored regions are superseded, not replaced",
                    region.id
                )));
            }
            let overlapping = state.overlapping(&region, self.settings.overlap_tolerance);

            let stored = if overlapping.is_empty() {
                region
            } else {
                let mut parts: Vec<ScannedRegion> = overlapping
                    .iter()
                    .filter_map(|id| state.regions.get(id).cloned())
                    .collect();
                parts.push(region);
                let merged = merge_all(&self.building_id, &parts)?;
                for id in &overlapping {
                    state.regions.remove(id);
                }
                merged
            };

            state.regions.insert(stored.id.clone(), stored.clone());
            (stored, overlapping, state.coverage_percentage())
        };

        if merged_from.is_empty() {
            debug!("Region {} added to {} ({:.1}%)", stored.id, self.building_id, coverage);
        } else {
            info!(
                "Region {} merged from {} overlapping region(s) in {}",
                stored.id,
                merged_from.len(),
                self.building_id
            );
        }

        self.persist(Some(&stored), &merged_from).await;
        self.emit_region_added(&stored.id, merged_from, coverage);
        Ok(stored.id)
    }

    /// Scanned share of the building's total area, in percent
    ///
    /// Returns 0.0 while the total area is unknown.
    pub async fn get_coverage_percentage(&self) -> f64 {
        self.state.read().await.coverage_percentage()
    }

    /// Confidence of the most recently scanned region containing `point`
    ///
    /// Containment is tested against region bounding boxes. Points outside
    /// every region are `Estimated`.
    pub async fn get_region_confidence(&self, point: Point2D) -> ConfidenceLevel {
        let state = self.state.read().await;
        state
            .regions
            .values()
            .filter(|r| r.bounds().is_some_and(|b| b.contains(&point)))
            .max_by_key(|r| r.scan_date)
            .map(|r| r.derived_confidence())
            .unwrap_or(ConfidenceLevel::Estimated)
    }

    /// Coarse extents of the footprint that no region covers
    pub async fn get_unscanned_areas(&self) -> Vec<Bounds2D> {
        let state = self.state.read().await;
        let Some(footprint) = state.effective_footprint() else {
            return Vec::new();
        };
        let scanned: Vec<Bounds2D> = state.regions.values().filter_map(|r| r.bounds()).collect();
        unscanned_areas(&footprint, &scanned, self.settings.gap_cell_size)
    }

    /// Coverage percentage per floor index
    ///
    /// Every floor is assumed to hold an equal share of the total area. The
    /// floor count is `ceil(max z_max / floor_height)`, between one and
    /// [`MAX_FLOORS`]. A region counts toward every floor its Z extent
    /// reaches into.
    pub async fn get_coverage_by_floor(&self) -> BTreeMap<i32, f64> {
        let state = self.state.read().await;
        let floor_height = state.floor_height;
        let max_z = state
            .regions
            .values()
            .map(|r| r.z_max)
            .fold(0.0_f64, f64::max);
        let needed = (max_z / floor_height).ceil();
        if needed > MAX_FLOORS as f64 {
            warn!(
                "Regions in {} reach z = {} m; reporting the first {} floors only",
                self.building_id, max_z, MAX_FLOORS
            );
        }
        let floors = needed.clamp(1.0, MAX_FLOORS as f64) as i32;
        let floor_area = state.total_area / floors as f64;

        (0..floors)
            .map(|floor| {
                let bottom = floor as f64 * floor_height;
                let top = bottom + floor_height;
                let scanned: f64 = state
                    .regions
                    .values()
                    .filter(|r| spans_floor(r, bottom, top))
                    .map(|r| r.area())
                    .sum();
                (floor, percentage(scanned, floor_area))
            })
            .collect()
    }

    /// Coverage percentage contributed by each scan type, keyed by type tag
    pub async fn get_coverage_by_scan_type(&self) -> BTreeMap<String, f64> {
        let state = self.state.read().await;
        let mut areas: BTreeMap<String, f64> = BTreeMap::new();
        for region in state.regions.values() {
            *areas.entry(region.scan_type.to_string()).or_insert(0.0) += region.area();
        }
        areas
            .into_iter()
            .map(|(scan_type, area)| (scan_type, percentage(area, state.total_area)))
            .collect()
    }

    /// Consolidate the named regions into one bounding-box region
    ///
    /// # Errors
    /// `Validation` for fewer than two distinct IDs; `NotFound` if any ID is
    /// unknown. Nothing is changed on error.
    pub async fn merge_regions(&self, ids: &[String]) -> Result<String> {
        let mut unique: Vec<String> = ids.to_vec();
        unique.sort();
        unique.dedup();
        if unique.len() < 2 {
            return Err(Error::validation("merging requires at least two distinct regions"));
        }

        let (merged, coverage) = {
            let mut state = self.state.write().await;
            if let Some(missing) = unique.iter().find(|id| !state.regions.contains_key(*id)) {
                return Err(Error::not_found("region", missing));
            }
            let parts: Vec<ScannedRegion> = unique
                .iter()
                .filter_map(|id| state.regions.get(id).cloned())
                .collect();
            let merged = merge_all(&self.building_id, &parts)?;
            for id in &unique {
                state.regions.remove(id);
            }
            state.regions.insert(merged.id.clone(), merged.clone());
            (merged, state.coverage_percentage())
        };

        info!("Merged {} regions into {}", unique.len(), merged.id);
        self.persist(Some(&merged), &unique).await;
        self.emit_region_added(&merged.id, unique, coverage);
        Ok(merged.id)
    }

    /// Amend the capture confidence of a stored region
    pub async fn update_region_confidence(&self, region_id: &str, confidence: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::validation(format!(
                "region confidence must be within [0, 1], got {}",
                confidence
            )));
        }

        let updated = {
            let mut state = self.state.write().await;
            let region = state
                .regions
                .get_mut(region_id)
                .ok_or_else(|| Error::not_found("region", region_id))?;
            region.confidence = confidence;
            region.clone()
        };

        debug!("Region {} confidence set to {:.2}", region_id, confidence);
        self.persist(Some(&updated), &[]).await;
        Ok(())
    }

    pub async fn get_region(&self, region_id: &str) -> Result<ScannedRegion> {
        self.state
            .read()
            .await
            .regions
            .get(region_id)
            .cloned()
            .ok_or_else(|| Error::not_found("region", region_id))
    }

    pub async fn region_count(&self) -> usize {
        self.state.read().await.regions.len()
    }

    pub async fn coverage_map(&self) -> CoverageMap {
        let state = self.state.read().await;
        let mut regions: Vec<ScannedRegion> = state.regions.values().cloned().collect();
        regions.sort_by(|a, b| a.scan_date.cmp(&b.scan_date).then_with(|| a.id.cmp(&b.id)));
        CoverageMap {
            building_id: self.building_id.clone(),
            total_area: state.total_area,
            footprint: state.footprint,
            regions,
            coverage_percentage: state.coverage_percentage(),
        }
    }

    pub async fn set_total_area(&self, total_area: f64) -> Result<()> {
        validate_total_area(total_area)?;
        self.state.write().await.total_area = total_area;
        info!("Total area of {} set to {:.1} m2", self.building_id, total_area);
        Ok(())
    }

    pub async fn set_footprint(&self, footprint: Option<Bounds2D>) {
        self.state.write().await.footprint = footprint;
    }

    pub async fn set_floor_height(&self, floor_height: f64) -> Result<()> {
        validate_floor_height(floor_height)?;
        self.state.write().await.floor_height = floor_height;
        Ok(())
    }

    /// Pull total area and footprint from `provider`
    pub async fn refresh_geometry(&self, provider: &dyn GeometryProvider) -> Result<()> {
        let total_area = provider.total_area(&self.building_id).await?;
        validate_total_area(total_area)?;
        let footprint = provider.footprint(&self.building_id).await?;

        let mut state = self.state.write().await;
        state.total_area = total_area;
        if footprint.is_some() {
            state.footprint = footprint;
        }
        debug!("Geometry refreshed for {}: {:.1} m2", self.building_id, total_area);
        Ok(())
    }

    /// Restore persisted regions for this building
    ///
    /// Loaded regions are inserted as-is; they were already merged when first
    /// added. Returns the number of regions restored.
    pub async fn load_from_store(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let loaded = store.load_regions(&self.building_id).await?;
        let count = loaded.len();

        let mut state = self.state.write().await;
        for region in loaded {
            state.regions.insert(region.id.clone(), region);
        }
        info!("Restored {} scanned region(s) for {}", count, self.building_id);
        Ok(count)
    }

    fn validate_region(&self, region: &ScannedRegion) -> Result<()> {
        if region.building_id != self.building_id {
            return Err(Error::validation(format!(
                "region belongs to building '{}', tracker is for '{}'",
                region.building_id, self.building_id
            )));
        }
        if region.boundary.len() < 3 {
            return Err(Error::validation(format!(
                "region boundary needs at least 3 points, got {}",
                region.boundary.len()
            )));
        }
        let finite = region.boundary.iter().all(|p| p.x.is_finite() && p.y.is_finite())
            && region.z_min.is_finite()
            && region.z_max.is_finite();
        if !finite {
            return Err(Error::validation("region geometry contains non-finite values"));
        }
        if !(0.0..=1.0).contains(&region.confidence) {
            return Err(Error::validation("region confidence must be within [0, 1]"));
        }
        Ok(())
    }

    async fn persist(&self, saved: Option<&ScannedRegion>, removed: &[String]) {
        let Some(store) = &self.store else {
            return;
        };
        for id in removed {
            if let Err(e) = store.delete_region(id).await {
                warn!("Failed to delete superseded region {}: {}", id, e);
            }
        }
        if let Some(region) = saved {
            if let Err(e) = store.save_region(region).await {
                warn!("Failed to persist region {}: {}", region.id, e);
            }
        }
    }

    fn emit_region_added(&self, region_id: &str, merged_from: Vec<String>, coverage: f64) {
        if let Some(events) = &self.events {
            events.emit_lossy(SpatialEvent::RegionAdded {
                building_id: self.building_id.clone(),
                region_id: region_id.to_string(),
                merged_from,
                coverage_percentage: coverage,
                timestamp: time::now(),
            });
        }
    }
}

/// Whether any vertex of `a` lies within `tolerance` of any vertex of `b`
fn vertices_touch(a: &[Point2D], b: &[Point2D], tolerance: f64) -> bool {
    a.iter()
        .any(|p| b.iter().any(|q| p.distance_to(q) <= tolerance))
}

/// Bounding-box union of `parts`
///
/// Z extent is the union, confidence and density the maximum, and the scan
/// date and type come from the most recent part (later parts win ties).
fn merge_all(building_id: &str, parts: &[ScannedRegion]) -> Result<ScannedRegion> {
    let points: Vec<Point2D> = parts.iter().flat_map(|r| r.boundary.iter().copied()).collect();
    let bounds = Bounds2D::from_points(&points)
        .ok_or_else(|| Error::validation("cannot merge regions without vertices"))?;

    let latest = parts
        .iter()
        .max_by_key(|r| r.scan_date)
        .ok_or_else(|| Error::validation("cannot merge an empty region set"))?;
    let scan_date: DateTime<Utc> = latest.scan_date;

    let z_min = parts.iter().map(|r| r.z_min).fold(f64::INFINITY, f64::min);
    let z_max = parts.iter().map(|r| r.z_max).fold(f64::NEG_INFINITY, f64::max);
    let confidence = parts.iter().map(|r| r.confidence).fold(0.0, f64::max);
    let density = parts.iter().map(|r| r.point_density).fold(0.0, f64::max);

    Ok(ScannedRegion::rectangle(building_id, bounds, latest.scan_type.clone())
        .with_z_extent(z_min, z_max)
        .with_scan_date(scan_date)
        .with_confidence(confidence)
        .with_point_density(density))
}

fn spans_floor(region: &ScannedRegion, bottom: f64, top: f64) -> bool {
    if region.z_max <= region.z_min {
        region.z_min >= bottom && region.z_min < top
    } else {
        region.z_min < top && region.z_max > bottom
    }
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    (part / whole * 100.0).clamp(0.0, 100.0)
}

fn validate_total_area(total_area: f64) -> Result<()> {
    if !total_area.is_finite() || total_area < 0.0 {
        return Err(Error::validation(format!(
            "total area must be a non-negative number, got {}",
            total_area
        )));
    }
    Ok(())
}

fn validate_floor_height(floor_height: f64) -> Result<()> {
    if !floor_height.is_finite() || floor_height <= 0.0 {
        return Err(Error::validation(format!(
            "floor height must be positive, got {}",
            floor_height
        )));
    }
    Ok(())
}
