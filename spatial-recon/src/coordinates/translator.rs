//! Per-building coordinate translator
//!
//! Converts between four conventions:
//! - **Grid**: integer building-grid indices plus floor number
//! - **World/local**: meters in the building's local frame
//! - **GPS**: WGS84 degrees (planar approximation, building scale only)
//! - **AR**: device-local meters relative to a spatial anchor

use super::MovementThresholds;
use serde::{Deserialize, Serialize};
use spatial_common::{Error, GpsCoordinate, GridCoordinate, GridDelta, Point3D, Result};

/// Meters per degree of latitude used by the planar GPS approximation
pub const METERS_PER_DEGREE_LAT: f64 = 111_132.92;

/// Tolerance applied before flooring a floor index so that lattice points
/// survive floating-point error
const FLOOR_EPSILON: f64 = 1e-9;

/// Transform parameters for one building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSettings {
    /// Meters per grid unit
    pub grid_scale: f64,
    /// Meters per storey
    pub floor_height: f64,
    /// Grid rotation about Z, degrees from north
    pub rotation_degrees: f64,
    /// World position of grid (0, 0, floor 0)
    pub origin: Point3D,
    /// GPS position of the local origin; required for GPS conversions
    pub gps_origin: Option<GpsCoordinate>,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            grid_scale: 0.5,
            floor_height: 3.0,
            rotation_degrees: 0.0,
            origin: Point3D::ORIGIN,
            gps_origin: None,
        }
    }
}

/// Stateless-per-configuration transforms between coordinate spaces
#[derive(Debug, Clone, Default)]
pub struct CoordinateTranslator {
    settings: TranslatorSettings,
    thresholds: MovementThresholds,
}

impl CoordinateTranslator {
    /// Translator with default settings (0.5 m grid, 3.0 m floors)
    pub fn new() -> Self {
        Self::default()
    }

    /// Translator from explicit settings
    ///
    /// # Errors
    /// Returns `Validation` if grid scale or floor height is not positive.
    pub fn with_settings(settings: TranslatorSettings, thresholds: MovementThresholds) -> Result<Self> {
        validate_positive("grid scale", settings.grid_scale)?;
        validate_positive("floor height", settings.floor_height)?;
        Ok(Self { settings, thresholds })
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    pub fn thresholds(&self) -> MovementThresholds {
        self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: MovementThresholds) {
        self.thresholds = thresholds;
    }

    pub fn set_grid_scale(&mut self, grid_scale: f64) -> Result<()> {
        validate_positive("grid scale", grid_scale)?;
        self.settings.grid_scale = grid_scale;
        Ok(())
    }

    pub fn set_floor_height(&mut self, floor_height: f64) -> Result<()> {
        validate_positive("floor height", floor_height)?;
        self.settings.floor_height = floor_height;
        Ok(())
    }

    pub fn set_rotation(&mut self, rotation_degrees: f64) {
        self.settings.rotation_degrees = rotation_degrees;
    }

    pub fn set_origin(&mut self, origin: Point3D) {
        self.settings.origin = origin;
    }

    pub fn set_gps_origin(&mut self, gps_origin: GpsCoordinate) {
        self.settings.gps_origin = Some(gps_origin);
    }

    // ------------------------------------------------------------------
    // Grid <-> world
    // ------------------------------------------------------------------

    /// Grid indices to world meters: scale, rotate about Z, add origin
    pub fn grid_to_world(&self, x: i32, y: i32, floor: i32) -> Point3D {
        let s = &self.settings;
        let gx = x as f64 * s.grid_scale;
        let gy = y as f64 * s.grid_scale;
        let (sin, cos) = s.rotation_degrees.to_radians().sin_cos();

        Point3D::new(
            gx * cos - gy * sin + s.origin.x,
            gx * sin + gy * cos + s.origin.y,
            floor as f64 * s.floor_height + s.origin.z,
        )
    }

    /// World meters to the nearest grid index
    ///
    /// X/Y round to the nearest index. The floor is the storey containing
    /// the point, so equipment mounted high on a wall stays on its floor.
    pub fn world_to_grid(&self, point: Point3D) -> GridCoordinate {
        let s = &self.settings;
        let lx = point.x - s.origin.x;
        let ly = point.y - s.origin.y;
        let (sin, cos) = s.rotation_degrees.to_radians().sin_cos();

        // Inverse rotation (transpose of the rotation matrix)
        let ux = lx * cos + ly * sin;
        let uy = -lx * sin + ly * cos;

        let floor = ((point.z - s.origin.z) / s.floor_height + FLOOR_EPSILON).floor();

        GridCoordinate::new(
            (ux / s.grid_scale).round() as i32,
            (uy / s.grid_scale).round() as i32,
            floor as i32,
        )
    }

    // ------------------------------------------------------------------
    // GPS <-> local
    // ------------------------------------------------------------------

    /// GPS to local meters (x east, y north, z up) relative to the GPS origin
    ///
    /// Planar approximation; accurate only over building-scale extents.
    pub fn gps_to_local(&self, gps: GpsCoordinate) -> Result<Point3D> {
        let origin = self.require_gps_origin()?;
        let meters_per_degree_lon = METERS_PER_DEGREE_LAT * origin.latitude.to_radians().cos();

        Ok(Point3D::new(
            (gps.longitude - origin.longitude) * meters_per_degree_lon,
            (gps.latitude - origin.latitude) * METERS_PER_DEGREE_LAT,
            gps.altitude - origin.altitude,
        ))
    }

    /// Local meters back to GPS; inverse of [`gps_to_local`](Self::gps_to_local)
    ///
    /// At the poles the longitude scale collapses to zero; longitude is then
    /// reported as the origin's.
    pub fn local_to_gps(&self, local: Point3D) -> Result<GpsCoordinate> {
        let origin = self.require_gps_origin()?;
        let meters_per_degree_lon = METERS_PER_DEGREE_LAT * origin.latitude.to_radians().cos();

        let longitude = if meters_per_degree_lon.abs() < 1e-9 {
            origin.longitude
        } else {
            origin.longitude + local.x / meters_per_degree_lon
        };

        Ok(GpsCoordinate::new(
            origin.latitude + local.y / METERS_PER_DEGREE_LAT,
            longitude,
            origin.altitude + local.z,
        ))
    }

    fn require_gps_origin(&self) -> Result<GpsCoordinate> {
        self.settings
            .gps_origin
            .ok_or_else(|| Error::validation("no GPS origin configured for this building"))
    }

    // ------------------------------------------------------------------
    // AR <-> world
    // ------------------------------------------------------------------

    /// AR point relative to an anchor, to world meters
    ///
    /// Rotation between AR and world conventions is resolved upstream by the
    /// AR session; only the anchor translation is applied here.
    pub fn ar_to_world(&self, ar_point: Point3D, anchor_world: Point3D) -> Point3D {
        ar_point + anchor_world
    }

    /// World meters to an AR point relative to an anchor
    pub fn world_to_ar(&self, world_point: Point3D, anchor_world: Point3D) -> Point3D {
        world_point - anchor_world
    }

    // ------------------------------------------------------------------
    // Significance policy
    // ------------------------------------------------------------------

    /// Whether moving from `old` to `new` should be propagated
    ///
    /// 1. Floor change: always significant
    /// 2. Grid-space displacement >= grid unit threshold
    /// 3. Straight-line distance >= room change threshold
    pub fn is_significant_movement(&self, old: Point3D, new: Point3D) -> bool {
        let old_grid = self.world_to_grid(old);
        let new_grid = self.world_to_grid(new);

        if old_grid.floor != new_grid.floor {
            return true;
        }

        let delta = self.calculate_grid_delta(old_grid, new_grid);
        let grid_displacement = ((delta.dx as f64).powi(2) + (delta.dy as f64).powi(2)).sqrt();
        if grid_displacement >= self.thresholds.grid_unit_threshold {
            return true;
        }

        old.distance_to(&new) >= self.thresholds.room_change_threshold
    }

    /// Whether a heading change (degrees) exceeds the rotation threshold
    ///
    /// Differences wrap, so 350 -> 10 is a 20 degree change.
    pub fn is_significant_rotation(&self, old_degrees: f64, new_degrees: f64) -> bool {
        let diff = (new_degrees - old_degrees).rem_euclid(360.0);
        let wrapped = diff.min(360.0 - diff);
        wrapped >= self.thresholds.rotation_threshold
    }

    /// Integer displacement between two grid coordinates
    pub fn calculate_grid_delta(&self, from: GridCoordinate, to: GridCoordinate) -> GridDelta {
        GridDelta {
            dx: to.x - from.x,
            dy: to.y - from.y,
            dz: to.floor - from.floor,
        }
    }
}

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::validation(format!("{} must be positive, got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Point3D, b: Point3D) -> bool {
        a.distance_to(&b) < 1e-9
    }

    fn rotated(rotation: f64, scale: f64) -> CoordinateTranslator {
        let settings = TranslatorSettings {
            grid_scale: scale,
            rotation_degrees: rotation,
            ..TranslatorSettings::default()
        };
        CoordinateTranslator::with_settings(settings, MovementThresholds::default()).unwrap()
    }

    #[test]
    fn test_grid_round_trip_on_lattice() {
        let mut t = rotated(37.5, 0.5);
        t.set_origin(Point3D::new(100.0, -42.0, 1.5));

        for x in -12..=12 {
            for y in -12..=12 {
                for floor in -2..=5 {
                    let world = t.grid_to_world(x, y, floor);
                    assert_eq!(t.world_to_grid(world), GridCoordinate::new(x, y, floor));
                }
            }
        }
    }

    #[test]
    fn test_rotation_90_maps_x_to_y() {
        let t = rotated(90.0, 1.0);
        assert!(approx(t.grid_to_world(1, 0, 0), Point3D::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_default_scale_and_floor_height() {
        let t = CoordinateTranslator::new();
        assert!(approx(t.grid_to_world(4, 2, 1), Point3D::new(2.0, 1.0, 3.0)));
    }

    #[test]
    fn test_world_to_grid_rounds_to_nearest_and_keeps_floor() {
        let t = CoordinateTranslator::new();
        // 1.3 m / 0.5 = 2.6 -> 3; 0.2 m -> 0; z 5.9 on floor 1 (3.0..6.0)
        assert_eq!(t.world_to_grid(Point3D::new(1.3, 0.2, 5.9)), GridCoordinate::new(3, 0, 1));
    }

    #[test]
    fn test_non_positive_scale_rejected() {
        let mut t = CoordinateTranslator::new();
        assert!(t.set_grid_scale(0.0).unwrap_err().is_validation());
        assert!(t.set_floor_height(-3.0).is_err());
        assert!(t.set_grid_scale(f64::NAN).is_err());
        assert_eq!(t.settings().grid_scale, 0.5);
    }

    #[test]
    fn test_gps_round_trip() {
        let mut t = CoordinateTranslator::new();
        t.set_gps_origin(GpsCoordinate::new(40.7128, -74.0060, 10.0));

        let gps = GpsCoordinate::new(40.7130, -74.0057, 13.0);
        let local = t.gps_to_local(gps).unwrap();
        let back = t.local_to_gps(local).unwrap();

        assert!((back.latitude - gps.latitude).abs() < 1e-10);
        assert!((back.longitude - gps.longitude).abs() < 1e-10);
        assert!((back.altitude - gps.altitude).abs() < 1e-10);
    }

    #[test]
    fn test_gps_latitude_scale() {
        let mut t = CoordinateTranslator::new();
        t.set_gps_origin(GpsCoordinate::new(0.0, 0.0, 0.0));
        let local = t.gps_to_local(GpsCoordinate::new(0.001, 0.0, 0.0)).unwrap();
        assert!((local.y - 111.13292).abs() < 1e-6);
        assert!(local.x.abs() < 1e-9);
    }

    #[test]
    fn test_gps_longitude_scaled_by_cos_latitude() {
        let mut t = CoordinateTranslator::new();
        t.set_gps_origin(GpsCoordinate::new(60.0, 0.0, 0.0));
        let local = t.gps_to_local(GpsCoordinate::new(60.0, 0.001, 0.0)).unwrap();
        // cos(60 deg) = 0.5
        assert!((local.x - 111.13292 * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_gps_without_origin_is_validation_error() {
        let t = CoordinateTranslator::new();
        let err = t.gps_to_local(GpsCoordinate::new(1.0, 1.0, 0.0)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_ar_world_translation() {
        let t = CoordinateTranslator::new();
        let anchor = Point3D::new(10.0, 5.0, 3.0);
        let ar = Point3D::new(0.5, -1.0, 0.2);
        let world = t.ar_to_world(ar, anchor);
        assert!(approx(world, Point3D::new(10.5, 4.0, 3.2)));
        assert!(approx(t.world_to_ar(world, anchor), ar));
    }

    #[test]
    fn test_floor_change_always_significant() {
        let t = CoordinateTranslator::new();
        let old = Point3D::new(1.0, 1.0, 0.5);
        let new = Point3D::new(1.0, 1.0, 3.5);
        assert!(t.is_significant_movement(old, new));
    }

    #[test]
    fn test_small_move_not_significant() {
        let t = CoordinateTranslator::new();
        // 0.1 m stays in the same grid cell and under the 0.5 m room threshold
        let old = Point3D::new(1.0, 1.0, 0.0);
        let new = Point3D::new(1.1, 1.0, 0.0);
        assert!(!t.is_significant_movement(old, new));
    }

    #[test]
    fn test_grid_crossing_is_significant() {
        let t = CoordinateTranslator::new();
        // 2 grid units along X (1.0 m)
        assert!(t.is_significant_movement(Point3D::new(0.0, 0.0, 0.0), Point3D::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_room_threshold_catches_in_cell_move() {
        let mut t = CoordinateTranslator::new();
        t.set_grid_scale(10.0).unwrap();
        // Large cells: 0.6 m diagonal stays in cell (0, 0) but passes 0.5 m
        let old = Point3D::new(0.0, 0.0, 0.0);
        let new = Point3D::new(0.45, 0.4, 0.0);
        assert_eq!(t.world_to_grid(old), t.world_to_grid(new));
        assert!(t.is_significant_movement(old, new));
    }

    #[test]
    fn test_slab_crossing_is_significant() {
        let t = CoordinateTranslator::new();
        // Crosses the 3.0 m slab with only 2 cm of vertical travel
        let old = Point3D::new(0.0, 0.0, 2.99);
        let new = Point3D::new(0.0, 0.0, 3.01);
        assert_ne!(t.world_to_grid(old).floor, t.world_to_grid(new).floor);
        assert!(t.is_significant_movement(old, new));

        // Same XY, one storey down, with thresholds that would veto any XY move
        let mut strict = CoordinateTranslator::new();
        strict.set_thresholds(MovementThresholds {
            grid_unit_threshold: 100.0,
            room_change_threshold: 100.0,
            ..MovementThresholds::default()
        });
        assert!(strict.is_significant_movement(Point3D::new(1.0, 1.0, 3.5), Point3D::new(1.0, 1.0, 2.5)));
    }

    #[test]
    fn test_floor_tolerance_only_absorbs_rounding_error() {
        let t = CoordinateTranslator::new();
        assert_eq!(t.world_to_grid(Point3D::new(0.0, 0.0, 3.0 - 1e-12)).floor, 1);
        assert_eq!(t.world_to_grid(Point3D::new(0.0, 0.0, 2.999)).floor, 0);
        assert_eq!(t.world_to_grid(Point3D::new(0.0, 0.0, -0.001)).floor, -1);
    }

    #[test]
    fn test_rotation_significance_wraps() {
        let t = CoordinateTranslator::new();
        assert!(!t.is_significant_rotation(350.0, 0.0));
        assert!(t.is_significant_rotation(350.0, 10.0));
        assert!(t.is_significant_rotation(0.0, 180.0));
    }

    #[test]
    fn test_grid_delta() {
        let t = CoordinateTranslator::new();
        let delta = t.calculate_grid_delta(GridCoordinate::new(1, 1, 0), GridCoordinate::new(4, 5, 2));
        assert_eq!(delta, GridDelta { dx: 3, dy: 4, dz: 2 });
        assert!((delta.magnitude() - 29f64.sqrt()).abs() < 1e-12);
    }
}
