//! Geometric value types shared by every coordinate space
//!
//! All types here are plain `Copy` values with no identity. Units are meters
//! unless a field says otherwise (grid indices, degrees).

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Point in a 3D metric space (world/local or AR device space)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const ORIGIN: Point3D = Point3D { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point3D) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Projection onto the XY plane
    pub fn xy(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

impl Add for Point3D {
    type Output = Point3D;

    fn add(self, rhs: Point3D) -> Point3D {
        Point3D::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3D {
    type Output = Point3D;

    fn sub(self, rhs: Point3D) -> Point3D {
        Point3D::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Point on a floor plan
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Integer building-grid position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridCoordinate {
    pub x: i32,
    pub y: i32,
    pub floor: i32,
}

impl GridCoordinate {
    pub fn new(x: i32, y: i32, floor: i32) -> Self {
        Self { x, y, floor }
    }
}

/// Displacement between two grid coordinates, in grid units and floors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridDelta {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
}

impl GridDelta {
    /// Euclidean length in grid units (floors count as one unit each)
    pub fn magnitude(&self) -> f64 {
        let dx = self.dx as f64;
        let dy = self.dy as f64;
        let dz = self.dz as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// WGS84 position (degrees, altitude in meters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

impl GpsCoordinate {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self { latitude, longitude, altitude }
    }
}

/// Unit quaternion used for AR orientations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `degrees` about the vertical (Z) axis
    pub fn from_yaw_degrees(degrees: f64) -> Self {
        let half = degrees.to_radians() / 2.0;
        Self::new(0.0, 0.0, half.sin(), half.cos())
    }

    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Smallest rotation angle between two orientations, in degrees
    ///
    /// `|dot|` folds q and -q onto the same orientation; the clamp keeps
    /// floating-point drift from pushing `acos` outside its domain.
    pub fn angle_to_degrees(&self, other: &Quaternion) -> f64 {
        let dot = self.dot(other).abs().clamp(-1.0, 1.0);
        (2.0 * dot.acos()).to_degrees()
    }
}

/// Axis-aligned rectangle on a floor plan
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds2D {
    pub min: Point2D,
    pub max: Point2D,
}

impl Bounds2D {
    pub fn new(min: Point2D, max: Point2D) -> Self {
        Self { min, max }
    }

    /// Bounding box of a set of points; `None` for an empty slice
    pub fn from_points(points: &[Point2D]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Bounds2D::new(*first, *first);
        for p in &points[1..] {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        (self.max.x - self.min.x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max.y - self.min.y).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Inclusive containment test
    pub fn contains(&self, p: &Point2D) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn union(&self, other: &Bounds2D) -> Bounds2D {
        Bounds2D::new(
            Point2D::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            Point2D::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        )
    }

    /// Corners in counter-clockwise order, starting at `min`
    pub fn corners(&self) -> Vec<Point2D> {
        vec![
            self.min,
            Point2D::new(self.max.x, self.min.y),
            self.max,
            Point2D::new(self.min.x, self.max.y),
        ]
    }
}

/// Polygon area by the shoelace formula
///
/// Orientation-independent; fewer than 3 vertices yield 0.
pub fn polygon_area(boundary: &[Point2D]) -> f64 {
    if boundary.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, p) in boundary.iter().enumerate() {
        let q = &boundary[(i + 1) % boundary.len()];
        twice_area += p.x * q.y - q.x * p.y;
    }
    twice_area.abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, side: f64) -> Vec<Point2D> {
        vec![
            Point2D::new(x, y),
            Point2D::new(x + side, y),
            Point2D::new(x + side, y + side),
            Point2D::new(x, y + side),
        ]
    }

    #[test]
    fn test_polygon_area_square() {
        assert!((polygon_area(&square(0.0, 0.0, 10.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_area_clockwise_is_positive() {
        let mut pts = square(2.0, 3.0, 4.0);
        pts.reverse();
        assert!((polygon_area(&pts) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_area_degenerate() {
        assert_eq!(polygon_area(&[Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn test_polygon_area_triangle() {
        let tri = vec![Point2D::new(0.0, 0.0), Point2D::new(4.0, 0.0), Point2D::new(0.0, 3.0)];
        assert!((polygon_area(&tri) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_from_points_and_contains() {
        let b = Bounds2D::from_points(&square(1.0, 1.0, 2.0)).unwrap();
        assert_eq!(b.min, Point2D::new(1.0, 1.0));
        assert_eq!(b.max, Point2D::new(3.0, 3.0));
        assert!(b.contains(&Point2D::new(2.0, 2.0)));
        assert!(b.contains(&Point2D::new(3.0, 3.0)));
        assert!(!b.contains(&Point2D::new(3.1, 2.0)));
        assert!(Bounds2D::from_points(&[]).is_none());
    }

    #[test]
    fn test_bounds_union() {
        let a = Bounds2D::new(Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0));
        let b = Bounds2D::new(Point2D::new(5.0, -2.0), Point2D::new(6.0, 0.5));
        let u = a.union(&b);
        assert_eq!(u.min, Point2D::new(0.0, -2.0));
        assert_eq!(u.max, Point2D::new(6.0, 1.0));
        assert!((u.area() - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_quaternion_angle_identity_is_zero() {
        let q = Quaternion::IDENTITY;
        assert!(q.angle_to_degrees(&q).abs() < 1e-6);
    }

    #[test]
    fn test_quaternion_angle_yaw() {
        let a = Quaternion::from_yaw_degrees(0.0);
        let b = Quaternion::from_yaw_degrees(90.0);
        assert!((a.angle_to_degrees(&b) - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_quaternion_angle_sign_flip_is_same_orientation() {
        let q = Quaternion::from_yaw_degrees(40.0);
        let neg = Quaternion::new(-q.x, -q.y, -q.z, -q.w);
        assert!(q.angle_to_degrees(&neg).abs() < 1e-6);
    }

    #[test]
    fn test_quaternion_angle_tolerates_drift() {
        // Slightly denormalized input would push the dot product above 1.0
        let a = Quaternion::new(0.0, 0.0, 0.0, 1.000_000_1);
        let angle = a.angle_to_degrees(&a);
        assert!(angle.is_finite());
        assert!(angle.abs() < 1e-3);
    }

    #[test]
    fn test_grid_delta_magnitude() {
        let d = GridDelta { dx: 3, dy: 4, dz: 0 };
        assert!((d.magnitude() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_arithmetic() {
        let a = Point3D::new(1.0, 2.0, 3.0);
        let b = Point3D::new(0.5, 0.5, 0.5);
        assert_eq!(a + b, Point3D::new(1.5, 2.5, 3.5));
        assert_eq!(a - b, Point3D::new(0.5, 1.5, 2.5));
        assert!((Point3D::ORIGIN.distance_to(&Point3D::new(3.0, 4.0, 0.0)) - 5.0).abs() < 1e-12);
    }
}
