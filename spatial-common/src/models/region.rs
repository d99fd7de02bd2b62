//! Scanned region model

use crate::geometry::{polygon_area, Bounds2D, Point2D};
use crate::models::ConfidenceLevel;
use crate::uuid_utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// LiDAR density above which a scan counts as high-confidence (points/m²)
pub const HIGH_DENSITY_POINTS_PER_M2: f64 = 1000.0;

/// Capture technique for a scanned region
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScanType {
    Lidar,
    Photogrammetry,
    ArVerify,
    Manual,
    Other(String),
}

impl ScanType {
    pub fn as_str(&self) -> &str {
        match self {
            ScanType::Lidar => "lidar",
            ScanType::Photogrammetry => "photogrammetry",
            ScanType::ArVerify => "ar_verify",
            ScanType::Manual => "manual",
            ScanType::Other(tag) => tag,
        }
    }
}

impl From<&str> for ScanType {
    fn from(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "lidar" => ScanType::Lidar,
            "photogrammetry" => ScanType::Photogrammetry,
            "ar_verify" => ScanType::ArVerify,
            "manual" => ScanType::Manual,
            _ => ScanType::Other(tag.to_string()),
        }
    }
}

impl From<String> for ScanType {
    fn from(tag: String) -> Self {
        ScanType::from(tag.as_str())
    }
}

impl From<ScanType> for String {
    fn from(scan_type: ScanType) -> Self {
        scan_type.as_str().to_string()
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Area of a building that has been physically scanned
///
/// Immutable once stored, apart from confidence amendment. Overlapping scans
/// are superseded by a merged region instead of being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedRegion {
    pub id: String,
    pub building_id: String,
    /// Floor-plan outline; at least 3 vertices
    pub boundary: Vec<Point2D>,
    pub z_min: f64,
    pub z_max: f64,
    pub scan_date: DateTime<Utc>,
    pub scan_type: ScanType,
    /// Points per square meter
    pub point_density: f64,
    /// Capture confidence reported by the scanner (0.0-1.0)
    pub confidence: f64,
}

impl ScannedRegion {
    /// New region dated now, spanning one standard storey (0-3 m)
    pub fn new(building_id: impl Into<String>, boundary: Vec<Point2D>, scan_type: ScanType) -> Self {
        Self {
            id: uuid_utils::generate_id(),
            building_id: building_id.into(),
            boundary,
            z_min: 0.0,
            z_max: 3.0,
            scan_date: Utc::now(),
            scan_type,
            point_density: 0.0,
            confidence: 0.5,
        }
    }

    /// Axis-aligned rectangle region
    pub fn rectangle(building_id: impl Into<String>, bounds: Bounds2D, scan_type: ScanType) -> Self {
        Self::new(building_id, bounds.corners(), scan_type)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_z_extent(mut self, z_min: f64, z_max: f64) -> Self {
        self.z_min = z_min;
        self.z_max = z_max;
        self
    }

    pub fn with_scan_date(mut self, scan_date: DateTime<Utc>) -> Self {
        self.scan_date = scan_date;
        self
    }

    pub fn with_point_density(mut self, density: f64) -> Self {
        self.point_density = density;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Shoelace area of the boundary
    pub fn area(&self) -> f64 {
        polygon_area(&self.boundary)
    }

    pub fn bounds(&self) -> Option<Bounds2D> {
        Bounds2D::from_points(&self.boundary)
    }

    /// Trust level implied by capture technique and density
    pub fn derived_confidence(&self) -> ConfidenceLevel {
        match self.scan_type {
            ScanType::Lidar if self.point_density > HIGH_DENSITY_POINTS_PER_M2 => ConfidenceLevel::High,
            ScanType::Lidar | ScanType::Photogrammetry => ConfidenceLevel::Medium,
            ScanType::ArVerify => ConfidenceLevel::High,
            ScanType::Manual | ScanType::Other(_) => ConfidenceLevel::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Point2D> {
        vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_derived_confidence_rules() {
        let lidar = ScannedRegion::new("B1", unit_square(), ScanType::Lidar);
        assert_eq!(lidar.derived_confidence(), ConfidenceLevel::Medium);
        assert_eq!(
            lidar.clone().with_point_density(1500.0).derived_confidence(),
            ConfidenceLevel::High
        );
        // Exactly at the threshold is not "above"
        assert_eq!(
            lidar.with_point_density(1000.0).derived_confidence(),
            ConfidenceLevel::Medium
        );

        let photo = ScannedRegion::new("B1", unit_square(), ScanType::Photogrammetry);
        assert_eq!(photo.derived_confidence(), ConfidenceLevel::Medium);
        let ar = ScannedRegion::new("B1", unit_square(), ScanType::ArVerify);
        assert_eq!(ar.derived_confidence(), ConfidenceLevel::High);
        let manual = ScannedRegion::new("B1", unit_square(), ScanType::Manual);
        assert_eq!(manual.derived_confidence(), ConfidenceLevel::Low);
    }

    #[test]
    fn test_rectangle_region_area() {
        let bounds = Bounds2D::new(Point2D::new(0.0, 0.0), Point2D::new(10.0, 5.0));
        let region = ScannedRegion::rectangle("B1", bounds, ScanType::Lidar);
        assert_eq!(region.boundary.len(), 4);
        assert!((region.area() - 50.0).abs() < 1e-9);
        assert_eq!(region.bounds(), Some(bounds));
    }

    #[test]
    fn test_scan_type_tags() {
        assert_eq!(ScanType::from("AR_VERIFY"), ScanType::ArVerify);
        assert_eq!(ScanType::from("sonar"), ScanType::Other("sonar".to_string()));
        assert_eq!(String::from(ScanType::Photogrammetry), "photogrammetry");
    }
}
