//! Trust levels and data-source provenance

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete trust level for a spatial or semantic fact
///
/// Ordering is declared by variant order, so comparisons never depend on the
/// numeric rank used for scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Estimated,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Numeric rank used in weighted scoring (Estimated=0 .. High=3)
    pub fn rank(self) -> u8 {
        match self {
            ConfidenceLevel::Estimated => 0,
            ConfidenceLevel::Low => 1,
            ConfidenceLevel::Medium => 2,
            ConfidenceLevel::High => 3,
        }
    }

    /// Rank scaled to [0, 1]
    pub fn normalized(self) -> f64 {
        self.rank() as f64 / 3.0
    }

    /// Map a continuous sensor confidence (0.0-1.0) onto a level
    ///
    /// - >= 0.9: High
    /// - >= 0.7: Medium
    /// - >= 0.4: Low
    /// - otherwise Estimated
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            ConfidenceLevel::High
        } else if score >= 0.7 {
            ConfidenceLevel::Medium
        } else if score >= 0.4 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Estimated
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Estimated => "estimated",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a reported fact
///
/// Unrecognized tags are kept verbatim in `Other` and rank lowest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataSource {
    Lidar,
    ArVerified,
    Ifc,
    Pdf,
    Manual,
    Estimated,
    Other(String),
}

impl DataSource {
    /// Tie-break priority used when two reports share a confidence level
    pub fn priority(&self) -> u8 {
        match self {
            DataSource::Lidar => 5,
            DataSource::ArVerified => 4,
            DataSource::Ifc => 3,
            DataSource::Pdf => 2,
            DataSource::Manual => 1,
            DataSource::Estimated | DataSource::Other(_) => 0,
        }
    }

    /// Typical positional accuracy of this source, in meters
    pub fn typical_accuracy(&self) -> Option<f64> {
        match self {
            DataSource::Lidar => Some(0.02),
            DataSource::ArVerified => Some(0.05),
            DataSource::Ifc => Some(0.10),
            DataSource::Pdf => Some(0.50),
            DataSource::Manual => Some(1.00),
            DataSource::Estimated | DataSource::Other(_) => None,
        }
    }

    /// Sources whose verification is a physical field/sensor confirmation
    pub fn is_field_confirmation(&self) -> bool {
        matches!(self, DataSource::Lidar | DataSource::ArVerified)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, DataSource::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            DataSource::Lidar => "lidar",
            DataSource::ArVerified => "ar_verified",
            DataSource::Ifc => "ifc",
            DataSource::Pdf => "pdf",
            DataSource::Manual => "manual",
            DataSource::Estimated => "estimated",
            DataSource::Other(tag) => tag,
        }
    }
}

impl From<&str> for DataSource {
    fn from(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "lidar" => DataSource::Lidar,
            "ar_verified" => DataSource::ArVerified,
            "ifc" => DataSource::Ifc,
            "pdf" => DataSource::Pdf,
            "manual" => DataSource::Manual,
            "estimated" => DataSource::Estimated,
            _ => DataSource::Other(tag.to_string()),
        }
    }
}

impl From<String> for DataSource {
    fn from(tag: String) -> Self {
        DataSource::from(tag.as_str())
    }
}

impl From<DataSource> for String {
    fn from(source: DataSource) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_totally_ordered() {
        assert!(ConfidenceLevel::Estimated < ConfidenceLevel::Low);
        assert!(ConfidenceLevel::Low < ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium < ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::High.normalized(), 1.0);
        assert_eq!(ConfidenceLevel::Estimated.normalized(), 0.0);
    }

    #[test]
    fn test_from_score_boundaries() {
        assert_eq!(ConfidenceLevel::from_score(0.95), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.75), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.4), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.1), ConfidenceLevel::Estimated);
    }

    #[test]
    fn test_source_priority_table() {
        let ordered = ["lidar", "ar_verified", "ifc", "pdf", "manual", "estimated"];
        let priorities: Vec<u8> = ordered.iter().map(|s| DataSource::from(*s).priority()).collect();
        assert_eq!(priorities, vec![5, 4, 3, 2, 1, 0]);
        assert_eq!(DataSource::from("drone").priority(), 0);
    }

    #[test]
    fn test_unknown_source_round_trips_tag() {
        let src = DataSource::from("thermal_camera");
        assert!(!src.is_known());
        assert_eq!(src.as_str(), "thermal_camera");
        let json = serde_json::to_string(&src).unwrap();
        assert_eq!(json, "\"thermal_camera\"");
    }

    #[test]
    fn test_source_serde_uses_tags() {
        let json = serde_json::to_string(&DataSource::ArVerified).unwrap();
        assert_eq!(json, "\"ar_verified\"");
        let parsed: DataSource = serde_json::from_str("\"LIDAR\"").unwrap();
        assert_eq!(parsed, DataSource::Lidar);
    }
}
