//! Movement significance thresholds

use serde::{Deserialize, Serialize};

/// Limits above which a movement is worth propagating to the building model
///
/// Mutable at runtime through `CoordinateTranslator::set_thresholds`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementThresholds {
    /// Minimum grid-space displacement, in grid units
    pub grid_unit_threshold: f64,

    /// Minimum straight-line displacement, in meters
    ///
    /// Catches diagonal moves that stay within one grid cell but still
    /// travel a meaningful distance.
    pub room_change_threshold: f64,

    /// Minimum heading change, in degrees
    pub rotation_threshold: f64,
}

impl Default for MovementThresholds {
    fn default() -> Self {
        Self {
            grid_unit_threshold: 1.0,
            room_change_threshold: 0.5,
            rotation_threshold: 15.0,
        }
    }
}
