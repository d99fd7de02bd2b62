//! AR spatial anchor model

use crate::geometry::{Point3D, Quaternion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracking state of a spatial anchor
///
/// Transitions are driven only by confidence thresholds and elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorState {
    /// Tracking reliably
    Active,
    /// Created with insufficient confidence, awaiting confirmation
    Pending,
    /// Tracking lost; positions derived from it are not trusted
    Lost,
    /// Re-acquired after loss, not yet back to full confidence
    Recovered,
    /// Unseen for too long; terminal
    Expired,
}

impl AnchorState {
    /// Whether positions relative to this anchor may be resolved to world space
    pub fn is_tracking(self) -> bool {
        matches!(self, AnchorState::Active | AnchorState::Recovered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorState::Active => "active",
            AnchorState::Pending => "pending",
            AnchorState::Lost => "lost",
            AnchorState::Recovered => "recovered",
            AnchorState::Expired => "expired",
        }
    }
}

/// Persistent reference point bridging AR device space and world space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialAnchor {
    pub id: String,
    pub building_id: String,
    /// Position reported by the AR session
    pub ar_position: Point3D,
    /// Surveyed world position
    pub world_position: Point3D,
    pub rotation: Quaternion,
    pub state: AnchorState,
    /// Tracking confidence (0.0-1.0)
    pub confidence: f64,
    /// Offset added to `world_position` to compensate accumulated drift
    pub drift_correction: Point3D,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SpatialAnchor {
    /// Effective world origin after drift correction
    pub fn corrected_world_position(&self) -> Point3D {
        self.world_position + self.drift_correction
    }
}
