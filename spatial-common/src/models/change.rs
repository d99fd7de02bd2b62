//! Proposed equipment edits coming from AR sessions

use crate::geometry::{Point3D, Quaternion};
use crate::uuid_utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of edit proposed for a piece of equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Move,
    Rotate,
    Add,
    Remove,
    Modify,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Move => "move",
            ChangeType::Rotate => "rotate",
            ChangeType::Add => "add",
            ChangeType::Remove => "remove",
            ChangeType::Modify => "modify",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state derived from the change's flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Applied,
    Rejected,
}

/// Edit proposed by an AR session
///
/// Created Pending; the sync engine sets exactly one terminal state
/// (applied or rejected) and the change is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ARChange {
    pub id: String,
    pub session_id: String,
    pub equipment_id: String,
    pub change_type: ChangeType,
    #[serde(default)]
    pub old_position: Option<Point3D>,
    #[serde(default)]
    pub new_position: Option<Point3D>,
    #[serde(default)]
    pub old_rotation: Option<Quaternion>,
    #[serde(default)]
    pub new_rotation: Option<Quaternion>,
    /// When set, positions are relative to this anchor's world origin
    #[serde(default)]
    pub anchor_id: Option<String>,
    /// Capture confidence reported by the AR session (0.0-1.0)
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub applied: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl ARChange {
    /// New pending change timestamped now
    pub fn new(
        session_id: impl Into<String>,
        equipment_id: impl Into<String>,
        change_type: ChangeType,
        confidence: f64,
    ) -> Self {
        Self {
            id: uuid_utils::generate_id(),
            session_id: session_id.into(),
            equipment_id: equipment_id.into(),
            change_type,
            old_position: None,
            new_position: None,
            old_rotation: None,
            new_rotation: None,
            anchor_id: None,
            confidence,
            timestamp: Utc::now(),
            applied: false,
            rejected: false,
            rejection_reason: None,
        }
    }

    /// Move from `old` to `new`
    pub fn moved(
        session_id: impl Into<String>,
        equipment_id: impl Into<String>,
        old: Point3D,
        new: Point3D,
        confidence: f64,
    ) -> Self {
        let mut change = Self::new(session_id, equipment_id, ChangeType::Move, confidence);
        change.old_position = Some(old);
        change.new_position = Some(new);
        change
    }

    /// Rotation from `old` to `new`
    pub fn rotated(
        session_id: impl Into<String>,
        equipment_id: impl Into<String>,
        old: Quaternion,
        new: Quaternion,
        confidence: f64,
    ) -> Self {
        let mut change = Self::new(session_id, equipment_id, ChangeType::Rotate, confidence);
        change.old_rotation = Some(old);
        change.new_rotation = Some(new);
        change
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_anchor(mut self, anchor_id: impl Into<String>) -> Self {
        self.anchor_id = Some(anchor_id.into());
        self
    }

    pub fn status(&self) -> ChangeStatus {
        if self.applied {
            ChangeStatus::Applied
        } else if self.rejected {
            ChangeStatus::Rejected
        } else {
            ChangeStatus::Pending
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == ChangeStatus::Pending
    }

    /// Straight-line displacement of a move; 0 when either end is unknown
    pub fn distance(&self) -> f64 {
        match (self.old_position, self.new_position) {
            (Some(old), Some(new)) => old.distance_to(&new),
            _ => 0.0,
        }
    }

    /// Mark applied. Returns false (and changes nothing) if already terminal.
    pub fn mark_applied(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.applied = true;
        true
    }

    /// Mark rejected with a reason. Returns false if already terminal.
    pub fn mark_rejected(&mut self, reason: impl Into<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.rejected = true;
        self.rejection_reason = Some(reason.into());
        true
    }
}
