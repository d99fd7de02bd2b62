//! Event types for the reconciliation event system
//!
//! Every component can publish onto a shared [`EventBus`]; consumers (audit
//! logs, operator dashboards, the daemon's log sink) subscribe independently.

use crate::models::{AnchorState, ChangeType, ConfidenceLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Reconciliation events
///
/// Serialized with an internal `type` tag so they can be forwarded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SpatialEvent {
    /// Change accepted into a session queue
    ChangeRecorded {
        session_id: String,
        change_id: String,
        change_type: ChangeType,
        high_priority: bool,
        critical: bool,
        timestamp: DateTime<Utc>,
    },

    /// Change reached the Rejected state
    ChangeRejected {
        session_id: String,
        change_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Batch accepted by the authoritative store
    BatchApplied {
        session_id: String,
        change_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Batch refused by the authoritative store; every change in it was rejected
    BatchRejected {
        session_id: String,
        change_count: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Confidence aspect upgraded for a piece of equipment
    ConfidenceUpgraded {
        equipment_id: String,
        aspect: String,
        level: ConfidenceLevel,
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// Scanned region stored (possibly as the result of merging overlaps)
    RegionAdded {
        building_id: String,
        region_id: String,
        /// IDs of regions superseded by this one
        merged_from: Vec<String>,
        coverage_percentage: f64,
        timestamp: DateTime<Utc>,
    },

    /// Anchor changed tracking state
    AnchorStateChanged {
        anchor_id: String,
        old_state: AnchorState,
        new_state: AnchorState,
        timestamp: DateTime<Utc>,
    },
}

impl SpatialEvent {
    /// Event name as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SpatialEvent::ChangeRecorded { .. } => "ChangeRecorded",
            SpatialEvent::ChangeRejected { .. } => "ChangeRejected",
            SpatialEvent::BatchApplied { .. } => "BatchApplied",
            SpatialEvent::BatchRejected { .. } => "BatchRejected",
            SpatialEvent::ConfidenceUpgraded { .. } => "ConfidenceUpgraded",
            SpatialEvent::RegionAdded { .. } => "RegionAdded",
            SpatialEvent::AnchorStateChanged { .. } => "AnchorStateChanged",
        }
    }
}

/// Broadcast bus for [`SpatialEvent`]s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded;
/// publishers never block.
pub struct EventBus {
    tx: broadcast::Sender<SpatialEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use spatial_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SpatialEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SpatialEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
