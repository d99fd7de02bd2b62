//! Spatial anchor registry
//!
//! Anchor state follows tracking confidence only:
//! - Pending or Recovered becomes Active at the active threshold
//! - Active or Recovered becomes Lost below the lost threshold
//! - Lost becomes Recovered at the recover threshold
//!
//! Anchors that are not Active and have not been seen for longer than the
//! configured maximum age become Expired, which is terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use spatial_common::db::AnchorStore;
use spatial_common::events::{EventBus, SpatialEvent};
use spatial_common::models::{AnchorState, SpatialAnchor};
use spatial_common::{time, uuid_utils, Error, Point3D, Quaternion, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Confidence thresholds driving anchor state (`[anchors]` config section)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorSettings {
    /// Confidence at which a Pending or Recovered anchor becomes Active
    pub active_threshold: f64,
    /// Confidence below which a tracking anchor is Lost
    pub lost_threshold: f64,
    /// Confidence at which a Lost anchor is Recovered
    pub recover_threshold: f64,
    /// Seconds an untracked anchor may go unseen before it expires
    pub max_age_secs: u64,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            active_threshold: 0.7,
            lost_threshold: 0.3,
            recover_threshold: 0.5,
            max_age_secs: 24 * 60 * 60,
        }
    }
}

impl AnchorSettings {
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_range(self.active_threshold)
            && in_range(self.lost_threshold)
            && in_range(self.recover_threshold))
        {
            return Err(Error::validation("anchor thresholds must be within [0, 1]"));
        }
        if self.lost_threshold > self.recover_threshold
            || self.recover_threshold > self.active_threshold
        {
            return Err(Error::validation(
                "anchor thresholds must satisfy lost <= recover <= active",
            ));
        }
        Ok(())
    }

    pub fn max_age(&self) -> Duration {
        Duration::seconds(self.max_age_secs.min(i64::MAX as u64) as i64)
    }

    /// State reached from `current` on observing `confidence`
    pub fn next_state(&self, current: AnchorState, confidence: f64) -> AnchorState {
        match current {
            AnchorState::Expired => AnchorState::Expired,
            AnchorState::Pending if confidence >= self.active_threshold => AnchorState::Active,
            AnchorState::Pending => AnchorState::Pending,
            AnchorState::Active if confidence < self.lost_threshold => AnchorState::Lost,
            AnchorState::Active => AnchorState::Active,
            AnchorState::Lost if confidence >= self.recover_threshold => AnchorState::Recovered,
            AnchorState::Lost => AnchorState::Lost,
            AnchorState::Recovered if confidence >= self.active_threshold => AnchorState::Active,
            AnchorState::Recovered if confidence < self.lost_threshold => AnchorState::Lost,
            AnchorState::Recovered => AnchorState::Recovered,
        }
    }
}

/// Anchors of one building
pub struct AnchorRegistry {
    building_id: String,
    settings: AnchorSettings,
    anchors: RwLock<HashMap<String, SpatialAnchor>>,
    store: Option<Arc<dyn AnchorStore>>,
    events: Option<Arc<EventBus>>,
}

impl AnchorRegistry {
    pub fn new(building_id: impl Into<String>, settings: AnchorSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            building_id: building_id.into(),
            settings,
            anchors: RwLock::new(HashMap::new()),
            store: None,
            events: None,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn AnchorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> AnchorSettings {
        self.settings
    }

    /// Register a new anchor
    ///
    /// Starts Active when `confidence` already meets the active threshold,
    /// Pending otherwise.
    pub async fn create_anchor(
        &self,
        ar_position: Point3D,
        world_position: Point3D,
        rotation: Quaternion,
        confidence: f64,
    ) -> Result<SpatialAnchor> {
        validate_confidence(confidence)?;
        let now = time::now();
        let state = if confidence >= self.settings.active_threshold {
            AnchorState::Active
        } else {
            AnchorState::Pending
        };
        let anchor = SpatialAnchor {
            id: uuid_utils::generate_id(),
            building_id: self.building_id.clone(),
            ar_position,
            world_position,
            rotation,
            state,
            confidence,
            drift_correction: Point3D::ORIGIN,
            created_at: now,
            last_seen: now,
        };

        self.anchors
            .write()
            .await
            .insert(anchor.id.clone(), anchor.clone());
        info!("Anchor {} created ({})", anchor.id, state.as_str());

        self.persist(&anchor).await;
        Ok(anchor)
    }

    /// Report fresh tracking confidence for an anchor
    ///
    /// # Returns
    /// The anchor's state after the update.
    pub async fn update_anchor_confidence(&self, anchor_id: &str, confidence: f64) -> Result<AnchorState> {
        validate_confidence(confidence)?;
        let now = time::now();

        let (updated, old_state) = {
            let mut anchors = self.anchors.write().await;
            let anchor = anchors
                .get_mut(anchor_id)
                .ok_or_else(|| Error::not_found("anchor", anchor_id))?;
            let old_state = anchor.state;
            if old_state == AnchorState::Expired {
                return Ok(old_state);
            }
            anchor.state = self.settings.next_state(old_state, confidence);
            anchor.confidence = confidence;
            anchor.last_seen = now;
            (anchor.clone(), old_state)
        };

        if updated.state != old_state {
            self.state_changed(&updated.id, old_state, updated.state, now);
        }
        self.persist(&updated).await;
        Ok(updated.state)
    }

    /// Expire untracked anchors unseen for longer than the configured maximum age
    pub async fn expire_stale(&self) -> Vec<String> {
        self.expire_stale_at(self.settings.max_age(), time::now()).await
    }

    /// Expire non-Active anchors whose last sighting is older than `max_age` at `now`
    ///
    /// Expired anchors stay visible in memory but are deleted from the store,
    /// so a restart does not bring them back.
    ///
    /// # Returns
    /// IDs of the anchors that expired, sorted.
    pub async fn expire_stale_at(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<(AnchorState, SpatialAnchor)> = {
            let mut anchors = self.anchors.write().await;
            anchors
                .values_mut()
                .filter(|a| {
                    !matches!(a.state, AnchorState::Active | AnchorState::Expired)
                        && now - a.last_seen > max_age
                })
                .map(|a| {
                    let old_state = a.state;
                    a.state = AnchorState::Expired;
                    (old_state, a.clone())
                })
                .collect()
        };

        for (old_state, anchor) in &expired {
            self.state_changed(&anchor.id, *old_state, AnchorState::Expired, now);
        }
        if let Some(store) = &self.store {
            for (_, anchor) in &expired {
                if let Err(e) = store.delete_anchor(&anchor.id).await {
                    warn!("Failed to delete expired anchor {}: {}", anchor.id, e);
                }
            }
        }
        let mut ids: Vec<String> = expired.into_iter().map(|(_, a)| a.id).collect();
        ids.sort();
        ids
    }

    /// Set the drift offset added to an anchor's world position
    pub async fn apply_drift_correction(&self, anchor_id: &str, offset: Point3D) -> Result<()> {
        let updated = {
            let mut anchors = self.anchors.write().await;
            let anchor = anchors
                .get_mut(anchor_id)
                .ok_or_else(|| Error::not_found("anchor", anchor_id))?;
            anchor.drift_correction = offset;
            anchor.clone()
        };
        debug!(
            "Anchor {} drift correction ({:.3}, {:.3}, {:.3})",
            anchor_id, offset.x, offset.y, offset.z
        );
        if updated.state != AnchorState::Expired {
            self.persist(&updated).await;
        }
        Ok(())
    }

    /// World position of a point expressed relative to an anchor
    ///
    /// # Errors
    /// `NotFound` for an unknown anchor; `Rejected` if the anchor is not
    /// currently tracking (Active or Recovered).
    pub async fn resolve_world(&self, anchor_id: &str, ar_point: Point3D) -> Result<Point3D> {
        let anchors = self.anchors.read().await;
        let anchor = anchors
            .get(anchor_id)
            .ok_or_else(|| Error::not_found("anchor", anchor_id))?;
        if !anchor.state.is_tracking() {
            return Err(Error::Rejected(format!(
                "anchor '{}' is {} and cannot resolve positions",
                anchor_id,
                anchor.state.as_str()
            )));
        }
        Ok(ar_point + anchor.corrected_world_position())
    }

    pub async fn get_anchor(&self, anchor_id: &str) -> Result<SpatialAnchor> {
        self.anchors
            .read()
            .await
            .get(anchor_id)
            .cloned()
            .ok_or_else(|| Error::not_found("anchor", anchor_id))
    }

    pub async fn anchor_count(&self) -> usize {
        self.anchors.read().await.len()
    }

    /// Restore persisted anchors for this building
    pub async fn load_from_store(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let loaded = store.load_anchors(&self.building_id).await?;
        let count = loaded.len();
        let mut anchors = self.anchors.write().await;
        for anchor in loaded {
            anchors.insert(anchor.id.clone(), anchor);
        }
        info!("Restored {} anchor(s) for {}", count, self.building_id);
        Ok(count)
    }

    async fn persist(&self, anchor: &SpatialAnchor) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_anchor(anchor).await {
                warn!("Failed to persist anchor {}: {}", anchor.id, e);
            }
        }
    }

    fn state_changed(&self, anchor_id: &str, old_state: AnchorState, new_state: AnchorState, now: DateTime<Utc>) {
        info!(
            "Anchor {} {} -> {}",
            anchor_id,
            old_state.as_str(),
            new_state.as_str()
        );
        if let Some(events) = &self.events {
            events.emit_lossy(SpatialEvent::AnchorStateChanged {
                anchor_id: anchor_id.to_string(),
                old_state,
                new_state,
                timestamp: now,
            });
        }
    }
}

fn validate_confidence(confidence: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::validation(format!(
            "anchor confidence must be within [0, 1], got {}",
            confidence
        )));
    }
    Ok(())
}
