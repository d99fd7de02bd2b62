//! Confidence Manager
//!
//! Tracks per-equipment trust for two independent aspects (position and
//! semantic). Reports only ever upgrade an aspect: a higher level always
//! wins, and at an equal level only a higher-priority source may replace the
//! current attribution. Scores decay with time since the last field
//! verification, bottoming out at half the undecayed value.

use super::{Aspect, ConfidenceQuery, ConfidenceRecord, ConfidenceStatistics, VerificationEvent};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use spatial_common::events::{EventBus, SpatialEvent};
use spatial_common::models::{ConfidenceLevel, DataSource};
use spatial_common::{time, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Lowest fraction of the undecayed score that decay may leave
const DECAY_FLOOR: f64 = 0.5;

/// Runtime-tunable decay and re-verification policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceSettings {
    /// Fraction of confidence lost per year without field verification
    pub decay_rate: f64,
    /// Days after which a field verification is considered stale
    pub verify_threshold_days: i64,
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self {
            decay_rate: 0.5,
            verify_threshold_days: 90,
        }
    }
}

/// Decay multiplier after `days` without verification
///
/// `max(0.5, 1 - days/365 * rate)`
pub fn decay_factor(days: f64, decay_rate: f64) -> f64 {
    (1.0 - days / 365.0 * decay_rate).clamp(DECAY_FLOOR, 1.0)
}

/// Per-equipment trust tracking
pub struct ConfidenceManager {
    records: RwLock<HashMap<String, ConfidenceRecord>>,
    settings: RwLock<ConfidenceSettings>,
    events: Option<Arc<EventBus>>,
}

impl ConfidenceManager {
    pub fn new(settings: ConfidenceSettings) -> Result<Self> {
        validate_settings(&settings)?;
        Ok(Self {
            records: RwLock::new(HashMap::new()),
            settings: RwLock::new(settings),
            events: None,
        })
    }

    /// Publish upgrade events on `events`
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn set_decay_rate(&self, decay_rate: f64) -> Result<()> {
        if !decay_rate.is_finite() || decay_rate < 0.0 {
            return Err(Error::validation(format!(
                "decay rate must be non-negative, got {}",
                decay_rate
            )));
        }
        self.settings.write().await.decay_rate = decay_rate;
        info!("Confidence decay rate set to {}", decay_rate);
        Ok(())
    }

    pub async fn set_verify_threshold(&self, threshold: Duration) -> Result<()> {
        if threshold <= Duration::zero() {
            return Err(Error::validation("verify threshold must be positive"));
        }
        self.settings.write().await.verify_threshold_days = threshold.num_days().max(1);
        info!("Verification threshold set to {} days", threshold.num_days().max(1));
        Ok(())
    }

    pub async fn settings(&self) -> ConfidenceSettings {
        self.settings.read().await.clone()
    }

    /// Report a confidence level for one aspect of a piece of equipment
    ///
    /// # Returns
    /// `true` if the report upgraded the aspect, `false` if it was ignored.
    ///
    /// # Errors
    /// `Validation` for an empty equipment ID.
    pub async fn update_confidence(
        &self,
        equipment_id: &str,
        aspect: Aspect,
        level: ConfidenceLevel,
        source: DataSource,
    ) -> Result<bool> {
        validate_id(equipment_id)?;
        let now = time::now();

        let applied = {
            let mut records = self.records.write().await;
            let record = records
                .entry(equipment_id.to_string())
                .or_insert_with(|| ConfidenceRecord::new(equipment_id, now));
            record.aspect_mut(aspect).try_upgrade(level, source.clone(), now)
        };

        if applied {
            debug!(
                "Confidence upgraded: {} {} -> {} ({})",
                equipment_id, aspect, level, source
            );
            self.emit(SpatialEvent::ConfidenceUpgraded {
                equipment_id: equipment_id.to_string(),
                aspect: aspect.to_string(),
                level,
                source: source.to_string(),
                timestamp: now,
            });
        } else {
            debug!(
                "Confidence report ignored: {} {} {} ({}) does not upgrade",
                equipment_id, aspect, level, source
            );
        }
        Ok(applied)
    }

    /// Record a verification of a piece of equipment
    ///
    /// LiDAR and AR-verified confirmations set position confidence to High
    /// regardless of the current attribution.
    pub async fn record_verification(
        &self,
        equipment_id: &str,
        method: DataSource,
        user: &str,
        notes: Option<String>,
    ) -> Result<()> {
        validate_id(equipment_id)?;
        let now = time::now();
        let field_confirmation = method.is_field_confirmation();

        {
            let mut records = self.records.write().await;
            let record = records
                .entry(equipment_id.to_string())
                .or_insert_with(|| ConfidenceRecord::new(equipment_id, now));

            record.verification_history.push(VerificationEvent {
                timestamp: now,
                method: method.clone(),
                user: user.to_string(),
                notes,
            });
            record.last_field_verified = Some(now);
            record.verification_count += 1;

            if field_confirmation {
                record.position.force(ConfidenceLevel::High, method.clone(), now);
            }
        }

        info!("Equipment {} verified by {} via {}", equipment_id, user, method);
        if field_confirmation {
            self.emit(SpatialEvent::ConfidenceUpgraded {
                equipment_id: equipment_id.to_string(),
                aspect: Aspect::Position.to_string(),
                level: ConfidenceLevel::High,
                source: method.to_string(),
                timestamp: now,
            });
        }
        Ok(())
    }

    /// Overall confidence in [0, 1] with time decay applied
    pub async fn calculate_overall_confidence(&self, equipment_id: &str) -> Result<f64> {
        self.calculate_overall_confidence_at(equipment_id, time::now()).await
    }

    /// [`calculate_overall_confidence`](Self::calculate_overall_confidence) evaluated at `now`
    pub async fn calculate_overall_confidence_at(
        &self,
        equipment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        validate_id(equipment_id)?;
        let decay_rate = self.settings.read().await.decay_rate;
        let records = self.records.read().await;
        let record = records
            .get(equipment_id)
            .ok_or_else(|| Error::not_found("equipment", equipment_id))?;
        Ok(overall_confidence(record, decay_rate, now))
    }

    /// IDs of equipment due for field verification, sorted
    ///
    /// Due means: never verified, verified longer ago than the verify
    /// threshold, or position confidence at Low or below.
    pub async fn get_equipment_needing_verification(&self) -> Vec<String> {
        self.get_equipment_needing_verification_at(time::now()).await
    }

    pub async fn get_equipment_needing_verification_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let threshold = Duration::days(self.settings.read().await.verify_threshold_days);
        let records = self.records.read().await;
        let mut due: Vec<String> = records
            .values()
            .filter(|r| needs_verification(r, threshold, now))
            .map(|r| r.equipment_id.clone())
            .collect();
        due.sort();
        due
    }

    /// Records matching every criterion of `query`, sorted by equipment ID
    pub async fn query_with_confidence(&self, query: &ConfidenceQuery) -> Result<Vec<ConfidenceRecord>> {
        self.query_with_confidence_at(query, time::now()).await
    }

    pub async fn query_with_confidence_at(
        &self,
        query: &ConfidenceQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConfidenceRecord>> {
        query.validate()?;
        let records = self.records.read().await;
        let mut matched: Vec<ConfidenceRecord> = records
            .values()
            .filter(|r| query.matches(r, now))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.equipment_id.cmp(&b.equipment_id));
        Ok(matched)
    }

    pub async fn get_record(&self, equipment_id: &str) -> Result<ConfidenceRecord> {
        self.records
            .read()
            .await
            .get(equipment_id)
            .cloned()
            .ok_or_else(|| Error::not_found("equipment", equipment_id))
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Summary over all records
    pub async fn statistics(&self) -> ConfidenceStatistics {
        let now = time::now();
        let settings = self.settings.read().await.clone();
        let threshold = Duration::days(settings.verify_threshold_days);
        let records = self.records.read().await;

        let mut stats = ConfidenceStatistics {
            total_records: records.len(),
            ..ConfidenceStatistics::default()
        };
        let mut score_sum = 0.0;
        for record in records.values() {
            *stats.by_position_level.entry(record.position.level).or_insert(0) += 1;
            if record.last_field_verified.is_some() {
                stats.field_verified += 1;
            }
            if needs_verification(record, threshold, now) {
                stats.needing_verification += 1;
            }
            score_sum += overall_confidence(record, settings.decay_rate, now);
        }
        if stats.total_records > 0 {
            stats.mean_overall_confidence = score_sum / stats.total_records as f64;
        }
        stats
    }

    fn emit(&self, event: SpatialEvent) {
        if let Some(events) = &self.events {
            events.emit_lossy(event);
        }
    }
}

fn overall_confidence(record: &ConfidenceRecord, decay_rate: f64, now: DateTime<Utc>) -> f64 {
    let reference = record.last_field_verified.unwrap_or(record.created_at);
    let days = time::days_between(reference, now);
    (record.base_score() * decay_factor(days, decay_rate)).clamp(0.0, 1.0)
}

fn needs_verification(record: &ConfidenceRecord, threshold: Duration, now: DateTime<Utc>) -> bool {
    match record.last_field_verified {
        None => true,
        Some(verified) if now - verified > threshold => true,
        Some(_) => record.position.level <= ConfidenceLevel::Low,
    }
}

fn validate_id(equipment_id: &str) -> Result<()> {
    if equipment_id.trim().is_empty() {
        return Err(Error::validation("equipment ID must not be empty"));
    }
    Ok(())
}

fn validate_settings(settings: &ConfidenceSettings) -> Result<()> {
    if !settings.decay_rate.is_finite() || settings.decay_rate < 0.0 {
        return Err(Error::validation("decay rate must be non-negative"));
    }
    if settings.verify_threshold_days <= 0 {
        return Err(Error::validation("verify threshold must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfidenceManager {
        ConfidenceManager::new(ConfidenceSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_same_level_lower_priority_keeps_source() {
        let m = manager();
        assert!(m
            .update_confidence("E1", Aspect::Position, ConfidenceLevel::Medium, DataSource::Ifc)
            .await
            .unwrap());

        let applied = m
            .update_confidence("E1", Aspect::Position, ConfidenceLevel::Medium, DataSource::Pdf)
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(m.get_record("E1").await.unwrap().position.source, DataSource::Ifc);

        let applied = m
            .update_confidence("E1", Aspect::Position, ConfidenceLevel::Medium, DataSource::Lidar)
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(m.get_record("E1").await.unwrap().position.source, DataSource::Lidar);
    }

    #[tokio::test]
    async fn test_aspects_are_independent() {
        let m = manager();
        m.update_confidence("E1", Aspect::Semantic, ConfidenceLevel::High, DataSource::Ifc)
            .await
            .unwrap();
        let record = m.get_record("E1").await.unwrap();
        assert_eq!(record.semantic.level, ConfidenceLevel::High);
        assert_eq!(record.position.level, ConfidenceLevel::Estimated);
    }

    #[tokio::test]
    async fn test_empty_id_rejected_without_mutation() {
        let m = manager();
        let err = m
            .update_confidence("  ", Aspect::Position, ConfidenceLevel::High, DataSource::Lidar)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(m.record_verification("", DataSource::Lidar, "tech", None).await.is_err());
        assert_eq!(m.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_field_verification_forces_high_position() {
        let m = manager();
        m.update_confidence("E1", Aspect::Position, ConfidenceLevel::High, DataSource::Lidar)
            .await
            .unwrap();

        // ar_verified has lower priority than lidar; verification applies anyway
        m.record_verification("E1", DataSource::ArVerified, "alice", Some("checked".into()))
            .await
            .unwrap();

        let record = m.get_record("E1").await.unwrap();
        assert_eq!(record.position.level, ConfidenceLevel::High);
        assert_eq!(record.position.source, DataSource::ArVerified);
        assert_eq!(record.verification_count, 1);
        assert_eq!(record.verification_history.len(), 1);
        assert_eq!(record.verification_history[0].user, "alice");
        assert!(record.last_field_verified.is_some());
    }

    #[tokio::test]
    async fn test_manual_verification_does_not_touch_level() {
        let m = manager();
        m.update_confidence("E1", Aspect::Position, ConfidenceLevel::Low, DataSource::Pdf)
            .await
            .unwrap();
        m.record_verification("E1", DataSource::Manual, "bob", None).await.unwrap();

        let record = m.get_record("E1").await.unwrap();
        assert_eq!(record.position.level, ConfidenceLevel::Low);
        assert_eq!(record.position.source, DataSource::Pdf);
        assert_eq!(record.verification_count, 1);
    }

    #[tokio::test]
    async fn test_overall_confidence_weights_and_decay_floor() {
        let m = manager();
        m.update_confidence("E1", Aspect::Position, ConfidenceLevel::High, DataSource::Lidar)
            .await
            .unwrap();
        m.update_confidence("E1", Aspect::Semantic, ConfidenceLevel::Medium, DataSource::Ifc)
            .await
            .unwrap();
        m.record_verification("E1", DataSource::Manual, "bob", None).await.unwrap();

        let undecayed = 0.6 + 0.4 * (2.0 / 3.0);
        let now = time::now();
        let fresh = m.calculate_overall_confidence_at("E1", now).await.unwrap();
        assert!((fresh - undecayed).abs() < 1e-6);

        // Default rate 0.5: one year loses half the remaining headroom
        let one_year = m
            .calculate_overall_confidence_at("E1", now + Duration::days(365))
            .await
            .unwrap();
        assert!((one_year - undecayed * 0.5).abs() < 1e-6);

        for years in [2, 5, 50] {
            let decayed = m
                .calculate_overall_confidence_at("E1", now + Duration::days(365 * years))
                .await
                .unwrap();
            assert!(decayed >= undecayed * 0.5 - 1e-12);
        }
    }

    #[tokio::test]
    async fn test_overall_confidence_unknown_equipment() {
        let m = manager();
        let err = m.calculate_overall_confidence("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_decay_factor_bounds() {
        assert_eq!(decay_factor(0.0, 1.0), 1.0);
        assert!((decay_factor(73.0, 1.0) - 0.8).abs() < 1e-12);
        assert_eq!(decay_factor(10_000.0, 1.0), 0.5);
        assert_eq!(decay_factor(10_000.0, 0.0), 1.0);
    }

    #[tokio::test]
    async fn test_needing_verification() {
        let m = manager();
        // Never verified
        m.update_confidence("never", Aspect::Position, ConfidenceLevel::High, DataSource::Ifc)
            .await
            .unwrap();
        // Verified, High position
        m.record_verification("fresh", DataSource::Lidar, "t", None).await.unwrap();
        // Verified but only Low position
        m.update_confidence("weak", Aspect::Position, ConfidenceLevel::Low, DataSource::Manual)
            .await
            .unwrap();
        m.record_verification("weak", DataSource::Manual, "t", None).await.unwrap();

        let now = time::now();
        assert_eq!(
            m.get_equipment_needing_verification_at(now).await,
            vec!["never".to_string(), "weak".to_string()]
        );

        // After the 90-day threshold the fresh verification is stale too
        let later = now + Duration::days(91);
        assert_eq!(
            m.get_equipment_needing_verification_at(later).await,
            vec!["fresh".to_string(), "never".to_string(), "weak".to_string()]
        );
    }

    #[tokio::test]
    async fn test_query_filters() {
        let m = manager();
        m.record_verification("A", DataSource::Lidar, "t", None).await.unwrap();
        m.update_confidence("A", Aspect::Semantic, ConfidenceLevel::Medium, DataSource::Ifc)
            .await
            .unwrap();
        m.update_confidence("B", Aspect::Position, ConfidenceLevel::Medium, DataSource::Pdf)
            .await
            .unwrap();
        m.update_confidence("C", Aspect::Position, ConfidenceLevel::Low, DataSource::Manual)
            .await
            .unwrap();

        let ids = |records: Vec<ConfidenceRecord>| {
            records.into_iter().map(|r| r.equipment_id).collect::<Vec<_>>()
        };

        let q = ConfidenceQuery::new().min_position(ConfidenceLevel::Medium);
        assert_eq!(ids(m.query_with_confidence(&q).await.unwrap()), vec!["A", "B"]);

        let q = ConfidenceQuery::new().min_semantic(ConfidenceLevel::Medium);
        assert_eq!(ids(m.query_with_confidence(&q).await.unwrap()), vec!["A"]);

        let q = ConfidenceQuery::new().verified_within(Duration::days(7));
        assert_eq!(ids(m.query_with_confidence(&q).await.unwrap()), vec!["A"]);

        let q = ConfidenceQuery::new().require_source("pdf").require_source("manual");
        assert_eq!(ids(m.query_with_confidence(&q).await.unwrap()), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_query_with_unknown_source_is_validation_error() {
        let m = manager();
        let q = ConfidenceQuery::new().require_source("carrier_pigeon");
        assert!(m.query_with_confidence(&q).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_runtime_settings_validation() {
        let m = manager();
        assert!(m.set_decay_rate(-0.1).await.is_err());
        assert!(m.set_verify_threshold(Duration::zero()).await.is_err());
        m.set_decay_rate(1.0).await.unwrap();
        m.set_verify_threshold(Duration::days(30)).await.unwrap();
        let settings = m.settings().await;
        assert_eq!(settings.decay_rate, 1.0);
        assert_eq!(settings.verify_threshold_days, 30);
    }

    #[tokio::test]
    async fn test_statistics() {
        let m = manager();
        assert_eq!(m.statistics().await.mean_overall_confidence, 0.0);

        m.record_verification("A", DataSource::Lidar, "t", None).await.unwrap();
        m.update_confidence("B", Aspect::Position, ConfidenceLevel::Low, DataSource::Pdf)
            .await
            .unwrap();

        let stats = m.statistics().await;
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.field_verified, 1);
        assert_eq!(stats.needing_verification, 1);
        assert_eq!(stats.by_position_level.get(&ConfidenceLevel::High), Some(&1));
        assert_eq!(stats.by_position_level.get(&ConfidenceLevel::Low), Some(&1));
        assert!(stats.mean_overall_confidence > 0.0);
    }

    #[tokio::test]
    async fn test_upgrade_emits_event() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let m = manager().with_event_bus(Arc::clone(&bus));

        m.update_confidence("E1", Aspect::Position, ConfidenceLevel::Medium, DataSource::Ifc)
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            SpatialEvent::ConfidenceUpgraded { equipment_id, level, source, .. } => {
                assert_eq!(equipment_id, "E1");
                assert_eq!(level, ConfidenceLevel::Medium);
                assert_eq!(source, "ifc");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
