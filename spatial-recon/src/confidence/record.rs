//! Per-equipment confidence records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spatial_common::models::{ConfidenceLevel, DataSource};
use spatial_common::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Independently tracked facets of an equipment fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    /// Where the equipment is
    Position,
    /// What the equipment is (type, classification, attributes)
    Semantic,
}

impl Aspect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aspect::Position => "position",
            Aspect::Semantic => "semantic",
        }
    }
}

impl FromStr for Aspect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "position" => Ok(Aspect::Position),
            "semantic" => Ok(Aspect::Semantic),
            other => Err(Error::validation(format!("unknown confidence aspect '{}'", other))),
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trust state of one aspect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectConfidence {
    pub level: ConfidenceLevel,
    pub source: DataSource,
    pub updated_at: DateTime<Utc>,
    /// Estimated accuracy in meters, when the source provides one
    pub accuracy: Option<f64>,
}

impl AspectConfidence {
    fn initial(now: DateTime<Utc>) -> Self {
        Self {
            level: ConfidenceLevel::Estimated,
            source: DataSource::Estimated,
            updated_at: now,
            accuracy: None,
        }
    }

    /// Apply a report if it is an upgrade
    ///
    /// A strictly higher level always wins. At an equal level only a
    /// strictly higher-priority source replaces the current attribution.
    pub(crate) fn try_upgrade(
        &mut self,
        level: ConfidenceLevel,
        source: DataSource,
        now: DateTime<Utc>,
    ) -> bool {
        let upgrade = level > self.level
            || (level == self.level && source.priority() > self.source.priority());
        if upgrade {
            self.force(level, source, now);
        }
        upgrade
    }

    pub(crate) fn force(&mut self, level: ConfidenceLevel, source: DataSource, now: DateTime<Utc>) {
        self.accuracy = source.typical_accuracy();
        self.level = level;
        self.source = source;
        self.updated_at = now;
    }
}

/// Field or sensor confirmation of a piece of equipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEvent {
    pub timestamp: DateTime<Utc>,
    pub method: DataSource,
    pub user: String,
    pub notes: Option<String>,
}

/// Everything known about how far a piece of equipment can be trusted
///
/// Created lazily on first update and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRecord {
    pub equipment_id: String,
    pub position: AspectConfidence,
    pub semantic: AspectConfidence,
    /// Append-only
    pub verification_history: Vec<VerificationEvent>,
    pub last_field_verified: Option<DateTime<Utc>>,
    pub verification_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ConfidenceRecord {
    pub(crate) fn new(equipment_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            equipment_id: equipment_id.to_string(),
            position: AspectConfidence::initial(now),
            semantic: AspectConfidence::initial(now),
            verification_history: Vec::new(),
            last_field_verified: None,
            verification_count: 0,
            created_at: now,
        }
    }

    pub fn aspect(&self, aspect: Aspect) -> &AspectConfidence {
        match aspect {
            Aspect::Position => &self.position,
            Aspect::Semantic => &self.semantic,
        }
    }

    pub(crate) fn aspect_mut(&mut self, aspect: Aspect) -> &mut AspectConfidence {
        match aspect {
            Aspect::Position => &mut self.position,
            Aspect::Semantic => &mut self.semantic,
        }
    }

    /// Weighted trust before decay: 60% position, 40% semantic
    pub fn base_score(&self) -> f64 {
        self.position.level.normalized() * 0.6 + self.semantic.level.normalized() * 0.4
    }

    /// Whether either aspect is attributed to `source`
    pub fn has_source(&self, source: &DataSource) -> bool {
        &self.position.source == source || &self.semantic.source == source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_parse() {
        assert_eq!("Position".parse::<Aspect>().unwrap(), Aspect::Position);
        assert_eq!(" semantic ".parse::<Aspect>().unwrap(), Aspect::Semantic);
        assert!("color".parse::<Aspect>().unwrap_err().is_validation());
    }

    #[test]
    fn test_upgrade_rules() {
        let now = Utc::now();
        let mut aspect = AspectConfidence::initial(now);

        assert!(aspect.try_upgrade(ConfidenceLevel::Medium, DataSource::Ifc, now));
        // Same level, lower priority: ignored
        assert!(!aspect.try_upgrade(ConfidenceLevel::Medium, DataSource::Pdf, now));
        // Same level, same priority: ignored
        assert!(!aspect.try_upgrade(ConfidenceLevel::Medium, DataSource::Ifc, now));
        // Lower level, higher priority: ignored
        assert!(!aspect.try_upgrade(ConfidenceLevel::Low, DataSource::Lidar, now));
        assert_eq!(aspect.source, DataSource::Ifc);

        // Same level, higher priority: applied
        assert!(aspect.try_upgrade(ConfidenceLevel::Medium, DataSource::Lidar, now));
        assert_eq!(aspect.source, DataSource::Lidar);
        assert_eq!(aspect.accuracy, Some(0.02));

        // Higher level from a weaker source still wins
        assert!(aspect.try_upgrade(ConfidenceLevel::High, DataSource::Manual, now));
        assert_eq!(aspect.level, ConfidenceLevel::High);
        assert_eq!(aspect.source, DataSource::Manual);
    }

    #[test]
    fn test_base_score_weights() {
        let now = Utc::now();
        let mut record = ConfidenceRecord::new("E1", now);
        assert_eq!(record.base_score(), 0.0);

        record.position.force(ConfidenceLevel::High, DataSource::Lidar, now);
        assert!((record.base_score() - 0.6).abs() < 1e-12);

        record.semantic.force(ConfidenceLevel::High, DataSource::Ifc, now);
        assert!((record.base_score() - 1.0).abs() < 1e-12);
        assert!(record.has_source(&DataSource::Ifc));
        assert!(!record.has_source(&DataSource::Pdf));
    }
}
