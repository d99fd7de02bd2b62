//! Confidence-filtered queries and summary statistics

use super::ConfidenceRecord;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use spatial_common::models::{ConfidenceLevel, DataSource};
use spatial_common::{Error, Result};
use std::collections::BTreeMap;

/// Filter over confidence records; every set criterion must hold
#[derive(Debug, Clone, Default)]
pub struct ConfidenceQuery {
    pub min_position: Option<ConfidenceLevel>,
    pub min_semantic: Option<ConfidenceLevel>,
    /// Only records field-verified within this window
    pub verified_within: Option<Duration>,
    /// Records must have at least one aspect attributed to one of these
    pub required_sources: Vec<DataSource>,
}

impl ConfidenceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_position(mut self, level: ConfidenceLevel) -> Self {
        self.min_position = Some(level);
        self
    }

    pub fn min_semantic(mut self, level: ConfidenceLevel) -> Self {
        self.min_semantic = Some(level);
        self
    }

    pub fn verified_within(mut self, window: Duration) -> Self {
        self.verified_within = Some(window);
        self
    }

    pub fn require_source(mut self, source: impl Into<DataSource>) -> Self {
        self.required_sources.push(source.into());
        self
    }

    /// Reject filters that could never be meaningfully evaluated
    pub fn validate(&self) -> Result<()> {
        if let Some(unknown) = self.required_sources.iter().find(|s| !s.is_known()) {
            return Err(Error::validation(format!(
                "unknown source type '{}' in confidence query",
                unknown
            )));
        }
        if let Some(window) = self.verified_within {
            if window <= Duration::zero() {
                return Err(Error::validation("verification window must be positive"));
            }
        }
        Ok(())
    }

    pub(crate) fn matches(&self, record: &ConfidenceRecord, now: DateTime<Utc>) -> bool {
        if let Some(min) = self.min_position {
            if record.position.level < min {
                return false;
            }
        }
        if let Some(min) = self.min_semantic {
            if record.semantic.level < min {
                return false;
            }
        }
        if let Some(window) = self.verified_within {
            match record.last_field_verified {
                Some(verified) if now - verified <= window => {}
                _ => return false,
            }
        }
        if !self.required_sources.is_empty()
            && !self.required_sources.iter().any(|s| record.has_source(s))
        {
            return false;
        }
        true
    }
}

/// Aggregate view over every tracked record
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfidenceStatistics {
    pub total_records: usize,
    pub by_position_level: BTreeMap<ConfidenceLevel, usize>,
    pub field_verified: usize,
    pub needing_verification: usize,
    /// Mean decayed overall confidence; 0.0 with no records
    pub mean_overall_confidence: f64,
}
