//! Configuration for the spatial-recon daemon
//!
//! One TOML file, every field optional:
//!
//! ```toml
//! database_path = "/var/lib/spatial-recon/recon.db"
//!
//! [building]
//! id = "HQ"
//! grid_scale = 0.5
//! floor_height = 3.0
//!
//! [thresholds]
//! grid_unit_threshold = 1.0
//!
//! [sync]
//! sync_interval_secs = 30
//! confidence_required = 0.7
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Sections: `[building]`, `[thresholds]`, `[confidence]`, `[coverage]`,
//! `[sync]`, `[anchors]`, `[logging]`. File resolution follows
//! [`spatial_common::config::resolve_config_path`].

use crate::anchors::AnchorSettings;
use crate::confidence::ConfidenceSettings;
use crate::coordinates::{MovementThresholds, TranslatorSettings};
use crate::coverage::CoverageSettings;
use crate::sync::SyncConfig;
use serde::{Deserialize, Serialize};
use spatial_common::config::{self, LoggingConfig};
use spatial_common::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SPATIAL_RECON_CONFIG";

/// Directory name under the platform config dir
pub const APP_NAME: &str = "spatial-recon";

/// Building identity and coordinate frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    pub id: String,
    #[serde(flatten)]
    pub translator: TranslatorSettings,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            translator: TranslatorSettings::default(),
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// SQLite file mirroring regions and anchors; in-memory only when unset
    pub database_path: Option<PathBuf>,
    pub building: BuildingConfig,
    pub thresholds: MovementThresholds,
    pub confidence: ConfidenceSettings,
    pub coverage: CoverageSettings,
    pub sync: SyncConfig,
    pub anchors: AnchorSettings,
    pub logging: LoggingConfig,
}

impl ReconConfig {
    /// Config file to read: CLI path, then `SPATIAL_RECON_CONFIG`, then the
    /// platform default if it exists
    pub fn resolve_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
        config::resolve_config_path(cli_arg, CONFIG_ENV_VAR, APP_NAME)
    }

    /// Load and validate; a missing file yields defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let loaded: ReconConfig = config::load_or_default(path)?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values no component could run with
    ///
    /// Component constructors repeat their own checks; this only lets the
    /// daemon fail before anything is built.
    pub fn validate(&self) -> Result<()> {
        if self.building.id.trim().is_empty() {
            return Err(Error::Config("building.id must not be empty".to_string()));
        }
        let t = &self.building.translator;
        if !(t.grid_scale.is_finite() && t.grid_scale > 0.0) {
            return Err(Error::Config("building.grid_scale must be positive".to_string()));
        }
        if !(t.floor_height.is_finite() && t.floor_height > 0.0) {
            return Err(Error::Config("building.floor_height must be positive".to_string()));
        }
        let th = &self.thresholds;
        let thresholds = [
            th.grid_unit_threshold,
            th.room_change_threshold,
            th.rotation_threshold,
        ];
        if thresholds.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::Config("movement thresholds must be non-negative".to_string()));
        }
        self.sync
            .validate()
            .and_then(|_| self.anchors.validate())
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Write this configuration as TOML
    pub fn write(&self, path: &Path) -> Result<()> {
        config::write_toml(self, path)
    }
}
