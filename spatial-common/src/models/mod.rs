//! Domain models shared by the reconciliation components and persistence
//!
//! Split by concern; everything is re-exported here.

mod anchor;
mod change;
mod confidence_types;
mod region;

pub use anchor::{AnchorState, SpatialAnchor};
pub use change::{ARChange, ChangeStatus, ChangeType};
pub use confidence_types::{ConfidenceLevel, DataSource};
pub use region::{ScanType, ScannedRegion, HIGH_DENSITY_POINTS_PER_M2};
