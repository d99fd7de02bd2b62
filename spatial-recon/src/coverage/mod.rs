//! Scan coverage tracking per building

mod gaps;
mod provider;
mod tracker;

pub use gaps::unscanned_areas;
pub use provider::{GeometryProvider, StaticGeometry};
pub use tracker::{CoverageMap, CoverageSettings, CoverageTracker};
