//! # Spatial Reconciliation Engine (spatial-recon)
//!
//! Reconciles what AR sessions observe on site with the authoritative
//! building model.
//!
//! **Components:**
//! - [`coordinates`]: grid, world, GPS and AR coordinate translation plus the
//!   movement significance policy
//! - [`confidence`]: per-equipment trust that only upgrades and decays with
//!   time since field verification
//! - [`coverage`]: scanned-region bookkeeping and gap detection
//! - [`anchors`]: AR anchor tracking state and anchor-relative resolution
//! - [`sync`]: per-session change queues flushed in batches to a
//!   [`sync::BimUpdater`]
//!
//! [`BuildingContext`] wires one building's components together.

pub mod anchors;
pub mod confidence;
pub mod config;
pub mod context;
pub mod coordinates;
pub mod coverage;
pub mod sync;

pub use config::ReconConfig;
pub use context::{BuildingContext, Stores};
pub use spatial_common::{Error, Result};
