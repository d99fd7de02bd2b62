//! # Spatial Common Library
//!
//! Shared code for the spatial reconciliation workspace:
//! - Geometric value types (points, grid coordinates, quaternions, bounds)
//! - Domain models (scanned regions, anchors, AR changes, confidence levels)
//! - Error taxonomy
//! - Event types and EventBus
//! - Configuration file helpers
//! - Optional region/anchor persistence

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod geometry;
pub mod models;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use geometry::{Bounds2D, GpsCoordinate, GridCoordinate, GridDelta, Point2D, Point3D, Quaternion};
