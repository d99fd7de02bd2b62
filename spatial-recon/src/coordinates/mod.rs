//! Coordinate translation between grid, world, GPS and AR spaces

mod thresholds;
mod translator;

pub use thresholds::MovementThresholds;
pub use translator::{CoordinateTranslator, TranslatorSettings, METERS_PER_DEGREE_LAT};
