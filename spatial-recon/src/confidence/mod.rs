//! Equipment confidence tracking

mod manager;
mod query;
mod record;

pub use manager::{decay_factor, ConfidenceManager, ConfidenceSettings};
pub use query::{ConfidenceQuery, ConfidenceStatistics};
pub use record::{Aspect, AspectConfidence, ConfidenceRecord, VerificationEvent};
