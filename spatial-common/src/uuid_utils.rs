//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4 rendered as a string identifier
///
/// Regions, changes and anchors are keyed by string IDs so that identifiers
/// minted by external systems (BIM exports, AR SDKs) can be stored verbatim.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
