//! Same-equipment conflict resolution within a batch
//!
//! When a batch names one piece of equipment more than once, the winner is
//! the latest-timestamped change among those whose confidence is at least
//! that of every competitor. A confident older observation therefore beats
//! a less confident newer one.

use spatial_common::models::ARChange;
use std::collections::HashMap;

/// Outcome of resolving one batch
#[derive(Debug, Default)]
pub struct Resolution {
    /// Changes to submit, in original batch order
    pub kept: Vec<ARChange>,
    /// Losing changes with the ID of the change that beat them
    pub superseded: Vec<(ARChange, String)>,
}

pub fn resolve_conflicts(batch: Vec<ARChange>) -> Resolution {
    let mut winners: HashMap<&str, usize> = HashMap::new();
    for (index, change) in batch.iter().enumerate() {
        winners
            .entry(change.equipment_id.as_str())
            .and_modify(|current| {
                if beats(change, &batch[*current]) {
                    *current = index;
                }
            })
            .or_insert(index);
    }

    let winner_ids: HashMap<String, String> = winners
        .iter()
        .map(|(equipment, index)| (equipment.to_string(), batch[*index].id.clone()))
        .collect();
    let winner_indices: Vec<usize> = winners.into_values().collect();

    let mut resolution = Resolution::default();
    for (index, change) in batch.into_iter().enumerate() {
        if winner_indices.contains(&index) {
            resolution.kept.push(change);
        } else {
            let winner = winner_ids
                .get(&change.equipment_id)
                .cloned()
                .unwrap_or_default();
            resolution.superseded.push((change, winner));
        }
    }
    resolution
}

/// Whether `challenger` (later in the batch) displaces `current`
///
/// Higher confidence always wins. At equal confidence the later timestamp
/// wins, and a tie on both goes to the later entry.
fn beats(challenger: &ARChange, current: &ARChange) -> bool {
    if challenger.confidence != current.confidence {
        return challenger.confidence > current.confidence;
    }
    challenger.timestamp >= current.timestamp
}
