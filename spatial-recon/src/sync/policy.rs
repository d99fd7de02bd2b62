//! Change significance and criticality

use crate::coordinates::CoordinateTranslator;
use spatial_common::models::{ARChange, ChangeType};

/// Moves longer than this (m) are synced immediately
pub const CRITICAL_MOVE_DISTANCE: f64 = 1.0;

/// Whether a change is large enough for the high-priority lane
///
/// Moves compare their straight-line distance with `position_threshold`;
/// with a translator attached, a move the translator finds significant
/// (floor change, grid or room threshold) also qualifies. Rotations compare
/// the quaternion angle with `rotation_threshold` degrees. Adds, removals
/// and modifications always qualify.
pub fn exceeds_threshold(
    change: &ARChange,
    position_threshold: f64,
    rotation_threshold: f64,
    translator: Option<&CoordinateTranslator>,
) -> bool {
    match change.change_type {
        ChangeType::Move => {
            if change.distance() >= position_threshold {
                return true;
            }
            match (translator, change.old_position, change.new_position) {
                (Some(t), Some(old), Some(new)) => t.is_significant_movement(old, new),
                _ => false,
            }
        }
        ChangeType::Rotate => match (change.old_rotation, change.new_rotation) {
            (Some(old), Some(new)) => old.angle_to_degrees(&new) >= rotation_threshold,
            _ => false,
        },
        ChangeType::Add | ChangeType::Remove | ChangeType::Modify => true,
    }
}

/// Whether a change warrants an out-of-band sync
pub fn is_critical(change: &ARChange) -> bool {
    match change.change_type {
        ChangeType::Add | ChangeType::Remove => true,
        ChangeType::Move => change.distance() > CRITICAL_MOVE_DISTANCE,
        ChangeType::Rotate | ChangeType::Modify => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_common::{Point3D, Quaternion};

    fn moved(dx: f64) -> ARChange {
        ARChange::moved("S1", "E1", Point3D::ORIGIN, Point3D::new(dx, 0.0, 0.0), 0.9)
    }

    #[test]
    fn test_move_threshold() {
        assert!(exceeds_threshold(&moved(0.5), 0.3, 5.0, None));
        assert!(!exceeds_threshold(&moved(0.2), 0.3, 5.0, None));
        assert!(exceeds_threshold(&moved(0.3), 0.3, 5.0, None));
    }

    #[test]
    fn test_translator_significance_promotes_small_distance() {
        // Floor change with a large position threshold
        let t = CoordinateTranslator::new();
        let change = ARChange::moved(
            "S1",
            "E1",
            Point3D::new(0.0, 0.0, 2.8),
            Point3D::new(0.0, 0.0, 3.4),
            0.9,
        );
        assert!(!exceeds_threshold(&change, 10.0, 5.0, None));
        assert!(exceeds_threshold(&change, 10.0, 5.0, Some(&t)));
    }

    #[test]
    fn test_rotation_threshold() {
        let small = ARChange::rotated(
            "S1",
            "E1",
            Quaternion::IDENTITY,
            Quaternion::from_yaw_degrees(3.0),
            0.9,
        );
        let large = ARChange::rotated(
            "S1",
            "E1",
            Quaternion::IDENTITY,
            Quaternion::from_yaw_degrees(10.0),
            0.9,
        );
        assert!(!exceeds_threshold(&small, 0.1, 5.0, None));
        assert!(exceeds_threshold(&large, 0.1, 5.0, None));
    }

    #[test]
    fn test_structural_changes_always_exceed() {
        for change_type in [ChangeType::Add, ChangeType::Remove, ChangeType::Modify] {
            let change = ARChange::new("S1", "E1", change_type, 0.9);
            assert!(exceeds_threshold(&change, 100.0, 180.0, None));
        }
    }

    #[test]
    fn test_criticality() {
        assert!(is_critical(&ARChange::new("S1", "E1", ChangeType::Add, 0.9)));
        assert!(is_critical(&ARChange::new("S1", "E1", ChangeType::Remove, 0.9)));
        assert!(!is_critical(&ARChange::new("S1", "E1", ChangeType::Modify, 0.9)));
        assert!(is_critical(&moved(1.5)));
        assert!(!is_critical(&moved(1.0)));
        assert!(!is_critical(&moved(0.5)));
    }
}
