//! Two-lane pending change queue
//!
//! The normal lane is a ring buffer: once it holds `max_size` changes the
//! oldest is evicted to make room. The high-priority lane is unbounded.

use serde::{Deserialize, Serialize};
use spatial_common::models::ARChange;
use std::collections::VecDeque;

/// Queue lane a change was placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    High,
    Normal,
}

#[derive(Debug)]
pub struct ChangeQueue {
    high: VecDeque<ARChange>,
    normal: VecDeque<ARChange>,
    max_size: usize,
}

impl ChangeQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Enqueue a change
    ///
    /// # Returns
    /// The normal-lane change evicted to make room, if any.
    pub fn push(&mut self, change: ARChange, lane: Lane) -> Option<ARChange> {
        match lane {
            Lane::High => {
                self.high.push_back(change);
                None
            }
            Lane::Normal => {
                let evicted = if self.normal.len() >= self.max_size {
                    self.normal.pop_front()
                } else {
                    None
                };
                self.normal.push_back(change);
                evicted
            }
        }
    }

    /// Remove every pending change, high-priority lane first
    pub fn drain(&mut self) -> Vec<ARChange> {
        self.high.drain(..).chain(self.normal.drain(..)).collect()
    }

    /// Remove every pending change without regard to lane
    pub fn clear(&mut self) -> usize {
        let count = self.len();
        self.high.clear();
        self.normal.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn high_len(&self) -> usize {
        self.high.len()
    }

    pub fn normal_len(&self) -> usize {
        self.normal.len()
    }

    pub fn find(&self, change_id: &str) -> Option<&ARChange> {
        self.high
            .iter()
            .chain(self.normal.iter())
            .find(|c| c.id == change_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_common::models::ChangeType;

    fn change(equipment: &str) -> ARChange {
        ARChange::new("S1", equipment, ChangeType::Modify, 0.9)
    }

    #[test]
    fn test_normal_lane_drops_oldest() {
        let mut q = ChangeQueue::new(2);
        assert!(q.push(change("a"), Lane::Normal).is_none());
        assert!(q.push(change("b"), Lane::Normal).is_none());
        let evicted = q.push(change("c"), Lane::Normal).unwrap();
        assert_eq!(evicted.equipment_id, "a");
        assert_eq!(q.normal_len(), 2);
    }

    #[test]
    fn test_high_lane_is_unbounded() {
        let mut q = ChangeQueue::new(1);
        for i in 0..10 {
            assert!(q.push(change(&i.to_string()), Lane::High).is_none());
        }
        assert_eq!(q.high_len(), 10);
    }

    #[test]
    fn test_drain_orders_high_first() {
        let mut q = ChangeQueue::new(10);
        q.push(change("n1"), Lane::Normal);
        q.push(change("h1"), Lane::High);
        q.push(change("n2"), Lane::Normal);
        q.push(change("h2"), Lane::High);

        let order: Vec<String> = q.drain().into_iter().map(|c| c.equipment_id).collect();
        assert_eq!(order, vec!["h1", "h2", "n1", "n2"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_find_and_clear() {
        let mut q = ChangeQueue::new(10);
        let c = change("x");
        let id = c.id.clone();
        q.push(c, Lane::Normal);
        assert!(q.find(&id).is_some());
        assert!(q.find("missing").is_none());
        assert_eq!(q.clear(), 1);
        assert!(q.is_empty());
    }
}
