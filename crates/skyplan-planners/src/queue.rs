//! Open queue with re-insertion semantics.
//!
//! Priority changes are handled by re-inserting under a fresh generation
//! and filtering stale entries on pop, so the heap never holds mutable
//! keys.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use skyplan_core::WaypointId;

/// Two-level search key; lower pops first, then the secondary component,
/// then insertion order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchKey {
    pub primary: f64,
    pub secondary: f64,
}

impl SearchKey {
    pub fn new(primary: f64, secondary: f64) -> Self {
        Self { primary, secondary }
    }

    fn cmp_total(&self, other: &Self) -> Ordering {
        self.primary
            .total_cmp(&other.primary)
            .then(self.secondary.total_cmp(&other.secondary))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: SearchKey,
    seq: u64,
    id: WaypointId,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // inverted so the BinaryHeap max-heap pops the smallest key;
        // equal keys pop in insertion order
        other
            .key
            .cmp_total(&self.key)
            .then(other.seq.cmp(&self.seq))
    }
}

/// Priority queue of expandable waypoints.
#[derive(Debug, Default)]
pub struct OpenQueue {
    heap: BinaryHeap<Entry>,
    current: HashMap<WaypointId, u64>,
    seq: u64,
}

impl OpenQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn contains(&self, id: WaypointId) -> bool {
        self.current.contains_key(&id)
    }

    /// Insert a waypoint, or update its priority by superseding the old
    /// entry.
    pub fn insert(&mut self, id: WaypointId, key: SearchKey) {
        self.seq += 1;
        self.current.insert(id, self.seq);
        self.heap.push(Entry {
            key,
            seq: self.seq,
            id,
        });
    }

    /// Lazily remove a waypoint; its heap entry dies on pop.
    pub fn remove(&mut self, id: WaypointId) -> bool {
        self.current.remove(&id).is_some()
    }

    /// Pop the best live entry, skipping superseded and removed ones.
    pub fn pop(&mut self) -> Option<WaypointId> {
        while let Some(entry) = self.heap.pop() {
            if self.current.get(&entry.id) == Some(&entry.seq) {
                self.current.remove(&entry.id);
                return Some(entry.id);
            }
        }
        None
    }

    /// Ids currently queued, in no particular order.
    pub fn ids(&self) -> Vec<WaypointId> {
        self.current.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_lowest_key_first() {
        let mut open = OpenQueue::new();
        open.insert(WaypointId(0), SearchKey::new(3.0, 0.0));
        open.insert(WaypointId(1), SearchKey::new(1.0, 0.0));
        open.insert(WaypointId(2), SearchKey::new(2.0, 0.0));
        assert_eq!(open.pop(), Some(WaypointId(1)));
        assert_eq!(open.pop(), Some(WaypointId(2)));
        assert_eq!(open.pop(), Some(WaypointId(0)));
        assert_eq!(open.pop(), None);
    }

    #[test]
    fn reinsertion_supersedes_old_priority() {
        let mut open = OpenQueue::new();
        open.insert(WaypointId(0), SearchKey::new(5.0, 0.0));
        open.insert(WaypointId(1), SearchKey::new(2.0, 0.0));
        open.insert(WaypointId(0), SearchKey::new(1.0, 0.0));
        assert_eq!(open.pop(), Some(WaypointId(0)));
        assert_eq!(open.pop(), Some(WaypointId(1)));
        assert_eq!(open.pop(), None);
        assert!(open.is_empty());
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut open = OpenQueue::new();
        open.insert(WaypointId(7), SearchKey::new(1.0, 0.0));
        open.insert(WaypointId(3), SearchKey::new(1.0, 0.0));
        assert_eq!(open.pop(), Some(WaypointId(7)));
        assert_eq!(open.pop(), Some(WaypointId(3)));
    }

    #[test]
    fn secondary_key_orders_equal_primaries() {
        let mut open = OpenQueue::new();
        open.insert(WaypointId(0), SearchKey::new(1.0, 0.5));
        open.insert(WaypointId(1), SearchKey::new(1.0, -0.5));
        assert_eq!(open.pop(), Some(WaypointId(1)));
    }

    #[test]
    fn removed_entries_never_pop() {
        let mut open = OpenQueue::new();
        open.insert(WaypointId(0), SearchKey::new(1.0, 0.0));
        open.insert(WaypointId(1), SearchKey::new(2.0, 0.0));
        assert!(open.remove(WaypointId(0)));
        assert_eq!(open.pop(), Some(WaypointId(1)));
        assert_eq!(open.pop(), None);
    }
}
