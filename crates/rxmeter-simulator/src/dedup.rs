//! Bounded, approximate "seen recently" filter for packet identifiers.
//!
//! Slot `id % capacity` remembers the last identifier that landed in it.
//! This is lossy in both directions: a duplicate is missed when an aliasing
//! identifier overwrote its slot in between, and two different identifiers
//! that share a slot are each reported as new. Sizing the window larger than
//! the number of packets in flight across all receivers keeps the first case
//! rare.

pub struct DuplicateWindow {
    slots: Vec<Option<u64>>,
}

impl DuplicateWindow {
    /// `capacity` must be non-zero; `SimConfig::validate` enforces this.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, id: u64) -> usize {
        (id % self.slots.len() as u64) as usize
    }

    pub fn contains(&self, id: u64) -> bool {
        self.slots[self.slot(id)] == Some(id)
    }

    /// Record `id`. Returns `true` if it was not already held in its slot.
    pub fn insert(&mut self, id: u64) -> bool {
        let slot = self.slot(id);
        if self.slots[slot] == Some(id) {
            false
        } else {
            self.slots[slot] = Some(id);
            true
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}
