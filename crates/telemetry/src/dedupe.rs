use std::collections::{HashSet, VecDeque};

use common::EventId;

/// Number of recent event IDs a consumer remembers by default.
pub const DEFAULT_DEDUPE_WINDOW: usize = 10_000;

/// Bounded memory of recently applied event IDs.
///
/// The oldest ID is forgotten once the window is full. Duplicates older than
/// the window are caught by the stores' own idempotency.
#[derive(Debug)]
pub struct Deduplicator {
    capacity: usize,
    seen: HashSet<EventId>,
    order: VecDeque<EventId>,
}

impl Deduplicator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.seen.contains(id)
    }

    /// Records an ID. Returns false if it was already remembered.
    pub fn remember(&mut self, id: EventId) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUPE_WINDOW)
    }
}
