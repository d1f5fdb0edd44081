//! # Recent Event Window
//!
//! Fixed-capacity, newest-first container of anomaly events. A push at
//! capacity evicts the oldest entry. Only the subscriber task writes to it;
//! observers get copies through [`RecentEventWindow::snapshot`].

use std::collections::VecDeque;

use crate::core::model::AnomalyEvent;

/// Default number of events kept.
pub const DEFAULT_WINDOW_CAPACITY: usize = 10;

/// Bounded newest-first event buffer.
#[derive(Debug, Clone)]
pub struct RecentEventWindow {
    events: VecDeque<AnomalyEvent>,
    capacity: usize,
}

impl RecentEventWindow {
    /// Creates an empty window. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepends an event, evicting the oldest when full. Amortized O(1).
    pub fn push(&mut self, event: AnomalyEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_back();
        }
        self.events.push_front(event);
    }

    /// Newest-first copy of the contents. O(K).
    pub fn snapshot(&self) -> Vec<AnomalyEvent> {
        self.events.iter().cloned().collect()
    }

    /// The most recently pushed event.
    pub fn latest(&self) -> Option<&AnomalyEvent> {
        self.events.front()
    }

    /// Number of events held.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of events held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentEventWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}
