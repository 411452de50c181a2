//! Rolling window of recent events

use std::collections::VecDeque;

use crate::config::WINDOW_CAPACITY;
use crate::types::{AttendanceEvent, Snapshot};

/// Newest-first window of events plus a lifetime counter
///
/// `lifetime_count` only ever grows (until [`RollingStore::reset`]) and is
/// never smaller than the window length.
#[derive(Debug, Clone)]
pub struct RollingStore {
    window: VecDeque<AttendanceEvent>,
    capacity: usize,
    lifetime_count: u64,
}

impl RollingStore {
    /// Create an empty store; a zero capacity is raised to 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
            lifetime_count: 0,
        }
    }

    /// Push `event` to the front, evicting from the tail past capacity
    pub fn apply(&mut self, event: AttendanceEvent) -> Snapshot {
        self.window.push_front(event);
        while self.window.len() > self.capacity {
            self.window.pop_back();
        }
        self.lifetime_count += 1;
        self.current_snapshot()
    }

    /// Drop every event and zero the counter
    pub fn reset(&mut self) {
        self.window.clear();
        self.lifetime_count = 0;
    }

    /// Copy of the current state with a stopped generator
    pub fn current_snapshot(&self) -> Snapshot {
        Snapshot {
            events: self.window.iter().cloned().collect(),
            lifetime_count: self.lifetime_count,
            generator: Default::default(),
        }
    }

    pub fn lifetime_count(&self) -> u64 {
        self.lifetime_count
    }
}

impl Default for RollingStore {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}
