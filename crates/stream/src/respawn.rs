use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::index::IndexId;

/// Deferred respawn timers keyed by game time.
///
/// Timers are never cancelled. Whoever pops a due timer must check that the
/// entity still exists and is still consumed before acting on it.
#[derive(Debug, Clone, Default)]
pub struct RespawnQueue {
    timers: BinaryHeap<Reverse<(Duration, IndexId)>>,
}

impl RespawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: Duration, handle: IndexId) {
        self.timers.push(Reverse((at, handle)));
    }

    /// Pop every timer due at or before `now`, earliest first.
    pub fn due(&mut self, now: Duration) -> Vec<IndexId> {
        let mut out = Vec::new();
        while let Some(Reverse((at, handle))) = self.timers.peek().copied() {
            if at > now {
                break;
            }
            self.timers.pop();
            out.push(handle);
        }
        out
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.timers.peek().map(|Reverse((at, _))| *at)
    }

    /// Pending timers, stale ones included.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
