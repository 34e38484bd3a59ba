//! The activity log: a bounded, timestamped record of connects, disconnects
//! and errors, for display to operators.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use clinic_sync_core::{Clock, SystemClock, Timestamp};

/// Default number of entries kept.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 200;

/// What an entry reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Connected,
    Disconnected,
    Error,
    Info,
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub at: Timestamp,
    pub kind: ActivityKind,
    pub message: String,
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}: {}", self.at, self.kind, self.message)
    }
}

/// Shared handle to a bounded activity log. Oldest entries are evicted.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<ActivityEntry>>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl ActivityLog {
    /// Create a log keeping at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Create a log stamping entries from `clock`.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ActivityEntry>> {
        // Entries are plain data; a panic mid-push cannot corrupt them.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry.
    pub fn record(&self, kind: ActivityKind, message: impl Into<String>) {
        let entry = ActivityEntry {
            at: self.clock.now(),
            kind,
            message: message.into(),
        };
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Entries of one kind.
    pub fn of_kind(&self, kind: ActivityKind) -> Vec<ActivityEntry> {
        self.lock().iter().filter(|e| e.kind == kind).cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_sync_core::ManualClock;

    #[test]
    fn test_bounded() {
        let log = ActivityLog::new(2);
        log.record(ActivityKind::Connected, "a");
        log.record(ActivityKind::Error, "b");
        log.record(ActivityKind::Disconnected, "c");

        let messages: Vec<_> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["b", "c"]);
    }

    #[test]
    fn test_entries_are_timestamped() {
        let clock = ManualClock::new(42);
        let log = ActivityLog::with_clock(10, Arc::new(clock.clone()));

        log.record(ActivityKind::Connected, "peer connected");
        clock.advance(8);
        log.record(ActivityKind::Error, "decrypt failed");

        let entries = log.entries();
        assert_eq!(entries[0].at, Timestamp(42));
        assert_eq!(entries[1].at, Timestamp(50));
        assert_eq!(log.of_kind(ActivityKind::Error).len(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let log = ActivityLog::default();
        let view = log.clone();
        log.record(ActivityKind::Info, "hello");
        assert_eq!(view.len(), 1);
    }
}
