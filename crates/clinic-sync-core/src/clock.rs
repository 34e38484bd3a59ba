//! Clocks for stamping change-log entries.
//!
//! [`LogClock`] turns any wall clock into a strictly increasing sequence, so
//! an incremental `timestamp > since` scan never skips a record appended in
//! the same millisecond as one already scanned.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::types::Timestamp;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Timestamp(ms)
    }
}

/// A manually driven clock for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Start at the given time.
    pub fn new(start: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Jump to a time.
    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Move forward.
    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.load(Ordering::SeqCst))
    }
}

/// Strictly increasing timestamps: `max(now, last + 1)`.
#[derive(Debug)]
pub struct LogClock {
    clock: Arc<dyn Clock>,
    last: AtomicI64,
}

impl LogClock {
    /// Wrap a wall clock, starting from zero.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::resume(clock, Timestamp::ZERO)
    }

    /// Wrap a wall clock, continuing after `last` (the newest logged timestamp).
    pub fn resume(clock: Arc<dyn Clock>, last: Timestamp) -> Self {
        Self {
            clock,
            last: AtomicI64::new(last.0),
        }
    }

    /// Issue the next timestamp.
    pub fn next(&self) -> Timestamp {
        let now = self.clock.now().0;
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Timestamp(candidate),
                Err(actual) => last = actual,
            }
        }
    }

    /// Note a timestamp seen elsewhere; later timestamps will exceed it.
    pub fn observe(&self, ts: Timestamp) {
        self.last.fetch_max(ts.0, Ordering::SeqCst);
    }

    /// The most recently issued timestamp.
    pub fn last(&self) -> Timestamp {
        Timestamp(self.last.load(Ordering::SeqCst))
    }
}
