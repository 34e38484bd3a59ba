//! Bounded retry of records that failed replay.

use std::collections::VecDeque;

use clinic_sync_core::ChangeRecord;

/// Default number of replay attempts before a record is dead-lettered.
pub const DEFAULT_MAX_REPLAY_ATTEMPTS: u32 = 5;

/// A record waiting for another replay attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    /// The record.
    pub record: ChangeRecord,
    /// Failed attempts so far.
    pub attempts: u32,
    /// The most recent failure.
    pub last_error: String,
}

/// What happened to a record after another failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Queued for another attempt.
    Requeued,
    /// A resent copy of a record that is already waiting; dropped.
    AlreadyQueued,
    /// Out of attempts; never retried again in this session.
    DeadLettered(PendingRecord),
}

/// FIFO queue of failed records, capped by attempt count.
#[derive(Debug)]
pub struct RetryQueue {
    entries: VecDeque<PendingRecord>,
    max_attempts: u32,
}

impl RetryQueue {
    /// Create an empty queue.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            entries: VecDeque::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Record a failure, first or repeated.
    ///
    /// A first failure of a record that is already queued (the peer sent it
    /// again) does not add a second entry.
    pub fn fail(&mut self, record: ChangeRecord, attempts: u32, error: String) -> RetryDecision {
        if attempts <= 1 && self.contains(&record) {
            return RetryDecision::AlreadyQueued;
        }
        let pending = PendingRecord {
            record,
            attempts,
            last_error: error,
        };
        if attempts >= self.max_attempts {
            return RetryDecision::DeadLettered(pending);
        }
        self.entries.push_back(pending);
        RetryDecision::Requeued
    }

    /// Whether the same logged write is waiting for a retry.
    pub fn contains(&self, record: &ChangeRecord) -> bool {
        self.entries.iter().any(|p| {
            p.record.timestamp == record.timestamp
                && p.record.collection == record.collection
                && p.record.key == record.key
        })
    }

    /// Take everything queued, oldest first.
    pub fn drain(&mut self) -> Vec<PendingRecord> {
        self.entries.drain(..).collect()
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REPLAY_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_sync_core::{DeviceId, DocKey, Timestamp};

    fn record() -> ChangeRecord {
        ChangeRecord::local_delete(Timestamp(1), "patients", DocKey::Int(1), DeviceId::ZERO)
    }

    #[test]
    fn test_dead_letter_after_max_attempts() {
        let mut queue = RetryQueue::new(3);

        assert_eq!(queue.fail(record(), 1, "boom".into()), RetryDecision::Requeued);
        let pending = queue.drain().remove(0);
        assert_eq!(queue.fail(pending.record, 2, "boom".into()), RetryDecision::Requeued);
        let pending = queue.drain().remove(0);

        match queue.fail(pending.record, 3, "still boom".into()) {
            RetryDecision::DeadLettered(dead) => {
                assert_eq!(dead.attempts, 3);
                assert_eq!(dead.last_error, "still boom");
            }
            other => panic!("expected dead letter, got {:?}", other),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_resent_record_is_not_queued_twice() {
        let mut queue = RetryQueue::new(3);

        assert_eq!(queue.fail(record(), 1, "boom".into()), RetryDecision::Requeued);
        assert_eq!(queue.fail(record(), 1, "boom".into()), RetryDecision::AlreadyQueued);
        assert_eq!(queue.len(), 1);

        // A different write of the same document is its own entry.
        let mut later = record();
        later.timestamp = Timestamp(2);
        assert_eq!(queue.fail(later, 1, "boom".into()), RetryDecision::Requeued);
        assert_eq!(queue.len(), 2);

        // Retries of a drained entry are tracked as usual.
        let pending = queue.drain().remove(0);
        assert_eq!(queue.fail(pending.record, 2, "boom".into()), RetryDecision::Requeued);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_keeps_order() {
        let mut queue = RetryQueue::default();
        for ts in [1, 2, 3] {
            let mut r = record();
            r.timestamp = Timestamp(ts);
            queue.fail(r, 1, String::new());
        }

        let order: Vec<i64> = queue.drain().iter().map(|p| p.record.timestamp.0).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(queue.len(), 0);
    }
}
