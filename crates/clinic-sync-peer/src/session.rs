//! Per-connection session state.

use bytes::Bytes;

use clinic_sync_core::{DeviceId, Timestamp};
use clinic_sync_crypto::{Envelope, PairingKey};

use crate::error::{Result, SyncError};
use crate::messages::SyncMessage;
use crate::retry::RetryQueue;
use crate::transport::LinkSender;

/// A timestamp that only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark(Timestamp);

impl Watermark {
    /// Current value.
    pub fn get(self) -> Timestamp {
        self.0
    }

    /// Move to `ts` if it is ahead. Returns whether the watermark moved.
    pub fn advance(&mut self, ts: Timestamp) -> bool {
        if ts > self.0 {
            self.0 = ts;
            true
        } else {
            false
        }
    }
}

/// Counters for one session, returned when it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Records transmitted in `changes` messages.
    pub records_sent: usize,
    /// Foreign records that changed local state.
    pub records_applied: usize,
    /// Foreign records that were already superseded locally.
    pub records_stale: usize,
    /// Replay failures, including retries.
    pub records_failed: usize,
    /// Records abandoned after too many failures.
    pub dead_lettered: usize,
    /// Local records too large to fit in one frame, never sent.
    pub records_skipped: usize,
    /// Messages dropped before dispatch (bad envelope, bad JSON, over limits).
    pub messages_dropped: usize,
    /// Final `lastAppliedTs`.
    pub last_applied: Timestamp,
    /// Final `lastSentTs`.
    pub last_sent: Timestamp,
    /// The peer's device, once it said hello.
    pub peer: Option<DeviceId>,
}

/// State of one live pairing: key, channel and watermarks.
///
/// Watermarks start at zero for every session, so each reconnect re-scans
/// the whole log. Last-writer-wins makes the resend harmless.
#[derive(Debug)]
pub struct PairSession {
    key: PairingKey,
    sender: LinkSender,
    pub last_applied: Watermark,
    pub last_sent: Watermark,
    pub peer: Option<DeviceId>,
    pub retry: RetryQueue,
    pub report: SessionReport,
}

impl PairSession {
    pub fn new(key: PairingKey, sender: LinkSender, max_replay_attempts: u32) -> Self {
        Self {
            key,
            sender,
            last_applied: Watermark::default(),
            last_sent: Watermark::default(),
            peer: None,
            retry: RetryQueue::new(max_replay_attempts),
            report: SessionReport::default(),
        }
    }

    /// Seal a message into the bytes of one frame.
    pub fn seal(&self, message: &SyncMessage) -> Result<Bytes> {
        let envelope = Envelope::seal(message, &self.key)?;
        Ok(Bytes::from(envelope.to_bytes()?))
    }

    /// Send an already sealed frame. Returns false if nothing was sent.
    pub fn send_frame(&self, kind: &'static str, frame: Bytes) -> bool {
        let sent = self.sender.send(frame);
        if sent {
            tracing::debug!(kind, "sent");
        } else {
            tracing::debug!(kind, "link closed, message dropped");
        }
        sent
    }

    /// Seal and send a message. Returns false if nothing was sent.
    pub fn send(&self, message: &SyncMessage) -> bool {
        match self.seal(message) {
            Ok(frame) => self.send_frame(message.kind(), frame),
            Err(error) => {
                tracing::warn!(%error, kind = message.kind(), "failed to seal message");
                false
            }
        }
    }

    /// Decrypt and decode an inbound frame.
    pub fn open(&self, bytes: &[u8]) -> Result<SyncMessage> {
        let envelope = Envelope::from_bytes(bytes)?;
        let message: SyncMessage = envelope.open(&self.key)?;
        message.validate_limits().map_err(|e| SyncError::Protocol(e.into()))?;
        Ok(message)
    }

    /// Close the underlying link.
    pub fn close(&self) {
        self.sender.close();
    }

    /// Snapshot the report with the current watermarks.
    pub fn finish_report(&self) -> SessionReport {
        SessionReport {
            last_applied: self.last_applied.get(),
            last_sent: self.last_sent.get(),
            peer: self.peer,
            ..self.report.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryNetwork;
    use crate::transport::{LinkEvent, Transport};
    use clinic_sync_crypto::CryptoError;

    #[test]
    fn test_watermark_only_moves_forward() {
        let mut mark = Watermark::default();
        assert!(mark.advance(Timestamp(200)));
        assert!(!mark.advance(Timestamp(100)));
        assert!(!mark.advance(Timestamp(200)));
        assert_eq!(mark.get(), Timestamp(200));
    }

    proptest::proptest! {
        #[test]
        fn prop_watermark_is_running_max(stamps in proptest::collection::vec(0i64..10_000, 0..64)) {
            let mut mark = Watermark::default();
            let mut max = 0;
            for ts in stamps {
                let before = mark.get();
                mark.advance(Timestamp(ts));
                proptest::prop_assert!(mark.get() >= before);
                max = max.max(ts);
            }
            proptest::prop_assert_eq!(mark.get(), Timestamp(max));
        }
    }

    async fn sessions(key_a: PairingKey, key_b: PairingKey) -> (PairSession, PairSession, crate::transport::Link) {
        let network = MemoryNetwork::new();
        let (offer, pending) = network.transport().create_offer().await.unwrap();
        let (answer, mut link_b) = network.transport().accept_offer(&offer).await.unwrap();
        let link_a = network.transport().accept_answer(pending, &answer).await.unwrap();
        assert_eq!(link_b.next_event().await, LinkEvent::Open);

        let a = PairSession::new(key_a, link_a.sender(), 5);
        let b = PairSession::new(key_b, link_b.sender(), 5);
        (a, b, link_b)
    }

    #[tokio::test]
    async fn test_send_and_open() {
        let key = PairingKey::from_bytes([3; 32]);
        let (a, b, mut link_b) = sessions(key.clone(), key).await;

        assert!(a.send(&SyncMessage::ReqState { since: Timestamp(7) }));
        let LinkEvent::Message(bytes) = link_b.next_event().await else {
            panic!("expected a message");
        };
        assert_eq!(b.open(&bytes).unwrap(), SyncMessage::ReqState { since: Timestamp(7) });
    }

    #[tokio::test]
    async fn test_wrong_key_fails_authentication() {
        let (a, b, mut link_b) =
            sessions(PairingKey::from_bytes([3; 32]), PairingKey::from_bytes([4; 32])).await;

        a.send(&SyncMessage::Noop);
        let LinkEvent::Message(bytes) = link_b.next_event().await else {
            panic!("expected a message");
        };
        assert!(matches!(b.open(&bytes), Err(SyncError::Crypto(CryptoError::Authentication))));
    }

    #[tokio::test]
    async fn test_garbage_frame_rejected() {
        let key = PairingKey::from_bytes([3; 32]);
        let (_, b, _link_b) = sessions(key.clone(), key).await;
        assert!(b.open(b"not an envelope").is_err());
    }
}
