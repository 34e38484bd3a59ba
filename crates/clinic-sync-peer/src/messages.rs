//! Sync protocol message types.
//!
//! Messages are JSON objects tagged by `type`, sealed in an envelope before
//! they reach the transport.

use serde::{Deserialize, Serialize};

use clinic_sync_core::{ChangeRecord, DeviceId, Timestamp};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message size limits.
pub mod limits {
    /// Max records in one `changes` message accepted from a peer.
    pub const MAX_RECORDS_PER_MESSAGE: usize = 1000;
    /// Max bytes in one transport frame.
    pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Sent on connect.
    Hello {
        /// Sender's wall clock.
        ts: Timestamp,
        /// Sender's `lastAppliedTs` for this session.
        since: Timestamp,
        /// Sender's device identity.
        device: DeviceId,
        /// Protocol version for compatibility checking.
        protocol_version: u8,
    },

    /// Ask the peer for every log entry newer than `since`.
    ReqState {
        /// The requester's watermark.
        since: Timestamp,
    },

    /// A batch of change records, ascending by timestamp.
    Changes {
        /// The records.
        data: Vec<ChangeRecord>,
    },

    /// Reply to `hello`. Informational.
    Ack {
        /// The replier's `lastAppliedTs`.
        since: Timestamp,
    },

    /// Nothing to send.
    Noop,
}

impl SyncMessage {
    /// Check if this message respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            SyncMessage::Changes { data } if data.len() > limits::MAX_RECORDS_PER_MESSAGE => {
                Err("too many records in changes")
            }
            _ => Ok(()),
        }
    }

    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Hello { .. } => "hello",
            SyncMessage::ReqState { .. } => "req_state",
            SyncMessage::Changes { .. } => "changes",
            SyncMessage::Ack { .. } => "ack",
            SyncMessage::Noop => "noop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_sync_core::{DocKey, Document};
    use serde_json::json;

    #[test]
    fn test_wire_tags() {
        let msg = SyncMessage::ReqState {
            since: Timestamp(200),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "req_state", "since": 200})
        );
        assert_eq!(
            serde_json::to_value(SyncMessage::Noop).unwrap(),
            json!({"type": "noop"})
        );
    }

    #[test]
    fn test_parse_changes() {
        let device = DeviceId::from_bytes([3; 16]);
        let wire = json!({
            "type": "changes",
            "data": [{
                "timestamp": 100,
                "collection": "patients",
                "operation": "put",
                "key": 1,
                "value": {"id": 1, "name": "Rao"},
                "version": {"ts": 100, "device": device.to_hex()},
            }],
        });

        let msg: SyncMessage = serde_json::from_value(wire).unwrap();
        let SyncMessage::Changes { data } = msg else {
            panic!("expected changes");
        };
        assert_eq!(data[0].key, Some(DocKey::Int(1)));
        assert_eq!(data[0].origin(), device);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<SyncMessage, _> = serde_json::from_value(json!({"type": "gossip"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_message_limits_exceeded() {
        let record = ChangeRecord::local_put(
            Timestamp(1),
            "patients",
            DocKey::Int(1),
            Document::new(),
            DeviceId::ZERO,
        );
        let ok = SyncMessage::Changes {
            data: vec![record.clone(); limits::MAX_RECORDS_PER_MESSAGE],
        };
        let too_big = SyncMessage::Changes {
            data: vec![record; limits::MAX_RECORDS_PER_MESSAGE + 1],
        };

        assert!(ok.validate_limits().is_ok());
        assert!(too_big.validate_limits().is_err());
    }
}
