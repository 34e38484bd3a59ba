//! Connection descriptors: the opaque strings users shuttle between devices.
//!
//! The offerer shows an offer, the answerer pastes it and shows back an
//! answer. Both are single-line JSON.

use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Which half of the exchange a descriptor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    /// Created by the device that starts pairing.
    Offer,
    /// Created by the device that accepted an offer.
    Answer,
}

/// A connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Offer or answer.
    pub kind: DescriptorKind,
    /// Random token tying the answer to its offer.
    pub session: String,
    /// Transport-specific address (e.g. `127.0.0.1:40123`).
    pub endpoint: String,
}

impl Descriptor {
    /// An offer descriptor.
    pub fn offer(session: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Offer,
            session: session.into(),
            endpoint: endpoint.into(),
        }
    }

    /// An answer descriptor.
    pub fn answer(session: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Answer,
            session: session.into(),
            endpoint: endpoint.into(),
        }
    }

    /// A fresh random session token.
    pub fn new_session() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Encode as single-line JSON.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SyncError::Protocol(e.to_string()))
    }

    /// Parse a descriptor pasted by the user.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::Setup("connection descriptor is empty".into()));
        }

        let descriptor: Descriptor = serde_json::from_str(text)
            .map_err(|e| SyncError::Setup(format!("malformed connection descriptor: {}", e)))?;
        if descriptor.session.is_empty() {
            return Err(SyncError::Setup("descriptor has no session".into()));
        }
        Ok(descriptor)
    }

    /// Fail unless this descriptor is of the given kind.
    pub fn expect_kind(&self, kind: DescriptorKind) -> Result<()> {
        if self.kind != kind {
            return Err(SyncError::Setup(format!(
                "expected {:?} descriptor, got {:?}",
                kind, self.kind
            )));
        }
        Ok(())
    }
}

impl FromStr for Descriptor {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parse() {
        let offer = Descriptor::offer(Descriptor::new_session(), "127.0.0.1:4000");
        let text = offer.encode().unwrap();

        assert!(!text.contains('\n'));
        assert!(text.contains("\"kind\":\"offer\""));
        assert_eq!(Descriptor::parse(&text).unwrap(), offer);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in ["", "   ", "{not json", r#"{"kind":"offer","session":"","endpoint":"x"}"#] {
            assert!(
                matches!(Descriptor::parse(bad), Err(SyncError::Setup(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_expect_kind() {
        let answer = Descriptor::answer("abc", "memory");
        assert!(answer.expect_kind(DescriptorKind::Answer).is_ok());
        assert!(matches!(
            answer.expect_kind(DescriptorKind::Offer),
            Err(SyncError::Setup(_))
        ));
    }

    #[test]
    fn test_sessions_are_unique() {
        assert_ne!(Descriptor::new_session(), Descriptor::new_session());
        assert_eq!(Descriptor::new_session().len(), 32);
    }
}
