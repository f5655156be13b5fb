//! Rendezvous topic derivation.
//!
//! A topic names exactly one logical channel between an ordered pair of peers
//! for one session. The sender/receiver order is part of the preimage, so the
//! encoder→attester and attester→hoster channels of the same amendment never
//! collide.

use alloy_primitives::{B256, Keccak256};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, IntoStaticStr};

use crate::{AmendmentId, ChallengeId, FeedKey, PeerKey, TopicError};

const TOPIC_DOMAIN: &[u8] = b"tether/topic/v1";

/// Protocol a session runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SessionKind {
    /// Chunk delivery and custody handoff after a new amendment.
    HostingSetup,
    /// Proof that a hoster still holds specific chunks.
    StorageChallenge,
    /// Retrieval latency and availability check.
    PerformanceChallenge,
}

impl SessionKind {
    fn tag(self) -> u8 {
        match self {
            Self::HostingSetup => 0,
            Self::StorageChallenge => 1,
            Self::PerformanceChallenge => 2,
        }
    }
}

/// Ledger-side identity of a session: the protocol plus the id of the event
/// subject (amendment or challenge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    pub kind: SessionKind,
    pub id: u64,
}

impl SessionId {
    pub fn hosting_setup(amendment: AmendmentId) -> Self {
        Self { kind: SessionKind::HostingSetup, id: amendment.0 }
    }

    pub fn storage_challenge(challenge: ChallengeId) -> Self {
        Self { kind: SessionKind::StorageChallenge, id: challenge.0 }
    }

    pub fn performance_challenge(challenge: ChallengeId) -> Self {
        Self { kind: SessionKind::PerformanceChallenge, id: challenge.0 }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Rendezvous identifier for one channel of one session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(B256);

impl Topic {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = hex::encode(self.as_bytes());
        hex.truncate(10);
        f.write_str(&hex)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({self})")
    }
}

/// Derives the rendezvous topic for `sender → receiver` over `feed` in
/// `session`.
///
/// Computed as `keccak256(domain || sender || receiver || feed || kind || id_le)`.
pub fn derive_topic(
    sender: &PeerKey,
    receiver: &PeerKey,
    feed: &FeedKey,
    session: SessionId,
) -> Result<Topic, TopicError> {
    if sender.is_zero() {
        return Err(TopicError::ZeroKey("sender"));
    }
    if receiver.is_zero() {
        return Err(TopicError::ZeroKey("receiver"));
    }
    if feed.is_zero() {
        return Err(TopicError::ZeroKey("feed"));
    }

    let mut hasher = Keccak256::new();
    hasher.update(TOPIC_DOMAIN);
    hasher.update(sender.as_bytes());
    hasher.update(receiver.as_bytes());
    hasher.update(feed.as_bytes());
    hasher.update([session.kind.tag()]);
    hasher.update(session.id.to_le_bytes());
    Ok(Topic(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn keys() -> (PeerKey, PeerKey, FeedKey) {
        (PeerKey::new([1; 32]), PeerKey::new([2; 32]), FeedKey::new([3; 32]))
    }

    #[test]
    fn test_deterministic() {
        let (a, b, feed) = keys();
        let session = SessionId::hosting_setup(AmendmentId(7));
        assert_eq!(
            derive_topic(&a, &b, &feed, session).unwrap(),
            derive_topic(&a, &b, &feed, session).unwrap()
        );
    }

    #[test]
    fn test_direction_matters() {
        let (a, b, feed) = keys();
        let session = SessionId::hosting_setup(AmendmentId(7));
        assert_ne!(
            derive_topic(&a, &b, &feed, session).unwrap(),
            derive_topic(&b, &a, &feed, session).unwrap()
        );
    }

    #[test]
    fn test_session_kind_and_id_separate_topics() {
        let (a, b, feed) = keys();
        let setup = derive_topic(&a, &b, &feed, SessionId::hosting_setup(AmendmentId(1))).unwrap();
        let storage =
            derive_topic(&a, &b, &feed, SessionId::storage_challenge(ChallengeId(1))).unwrap();
        let perf =
            derive_topic(&a, &b, &feed, SessionId::performance_challenge(ChallengeId(1))).unwrap();
        let next = derive_topic(&a, &b, &feed, SessionId::hosting_setup(AmendmentId(2))).unwrap();
        assert_ne!(setup, storage);
        assert_ne!(storage, perf);
        assert_ne!(setup, next);
    }

    #[test]
    fn test_zero_key_rejected() {
        let (a, _, feed) = keys();
        let zero = PeerKey::default();
        assert_matches!(
            derive_topic(&a, &zero, &feed, SessionId::hosting_setup(AmendmentId(1))),
            Err(TopicError::ZeroKey("receiver"))
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(SessionKind::StorageChallenge.to_string(), "storage-challenge");
    }
}
