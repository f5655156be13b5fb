//! Session outcomes submitted to the ledger.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use tether_primitives::{AmendmentId, ChallengeId, ContractId, FeedProof, PeerKey, UserId};

/// Outcome of a hosting setup across every position of an amendment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendmentReport {
    pub amendment: AmendmentId,
    /// Transport keys of providers that failed, without duplicates.
    pub failed: Vec<PeerKey>,
    /// Proof-of-contact of every hoster that completed, by user id.
    pub signatures: BTreeMap<UserId, Vec<u8>>,
}

impl AmendmentReport {
    pub fn new(amendment: AmendmentId) -> Self {
        Self { amendment, ..Default::default() }
    }

    /// Records failed providers, skipping ones already listed.
    pub fn fail(&mut self, keys: impl IntoIterator<Item = PeerKey>) {
        for key in keys {
            if !self.failed.contains(&key) {
                self.failed.push(key);
            }
        }
    }
}

/// A verified storage-challenge check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub contract: ContractId,
    pub proof: FeedProof,
}

/// Attester's answer to a storage challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageChallengeResponse {
    pub challenge: ChallengeId,
    pub proof_of_contact: Vec<u8>,
    pub reports: Vec<CheckReport>,
    /// Checks that failed verification. Empty unless partial submission is
    /// enabled.
    pub failed: Vec<ContractId>,
}

/// Retrieval timing for one hoster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Running average latency over the served chunks.
    pub latency: Option<Duration>,
    pub served: u32,
    pub missed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HosterPerformance {
    pub stats: PerformanceStats,
    pub proof_of_contact: Vec<u8>,
}

/// Attester's answer to a performance challenge, covering every targeted
/// hoster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub challenge: ChallengeId,
    pub reports: BTreeMap<UserId, HosterPerformance>,
}
