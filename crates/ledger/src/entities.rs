//! Ledger entities read by the engine.

use std::collections::BTreeMap;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use tether_primitives::{
    AmendmentId, ChallengeId, ChunkIndex, ChunkRange, ContractId, FeedId, FeedKey, PlanId, UserId,
    ranges_count,
};

/// Provider roles of an amendment.
///
/// `hosters[i]` stores what `encoders[i]` produced; the position `i` scopes
/// every bundle of the pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Providers {
    pub encoders: Vec<UserId>,
    pub hosters: Vec<UserId>,
    pub attesters: Vec<UserId>,
}

/// Assignment of providers to a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub id: AmendmentId,
    pub contract: ContractId,
    pub providers: Providers,
}

impl Amendment {
    /// Position of `hoster` in the hoster list.
    pub fn hoster_position(&self, hoster: UserId) -> Option<usize> {
        self.providers.hosters.iter().position(|id| *id == hoster)
    }

    /// Encoder paired with the hoster at `position`.
    pub fn encoder_at(&self, position: usize) -> Option<UserId> {
        self.providers.encoders.get(position).copied()
    }

    /// The attester in charge of the amendment.
    pub fn attester(&self) -> Option<UserId> {
        self.providers.attesters.first().copied()
    }

    /// `(encoder, hoster)` pairs in positional order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, UserId, UserId)> + '_ {
        self.providers
            .encoders
            .iter()
            .zip(&self.providers.hosters)
            .enumerate()
            .map(|(position, (encoder, hoster))| (position, *encoder, *hoster))
    }
}

/// Hosting contract for part of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub plan: PlanId,
    pub feed: FeedId,
    pub ranges: Vec<ChunkRange>,
    /// Amendments in ledger order; the last one is active.
    pub amendments: Vec<AmendmentId>,
}

impl Contract {
    pub fn active_amendment(&self) -> Option<AmendmentId> {
        self.amendments.last().copied()
    }

    /// Number of chunks the contract covers.
    pub fn chunk_count(&self) -> u64 {
        ranges_count(&self.ranges)
    }
}

/// Published feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: FeedId,
    pub key: FeedKey,
    /// Merkle root every chunk proof must reach.
    pub commitment: B256,
    pub contracts: Vec<ContractId>,
}

/// Request that a hoster prove one chunk per contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageChallenge {
    pub id: ChallengeId,
    pub hoster: UserId,
    pub attester: UserId,
    pub checks: BTreeMap<ContractId, ChunkIndex>,
}

/// Request that attesters time the hosters of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceChallenge {
    pub id: ChallengeId,
    pub feed: FeedId,
    /// Hosters named by the ledger. Targets are taken from the feed's active
    /// amendments, which include these.
    pub hosters: Vec<UserId>,
    pub attesters: Vec<UserId>,
}

impl PerformanceChallenge {
    pub fn attester(&self) -> Option<UserId> {
        self.attesters.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amendment_positions() {
        let amendment = Amendment {
            id: AmendmentId(1),
            contract: ContractId(1),
            providers: Providers {
                encoders: vec![UserId(10), UserId(11)],
                hosters: vec![UserId(20), UserId(21)],
                attesters: vec![UserId(30), UserId(31)],
            },
        };
        assert_eq!(amendment.hoster_position(UserId(21)), Some(1));
        assert_eq!(amendment.hoster_position(UserId(10)), None);
        assert_eq!(amendment.encoder_at(1), Some(UserId(11)));
        assert_eq!(amendment.attester(), Some(UserId(30)));
        assert_eq!(
            amendment.pairs().collect::<Vec<_>>(),
            vec![(0, UserId(10), UserId(20)), (1, UserId(11), UserId(21))]
        );
    }

    #[test]
    fn test_contract_counts_inclusive_ranges() {
        let contract = Contract {
            id: ContractId(1),
            plan: PlanId(1),
            feed: FeedId(1),
            ranges: vec![ChunkRange::new(0, 2).unwrap(), ChunkRange::new(5, 5).unwrap()],
            amendments: vec![AmendmentId(1), AmendmentId(4)],
        };
        assert_eq!(contract.chunk_count(), 4);
        assert_eq!(contract.active_amendment(), Some(AmendmentId(4)));
    }
}
