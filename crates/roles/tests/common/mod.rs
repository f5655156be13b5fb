#![allow(dead_code, unreachable_pub)]

use std::{sync::Arc, time::Duration};

use alloy_signer_local::PrivateKeySigner;
use tether_ledger::{Amendment, Contract, Providers};
use tether_net_transport::{MemoryNetwork, MemoryTransport};
use tether_primitives::{
    AmendmentId, ChunkIndex, ChunkRange, ContractId, FeedId, PeerKey, PlanId, ScopeId, UserId,
};
use tether_proof::PayloadSigner;
use tether_roles::{LocalIdentity, Node, RoleConfig, RoleContext};
use tether_storer::{HostedFeed, MemoryBackend, StorageRegistry};
use tether_test_utils::{EncoderSim, FeedFixture, MockLedger};

/// A registered ledger user with its own transport.
pub struct Peer {
    pub user: UserId,
    pub key: PeerKey,
    pub signer: PrivateKeySigner,
    pub transport: Arc<MemoryTransport>,
}

/// Ledger and network shared by every peer of a test.
pub struct Harness {
    pub network: MemoryNetwork,
    pub ledger: Arc<MockLedger>,
}

impl Harness {
    pub fn new() -> Self {
        Self { network: MemoryNetwork::new(), ledger: Arc::new(MockLedger::new()) }
    }

    pub fn peer(&self, user: u64) -> Peer {
        let key = PeerKey::new([user as u8; 32]);
        let signer = PrivateKeySigner::random();
        self.ledger.register(UserId(user), key, PayloadSigner::address(&signer));
        Peer {
            user: UserId(user),
            key,
            signer,
            transport: Arc::new(self.network.transport(key)),
        }
    }

    pub fn node(&self, peer: &Peer) -> Arc<Node> {
        self.node_with(peer, RoleConfig::default())
    }

    pub fn node_with(&self, peer: &Peer, config: RoleConfig) -> Arc<Node> {
        self.node_from(LocalIdentity::new(peer.key, Arc::new(peer.signer.clone())), peer, config)
    }

    pub fn node_from(&self, identity: LocalIdentity, peer: &Peer, config: RoleConfig) -> Arc<Node> {
        let ctx = RoleContext::new(self.ledger.clone(), peer.transport.clone(), identity, config);
        let registry = Arc::new(StorageRegistry::new(Arc::new(MemoryBackend::new())));
        Arc::new(Node::new(ctx, registry))
    }

    pub fn encoder(&self, peer: &Peer) -> EncoderSim {
        EncoderSim::new(peer.transport.clone(), peer.signer.clone())
    }

    /// Publishes `fixture` with one contract per entry of `ranges`, all under
    /// plan 1, and returns the contract ids.
    pub fn publish_feed(&self, fixture: &FeedFixture, ranges: &[(u64, u64)]) -> Vec<ContractId> {
        let contracts: Vec<ContractId> =
            (1..=ranges.len() as u64).map(|n| ContractId(fixture.id.0 * 100 + n)).collect();
        for (id, (start, end)) in contracts.iter().zip(ranges) {
            self.ledger.insert_contract(Contract {
                id: *id,
                plan: PlanId(1),
                feed: fixture.id,
                ranges: vec![ChunkRange::new(*start, *end).unwrap()],
                amendments: Vec::new(),
            });
        }
        self.ledger.insert_feed(fixture.feed(contracts.clone()));
        contracts
    }

    pub fn amend(
        &self,
        id: u64,
        contract: ContractId,
        encoders: &[&Peer],
        hosters: &[&Peer],
        attester: &Peer,
    ) -> AmendmentId {
        let id = AmendmentId(id);
        self.ledger.insert_amendment(Amendment {
            id,
            contract,
            providers: Providers {
                encoders: encoders.iter().map(|p| p.user).collect(),
                hosters: hosters.iter().map(|p| p.user).collect(),
                attesters: vec![attester.user],
            },
        });
        id
    }
}

/// Stores valid bundles for `indices` on `node` as if a hosting setup had
/// delivered them.
pub async fn preload(
    node: &Node,
    fixture: &FeedFixture,
    encoder: &Peer,
    scope: &ScopeId,
    indices: impl IntoIterator<Item = ChunkIndex>,
) {
    let registry = node.hoster().registry();
    let indices: Vec<ChunkIndex> = indices.into_iter().collect();
    let start = *indices.iter().min().unwrap();
    let end = *indices.iter().max().unwrap();
    registry
        .add_key(HostedFeed { feed: fixture.key, ranges: vec![ChunkRange::new(start, end).unwrap()] })
        .unwrap();
    let store = registry.load(fixture.key).await.unwrap();
    for index in indices {
        store.store_encoded(&fixture.bundle(index, scope, &encoder.signer).unwrap()).unwrap();
    }
}

pub fn feed(id: u64, chunks: u64) -> FeedFixture {
    FeedFixture::new(FeedId(id), chunks).unwrap()
}

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(300);
