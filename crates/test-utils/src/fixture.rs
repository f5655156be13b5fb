//! Feed fixtures: chunk data, Merkle tree and signed bundles.

use alloy_primitives::{B256, keccak256};
use tether_ledger::Feed;
use tether_primitives::{
    ChunkIndex, ChunkProofBundle, CodecError, ContractId, FeedId, FeedKey, ScopeId,
};
use tether_proof::{MerkleTree, PayloadSigner, SignError, encode_payload};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("feed must have at least one chunk")]
    Empty,
    #[error("chunk {0} is outside the feed")]
    OutOfRange(ChunkIndex),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Sign(#[from] SignError),
}

/// A feed of `count` deterministic chunks.
#[derive(Debug, Clone)]
pub struct FeedFixture {
    pub id: FeedId,
    pub key: FeedKey,
    chunks: Vec<Vec<u8>>,
    tree: MerkleTree,
}

impl FeedFixture {
    pub fn new(id: FeedId, count: u64) -> Result<Self, FixtureError> {
        let chunks: Vec<Vec<u8>> =
            (0..count).map(|index| format!("feed {id} chunk {index}").into_bytes()).collect();
        let tree = MerkleTree::build(&chunks).ok_or(FixtureError::Empty)?;
        let key = FeedKey::from(keccak256(format!("tether/test-feed/{id}")));
        Ok(Self { id, key, chunks, tree })
    }

    pub fn commitment(&self) -> B256 {
        self.tree.root()
    }

    pub fn chunk(&self, index: ChunkIndex) -> Option<&[u8]> {
        self.chunks.get(usize::try_from(index).ok()?).map(Vec::as_slice)
    }

    /// The ledger record of this feed.
    pub fn feed(&self, contracts: Vec<ContractId>) -> Feed {
        Feed { id: self.id, key: self.key, commitment: self.commitment(), contracts }
    }

    /// Bundle for chunk `index`, encoded under `scope` and signed by `encoder`.
    pub fn bundle(
        &self,
        index: ChunkIndex,
        scope: &ScopeId,
        encoder: &dyn PayloadSigner,
    ) -> Result<ChunkProofBundle, FixtureError> {
        let data = self.chunk(index).ok_or(FixtureError::OutOfRange(index))?;
        let merkle_proof = self.tree.proof(index).ok_or(FixtureError::OutOfRange(index))?;
        let encoded_payload = encode_payload(scope, data)?;
        Ok(ChunkProofBundle {
            index,
            payload_signature: encoder.sign(&encoded_payload)?,
            encoded_payload,
            merkle_proof,
            scope: scope.clone(),
        })
    }
}
