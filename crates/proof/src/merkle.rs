//! Keccak256 Merkle tree over feed chunks.
//!
//! Leaves are `keccak256(chunk)`. Each level pairs nodes left/right by index
//! parity and hashes `keccak256(left || right)`. A level with an odd number of
//! nodes is padded with the zero hash.

use alloy_primitives::{B256, keccak256};
use tether_primitives::{ChunkIndex, FeedProof};

/// Hash of a chunk as stored in the tree.
pub fn leaf_hash(data: &[u8]) -> B256 {
    keccak256(data)
}

fn hash_pair(left: &B256, right: &B256) -> B256 {
    keccak256([left.as_slice(), right.as_slice()].concat())
}

/// A fully materialized tree, used by feed producers and in tests.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<B256>>,
}

impl MerkleTree {
    /// Builds a tree over `chunks`. Returns `None` when `chunks` is empty.
    pub fn build<T: AsRef<[u8]>>(chunks: &[T]) -> Option<Self> {
        if chunks.is_empty() {
            return None;
        }

        let mut levels = vec![chunks.iter().map(|c| leaf_hash(c.as_ref())).collect::<Vec<_>>()];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [left] => hash_pair(left, &B256::ZERO),
                    _ => B256::ZERO,
                })
                .collect();
            levels.push(next);
        }

        Some(Self { levels })
    }

    /// Feed commitment.
    pub fn root(&self) -> B256 {
        self.levels.last().and_then(|level| level.first()).copied().unwrap_or_default()
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inclusion proof for leaf `index`.
    pub fn proof(&self, index: ChunkIndex) -> Option<FeedProof> {
        let position = usize::try_from(index).ok()?;
        let leaf = *self.levels.first()?.get(position)?;

        let mut siblings = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut i = position;
        for level in self.levels.iter().take(self.levels.len().saturating_sub(1)) {
            let sibling = level.get(i ^ 1).copied().unwrap_or(B256::ZERO);
            siblings.push(sibling);
            i /= 2;
        }

        Some(FeedProof { index, leaf, siblings })
    }
}

/// Walks `proof` up to a root and compares it with `commitment`.
pub(crate) fn verify_path(proof: &FeedProof, commitment: &B256) -> bool {
    let mut hash = proof.leaf;
    let mut i = proof.index;
    for sibling in &proof.siblings {
        hash = if i % 2 == 0 { hash_pair(&hash, sibling) } else { hash_pair(sibling, &hash) };
        i /= 2;
    }
    // Any remaining bits mean the index lies outside a tree of this depth.
    i == 0 && &hash == commitment
}
