//! Ordered, fail-fast bundle verification.

use std::sync::Arc;

use alloy_primitives::B256;
use tether_primitives::{ChunkIndex, ChunkProofBundle, ScopeId, SignerAddress};
use tracing::trace;

use crate::{KeccakPrimitives, ProofPrimitives, Result, VerifyError, codec};

/// A bundle that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub index: ChunkIndex,
    /// Original chunk data recovered from the payload.
    pub data: Vec<u8>,
}

/// Runs signature, Merkle and content checks in order.
#[derive(Clone)]
pub struct ProofVerifier {
    primitives: Arc<dyn ProofPrimitives>,
}

impl Default for ProofVerifier {
    fn default() -> Self {
        Self::new(Arc::new(KeccakPrimitives))
    }
}

impl std::fmt::Debug for ProofVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofVerifier").finish_non_exhaustive()
    }
}

impl ProofVerifier {
    pub fn new(primitives: Arc<dyn ProofPrimitives>) -> Self {
        Self { primitives }
    }

    /// Verifies `bundle` against the feed `commitment` and the `encoder`
    /// signing identity. The payload must carry the `scope` of the current
    /// session.
    pub fn verify(
        &self,
        bundle: &ChunkProofBundle,
        commitment: &B256,
        encoder: &SignerAddress,
        scope: &ScopeId,
    ) -> Result<Verified> {
        self.primitives.verify_signature(
            &bundle.payload_signature,
            &bundle.encoded_payload,
            encoder,
        )?;

        let proof = &bundle.merkle_proof;
        if proof.index != bundle.index {
            return Err(VerifyError::IndexMismatch { proof: proof.index, chunk: bundle.index });
        }
        self.primitives.verify_merkle_proof(proof, commitment)?;

        let plain = self.primitives.decompress(&bundle.encoded_payload)?;
        let data = codec::open_scoped(&plain, scope)?;
        self.primitives.verify_block_hash(proof, &data)?;

        trace!(index = bundle.index, %scope, "bundle verified");
        Ok(Verified { index: bundle.index, data })
    }
}
