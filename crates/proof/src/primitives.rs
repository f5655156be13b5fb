//! Codec and crypto primitives consumed by the verification pipeline.

use alloy_primitives::{B256, Signature};
use tether_primitives::{FeedProof, SignerAddress};

use crate::{Result, VerifyError, codec, merkle};

/// Low-level operations behind each pipeline stage.
///
/// Implementations must be pure with respect to their inputs.
pub trait ProofPrimitives: Send + Sync + 'static {
    /// Checks that `signature` over `data` was produced by `signer`.
    fn verify_signature(&self, signature: &[u8], data: &[u8], signer: &SignerAddress)
    -> Result<()>;

    /// Checks that `proof` reaches `commitment`.
    fn verify_merkle_proof(&self, proof: &FeedProof, commitment: &B256) -> Result<()>;

    /// Checks that `content` hashes to the leaf referenced by `proof`.
    fn verify_block_hash(&self, proof: &FeedProof, content: &[u8]) -> Result<()>;

    /// Decompresses an encoded payload.
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Recoverable secp256k1 signatures, keccak256 Merkle paths, zstd payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeccakPrimitives;

impl ProofPrimitives for KeccakPrimitives {
    fn verify_signature(
        &self,
        signature: &[u8],
        data: &[u8],
        signer: &SignerAddress,
    ) -> Result<()> {
        let signature = Signature::try_from(signature)
            .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
        let recovered = signature
            .recover_address_from_msg(data)
            .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
        if &recovered != signer {
            return Err(VerifyError::SignerMismatch { expected: *signer, recovered });
        }
        Ok(())
    }

    fn verify_merkle_proof(&self, proof: &FeedProof, commitment: &B256) -> Result<()> {
        if merkle::verify_path(proof, commitment) {
            Ok(())
        } else {
            Err(VerifyError::MerkleRoot(proof.index))
        }
    }

    fn verify_block_hash(&self, proof: &FeedProof, content: &[u8]) -> Result<()> {
        if merkle::leaf_hash(content) == proof.leaf {
            Ok(())
        } else {
            Err(VerifyError::BlockHash(proof.index))
        }
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        codec::decompress(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PayloadSigner;
    use alloy_signer_local::PrivateKeySigner;
    use assert_matches::assert_matches;

    #[test]
    fn test_signature_roundtrip() {
        let signer = PrivateKeySigner::random();
        let signature = signer.sign(b"12/0").unwrap();
        assert_eq!(signature.len(), 65);
        KeccakPrimitives.verify_signature(&signature, b"12/0", &signer.address()).unwrap();
    }

    #[test]
    fn test_signature_wrong_signer() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let signature = signer.sign(b"payload").unwrap();
        assert_matches!(
            KeccakPrimitives.verify_signature(&signature, b"payload", &other.address()),
            Err(VerifyError::SignerMismatch { .. })
        );
    }

    #[test]
    fn test_signature_truncated() {
        let signer = PrivateKeySigner::random();
        assert_matches!(
            KeccakPrimitives.verify_signature(&[0u8; 10], b"payload", &signer.address()),
            Err(VerifyError::MalformedSignature(_))
        );
    }
}
