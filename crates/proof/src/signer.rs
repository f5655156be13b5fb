//! Local signing identity.

use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use tether_primitives::SignerAddress;

/// Error returned when signing fails.
#[derive(Debug, thiserror::Error)]
#[error("signing failed: {0}")]
pub struct SignError(#[from] alloy_signer::Error);

/// Produces EIP-191 signatures: payload signatures for encoders and
/// proof-of-contact signatures for checked parties.
pub trait PayloadSigner: Send + Sync {
    /// Address the signatures recover to.
    fn address(&self) -> SignerAddress;

    /// Signs `message`, returning the 65-byte signature.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignError>;
}

impl PayloadSigner for PrivateKeySigner {
    fn address(&self) -> SignerAddress {
        alloy_signer::Signer::address(self)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignError> {
        let signature = self.sign_message_sync(message)?;
        Ok(signature.as_bytes().to_vec())
    }
}
