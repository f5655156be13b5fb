//! Simulated encoder.

use std::{collections::HashSet, sync::Arc};

use alloy_primitives::B256;
use alloy_signer_local::PrivateKeySigner;
use tether_net_transport::{ConnectRequest, Mode, Transport, TransportError};
use tether_primitives::{
    AmendmentId, ChunkIndex, CodecError, ControlMessage, PeerKey, ScopeId, SessionId, SessionKind,
    SignerAddress, TopicError, Wire, derive_topic,
};
use tether_proof::PayloadSigner;
use tracing::debug;

use crate::{FeedFixture, FixtureError};

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Serves one position of a hosting setup to the attester: connects as the
/// serving side, announces the feed and appends one bundle per expected chunk.
pub struct EncoderSim {
    key: PeerKey,
    transport: Arc<dyn Transport>,
    signer: PrivateKeySigner,
    corrupt: HashSet<ChunkIndex>,
}

impl std::fmt::Debug for EncoderSim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSim")
            .field("key", &self.key)
            .field("corrupt", &self.corrupt)
            .finish_non_exhaustive()
    }
}

impl EncoderSim {
    pub fn new(transport: Arc<dyn Transport>, signer: PrivateKeySigner) -> Self {
        Self { key: transport.local_key(), transport, signer, corrupt: HashSet::new() }
    }

    /// Sends a bundle with a broken Merkle proof for `index`.
    pub fn corrupt(mut self, index: ChunkIndex) -> Self {
        self.corrupt.insert(index);
        self
    }

    pub fn key(&self) -> PeerKey {
        self.key
    }

    pub fn address(&self) -> SignerAddress {
        PayloadSigner::address(&self.signer)
    }

    /// Serves `expected` (in log order) of `fixture` for the pair at
    /// `position` of `amendment`.
    pub async fn serve(
        &self,
        attester: PeerKey,
        fixture: &FeedFixture,
        amendment: AmendmentId,
        position: usize,
        expected: &[ChunkIndex],
    ) -> Result<(), EncoderError> {
        let session = SessionId::hosting_setup(amendment);
        let topic = derive_topic(&self.key, &attester, &fixture.key, session)?;
        let link = self
            .transport
            .connect(ConnectRequest {
                topic,
                kind: SessionKind::HostingSetup,
                mode: Mode::Server,
                target: attester,
            })
            .await?;
        link.send(&ControlMessage::FeedKey { feed: fixture.key }).await?;

        let scope = ScopeId::position(amendment, position);
        for (slot, index) in expected.iter().enumerate() {
            let mut bundle = fixture.bundle(*index, &scope, &self.signer)?;
            if self.corrupt.contains(index) {
                bundle.merkle_proof.leaf = B256::repeat_byte(0xee);
            }
            link.append(slot as u64, bundle.to_wire()?).await?;
        }
        debug!(%amendment, position, chunks = expected.len(), "encoder served");
        Ok(())
    }
}
