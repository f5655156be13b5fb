//! Hoster role.
//!
//! A hoster receives its share of a feed from the amendment's attester during
//! hosting setup, stores every verified chunk, and later proves possession to
//! attesters in storage and performance challenges.

use std::{collections::HashSet, sync::Arc};

use tether_ledger::{Amendment, Feed, StorageChallenge};
use tether_net_transport::{Mode, PeerLink};
use tether_primitives::{
    AmendmentId, ChallengeId, ChunkIndex, ChunkProofBundle, ChunkRange, ControlMessage, FeedId,
    FeedKey, ScopeId, SessionId, SignerAddress, StorageProof, UserId, Wire, derive_topic,
};
use tether_session::CompletionJoin;
use tether_storer::{HostedFeed, StorageRegistry};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::{NodeEvent, ProtocolError, ProtocolResult, RoleContext};

/// Handles the events addressed to this node as a hoster.
#[derive(Debug, Clone)]
pub struct Hoster {
    ctx: Arc<RoleContext>,
    registry: Arc<StorageRegistry>,
}

impl Hoster {
    pub fn new(ctx: Arc<RoleContext>, registry: Arc<StorageRegistry>) -> Self {
        Self { ctx, registry }
    }

    pub fn registry(&self) -> &Arc<StorageRegistry> {
        &self.registry
    }

    /// Reopens the storage of every feed recorded as hosted.
    pub async fn restore(&self) -> ProtocolResult<usize> {
        Ok(self.registry.restore().await?)
    }

    /// Closes every feed storage.
    pub fn close(&self) {
        self.registry.close();
    }

    pub async fn on_registered(&self, user: UserId) -> ProtocolResult<()> {
        if self.ctx.is_me(user).await? {
            info!(%user, "registered for hosting");
        }
        Ok(())
    }

    /// Hosting setup: pull this node's share from the attester.
    pub async fn on_new_amendment(&self, id: AmendmentId) -> ProtocolResult<()> {
        let amendment = self.ctx.ledger.amendment(id).await?;
        let Some(position) = self.position_in(&amendment).await? else {
            trace!(amendment = %id, "not a hoster of this amendment");
            return Ok(());
        };

        let session = SessionId::hosting_setup(id);
        let span = info_span!("hosting_setup", role = "hoster", %session, position);
        async {
            match self.host(&amendment, position).await {
                Ok(feed) => {
                    info!(feed = %feed.short(), "hosting started");
                    self.ctx.events.emit(NodeEvent::FeedHosted { feed, amendment: id });
                    Ok(())
                }
                Err(e) => {
                    self.ctx.failed(session, &e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Storage challenge: send the requested bundles to the attester.
    pub async fn on_storage_challenge(&self, id: ChallengeId) -> ProtocolResult<()> {
        let challenge = self.ctx.ledger.storage_challenge(id).await?;
        if !self.ctx.is_me(challenge.hoster).await? {
            return Ok(());
        }

        let session = SessionId::storage_challenge(id);
        let span = info_span!("storage_challenge", role = "hoster", %session);
        async {
            let result = self.prove(&challenge).await;
            match &result {
                Ok(()) => info!(checks = challenge.checks.len(), "storage proofs delivered"),
                Err(e) => self.ctx.failed(session, e),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Performance challenge: serve chunk requests from the attester.
    pub async fn on_performance_challenge(&self, id: ChallengeId) -> ProtocolResult<()> {
        let challenge = self.ctx.ledger.performance_challenge(id).await?;
        let feed = self.ctx.ledger.feed(challenge.feed).await?;
        if !self.hosts(&feed).await? {
            return Ok(());
        }
        let attester = challenge
            .attester()
            .ok_or_else(|| ProtocolError::Inconsistent(format!("challenge {id} has no attester")))?;

        let session = SessionId::performance_challenge(id);
        let span = info_span!("performance_challenge", role = "hoster", %session);
        async {
            let result = self.serve(id, &feed, attester).await;
            match &result {
                Ok(served) => info!(served, "performance challenge served"),
                Err(e) => self.ctx.failed(session, e),
            }
            result.map(|_| ())
        }
        .instrument(span)
        .await
    }

    /// Stops hosting the feed if the event names this node.
    pub async fn on_drop_hosting(&self, feed: FeedId, hoster: UserId) -> ProtocolResult<()> {
        if !self.ctx.is_me(hoster).await? {
            return Ok(());
        }
        let feed = self.ctx.ledger.feed(feed).await?;
        self.registry.remove_feed(feed.key).await?;
        info!(feed = %feed.key.short(), "hosting dropped");
        self.ctx.events.emit(NodeEvent::FeedDropped { feed: feed.key });
        Ok(())
    }

    async fn position_in(&self, amendment: &Amendment) -> ProtocolResult<Option<usize>> {
        for (position, hoster) in amendment.providers.hosters.iter().enumerate() {
            if self.ctx.is_me(*hoster).await? {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    /// Returns true if this node hosts a contract of `feed` under its active
    /// amendment.
    async fn hosts(&self, feed: &Feed) -> ProtocolResult<bool> {
        for contract in &feed.contracts {
            let contract = self.ctx.ledger.contract(*contract).await?;
            let Some(active) = contract.active_amendment() else {
                continue;
            };
            let amendment = self.ctx.ledger.amendment(active).await?;
            if self.position_in(&amendment).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn host(&self, amendment: &Amendment, position: usize) -> ProtocolResult<FeedKey> {
        let ledger = &self.ctx.ledger;
        let encoder = amendment.encoder_at(position).ok_or_else(|| {
            ProtocolError::Inconsistent(format!("no encoder at position {position}"))
        })?;
        let attester = amendment
            .attester()
            .ok_or_else(|| ProtocolError::Inconsistent("amendment has no attester".into()))?;
        let encoder_signer = ledger.signing_key(encoder).await?;
        let attester_key = ledger.attester_key(attester).await?;
        let contract = ledger.contract(amendment.contract).await?;
        let feed = ledger.feed(contract.feed).await?;

        self.registry.add_key(HostedFeed { feed: feed.key, ranges: contract.ranges.clone() })?;
        self.registry.load(feed.key).await?;

        let session = SessionId::hosting_setup(amendment.id);
        let topic = derive_topic(&attester_key, &self.ctx.identity.noise_key(), &feed.key, session)?;
        let handle = self.ctx.open(topic, session)?;
        let link = self.ctx.link(&handle, Mode::Client, attester_key, feed.key).await?;

        let expected: Vec<ChunkIndex> = contract.ranges.iter().flat_map(ChunkRange::iter).collect();
        let setup = Setup {
            feed: &feed,
            encoder: encoder_signer,
            scope: ScopeId::position(amendment.id, position),
            expected: &expected,
        };
        self.ctx.within(&handle, self.receive(&link, &setup)).await?;
        self.ctx.finish(&handle);
        Ok(feed.key)
    }

    /// Requests every expected chunk, stores the verified ones and answers the
    /// contact request once all are stored.
    async fn receive(&self, link: &PeerLink, setup: &Setup<'_>) -> ProtocolResult<()> {
        for index in setup.expected {
            link.send(&ControlMessage::ChunkRequest { feed: setup.feed.key, index: *index }).await?;
        }

        let (join, fired) = CompletionJoin::new();
        let mut remaining: HashSet<ChunkIndex> = setup.expected.iter().copied().collect();
        if remaining.is_empty() {
            join.data_complete()?;
        }
        let mut contact_requested = false;

        while !join.is_fired() {
            match link.recv().await? {
                ControlMessage::ChunkResponse { index, bundle } => {
                    if !remaining.remove(&index) {
                        return Err(ProtocolError::MalformedMessage(format!(
                            "chunk {index} was not requested"
                        )));
                    }
                    let bundle = bundle.ok_or_else(|| {
                        ProtocolError::MalformedMessage(format!("attester has no chunk {index}"))
                    })?;
                    self.store(setup, &bundle).await?;
                    if remaining.is_empty() {
                        debug!(chunks = setup.expected.len(), "all chunks stored");
                        join.data_complete()?;
                    }
                }
                ControlMessage::ContactRequest { scope } if scope == setup.scope => {
                    contact_requested = true;
                }
                other => return Err(ProtocolError::unexpected("chunk or contact request", &other)),
            }

            // Proof of contact only goes out once every chunk is stored.
            if contact_requested && remaining.is_empty() {
                let signature = self.send_contact(link, &setup.scope).await?;
                join.contact_proof(signature)?;
            }
        }
        fired.fired().await?;
        Ok(())
    }

    async fn store(&self, setup: &Setup<'_>, bundle: &ChunkProofBundle) -> ProtocolResult<()> {
        let store = self.registry.hosted(setup.feed.key).await?;
        let verified = self.ctx.verifier.verify(
            bundle,
            &setup.feed.commitment,
            &setup.encoder,
            &setup.scope,
        );
        self.ctx.metrics.chunk(verified.is_ok());
        verified.map_err(|reason| ProtocolError::invalid(bundle.index, reason))?;

        store.store_encoded(bundle)?;
        trace!(index = bundle.index, "chunk stored");
        Ok(())
    }

    async fn prove(&self, challenge: &StorageChallenge) -> ProtocolResult<()> {
        let ledger = &self.ctx.ledger;
        let attester_key = ledger.attester_key(challenge.attester).await?;

        let mut proofs = Vec::with_capacity(challenge.checks.len());
        let mut first_feed = None;
        for (contract, index) in &challenge.checks {
            let feed = ledger.feed(ledger.contract(*contract).await?.feed).await?;
            first_feed.get_or_insert(feed.key);
            let bundle = self.registry.hosted(feed.key).await?.get_storage_challenge(*index)?;
            proofs.push(StorageProof { contract: *contract, bundle });
        }
        let feed = first_feed.ok_or_else(|| {
            ProtocolError::Inconsistent(format!("challenge {} has no checks", challenge.id))
        })?;

        let session = SessionId::storage_challenge(challenge.id);
        let topic = derive_topic(&self.ctx.identity.noise_key(), &attester_key, &feed, session)?;
        let handle = self.ctx.open(topic, session)?;
        let link = self.ctx.link(&handle, Mode::Server, attester_key, feed).await?;
        let scope = ScopeId::challenge(challenge.id);

        self.ctx
            .within(&handle, async {
                let (join, fired) = CompletionJoin::new();
                for (position, proof) in proofs.iter().enumerate() {
                    link.append(position as u64, proof.to_wire()?).await?;
                }
                join.data_complete()?;

                self.await_contact_request(&link, &scope).await?;
                join.contact_proof(self.send_contact(&link, &scope).await?)?;
                fired.fired().await?;
                Ok(())
            })
            .await?;
        self.ctx.finish(&handle);
        Ok(())
    }

    /// Answers chunk requests until the attester asks for proof of contact.
    async fn serve(
        &self,
        challenge: ChallengeId,
        feed: &Feed,
        attester: UserId,
    ) -> ProtocolResult<u32> {
        let attester_key = self.ctx.ledger.attester_key(attester).await?;
        let store = self.registry.hosted(feed.key).await?;

        let session = SessionId::performance_challenge(challenge);
        let topic = derive_topic(&attester_key, &self.ctx.identity.noise_key(), &feed.key, session)?;
        let handle = self.ctx.open(topic, session)?;
        let link = self.ctx.link(&handle, Mode::Server, attester_key, feed.key).await?;
        let scope = ScopeId::challenge(challenge);

        let served = self
            .ctx
            .within(&handle, async {
                let mut served = 0;
                loop {
                    match link.recv().await? {
                        ControlMessage::ChunkRequest { feed: requested, index }
                            if requested == feed.key =>
                        {
                            let bundle = match store.get_storage_challenge(index) {
                                Ok(bundle) => {
                                    served += 1;
                                    Some(bundle)
                                }
                                Err(e) => {
                                    warn!(index, error = %e, "cannot serve chunk");
                                    None
                                }
                            };
                            link.send(&ControlMessage::ChunkResponse { index, bundle }).await?;
                        }
                        ControlMessage::ContactRequest { scope: requested } if requested == scope => {
                            self.send_contact(&link, &scope).await?;
                            return Ok(served);
                        }
                        other => {
                            return Err(ProtocolError::unexpected("chunk or contact request", &other));
                        }
                    }
                }
            })
            .await?;
        self.ctx.finish(&handle);
        Ok(served)
    }

    async fn await_contact_request(&self, link: &PeerLink, scope: &ScopeId) -> ProtocolResult<()> {
        match link.recv().await? {
            ControlMessage::ContactRequest { scope: requested } if &requested == scope => Ok(()),
            other => Err(ProtocolError::unexpected("contact request", &other)),
        }
    }

    /// Signs `scope` and sends the proof of contact.
    async fn send_contact(&self, link: &PeerLink, scope: &ScopeId) -> ProtocolResult<Vec<u8>> {
        let signature = self.ctx.identity.sign_scope(scope)?;
        link.send(&ControlMessage::ContactProof { topic: link.topic(), signature: signature.clone() })
            .await?;
        debug!(%scope, "proof of contact sent");
        Ok(signature)
    }
}

/// What a hosting setup verifies chunks against.
struct Setup<'a> {
    feed: &'a Feed,
    encoder: SignerAddress,
    scope: ScopeId,
    expected: &'a [ChunkIndex],
}
