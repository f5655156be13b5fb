//! Attester role.
//!
//! During hosting setup the attester sits between each encoder and its
//! positional hoster: chunks pulled from the encoder are verified and handed
//! to the hoster through a rendezvous relay, so only unmatched chunks are held
//! in memory. In challenges the attester checks a hoster and reports to the
//! ledger.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use alloy_primitives::B256;
use futures::{StreamExt, TryFutureExt, future::join_all, stream::FuturesUnordered};
use parking_lot::Mutex;
use tether_ledger::{
    Amendment, AmendmentReport, CheckReport, Feed, HosterPerformance, PerformanceChallenge,
    PerformanceReport, PerformanceStats, StorageChallenge, StorageChallengeResponse,
};
use tether_net_transport::{Mode, PeerLink};
use tether_primitives::{
    AmendmentId, ChallengeId, ChunkIndex, ChunkProofBundle, ChunkRange, ContractId,
    ControlMessage, FeedKey, PeerKey, PlanId, ScopeId, SessionId, SessionKind, SignerAddress,
    StorageProof, UserId, Wire, derive_topic,
};
use tether_proof::VerifyError;
use tether_session::{CompletionJoin, MultiJoin, RendezvousRelay, SessionHandle};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::{
    FailurePolicy, ProtocolError, ProtocolResult, RoleContext, selection::IndexPicker,
};

/// Handles the events addressed to this node as an attester.
#[derive(Debug, Clone)]
pub struct Attester {
    ctx: Arc<RoleContext>,
    /// Plans of the amendments being set up, for cancellation on unpublish.
    setups: Arc<Mutex<HashMap<AmendmentId, PlanId>>>,
}

impl Attester {
    pub fn new(ctx: Arc<RoleContext>) -> Self {
        Self { ctx, setups: Default::default() }
    }

    /// Hosting setup: relay every encoder's chunks to its hoster and report
    /// the outcome of all positions.
    pub async fn on_new_amendment(&self, id: AmendmentId) -> ProtocolResult<()> {
        let amendment = self.ctx.ledger.amendment(id).await?;
        let Some(attester) = amendment.attester() else {
            warn!(amendment = %id, "amendment has no attester");
            return Ok(());
        };
        if !self.ctx.is_me(attester).await? {
            return Ok(());
        }

        let session = SessionId::hosting_setup(id);
        let span = info_span!("hosting_setup", role = "attester", %session);
        async {
            let result = self.attest_setup(&amendment).await;
            self.setups.lock().remove(&id);
            match &result {
                Ok(Some(report)) => info!(
                    hosted = report.signatures.len(),
                    failed = report.failed.len(),
                    "amendment report submitted"
                ),
                Ok(None) => info!("hosting setup cancelled, no report"),
                Err(e) => self.ctx.failed(session, e),
            }
            result.map(|_| ())
        }
        .instrument(span)
        .await
    }

    /// Storage challenge: verify one bundle per contract check.
    pub async fn on_storage_challenge(&self, id: ChallengeId) -> ProtocolResult<()> {
        let challenge = self.ctx.ledger.storage_challenge(id).await?;
        if !self.ctx.is_me(challenge.attester).await? {
            return Ok(());
        }

        let session = SessionId::storage_challenge(id);
        let span = info_span!("storage_challenge", role = "attester", %session);
        async {
            let result = self.check_storage(&challenge).await;
            match &result {
                Ok(response) => info!(
                    verified = response.reports.len(),
                    failed = response.failed.len(),
                    "storage challenge submitted"
                ),
                Err(e) => self.ctx.failed(session, e),
            }
            result.map(|_| ())
        }
        .instrument(span)
        .await
    }

    /// Performance challenge: time every hoster of the feed.
    pub async fn on_performance_challenge(&self, id: ChallengeId) -> ProtocolResult<()> {
        let challenge = self.ctx.ledger.performance_challenge(id).await?;
        let Some(attester) = challenge.attester() else {
            warn!(challenge = %id, "performance challenge has no attester");
            return Ok(());
        };
        if !self.ctx.is_me(attester).await? {
            return Ok(());
        }

        let session = SessionId::performance_challenge(id);
        let span = info_span!("performance_challenge", role = "attester", %session);
        async {
            let result = self.check_performance(&challenge).await;
            match &result {
                Ok(report) => info!(hosters = report.reports.len(), "performance report submitted"),
                Err(e) => self.ctx.failed(session, e),
            }
            result.map(|_| ())
        }
        .instrument(span)
        .await
    }

    /// Cancels the hosting setups of amendments under `plan`.
    pub fn on_unpublish_plan(&self, plan: PlanId) -> usize {
        let amendments: HashSet<u64> = self
            .setups
            .lock()
            .iter()
            .filter(|(_, p)| **p == plan)
            .map(|(amendment, _)| amendment.0)
            .collect();
        if amendments.is_empty() {
            return 0;
        }
        let cancelled = self.ctx.sessions.cancel_where(|session| {
            session.kind == SessionKind::HostingSetup && amendments.contains(&session.id)
        });
        info!(%plan, cancelled, "plan unpublished");
        cancelled
    }

    async fn attest_setup(&self, amendment: &Amendment) -> ProtocolResult<Option<AmendmentReport>> {
        let ledger = &self.ctx.ledger;
        let contract = ledger.contract(amendment.contract).await?;
        let feed = ledger.feed(contract.feed).await?;
        self.setups.lock().insert(amendment.id, contract.plan);

        let expected: Vec<ChunkIndex> = contract.ranges.iter().flat_map(ChunkRange::iter).collect();
        let pairs = amendment.pairs().map(|(position, encoder, hoster)| {
            self.attest_pair(amendment.id, &feed, &expected, position, encoder, hoster)
        });
        let outcomes = join_all(pairs).await;

        let session = SessionId::hosting_setup(amendment.id);
        let mut report = AmendmentReport::new(amendment.id);
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                PairOutcome::Hosted { hoster, proof } => {
                    report.signatures.insert(hoster, proof);
                }
                PairOutcome::Failed { failed, error } => {
                    cancelled |= matches!(error, ProtocolError::Cancelled(_));
                    self.ctx.failed(session, &error);
                    report.fail(failed);
                }
            }
        }
        if cancelled {
            return Ok(None);
        }

        let identity = &self.ctx.identity;
        ledger
            .amendment_report(report.clone(), identity.address(), identity.next_nonce())
            .await?;
        self.ctx.submitted(session);
        Ok(Some(report))
    }

    async fn attest_pair(
        &self,
        amendment: AmendmentId,
        feed: &Feed,
        expected: &[ChunkIndex],
        position: usize,
        encoder: UserId,
        hoster: UserId,
    ) -> PairOutcome {
        let ledger = &self.ctx.ledger;
        let keys = async {
            Ok::<_, ProtocolError>(PairKeys {
                encoder: ledger.encoder_key(encoder).await?,
                encoder_signer: ledger.signing_key(encoder).await?,
                hoster: ledger.hoster_key(hoster).await?,
                hoster_signer: ledger.signing_key(hoster).await?,
            })
        };
        let keys = match keys.await {
            Ok(keys) => keys,
            Err(error) => return PairOutcome::Failed { failed: Vec::new(), error },
        };

        let pair = Pair {
            feed,
            scope: ScopeId::position(amendment, position),
            session: SessionId::hosting_setup(amendment),
            expected,
            keys,
        };
        match self.relay_pair(&pair).await {
            Ok(proof) => {
                debug!(position, hoster = %pair.keys.hoster.short(), "position complete");
                PairOutcome::Hosted { hoster, proof }
            }
            Err((Side::Encoder, error)) => PairOutcome::Failed {
                failed: vec![pair.keys.encoder, pair.keys.hoster],
                error,
            },
            Err((Side::Hoster, error)) => {
                PairOutcome::Failed { failed: vec![pair.keys.hoster], error }
            }
        }
    }

    /// Runs the encoder-facing and hoster-facing sessions of one position.
    ///
    /// Fires with the hoster's proof of contact once every chunk has been
    /// handed off and the proof has verified.
    async fn relay_pair(&self, pair: &Pair<'_>) -> Result<Vec<u8>, (Side, ProtocolError)> {
        let me = self.ctx.identity.noise_key();
        let key = pair.feed.key;
        let upstream_topic = derive_topic(&pair.keys.encoder, &me, &key, pair.session)
            .map_err(|e| (Side::Encoder, e.into()))?;
        let downstream_topic = derive_topic(&me, &pair.keys.hoster, &key, pair.session)
            .map_err(|e| (Side::Hoster, e.into()))?;
        let upstream = self.ctx.open(upstream_topic, pair.session).map_err(|e| (Side::Encoder, e))?;
        let downstream = self.ctx.open(downstream_topic, pair.session).map_err(|e| (Side::Hoster, e))?;

        let relay = RendezvousRelay::new(pair.expected.iter().copied());
        let (join, fired) = CompletionJoin::new();

        let pull = self.pull(&upstream, pair, &relay).map_err(|e| (Side::Encoder, e));
        let serve = self.serve(&downstream, pair, &relay, &join).map_err(|e| (Side::Hoster, e));
        let complete = self
            .ctx
            .within(&downstream, async {
                relay.all_sent().await;
                join.data_complete()?;
                Ok(fired.fired().await?)
            })
            .map_err(|e| (Side::Hoster, e));

        let ((), (), proof) = tokio::try_join!(pull, serve, complete)?;
        self.ctx.finish(&upstream);
        self.ctx.finish(&downstream);
        Ok(proof)
    }

    /// Pulls, verifies and relays every chunk from the encoder.
    async fn pull(
        &self,
        handle: &SessionHandle,
        pair: &Pair<'_>,
        relay: &RendezvousRelay<ChunkProofBundle>,
    ) -> ProtocolResult<()> {
        let link = self.ctx.link(handle, Mode::Client, pair.keys.encoder, pair.feed.key).await?;
        self.ctx
            .within(handle, async {
                for (position, index) in pair.expected.iter().enumerate() {
                    let bundle = ChunkProofBundle::from_wire(&link.get(position as u64).await?)?;
                    if bundle.index != *index {
                        return Err(ProtocolError::invalid(
                            bundle.index,
                            VerifyError::IndexMismatch { proof: bundle.index, chunk: *index },
                        ));
                    }
                    let verified = self.ctx.verifier.verify(
                        &bundle,
                        &pair.feed.commitment,
                        &pair.keys.encoder_signer,
                        &pair.scope,
                    );
                    self.ctx.metrics.chunk(verified.is_ok());
                    verified.map_err(|reason| ProtocolError::invalid(*index, reason))?;
                    relay.produce(*index, bundle)?;
                    trace!(index, "chunk relayed");
                }
                Ok(())
            })
            .await
    }

    /// Serves the hoster's chunk requests from the relay, then collects its
    /// proof of contact.
    async fn serve(
        &self,
        handle: &SessionHandle,
        pair: &Pair<'_>,
        relay: &RendezvousRelay<ChunkProofBundle>,
        join: &CompletionJoin<Vec<u8>>,
    ) -> ProtocolResult<()> {
        let link = self.ctx.link(handle, Mode::Server, pair.keys.hoster, pair.feed.key).await?;
        self.ctx
            .within(handle, async {
                let total = pair.expected.len();
                let mut inflight = FuturesUnordered::new();
                let (mut requested, mut sent) = (0, 0);
                while sent < total {
                    tokio::select! {
                        message = link.recv(), if requested < total => match message? {
                            ControlMessage::ChunkRequest { feed, index } if feed == pair.feed.key => {
                                let delivery = relay.consume(index)?;
                                requested += 1;
                                inflight.push(async move { (index, delivery.recv().await) });
                            }
                            other => return Err(ProtocolError::unexpected("chunk request", &other)),
                        },
                        Some((index, bundle)) = inflight.next() => {
                            let bundle = Some(bundle?);
                            link.send(&ControlMessage::ChunkResponse { index, bundle }).await?;
                            sent += 1;
                        }
                    }
                }

                let signature = request_contact(&link, &pair.scope).await?;
                self.ctx.verify_contact(&signature, &pair.scope, &pair.keys.hoster_signer)?;
                join.contact_proof(signature)?;
                Ok(())
            })
            .await
    }

    async fn check_storage(
        &self,
        challenge: &StorageChallenge,
    ) -> ProtocolResult<StorageChallengeResponse> {
        let ledger = &self.ctx.ledger;
        let hoster_key = ledger.hoster_key(challenge.hoster).await?;
        let hoster_signer = ledger.signing_key(challenge.hoster).await?;
        let (feed, mut checks) = self.resolve_checks(challenge).await?;

        let session = SessionId::storage_challenge(challenge.id);
        let topic = derive_topic(&hoster_key, &self.ctx.identity.noise_key(), &feed, session)?;
        let handle = self.ctx.open(topic, session)?;
        let link = self.ctx.link(&handle, Mode::Client, hoster_key, feed).await?;
        let scope = ScopeId::challenge(challenge.id);
        let policy = self.ctx.config.storage_failure_policy;

        let response = self
            .ctx
            .within(&handle, async {
                let (join, fired) = CompletionJoin::new();
                let total = checks.len();
                let (mut reports, mut failed) = (Vec::new(), Vec::new());
                for position in 0..total {
                    let proof = StorageProof::from_wire(&link.get(position as u64).await?)?;
                    let check = checks.remove(&proof.contract).ok_or_else(|| {
                        ProtocolError::MalformedMessage(format!(
                            "unexpected proof for contract {}",
                            proof.contract
                        ))
                    })?;
                    match self.verify_check(&check, &proof.bundle) {
                        Ok(()) => reports.push(CheckReport {
                            contract: proof.contract,
                            proof: proof.bundle.merkle_proof,
                        }),
                        Err(e) if policy == FailurePolicy::SubmitPartial => {
                            warn!(contract = %proof.contract, error = %e, "check failed");
                            failed.push(proof.contract);
                        }
                        Err(e) => return Err(e),
                    }
                }
                join.data_complete()?;

                let signature = request_contact(&link, &scope).await?;
                self.ctx.verify_contact(&signature, &scope, &hoster_signer)?;
                join.contact_proof(signature)?;

                Ok(StorageChallengeResponse {
                    challenge: challenge.id,
                    proof_of_contact: fired.fired().await?,
                    reports,
                    failed,
                })
            })
            .await?;
        self.ctx.finish(&handle);

        let identity = &self.ctx.identity;
        ledger
            .submit_storage_challenge(response.clone(), identity.address(), identity.next_nonce())
            .await?;
        self.ctx.submitted(session);
        Ok(response)
    }

    /// Resolves everything a check is verified against, once per challenge.
    async fn resolve_checks(
        &self,
        challenge: &StorageChallenge,
    ) -> ProtocolResult<(FeedKey, BTreeMap<ContractId, Check>)> {
        let ledger = &self.ctx.ledger;
        let mut checks = BTreeMap::new();
        let mut first_feed = None;
        for (contract_id, index) in &challenge.checks {
            let contract = ledger.contract(*contract_id).await?;
            let active = contract.active_amendment().ok_or_else(|| {
                ProtocolError::Inconsistent(format!("contract {contract_id} has no amendment"))
            })?;
            let amendment = ledger.amendment(active).await?;
            let position = amendment.hoster_position(challenge.hoster).ok_or_else(|| {
                ProtocolError::Inconsistent(format!(
                    "user {} does not host contract {contract_id}",
                    challenge.hoster
                ))
            })?;
            let encoder = amendment.encoder_at(position).ok_or_else(|| {
                ProtocolError::Inconsistent(format!("no encoder at position {position}"))
            })?;
            let feed = ledger.feed(contract.feed).await?;
            first_feed.get_or_insert(feed.key);

            checks.insert(
                *contract_id,
                Check {
                    contract: *contract_id,
                    index: *index,
                    commitment: feed.commitment,
                    encoder: ledger.signing_key(encoder).await?,
                    scope: ScopeId::position(active, position),
                },
            );
        }
        let feed = first_feed.ok_or_else(|| {
            ProtocolError::Inconsistent(format!("challenge {} has no checks", challenge.id))
        })?;
        Ok((feed, checks))
    }

    fn verify_check(&self, check: &Check, bundle: &ChunkProofBundle) -> ProtocolResult<()> {
        let verified = if bundle.index != check.index {
            Err(VerifyError::IndexMismatch { proof: bundle.index, chunk: check.index })
        } else {
            self.ctx
                .verifier
                .verify(bundle, &check.commitment, &check.encoder, &check.scope)
                .map(|_| ())
        };
        self.ctx.metrics.chunk(verified.is_ok());
        verified.map_err(|reason| ProtocolError::InvalidProof {
            contract: Some(check.contract),
            index: check.index,
            reason,
        })
    }

    async fn check_performance(
        &self,
        challenge: &PerformanceChallenge,
    ) -> ProtocolResult<PerformanceReport> {
        let ledger = &self.ctx.ledger;
        let feed = ledger.feed(challenge.feed).await?;
        let targets = self.select_targets(challenge, &feed).await?;
        if targets.is_empty() {
            return Err(ProtocolError::Inconsistent(format!(
                "feed {} has no hosters to check",
                feed.id
            )));
        }
        debug!(hosters = targets.len(), "performance targets selected");

        let (join, fired) = MultiJoin::new(targets.iter().map(|target| target.user));
        let timings = targets.iter().map(|target| self.time_hoster(challenge.id, &feed, target, &join));
        for result in join_all(timings).await {
            result?;
        }

        let reports = fired
            .fired()
            .await?
            .into_iter()
            .map(|(user, (stats, proof_of_contact))| {
                (user, HosterPerformance { stats, proof_of_contact })
            })
            .collect();
        let report = PerformanceReport { challenge: challenge.id, reports };

        let identity = &self.ctx.identity;
        ledger
            .submit_performance_challenge(report.clone(), identity.address(), identity.next_nonce())
            .await?;
        self.ctx.submitted(SessionId::performance_challenge(challenge.id));
        Ok(report)
    }

    /// Picks one index per contract for every hoster of the feed's active
    /// amendments. A hoster under several contracts is checked once, for all
    /// of its indices.
    async fn select_targets(
        &self,
        challenge: &PerformanceChallenge,
        feed: &Feed,
    ) -> ProtocolResult<Vec<Target>> {
        let ledger = &self.ctx.ledger;
        let mut targets: BTreeMap<UserId, Target> = BTreeMap::new();
        for contract_id in &feed.contracts {
            let contract = ledger.contract(*contract_id).await?;
            let Some(active) = contract.active_amendment() else {
                continue;
            };
            let amendment = ledger.amendment(active).await?;
            for (position, encoder, hoster) in amendment.pairs() {
                if !targets.contains_key(&hoster) {
                    let key = ledger.hoster_key(hoster).await?;
                    targets.insert(
                        hoster,
                        Target {
                            user: hoster,
                            key,
                            signer: ledger.signing_key(hoster).await?,
                            picker: IndexPicker::new(
                                self.ctx.config.index_selection,
                                challenge.id,
                                &key,
                            ),
                            probes: Vec::new(),
                        },
                    );
                }
                let encoder = ledger.signing_key(encoder).await?;
                let Some(target) = targets.get_mut(&hoster) else {
                    continue;
                };
                let Some(index) = target.picker.pick(&contract.ranges) else {
                    continue;
                };
                target.probes.push(Probe {
                    index,
                    commitment: feed.commitment,
                    encoder,
                    scope: ScopeId::position(active, position),
                });
            }
        }
        Ok(targets.into_values().collect())
    }

    /// Times chunk retrieval from one hoster and collects its proof of contact.
    async fn time_hoster(
        &self,
        challenge: ChallengeId,
        feed: &Feed,
        target: &Target,
        join: &MultiJoin<UserId, PerformanceStats, Vec<u8>>,
    ) -> ProtocolResult<()> {
        let session = SessionId::performance_challenge(challenge);
        let topic = derive_topic(&self.ctx.identity.noise_key(), &target.key, &feed.key, session)?;
        let handle = self.ctx.open(topic, session)?;
        let link = self.ctx.link(&handle, Mode::Client, target.key, feed.key).await?;
        let scope = ScopeId::challenge(challenge);

        self.ctx
            .within(&handle, async {
                let mut stats = PerformanceStats::default();
                let start = Instant::now();
                for probe in &target.probes {
                    link.send(&ControlMessage::ChunkRequest { feed: feed.key, index: probe.index })
                        .await?;
                    let bundle = match link.recv().await? {
                        ControlMessage::ChunkResponse { index, bundle } if index == probe.index => bundle,
                        other => return Err(ProtocolError::unexpected("chunk response", &other)),
                    };
                    let latency = start.elapsed();

                    let verified = bundle.ok_or(None).and_then(|bundle| {
                        self.ctx
                            .verifier
                            .verify(&bundle, &probe.commitment, &probe.encoder, &probe.scope)
                            .map_err(Some)
                    });
                    match verified {
                        Ok(_) => {
                            self.ctx.metrics.chunk(true);
                            stats.served += 1;
                            stats.latency = Some(match stats.latency {
                                Some(average) => (average + latency) / 2,
                                None => latency,
                            });
                        }
                        Err(reason) => {
                            if let Some(reason) = &reason {
                                self.ctx.metrics.chunk(false);
                                warn!(index = probe.index, %reason, "chunk rejected");
                            } else {
                                warn!(index = probe.index, "chunk not served");
                            }
                            stats.missed += 1;
                        }
                    }
                }
                trace!(hoster = %target.key.short(), ?stats, "hoster timed");
                join.stats(&target.user, stats)?;

                let signature = request_contact(&link, &scope).await?;
                self.ctx.verify_contact(&signature, &scope, &target.signer)?;
                join.contact_proof(&target.user, signature)?;
                Ok(())
            })
            .await?;
        self.ctx.finish(&handle);
        Ok(())
    }
}

/// Asks the peer for proof of contact over `scope` and waits for it.
async fn request_contact(link: &PeerLink, scope: &ScopeId) -> ProtocolResult<Vec<u8>> {
    link.send(&ControlMessage::ContactRequest { scope: scope.clone() }).await?;
    match link.recv().await? {
        ControlMessage::ContactProof { topic, signature } if topic == link.topic() => Ok(signature),
        other => Err(ProtocolError::unexpected("proof of contact", &other)),
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Encoder,
    Hoster,
}

enum PairOutcome {
    Hosted { hoster: UserId, proof: Vec<u8> },
    Failed { failed: Vec<PeerKey>, error: ProtocolError },
}

struct PairKeys {
    encoder: PeerKey,
    encoder_signer: SignerAddress,
    hoster: PeerKey,
    hoster_signer: SignerAddress,
}

struct Pair<'a> {
    feed: &'a Feed,
    scope: ScopeId,
    session: SessionId,
    expected: &'a [ChunkIndex],
    keys: PairKeys,
}

struct Check {
    contract: ContractId,
    index: ChunkIndex,
    commitment: B256,
    encoder: SignerAddress,
    scope: ScopeId,
}

struct Probe {
    index: ChunkIndex,
    commitment: B256,
    encoder: SignerAddress,
    scope: ScopeId,
}

struct Target {
    user: UserId,
    key: PeerKey,
    signer: SignerAddress,
    picker: IndexPicker,
    probes: Vec<Probe>,
}
