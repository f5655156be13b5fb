//! In-memory ledger.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_ledger::{
    Amendment, AmendmentReport, Contract, Entity, EventPayload, Feed, LedgerClient, LedgerError,
    LedgerEvent, LedgerResult, PerformanceChallenge, PerformanceReport, StorageChallenge,
    StorageChallengeResponse,
};
use tether_primitives::{
    AmendmentId, ChallengeId, ContractId, FeedId, PeerKey, SignerAddress, UserId,
};
use tokio::sync::broadcast;
use tracing::debug;

/// A report as received by the ledger, with the submitting account and nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission<T> {
    pub report: T,
    pub signer: SignerAddress,
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    noise: PeerKey,
    signer: SignerAddress,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, Registration>,
    amendments: HashMap<AmendmentId, Amendment>,
    contracts: HashMap<ContractId, Contract>,
    feeds: HashMap<FeedId, Feed>,
    storage_challenges: HashMap<ChallengeId, StorageChallenge>,
    performance_challenges: HashMap<ChallengeId, PerformanceChallenge>,
    amendment_reports: Vec<Submission<AmendmentReport>>,
    storage_responses: Vec<Submission<StorageChallengeResponse>>,
    performance_reports: Vec<Submission<PerformanceReport>>,
    reject: Option<String>,
}

/// Ledger backed by maps. Entities are inserted by the test; submissions are
/// recorded for inspection.
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<State>,
    events: broadcast::Sender<LedgerEvent>,
    next_event: AtomicU64,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { state: Mutex::default(), events, next_event: AtomicU64::new(1) }
    }

    /// Registers `user` with a transport key and signing address, for every
    /// role.
    pub fn register(&self, user: UserId, noise: PeerKey, signer: SignerAddress) {
        self.state.lock().users.insert(user, Registration { noise, signer });
    }

    pub fn insert_feed(&self, feed: Feed) {
        self.state.lock().feeds.insert(feed.id, feed);
    }

    pub fn insert_contract(&self, contract: Contract) {
        self.state.lock().contracts.insert(contract.id, contract);
    }

    /// Inserts `amendment` and appends it to its contract's amendment list,
    /// making it the active one.
    pub fn insert_amendment(&self, amendment: Amendment) {
        let mut state = self.state.lock();
        if let Some(contract) = state.contracts.get_mut(&amendment.contract) {
            if !contract.amendments.contains(&amendment.id) {
                contract.amendments.push(amendment.id);
            }
        }
        state.amendments.insert(amendment.id, amendment);
    }

    pub fn insert_storage_challenge(&self, challenge: StorageChallenge) {
        self.state.lock().storage_challenges.insert(challenge.id, challenge);
    }

    pub fn insert_performance_challenge(&self, challenge: PerformanceChallenge) {
        self.state.lock().performance_challenges.insert(challenge.id, challenge);
    }

    /// Refuses every later submission with `reason`.
    pub fn reject_submissions(&self, reason: impl Into<String>) {
        self.state.lock().reject = Some(reason.into());
    }

    /// Builds an event with a fresh id and broadcasts it to subscribers.
    pub fn publish(&self, payload: EventPayload) -> LedgerEvent {
        let event = LedgerEvent::new(self.next_event.fetch_add(1, Ordering::Relaxed), payload);
        let _ = self.events.send(event.clone());
        event
    }

    pub fn amendment_reports(&self) -> Vec<Submission<AmendmentReport>> {
        self.state.lock().amendment_reports.clone()
    }

    pub fn storage_responses(&self) -> Vec<Submission<StorageChallengeResponse>> {
        self.state.lock().storage_responses.clone()
    }

    pub fn performance_reports(&self) -> Vec<Submission<PerformanceReport>> {
        self.state.lock().performance_reports.clone()
    }

    /// Number of submissions of any kind.
    pub fn submissions(&self) -> usize {
        let state = self.state.lock();
        state.amendment_reports.len() + state.storage_responses.len() + state.performance_reports.len()
    }

    fn user(&self, user: UserId) -> LedgerResult<Registration> {
        self.state
            .lock()
            .users
            .get(&user)
            .copied()
            .ok_or(LedgerError::not_found(Entity::User, user.0))
    }

    fn accept(&self) -> LedgerResult<()> {
        match &self.state.lock().reject {
            Some(reason) => Err(LedgerError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

fn lookup<K: std::hash::Hash + Eq, V: Clone>(
    map: &HashMap<K, V>,
    id: &K,
    entity: Entity,
    raw: u64,
) -> LedgerResult<V> {
    map.get(id).cloned().ok_or(LedgerError::not_found(entity, raw))
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    async fn amendment(&self, id: AmendmentId) -> LedgerResult<Amendment> {
        lookup(&self.state.lock().amendments, &id, Entity::Amendment, id.0)
    }

    async fn contract(&self, id: ContractId) -> LedgerResult<Contract> {
        lookup(&self.state.lock().contracts, &id, Entity::Contract, id.0)
    }

    async fn feed(&self, id: FeedId) -> LedgerResult<Feed> {
        lookup(&self.state.lock().feeds, &id, Entity::Feed, id.0)
    }

    async fn storage_challenge(&self, id: ChallengeId) -> LedgerResult<StorageChallenge> {
        lookup(&self.state.lock().storage_challenges, &id, Entity::StorageChallenge, id.0)
    }

    async fn performance_challenge(&self, id: ChallengeId) -> LedgerResult<PerformanceChallenge> {
        lookup(&self.state.lock().performance_challenges, &id, Entity::PerformanceChallenge, id.0)
    }

    async fn hoster_key(&self, user: UserId) -> LedgerResult<PeerKey> {
        Ok(self.user(user)?.noise)
    }

    async fn attester_key(&self, user: UserId) -> LedgerResult<PeerKey> {
        Ok(self.user(user)?.noise)
    }

    async fn encoder_key(&self, user: UserId) -> LedgerResult<PeerKey> {
        Ok(self.user(user)?.noise)
    }

    async fn signing_key(&self, user: UserId) -> LedgerResult<SignerAddress> {
        Ok(self.user(user)?.signer)
    }

    async fn user_address(&self, user: UserId) -> LedgerResult<SignerAddress> {
        Ok(self.user(user)?.signer)
    }

    async fn user_id_by_noise_key(&self, key: &PeerKey) -> LedgerResult<UserId> {
        self.state
            .lock()
            .users
            .iter()
            .find(|(_, registration)| registration.noise == *key)
            .map(|(user, _)| *user)
            .ok_or(LedgerError::UnknownNoiseKey(*key))
    }

    async fn amendment_report(
        &self,
        report: AmendmentReport,
        signer: SignerAddress,
        nonce: u64,
    ) -> LedgerResult<()> {
        self.accept()?;
        debug!(amendment = %report.amendment, nonce, "amendment report received");
        self.state.lock().amendment_reports.push(Submission { report, signer, nonce });
        Ok(())
    }

    async fn submit_storage_challenge(
        &self,
        response: StorageChallengeResponse,
        signer: SignerAddress,
        nonce: u64,
    ) -> LedgerResult<()> {
        self.accept()?;
        debug!(challenge = %response.challenge, nonce, "storage challenge response received");
        self.state.lock().storage_responses.push(Submission { report: response, signer, nonce });
        Ok(())
    }

    async fn submit_performance_challenge(
        &self,
        report: PerformanceReport,
        signer: SignerAddress,
        nonce: u64,
    ) -> LedgerResult<()> {
        self.accept()?;
        debug!(challenge = %report.challenge, nonce, "performance report received");
        self.state.lock().performance_reports.push(Submission { report, signer, nonce });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tether_primitives::PlanId;

    #[tokio::test]
    async fn test_lookups_and_missing_entities() {
        let ledger = MockLedger::new();
        let noise = PeerKey::new([3; 32]);
        ledger.register(UserId(1), noise, SignerAddress::repeat_byte(1));

        assert_eq!(ledger.hoster_key(UserId(1)).await.unwrap(), noise);
        assert_eq!(ledger.user_id_by_noise_key(&noise).await.unwrap(), UserId(1));
        assert_matches!(
            ledger.feed(FeedId(9)).await,
            Err(LedgerError::NotFound { entity: Entity::Feed, id: 9 })
        );
        assert_matches!(
            ledger.user_id_by_noise_key(&PeerKey::new([4; 32])).await,
            Err(LedgerError::UnknownNoiseKey(_))
        );
    }

    #[tokio::test]
    async fn test_publish_assigns_fresh_ids() {
        let ledger = MockLedger::new();
        let mut events = ledger.subscribe();
        let first = ledger.publish(EventPayload::UnpublishPlan { plan: PlanId(1) });
        let second = ledger.publish(EventPayload::UnpublishPlan { plan: PlanId(1) });
        assert_ne!(first.id, second.id);
        assert_eq!(events.recv().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_rejected_submission_is_not_recorded() {
        let ledger = MockLedger::new();
        ledger.reject_submissions("paused");
        let err = ledger
            .amendment_report(AmendmentReport::new(AmendmentId(1)), SignerAddress::ZERO, 0)
            .await
            .unwrap_err();
        assert_matches!(err, LedgerError::Rejected(_));
        assert_eq!(ledger.submissions(), 0);
    }
}
