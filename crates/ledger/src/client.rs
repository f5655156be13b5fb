use async_trait::async_trait;
use tether_primitives::{
    AmendmentId, ChallengeId, ContractId, FeedId, PeerKey, SignerAddress, UserId,
};
use tokio::sync::broadcast;

use crate::{
    Amendment, AmendmentReport, Contract, Feed, LedgerEvent, LedgerResult, PerformanceChallenge,
    PerformanceReport, StorageChallenge, StorageChallengeResponse,
};

/// Reads, event delivery and report submission against the ledger.
///
/// Key lookups resolve a user to its transport key for the given role
/// (`hoster_key`, `attester_key`, `encoder_key`) or to its signing identity
/// (`signing_key`). `user_address` is the account a user is registered with;
/// a node recognises events addressed to it by comparing it with its own
/// signer address.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Subscribes to ledger events from now on.
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent>;

    async fn amendment(&self, id: AmendmentId) -> LedgerResult<Amendment>;

    async fn contract(&self, id: ContractId) -> LedgerResult<Contract>;

    async fn feed(&self, id: FeedId) -> LedgerResult<Feed>;

    async fn storage_challenge(&self, id: ChallengeId) -> LedgerResult<StorageChallenge>;

    async fn performance_challenge(&self, id: ChallengeId) -> LedgerResult<PerformanceChallenge>;

    async fn hoster_key(&self, user: UserId) -> LedgerResult<PeerKey>;

    async fn attester_key(&self, user: UserId) -> LedgerResult<PeerKey>;

    async fn encoder_key(&self, user: UserId) -> LedgerResult<PeerKey>;

    async fn signing_key(&self, user: UserId) -> LedgerResult<SignerAddress>;

    async fn user_address(&self, user: UserId) -> LedgerResult<SignerAddress>;

    async fn user_id_by_noise_key(&self, key: &PeerKey) -> LedgerResult<UserId>;

    async fn amendment_report(
        &self,
        report: AmendmentReport,
        signer: SignerAddress,
        nonce: u64,
    ) -> LedgerResult<()>;

    async fn submit_storage_challenge(
        &self,
        response: StorageChallengeResponse,
        signer: SignerAddress,
        nonce: u64,
    ) -> LedgerResult<()>;

    async fn submit_performance_challenge(
        &self,
        report: PerformanceReport,
        signer: SignerAddress,
        nonce: u64,
    ) -> LedgerResult<()>;
}
