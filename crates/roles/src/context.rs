//! State shared by every role handler of a node.

use std::{future::Future, sync::Arc};

use tether_ledger::{LedgerClient, NonceCounter};
use tether_net_transport::{ConnectRequest, Mode, PeerLink, Transport};
use tether_primitives::{
    ControlMessage, FeedKey, PeerKey, ScopeId, SessionId, SignerAddress, Topic, UserId,
};
use tether_proof::{KeccakPrimitives, PayloadSigner, ProofPrimitives, ProofVerifier};
use tether_session::{ScopeError, SessionHandle, SessionManager, TeardownHook};
use tracing::{debug, error, warn};

use crate::{
    NodeEvent, NodeEvents, ProtocolError, ProtocolResult, RoleConfig, SessionMetrics,
};

/// Keys this node acts under.
pub struct LocalIdentity {
    noise: PeerKey,
    signer: Arc<dyn PayloadSigner>,
    nonces: NonceCounter,
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("noise", &self.noise)
            .field("address", &self.signer.address())
            .finish()
    }
}

impl LocalIdentity {
    /// `noise` is the transport key, `signer` signs reports and proofs of
    /// contact.
    pub fn new(noise: PeerKey, signer: Arc<dyn PayloadSigner>) -> Self {
        Self { noise, signer, nonces: NonceCounter::default() }
    }

    /// Resumes nonces at `next`, the first nonce the ledger has not yet seen
    /// from this signer.
    pub fn with_next_nonce(mut self, next: u64) -> Self {
        self.nonces = NonceCounter::starting_at(next);
        self
    }

    pub fn noise_key(&self) -> PeerKey {
        self.noise
    }

    pub fn address(&self) -> SignerAddress {
        self.signer.address()
    }

    pub(crate) fn next_nonce(&self) -> u64 {
        self.nonces.next()
    }

    /// Signs the session scope as proof of contact.
    pub(crate) fn sign_scope(&self, scope: &ScopeId) -> ProtocolResult<Vec<u8>> {
        Ok(self.signer.sign(scope.as_bytes())?)
    }
}

/// Releases transport registrations when a session is torn down.
struct ReleaseTransport(Arc<dyn Transport>);

impl TeardownHook for ReleaseTransport {
    fn release(&self, topic: &Topic, peers: &[PeerKey]) {
        self.0.release(topic, peers);
    }
}

/// Collaborators and settings of a node's role handlers.
pub struct RoleContext {
    pub(crate) ledger: Arc<dyn LedgerClient>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) identity: LocalIdentity,
    pub(crate) sessions: SessionManager,
    pub(crate) primitives: Arc<dyn ProofPrimitives>,
    pub(crate) verifier: ProofVerifier,
    pub(crate) metrics: SessionMetrics,
    pub(crate) events: NodeEvents,
    pub(crate) config: RoleConfig,
}

impl std::fmt::Debug for RoleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleContext")
            .field("identity", &self.identity)
            .field("sessions", &self.sessions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RoleContext {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        transport: Arc<dyn Transport>,
        identity: LocalIdentity,
        config: RoleConfig,
    ) -> Self {
        Self::with_primitives(ledger, transport, identity, config, Arc::new(KeccakPrimitives))
    }

    pub fn with_primitives(
        ledger: Arc<dyn LedgerClient>,
        transport: Arc<dyn Transport>,
        identity: LocalIdentity,
        config: RoleConfig,
        primitives: Arc<dyn ProofPrimitives>,
    ) -> Self {
        let sessions = SessionManager::new(
            Arc::new(ReleaseTransport(transport.clone())),
            config.session_timeout,
        );
        Self {
            ledger,
            transport,
            identity,
            sessions,
            verifier: ProofVerifier::new(primitives.clone()),
            primitives,
            metrics: SessionMetrics::default(),
            events: NodeEvents::default(),
            config,
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn events(&self) -> &NodeEvents {
        &self.events
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    /// Returns true if `user` is registered with this node's signer.
    pub(crate) async fn is_me(&self, user: UserId) -> ProtocolResult<bool> {
        Ok(self.ledger.user_address(user).await? == self.identity.address())
    }

    pub(crate) fn open(&self, topic: Topic, session: SessionId) -> ProtocolResult<SessionHandle> {
        let handle = self.sessions.open(topic, session)?;
        self.metrics.sessions_opened.increment(1);
        debug!(%topic, %session, "session opened");
        Ok(handle)
    }

    /// Runs `fut` under the session's deadline.
    pub(crate) async fn within<T>(
        &self,
        handle: &SessionHandle,
        fut: impl Future<Output = ProtocolResult<T>>,
    ) -> ProtocolResult<T> {
        handle.run(fut).await.map_err(|e| ProtocolError::scope(handle.session(), e))?
    }

    /// Connects to `target` on the session topic and exchanges the feed key.
    ///
    /// The server announces `feed`; the client expects to be told the same
    /// feed.
    pub(crate) async fn link(
        &self,
        handle: &SessionHandle,
        mode: Mode,
        target: PeerKey,
        feed: FeedKey,
    ) -> ProtocolResult<PeerLink> {
        handle.observe_peer(target);
        let request = ConnectRequest {
            topic: handle.topic(),
            kind: handle.session().kind,
            mode,
            target,
        };
        let link = match handle.run(self.transport.connect(request)).await {
            Ok(link) => link?,
            Err(ScopeError::TimedOut) => return Err(ProtocolError::PeerUnreachable(target)),
            Err(e) => return Err(ProtocolError::scope(handle.session(), e)),
        };

        match mode {
            Mode::Server => link.send(&ControlMessage::FeedKey { feed }).await?,
            Mode::Client => {
                let announced = self.within(handle, async { Ok(link.recv().await?) }).await?;
                match announced {
                    ControlMessage::FeedKey { feed: announced } if announced == feed => {}
                    other => return Err(ProtocolError::unexpected("feed key", &other)),
                }
            }
        }
        Ok(link)
    }

    /// Checks a proof-of-contact over `scope` by `signer`.
    pub(crate) fn verify_contact(
        &self,
        signature: &[u8],
        scope: &ScopeId,
        signer: &SignerAddress,
    ) -> ProtocolResult<()> {
        self.primitives
            .verify_signature(signature, scope.as_bytes(), signer)
            .map_err(ProtocolError::InvalidContact)
    }

    /// Completes the session and tears it down.
    pub(crate) fn finish(&self, handle: &SessionHandle) {
        handle.complete();
        self.metrics.sessions_completed.increment(1);
    }

    /// Records a failed session.
    pub(crate) fn failed(&self, session: SessionId, err: &ProtocolError) {
        if err.is_timeout() {
            self.metrics.sessions_timed_out.increment(1);
            warn!(%session, error = %err, "session timed out");
        } else {
            error!(%session, error = %err, "session failed");
        }
        self.events.emit(NodeEvent::SessionFailed { session, reason: err.to_string() });
    }

    pub(crate) fn submitted(&self, session: SessionId) {
        self.metrics.reports_submitted.increment(1);
        self.events.emit(NodeEvent::ReportSubmitted { session });
    }
}
