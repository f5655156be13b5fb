//! Arena of live sessions keyed by topic.
//!
//! Every session is opened through [`SessionManager::open`] and torn down
//! exactly once: on completion, explicit cancellation, timeout, or when its
//! [`SessionHandle`] is dropped. Teardown releases the transport registrations
//! of the topic and of every peer the session observed.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tether_primitives::{PeerKey, SessionId, Topic};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::{LifecycleError, ScopeError, ScopeState, SessionScope};

/// Releases transport-level bookkeeping for a finished session.
pub trait TeardownHook: Send + Sync + 'static {
    fn release(&self, topic: &Topic, peers: &[PeerKey]);
}

struct Entry {
    session: SessionId,
    scope: SessionScope,
}

struct Inner {
    sessions: Mutex<HashMap<Topic, Entry>>,
    hook: Arc<dyn TeardownHook>,
    closed: AtomicBool,
    live: watch::Sender<usize>,
}

impl Inner {
    fn remove(&self, topic: &Topic) {
        let mut sessions = self.sessions.lock();
        sessions.remove(topic);
        let remaining = sessions.len();
        drop(sessions);
        self.live.send_replace(remaining);
    }
}

/// Owns every live session of the node.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
    timeout: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("live", &self.live())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SessionManager {
    /// Creates a manager whose sessions time out after `timeout`.
    pub fn new(hook: Arc<dyn TeardownHook>, timeout: Duration) -> Self {
        let (live, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                hook,
                closed: AtomicBool::new(false),
                live,
            }),
            timeout,
        }
    }

    /// Per-session deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens a session for `topic` with its own deadline.
    pub fn open(&self, topic: Topic, session: SessionId) -> Result<SessionHandle, LifecycleError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(LifecycleError::Closed);
        }

        let mut sessions = self.inner.sessions.lock();
        if sessions.contains_key(&topic) {
            return Err(LifecycleError::AlreadyOpen(topic));
        }
        let scope = SessionScope::open(self.timeout);
        sessions.insert(topic, Entry { session, scope: scope.clone() });
        let live = sessions.len();
        drop(sessions);
        self.inner.live.send_replace(live);

        trace!(%topic, %session, "session opened");
        Ok(SessionHandle {
            topic,
            session,
            scope,
            peers: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
            inner: self.inner.clone(),
        })
    }

    /// Number of live sessions.
    pub fn live(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Returns true if a session owns `topic`.
    pub fn contains(&self, topic: &Topic) -> bool {
        self.inner.sessions.lock().contains_key(topic)
    }

    /// Cancels the session on `topic`, if any.
    pub fn cancel(&self, topic: &Topic) -> bool {
        let scope = self.inner.sessions.lock().get(topic).map(|entry| entry.scope.clone());
        scope.is_some_and(|scope| scope.cancel())
    }

    /// Cancels every session whose id matches `predicate`.
    pub fn cancel_where(&self, predicate: impl Fn(&SessionId) -> bool) -> usize {
        let scopes: Vec<_> = self
            .inner
            .sessions
            .lock()
            .values()
            .filter(|entry| predicate(&entry.session))
            .map(|entry| entry.scope.clone())
            .collect();
        scopes.iter().filter(|scope| scope.cancel()).count()
    }

    /// Stops accepting sessions, cancels the live ones and waits for every
    /// teardown to run.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let cancelled = self.cancel_where(|_| true);
        debug!(cancelled, "draining sessions");

        let mut live = self.inner.live.subscribe();
        let _ = live.wait_for(|n| *n == 0).await;
    }
}

/// A live session. Dropping the handle tears the session down.
pub struct SessionHandle {
    topic: Topic,
    session: SessionId,
    scope: SessionScope,
    peers: Mutex<Vec<PeerKey>>,
    torn_down: AtomicBool,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("topic", &self.topic)
            .field("session", &self.session)
            .field("state", &self.scope.state())
            .finish()
    }
}

impl SessionHandle {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    /// Records a peer seen on this session, released on teardown.
    pub fn observe_peer(&self, peer: PeerKey) {
        let mut peers = self.peers.lock();
        if !peers.contains(&peer) {
            peers.push(peer);
        }
    }

    /// Runs `fut` under the session scope.
    pub async fn run<F: std::future::Future>(&self, fut: F) -> Result<F::Output, ScopeError> {
        self.scope.run(fut).await
    }

    /// Closes the scope as completed and tears the session down.
    pub fn complete(&self) -> ScopeState {
        self.scope.complete();
        self.teardown()
    }

    /// Tears the session down. Runs once; later calls are no-ops.
    ///
    /// An open scope is cancelled first, which short-circuits every pending
    /// wait of the session.
    pub fn teardown(&self) -> ScopeState {
        self.scope.cancel();
        let state = self.scope.state();
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return state;
        }

        let peers = std::mem::take(&mut *self.peers.lock());
        self.inner.hook.release(&self.topic, &peers);
        self.inner.remove(&self.topic);
        debug!(topic = %self.topic, session = %self.session, ?state, peers = peers.len(), "session torn down");
        state
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tether_primitives::{AmendmentId, ChallengeId, FeedKey, derive_topic};

    #[derive(Default)]
    struct RecordingHook {
        released: Mutex<Vec<(Topic, Vec<PeerKey>)>>,
    }

    impl TeardownHook for RecordingHook {
        fn release(&self, topic: &Topic, peers: &[PeerKey]) {
            self.released.lock().push((*topic, peers.to_vec()));
        }
    }

    fn topic(id: u64) -> Topic {
        derive_topic(
            &PeerKey::new([1; 32]),
            &PeerKey::new([2; 32]),
            &FeedKey::new([3; 32]),
            SessionId::hosting_setup(AmendmentId(id)),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_runs_once() {
        let hook = Arc::new(RecordingHook::default());
        let manager = SessionManager::new(hook.clone(), Duration::from_secs(10));
        let handle = manager.open(topic(1), SessionId::hosting_setup(AmendmentId(1))).unwrap();
        handle.observe_peer(PeerKey::new([9; 32]));
        handle.observe_peer(PeerKey::new([9; 32]));

        assert_eq!(handle.complete(), ScopeState::Completed);
        handle.teardown();
        drop(handle);

        let released = hook.released.lock();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].1, vec![PeerKey::new([9; 32])]);
        assert_eq!(manager.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_topic_rejected() {
        let manager = SessionManager::new(Arc::new(RecordingHook::default()), Duration::from_secs(1));
        let _handle = manager.open(topic(1), SessionId::hosting_setup(AmendmentId(1))).unwrap();
        assert_matches!(
            manager.open(topic(1), SessionId::hosting_setup(AmendmentId(1))),
            Err(LifecycleError::AlreadyOpen(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_isolated_from_sibling() {
        let hook = Arc::new(RecordingHook::default());
        let manager = SessionManager::new(hook.clone(), Duration::from_secs(10));
        let slow = manager.open(topic(1), SessionId::hosting_setup(AmendmentId(1))).unwrap();
        let fast = manager.open(topic(2), SessionId::hosting_setup(AmendmentId(2))).unwrap();

        let stalled = tokio::spawn(async move {
            let result = slow.run(std::future::pending::<()>()).await;
            slow.teardown();
            result
        });

        assert_eq!(fast.run(async { 1 }).await, Ok(1));
        assert_matches!(stalled.await.unwrap(), Err(ScopeError::TimedOut));

        assert!(fast.scope().state().is_open());
        assert!(manager.contains(&topic(2)));
        assert!(!manager.contains(&topic(1)));
        assert_eq!(fast.complete(), ScopeState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drains_sessions() {
        let hook = Arc::new(RecordingHook::default());
        let manager = SessionManager::new(hook.clone(), Duration::from_secs(60));
        let session = SessionId::storage_challenge(ChallengeId(3));
        let handle = manager.open(topic(3), session).unwrap();

        let task = tokio::spawn(async move {
            let _ = handle.run(std::future::pending::<()>()).await;
        });

        manager.close().await;
        task.await.unwrap();
        assert_eq!(manager.live(), 0);
        assert_eq!(hook.released.lock().len(), 1);
        assert_matches!(manager.open(topic(4), session), Err(LifecycleError::Closed));
    }
}
