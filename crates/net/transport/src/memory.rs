//! In-process rendezvous network.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_primitives::{PeerKey, Topic};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::{ConnectRequest, PeerLink, Transport, TransportError, TransportResult};

struct Waiting {
    from: PeerKey,
    to: PeerKey,
    reply: oneshot::Sender<PeerLink>,
}

#[derive(Default)]
struct Rendezvous {
    waiting: HashMap<Topic, Vec<Waiting>>,
    delays: HashMap<PeerKey, Duration>,
}

/// Pairs the transports created from it. Two peers meet when each joins the
/// same topic targeting the other.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Rendezvous>>,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork").field("waiting", &self.waiting()).finish()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the transport of the peer with `key`.
    pub fn transport(&self, key: PeerKey) -> MemoryTransport {
        MemoryTransport {
            key,
            network: self.clone(),
            joined: Mutex::new(HashSet::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    /// Delays everything `peer` sends on links established from now on.
    pub fn set_delay(&self, peer: PeerKey, delay: Duration) {
        self.inner.lock().delays.insert(peer, delay);
    }

    /// Joins still waiting for their target.
    pub fn waiting(&self) -> usize {
        self.inner.lock().waiting.values().map(Vec::len).sum()
    }

    /// Either pairs with a waiting target or parks the caller.
    fn meet(
        &self,
        topic: Topic,
        local: PeerKey,
        target: PeerKey,
    ) -> Result<PeerLink, oneshot::Receiver<PeerLink>> {
        let mut inner = self.inner.lock();
        let local_delay = inner.delays.get(&local).copied().unwrap_or_default();
        let target_delay = inner.delays.get(&target).copied().unwrap_or_default();

        let waiting = inner.waiting.entry(topic).or_default();
        while let Some(pos) = waiting.iter().position(|w| w.from == target && w.to == local) {
            let peer = waiting.swap_remove(pos);
            let (mine, theirs) = PeerLink::pair(topic, local, target);
            // A dropped receiver belongs to a join that was abandoned; try the next.
            if peer.reply.send(theirs.with_delay(target_delay)).is_ok() {
                if waiting.is_empty() {
                    inner.waiting.remove(&topic);
                }
                return Ok(mine.with_delay(local_delay));
            }
        }

        let (reply, rx) = oneshot::channel();
        waiting.push(Waiting { from: local, to: target, reply });
        Err(rx)
    }

    fn forget(&self, topic: &Topic, local: &PeerKey) {
        let mut inner = self.inner.lock();
        if let Some(waiting) = inner.waiting.get_mut(topic) {
            waiting.retain(|w| &w.from != local);
            if waiting.is_empty() {
                inner.waiting.remove(topic);
            }
        }
    }
}

/// A peer's view of a [`MemoryNetwork`].
pub struct MemoryTransport {
    key: PeerKey,
    network: MemoryNetwork,
    joined: Mutex<HashSet<Topic>>,
    released: Mutex<Vec<(Topic, Vec<PeerKey>)>>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("key", &self.key)
            .field("joined", &self.joined.lock().len())
            .finish()
    }
}

impl MemoryTransport {
    /// Topics joined and not yet released.
    pub fn joined(&self) -> usize {
        self.joined.lock().len()
    }

    /// Every release call, in order.
    pub fn released(&self) -> Vec<(Topic, Vec<PeerKey>)> {
        self.released.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_key(&self) -> PeerKey {
        self.key
    }

    async fn connect(&self, request: ConnectRequest) -> TransportResult<PeerLink> {
        if !self.joined.lock().insert(request.topic) {
            return Err(TransportError::AlreadyJoined(request.topic));
        }
        trace!(topic = %request.topic, kind = %request.kind, mode = %request.mode, "joined topic");

        let link = match self.network.meet(request.topic, self.key, request.target) {
            Ok(link) => link,
            Err(rx) => rx.await.map_err(|_| TransportError::Closed(request.target))?,
        };
        debug!(
            topic = %request.topic,
            peer = %request.target.short(),
            mode = %request.mode,
            "link established"
        );
        Ok(link)
    }

    fn release(&self, topic: &Topic, peers: &[PeerKey]) {
        self.joined.lock().remove(topic);
        self.network.forget(topic, &self.key);
        self.released.lock().push((*topic, peers.to_vec()));
        trace!(%topic, peers = peers.len(), "released topic");
    }
}
