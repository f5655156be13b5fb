//! Established link between two peers.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use tether_primitives::{ChunkIndex, ControlMessage, PeerKey, Topic, Wire};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::trace;

use crate::{TransportError, TransportResult};

type Log = BTreeMap<ChunkIndex, Bytes>;

/// One side of a link: an outbound log this side appends to, the remote's
/// log this side reads from, and a control channel in each direction.
pub struct PeerLink {
    topic: Topic,
    local: PeerKey,
    remote: PeerKey,
    outbound: watch::Sender<Log>,
    inbound: watch::Receiver<Log>,
    control_tx: mpsc::UnboundedSender<Bytes>,
    control_rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    delay: Duration,
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("topic", &self.topic)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl PeerLink {
    /// Creates both ends of a link between `a` and `b`.
    pub fn pair(topic: Topic, a: PeerKey, b: PeerKey) -> (Self, Self) {
        let (a_log, b_reads) = watch::channel(Log::new());
        let (b_log, a_reads) = watch::channel(Log::new());
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a_end = Self {
            topic,
            local: a,
            remote: b,
            outbound: a_log,
            inbound: a_reads,
            control_tx: a_tx,
            control_rx: Mutex::new(a_rx),
            delay: Duration::ZERO,
        };
        let b_end = Self {
            topic,
            local: b,
            remote: a,
            outbound: b_log,
            inbound: b_reads,
            control_tx: b_tx,
            control_rx: Mutex::new(b_rx),
            delay: Duration::ZERO,
        };
        (a_end, b_end)
    }

    /// Delays everything this side sends by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn local(&self) -> PeerKey {
        self.local
    }

    pub fn remote(&self) -> PeerKey {
        self.remote
    }

    /// Writes `bytes` at `index` of the outbound log.
    pub async fn append(&self, index: ChunkIndex, bytes: impl Into<Bytes>) -> TransportResult<()> {
        self.pace().await;
        if self.outbound.is_closed() {
            return Err(TransportError::Closed(self.remote));
        }

        let bytes = bytes.into();
        let mut occupied = false;
        self.outbound.send_if_modified(|log| {
            if log.contains_key(&index) {
                occupied = true;
                return false;
            }
            log.insert(index, bytes);
            true
        });
        if occupied {
            return Err(TransportError::Occupied(index));
        }
        trace!(topic = %self.topic, index, "appended");
        Ok(())
    }

    /// Waits for the remote log entry at `index`.
    pub async fn get(&self, index: ChunkIndex) -> TransportResult<Bytes> {
        let mut inbound = self.inbound.clone();
        let log = inbound
            .wait_for(|log| log.contains_key(&index))
            .await
            .map_err(|_| TransportError::Closed(self.remote))?;
        log.get(&index).cloned().ok_or(TransportError::Closed(self.remote))
    }

    /// Sends a control message.
    pub async fn send(&self, message: &ControlMessage) -> TransportResult<()> {
        self.pace().await;
        let bytes = message.to_wire()?;
        self.control_tx
            .send(Bytes::from(bytes))
            .map_err(|_| TransportError::Closed(self.remote))
    }

    /// Receives the next control message.
    pub async fn recv(&self) -> TransportResult<ControlMessage> {
        let bytes = self
            .control_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed(self.remote))?;
        Ok(ControlMessage::from_wire(&bytes)?)
    }

    async fn pace(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tether_primitives::{AmendmentId, FeedKey, ScopeId, SessionId, derive_topic};

    fn link() -> (PeerLink, PeerLink) {
        let (a, b) = (PeerKey::new([1; 32]), PeerKey::new([2; 32]));
        let topic = derive_topic(
            &a,
            &b,
            &FeedKey::new([3; 32]),
            SessionId::hosting_setup(AmendmentId(1)),
        )
        .unwrap();
        PeerLink::pair(topic, a, b)
    }

    #[tokio::test]
    async fn test_get_waits_for_append() {
        let (a, b) = link();
        let reader = tokio::spawn(async move { b.get(2).await.unwrap() });
        a.append(0, vec![0]).await.unwrap();
        a.append(2, vec![2, 2]).await.unwrap();
        assert_eq!(reader.await.unwrap(), Bytes::from(vec![2, 2]));
    }

    #[tokio::test]
    async fn test_positions_are_written_once() {
        let (a, _b) = link();
        a.append(1, vec![1]).await.unwrap();
        assert_matches!(a.append(1, vec![9]).await, Err(TransportError::Occupied(1)));
    }

    #[tokio::test]
    async fn test_entries_survive_writer_drop() {
        let (a, b) = link();
        a.append(0, vec![7]).await.unwrap();
        drop(a);
        assert_eq!(b.get(0).await.unwrap(), Bytes::from(vec![7]));
        assert_matches!(b.get(1).await, Err(TransportError::Closed(_)));
    }

    #[tokio::test]
    async fn test_control_messages_in_order() {
        let (a, b) = link();
        let first = ControlMessage::ContactRequest { scope: ScopeId::position(AmendmentId(1), 0) };
        let second = ControlMessage::FeedKey { feed: FeedKey::new([3; 32]) };
        a.send(&first).await.unwrap();
        a.send(&second).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), first);
        assert_eq!(b.recv().await.unwrap(), second);

        drop(a);
        assert_matches!(b.recv().await, Err(TransportError::Closed(_)));
    }
}
