use async_trait::async_trait;
use tether_primitives::{PeerKey, SessionKind, Topic};

use crate::{PeerLink, TransportResult};

/// Which side of the rendezvous a session takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Serves data to the target; sends the feed key on connect.
    Server,
    /// Pulls data from the target.
    Client,
}

/// Parameters of one `connect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    pub topic: Topic,
    pub kind: SessionKind,
    pub mode: Mode,
    /// The only peer accepted on the topic.
    pub target: PeerKey,
}

/// Rendezvous and link establishment.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Transport key of this node.
    fn local_key(&self) -> PeerKey;

    /// Joins `request.topic` and waits for the target to join it too.
    ///
    /// Does not time out on its own; callers bound it with their session
    /// deadline.
    async fn connect(&self, request: ConnectRequest) -> TransportResult<PeerLink>;

    /// Drops every registration held for `topic` and for `peers` on it.
    fn release(&self, topic: &Topic, peers: &[PeerKey]);
}
