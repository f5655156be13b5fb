//! Notifications the engine publishes to the rest of the node.

use tether_primitives::{AmendmentId, EventId, FeedKey, SessionId};
use tokio::sync::broadcast;

/// Outcome of a session, or a change in what this node hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Hosting setup finished; the feed is stored and served.
    FeedHosted { feed: FeedKey, amendment: AmendmentId },
    /// The feed was dropped from this node.
    FeedDropped { feed: FeedKey },
    /// A report for the session was accepted by the ledger.
    ReportSubmitted { session: SessionId },
    /// The session ended without its normal outcome.
    SessionFailed { session: SessionId, reason: String },
    /// Handling a ledger event failed, possibly before any session opened.
    EventFailed { event: EventId, method: &'static str, reason: String },
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug, Clone)]
pub struct NodeEvents {
    tx: broadcast::Sender<NodeEvent>,
}

impl Default for NodeEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl NodeEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: NodeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }
}
