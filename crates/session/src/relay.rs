//! Rendezvous relay between a producing and a consuming peer flow.
//!
//! Each expected index owns one cell. Whichever side arrives first parks in
//! the cell; the second side completes the hand-off and frees it. Only
//! unmatched items occupy memory, so the relay never buffers a whole feed.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tether_primitives::ChunkIndex;
use tokio::sync::{oneshot, watch};
use tracing::trace;

use crate::RelayError;

enum Cell<T> {
    /// Producer arrived first.
    Filled(T),
    /// Consumer arrived first.
    Awaiting(oneshot::Sender<T>),
}

struct Cells<T> {
    cells: HashMap<ChunkIndex, Cell<T>>,
    produced: HashSet<ChunkIndex>,
    consumed: HashSet<ChunkIndex>,
}

/// Exactly-once delivery of indexed items regardless of arrival order.
pub struct RendezvousRelay<T> {
    expected: HashSet<ChunkIndex>,
    state: Mutex<Cells<T>>,
    matched: watch::Sender<u64>,
}

/// A consumer's claim on one index.
#[derive(Debug)]
pub struct Delivery<T> {
    index: ChunkIndex,
    inner: DeliveryInner<T>,
}

#[derive(Debug)]
enum DeliveryInner<T> {
    Ready(T),
    Waiting(oneshot::Receiver<T>),
}

impl<T> Delivery<T> {
    /// Returns true if the item was already there when the claim was made.
    pub fn is_ready(&self) -> bool {
        matches!(self.inner, DeliveryInner::Ready(_))
    }

    /// Waits for the item.
    pub async fn recv(self) -> Result<T, RelayError> {
        match self.inner {
            DeliveryInner::Ready(item) => Ok(item),
            DeliveryInner::Waiting(rx) => rx.await.map_err(|_| RelayError::Closed(self.index)),
        }
    }
}

impl<T> RendezvousRelay<T> {
    /// Creates a relay over the given index set.
    pub fn new(indices: impl IntoIterator<Item = ChunkIndex>) -> Self {
        let (matched, _) = watch::channel(0);
        Self {
            expected: indices.into_iter().collect(),
            state: Mutex::new(Cells {
                cells: HashMap::new(),
                produced: HashSet::new(),
                consumed: HashSet::new(),
            }),
            matched,
        }
    }

    /// Number of indices this relay expects.
    pub fn expected(&self) -> u64 {
        self.expected.len() as u64
    }

    /// Number of completed hand-offs.
    pub fn matched(&self) -> u64 {
        *self.matched.borrow()
    }

    /// Cells currently holding a parked producer or consumer.
    pub fn pending(&self) -> usize {
        self.state.lock().cells.len()
    }

    /// Offers `item` for `index`.
    pub fn produce(&self, index: ChunkIndex, item: T) -> Result<(), RelayError> {
        if !self.expected.contains(&index) {
            return Err(RelayError::UnexpectedIndex(index));
        }

        let waiting = {
            let mut state = self.state.lock();
            if !state.produced.insert(index) {
                return Err(RelayError::DoubleFill(index));
            }
            match state.cells.remove(&index) {
                Some(Cell::Awaiting(tx)) => tx,
                Some(Cell::Filled(_)) | None => {
                    trace!(index, "relay cell filled");
                    state.cells.insert(index, Cell::Filled(item));
                    return Ok(());
                }
            }
        };

        waiting.send(item).map_err(|_| RelayError::ConsumerGone(index))?;
        self.mark_matched(index);
        Ok(())
    }

    /// Claims `index`. The returned delivery resolves once a producer arrives.
    pub fn consume(&self, index: ChunkIndex) -> Result<Delivery<T>, RelayError> {
        if !self.expected.contains(&index) {
            return Err(RelayError::UnexpectedIndex(index));
        }

        let mut state = self.state.lock();
        if !state.consumed.insert(index) {
            return Err(RelayError::DoubleConsume(index));
        }
        match state.cells.remove(&index) {
            Some(Cell::Filled(item)) => {
                drop(state);
                self.mark_matched(index);
                Ok(Delivery { index, inner: DeliveryInner::Ready(item) })
            }
            Some(Cell::Awaiting(_)) | None => {
                trace!(index, "relay consumer parked");
                let (tx, rx) = oneshot::channel();
                state.cells.insert(index, Cell::Awaiting(tx));
                Ok(Delivery { index, inner: DeliveryInner::Waiting(rx) })
            }
        }
    }

    /// Resolves once every expected index has been handed off.
    pub async fn all_sent(&self) {
        let expected = self.expected();
        let mut rx = self.matched.subscribe();
        // The sender lives in `self`, so this only ends by matching.
        let _ = rx.wait_for(|matched| *matched >= expected).await;
    }

    fn mark_matched(&self, index: ChunkIndex) {
        self.matched.send_modify(|matched| *matched += 1);
        trace!(index, matched = self.matched(), "relay hand-off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_producer_first() {
        let relay = RendezvousRelay::new(0..3);
        relay.produce(1, "one").unwrap();
        assert_eq!(relay.pending(), 1);

        let delivery = relay.consume(1).unwrap();
        assert!(delivery.is_ready());
        assert_eq!(delivery.recv().await.unwrap(), "one");
        assert_eq!(relay.pending(), 0);
        assert_eq!(relay.matched(), 1);
    }

    #[tokio::test]
    async fn test_consumer_first() {
        let relay = RendezvousRelay::new(0..3);
        let delivery = relay.consume(2).unwrap();
        assert!(!delivery.is_ready());
        relay.produce(2, "two").unwrap();
        assert_eq!(delivery.recv().await.unwrap(), "two");
        assert_eq!(relay.matched(), 1);
    }

    #[test]
    fn test_double_fill_and_consume() {
        let relay = RendezvousRelay::new(0..2);
        relay.produce(0, 1).unwrap();
        assert_matches!(relay.produce(0, 2), Err(RelayError::DoubleFill(0)));

        let _claim = relay.consume(1).unwrap();
        assert_matches!(relay.consume(1), Err(RelayError::DoubleConsume(1)));
        assert_matches!(relay.consume(9), Err(RelayError::UnexpectedIndex(9)));
    }

    #[test]
    fn test_dropped_consumer_reported() {
        let relay = RendezvousRelay::new(0..1);
        drop(relay.consume(0).unwrap());
        assert_matches!(relay.produce(0, 5), Err(RelayError::ConsumerGone(0)));
    }

    #[tokio::test]
    async fn test_all_sent_waits_for_every_index() {
        let relay = Arc::new(RendezvousRelay::new([4, 5]));
        let waiter = tokio::spawn({
            let relay = relay.clone();
            async move { relay.all_sent().await }
        });

        relay.produce(4, ()).unwrap();
        relay.consume(4).unwrap().recv().await.unwrap();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let claim = relay.consume(5).unwrap();
        relay.produce(5, ()).unwrap();
        claim.recv().await.unwrap();
        waiter.await.unwrap();
    }

    fn interleavings() -> impl Strategy<Value = Vec<(bool, u64)>> {
        (1u64..12).prop_flat_map(|n| {
            let events: Vec<_> = (0..n).flat_map(|i| [(true, i), (false, i)]).collect();
            Just(events).prop_shuffle()
        })
    }

    proptest! {
        #[test]
        fn test_every_index_delivered_once(events in interleavings()) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let relay = RendezvousRelay::new(0..(events.len() as u64 / 2));
                let mut claims = Vec::new();
                for (produce, index) in &events {
                    if *produce {
                        relay.produce(*index, *index * 10).unwrap();
                    } else {
                        claims.push((*index, relay.consume(*index).unwrap()));
                    }
                }
                for (index, claim) in claims {
                    assert_eq!(claim.recv().await.unwrap(), index * 10);
                }
                assert_eq!(relay.matched(), relay.expected());
                assert_eq!(relay.pending(), 0);
                relay.all_sent().await;
            });
        }
    }
}
