//! Dual-signal completion joins.
//!
//! A session is complete only once its data has been fully processed and a
//! proof-of-contact has been received. The join fires exactly once, after both
//! signals, whichever order they land in.

use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{JoinError, Signal};

/// Receives the join's output once it fires.
#[derive(Debug)]
pub struct JoinFuture<T>(oneshot::Receiver<T>);

impl<T> JoinFuture<T> {
    /// Waits for the join to fire.
    pub async fn fired(self) -> Result<T, JoinError> {
        self.0.await.map_err(|_| JoinError::Abandoned)
    }
}

struct JoinState<P> {
    data: bool,
    contact: Option<P>,
    fire: Option<oneshot::Sender<P>>,
}

/// Barrier over `data-complete` and `contact-proof` for one peer.
///
/// Fires with the proof-of-contact payload.
pub struct CompletionJoin<P> {
    state: Mutex<JoinState<P>>,
}

impl<P> CompletionJoin<P> {
    pub fn new() -> (Self, JoinFuture<P>) {
        let (tx, rx) = oneshot::channel();
        let join = Self {
            state: Mutex::new(JoinState { data: false, contact: None, fire: Some(tx) }),
        };
        (join, JoinFuture(rx))
    }

    /// Records that every expected chunk has reached a terminal outcome.
    pub fn data_complete(&self) -> Result<(), JoinError> {
        let mut state = self.state.lock();
        if state.data {
            return Err(JoinError::DuplicateSignal(Signal::DataComplete));
        }
        state.data = true;
        Self::try_fire(&mut state);
        Ok(())
    }

    /// Records a verified proof-of-contact.
    pub fn contact_proof(&self, proof: P) -> Result<(), JoinError> {
        let mut state = self.state.lock();
        if state.contact.is_some() || state.fire.is_none() {
            return Err(JoinError::DuplicateSignal(Signal::ContactProof));
        }
        state.contact = Some(proof);
        Self::try_fire(&mut state);
        Ok(())
    }

    /// Returns true if both signals have landed.
    pub fn is_fired(&self) -> bool {
        self.state.lock().fire.is_none()
    }

    fn try_fire(state: &mut JoinState<P>) {
        if !state.data {
            return;
        }
        if let Some(proof) = state.contact.take()
            && let Some(fire) = state.fire.take()
        {
            // A dropped receiver means the session was already abandoned.
            let _ = fire.send(proof);
        }
    }
}

struct Participant<S, P> {
    stats: Option<S>,
    contact: Option<P>,
}

struct MultiState<K, S, P> {
    pending: HashMap<K, Participant<S, P>>,
    done: HashMap<K, (S, P)>,
    fire: Option<oneshot::Sender<HashMap<K, (S, P)>>>,
}

/// Barrier that needs both signals from every tracked participant.
///
/// Fires once, with every participant's `(stats, proof)` pair.
pub struct MultiJoin<K, S, P> {
    state: Mutex<MultiState<K, S, P>>,
}

impl<K: Eq + Hash, S, P> MultiJoin<K, S, P> {
    pub fn new(participants: impl IntoIterator<Item = K>) -> (Self, JoinFuture<HashMap<K, (S, P)>>) {
        let (tx, rx) = oneshot::channel();
        let pending: HashMap<_, _> = participants
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|key| (key, Participant { stats: None, contact: None }))
            .collect();

        let mut state = MultiState { pending, done: HashMap::new(), fire: Some(tx) };
        Self::try_fire(&mut state);
        (Self { state: Mutex::new(state) }, JoinFuture(rx))
    }

    /// Records a participant's data signal.
    pub fn stats(&self, key: &K, stats: S) -> Result<(), JoinError> {
        let mut state = self.state.lock();
        let entry = Self::participant(&mut state, key)?;
        if entry.stats.is_some() {
            return Err(JoinError::DuplicateSignal(Signal::DataComplete));
        }
        entry.stats = Some(stats);
        Self::settle(&mut state, key);
        Ok(())
    }

    /// Records a participant's proof-of-contact.
    pub fn contact_proof(&self, key: &K, proof: P) -> Result<(), JoinError> {
        let mut state = self.state.lock();
        let entry = Self::participant(&mut state, key)?;
        if entry.contact.is_some() {
            return Err(JoinError::DuplicateSignal(Signal::ContactProof));
        }
        entry.contact = Some(proof);
        Self::settle(&mut state, key);
        Ok(())
    }

    /// Participants still missing a signal.
    pub fn outstanding(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn participant<'a>(
        state: &'a mut MultiState<K, S, P>,
        key: &K,
    ) -> Result<&'a mut Participant<S, P>, JoinError> {
        if state.done.contains_key(key) {
            return Err(JoinError::DuplicateSignal(Signal::ContactProof));
        }
        state.pending.get_mut(key).ok_or(JoinError::UnknownParticipant)
    }

    fn settle(state: &mut MultiState<K, S, P>, key: &K) {
        let complete = state
            .pending
            .get(key)
            .is_some_and(|entry| entry.stats.is_some() && entry.contact.is_some());
        if complete
            && let Some((key, Participant { stats: Some(stats), contact: Some(contact) })) =
                state.pending.remove_entry(key)
        {
            state.done.insert(key, (stats, contact));
        }
        Self::try_fire(state);
    }

    fn try_fire(state: &mut MultiState<K, S, P>) {
        if !state.pending.is_empty() {
            return;
        }
        if let Some(fire) = state.fire.take() {
            let _ = fire.send(std::mem::take(&mut state.done));
        }
    }
}
