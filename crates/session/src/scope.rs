//! Deadline-bound cancellation scopes.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::watch;
use tracing::debug;

use crate::ScopeError;

/// State of a [`SessionScope`]. Leaves `Open` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Open,
    Completed,
    Cancelled,
    TimedOut,
}

impl ScopeState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    fn into_error(self) -> Option<ScopeError> {
        match self {
            Self::Open => None,
            Self::Completed => Some(ScopeError::Completed),
            Self::Cancelled => Some(ScopeError::Cancelled),
            Self::TimedOut => Some(ScopeError::TimedOut),
        }
    }
}

/// Cancellation scope bound to one session.
///
/// Every wait inside the session goes through [`SessionScope::run`], so
/// completion, cancellation or the deadline short-circuit all of them at once.
#[derive(Debug, Clone)]
pub struct SessionScope {
    state: Arc<watch::Sender<ScopeState>>,
}

impl SessionScope {
    /// Opens a scope that times out after `timeout`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(timeout: Duration) -> Self {
        let (tx, _) = watch::channel(ScopeState::Open);
        let scope = Self { state: Arc::new(tx) };

        let timer = scope.clone();
        let mut closed = scope.state.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    if timer.transition(ScopeState::TimedOut) {
                        debug!(?timeout, "session scope timed out");
                    }
                }
                _ = closed.wait_for(|state| !state.is_open()) => {}
            }
        });

        scope
    }

    /// Current state.
    pub fn state(&self) -> ScopeState {
        *self.state.borrow()
    }

    /// Cancels the scope. Returns false if it was already closed.
    pub fn cancel(&self) -> bool {
        self.transition(ScopeState::Cancelled)
    }

    /// Marks the scope completed. Returns false if it was already closed.
    pub fn complete(&self) -> bool {
        self.transition(ScopeState::Completed)
    }

    /// Waits until the scope leaves `Open` and returns the final state.
    pub async fn closed(&self) -> ScopeState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| !state.is_open()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Runs `fut` until it finishes or the scope closes, whichever is first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ScopeError> {
        if let Some(err) = self.state().into_error() {
            return Err(err);
        }
        tokio::select! {
            output = fut => Ok(output),
            state = self.closed() => Err(state.into_error().unwrap_or(ScopeError::Cancelled)),
        }
    }

    fn transition(&self, to: ScopeState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_open() {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out_pending_wait() {
        let scope = SessionScope::open(Duration::from_secs(10));
        let result = scope.run(std::future::pending::<()>()).await;
        assert_matches!(result, Err(ScopeError::TimedOut));
        assert_eq!(scope.state(), ScopeState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_short_circuits_every_wait() {
        let scope = SessionScope::open(Duration::from_secs(10));
        let a = tokio::spawn({
            let scope = scope.clone();
            async move { scope.run(std::future::pending::<()>()).await }
        });
        let b = tokio::spawn({
            let scope = scope.clone();
            async move { scope.run(std::future::pending::<()>()).await }
        });
        tokio::task::yield_now().await;

        assert!(scope.cancel());
        assert_matches!(a.await.unwrap(), Err(ScopeError::Cancelled));
        assert_matches!(b.await.unwrap(), Err(ScopeError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_transition_wins() {
        let scope = SessionScope::open(Duration::from_secs(1));
        assert_eq!(scope.run(async { 5 }).await, Ok(5));
        assert!(scope.complete());
        assert!(!scope.cancel());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scope.state(), ScopeState::Completed);
        assert_matches!(scope.run(async {}).await, Err(ScopeError::Completed));
    }
}
