use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic nonce source of the local signing identity.
#[derive(Debug, Default)]
pub struct NonceCounter(AtomicU64);

impl NonceCounter {
    pub fn starting_at(next: u64) -> Self {
        Self(AtomicU64::new(next))
    }

    /// Issues the next nonce. Never returns the same value twice.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// The nonce [`NonceCounter::next`] would return.
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
