//! Contract between the protocol engine and the ledger.
//!
//! The ledger is an external collaborator. This crate defines what the engine
//! reads from it ([`Amendment`], [`Contract`], [`Feed`] and the challenges),
//! the events it delivers ([`LedgerEvent`]), and the reports the engine submits
//! back through [`LedgerClient`]. Every submission carries a nonce drawn from
//! the local [`NonceCounter`].

mod client;
mod entities;
mod error;
mod event;
mod nonce;
mod report;

pub use client::LedgerClient;
pub use entities::{Amendment, Contract, Feed, PerformanceChallenge, Providers, StorageChallenge};
pub use error::{Entity, LedgerError, LedgerResult};
pub use event::{EventPayload, LedgerEvent};
pub use nonce::NonceCounter;
pub use report::{
    AmendmentReport, CheckReport, HosterPerformance, PerformanceReport, PerformanceStats,
    StorageChallengeResponse,
};
