//! Hoster and attester protocol state machines.
//!
//! A [`Node`] receives ledger events and hands each one to its [`Hoster`] and
//! [`Attester`]:
//!
//! - hosting setup: the attester relays every encoder's verified chunks to the
//!   hoster at the same position, which stores them and signs a proof of
//!   contact; the attester reports the amendment outcome
//! - storage challenge: the hoster publishes the requested bundles, the
//!   attester verifies them and reports
//! - performance challenge: the attester times chunk retrieval from every
//!   hoster of a feed and submits one report once all of them answered
//!
//! Every session runs under a [`RoleContext`]-wide deadline and publishes its
//! outcome as a [`NodeEvent`].

mod attester;
mod config;
mod context;
mod error;
mod events;
mod hoster;
mod metrics;
mod node;
mod selection;

pub use attester::Attester;
pub use config::{FailurePolicy, IndexSelection, RoleConfig};
pub use context::{LocalIdentity, RoleContext};
pub use error::{ProtocolError, ProtocolResult};
pub use events::{NodeEvent, NodeEvents};
pub use hoster::Hoster;
pub use metrics::SessionMetrics;
pub use node::Node;
