//! Test support for the tether crates.
//!
//! - [`MockLedger`] - ledger client over in-memory maps that records every
//!   submission
//! - [`FeedFixture`] - deterministic feed with its Merkle tree and signed
//!   bundles
//! - [`EncoderSim`] - serves an encoder's share of a hosting setup over a
//!   transport

mod encoder;
mod fixture;
mod ledger;

pub use encoder::{EncoderError, EncoderSim};
pub use fixture::{FeedFixture, FixtureError};
pub use ledger::{MockLedger, Submission};
