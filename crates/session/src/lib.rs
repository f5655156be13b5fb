//! Session primitives shared by every role.
//!
//! - [`KeyedSerializer`] - one in-flight loader per key, FIFO for the rest
//! - [`RendezvousRelay`] - exactly-once hand-off of indexed items between a
//!   producer flow and a consumer flow
//! - [`CompletionJoin`], [`MultiJoin`] - barriers that fire once both the data
//!   signal and the proof-of-contact signal have landed
//! - [`SessionScope`] - cancellation scope with a deadline
//! - [`SessionManager`] - arena of live sessions keyed by topic, with
//!   exactly-once teardown

mod error;
mod join;
mod lifecycle;
mod relay;
mod scope;
mod serializer;

pub use error::{JoinError, LifecycleError, RelayError, ScopeError, Signal};
pub use join::{CompletionJoin, JoinFuture, MultiJoin};
pub use lifecycle::{SessionHandle, SessionManager, TeardownHook};
pub use relay::{Delivery, RendezvousRelay};
pub use scope::{ScopeState, SessionScope};
pub use serializer::KeyedSerializer;
