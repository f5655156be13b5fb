//! Session transport.
//!
//! A session joins a rendezvous [`Topic`](tether_primitives::Topic) and
//! resolves to one [`PeerLink`] with the targeted peer. A link carries two
//! ordered logs, one per direction, with `append`/`get` by index, plus a
//! channel of [`ControlMessage`](tether_primitives::ControlMessage)s for
//! handshakes.
//!
//! [`Transport`] is the seam to the peer-to-peer substrate. [`MemoryNetwork`]
//! pairs in-process transports and is what the `dev` command and the tests
//! run on.

mod error;
mod link;
mod memory;
mod traits;

pub use error::{TransportError, TransportResult};
pub use link::PeerLink;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use traits::{ConnectRequest, Mode, Transport};
