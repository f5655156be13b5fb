//! Ledger identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Ledger user (a registered provider).
    UserId
);
id_type!(
    /// Amendment assigning roles for a contract.
    AmendmentId
);
id_type!(
    /// Hosting contract.
    ContractId
);
id_type!(
    /// Feed registered on the ledger.
    FeedId
);
id_type!(
    /// Storage or performance challenge.
    ChallengeId
);
id_type!(
    /// Published hosting plan.
    PlanId
);
id_type!(
    /// Ledger event, unique per emitted event.
    EventId
);
