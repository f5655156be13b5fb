//! Events delivered by the ledger.

use serde::{Deserialize, Serialize};
use tether_primitives::{AmendmentId, ChallengeId, EventId, FeedId, PlanId, UserId};

/// A ledger notification. `id` is unique per emitted event; re-delivery of
/// the same event keeps its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: EventId,
    pub payload: EventPayload,
}

impl LedgerEvent {
    pub fn new(id: impl Into<EventId>, payload: EventPayload) -> Self {
        Self { id: id.into(), payload }
    }
}

/// Event method and its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::IntoStaticStr)]
pub enum EventPayload {
    NewAmendment { amendment: AmendmentId },
    NewStorageChallenge { challenge: ChallengeId },
    NewPerformanceChallenge { challenge: ChallengeId },
    DropHosting { feed: FeedId, hoster: UserId },
    UnpublishPlan { plan: PlanId },
    HostingStarted { amendment: AmendmentId },
    RegisteredForHosting { user: UserId },
}

impl EventPayload {
    /// Ledger method name.
    pub fn method(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_method_names() {
        let payload = EventPayload::NewStorageChallenge { challenge: ChallengeId(3) };
        assert_eq!(payload.method(), "NewStorageChallenge");
        assert_eq!(payload.to_string(), "NewStorageChallenge");
    }

    #[test]
    fn test_redelivery_keeps_id_and_payload() {
        let payload = EventPayload::DropHosting { feed: FeedId(2), hoster: UserId(9) };
        let event = LedgerEvent::new(EventId(4), payload);
        let redelivered = event.clone();
        assert_eq!(redelivered.id, EventId(4));
        assert_matches!(
            redelivered.payload,
            EventPayload::DropHosting { feed, hoster } if feed == FeedId(2) && hoster == UserId(9)
        );
    }
}
