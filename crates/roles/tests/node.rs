mod common;

use std::collections::BTreeMap;

use assert_matches::assert_matches;
use common::{Harness, SHORT_TIMEOUT, feed, preload};
use tether_ledger::{EventPayload, LedgerClient, StorageChallenge};
use tether_primitives::{AmendmentId, ChallengeId, ScopeId, SessionId};
use tether_roles::{NodeEvent, ProtocolError, RoleConfig};
use tokio::sync::oneshot;

#[tokio::test]
async fn test_timed_out_session_leaves_sibling_untouched() {
    let h = Harness::new();
    let (encoder, live_hoster, dead_hoster, attester) = (h.peer(1), h.peer(2), h.peer(3), h.peer(4));
    let fixture = feed(1, 4);
    let contracts = h.publish_feed(&fixture, &[(0, 1), (2, 3)]);
    let live = h.amend(1, contracts[0], &[&encoder], &[&live_hoster], &attester);
    h.amend(2, contracts[1], &[&encoder], &[&dead_hoster], &attester);

    let hoster_node = h.node(&live_hoster);
    preload(&hoster_node, &fixture, &encoder, &ScopeId::position(live, 0), 0..2).await;
    for (id, hoster, contract, index) in
        [(1, &live_hoster, contracts[0], 1), (2, &dead_hoster, contracts[1], 2)]
    {
        h.ledger.insert_storage_challenge(StorageChallenge {
            id: ChallengeId(id),
            hoster: hoster.user,
            attester: attester.user,
            checks: BTreeMap::from([(contract, index)]),
        });
    }

    let short = RoleConfig { session_timeout: SHORT_TIMEOUT, ..Default::default() };
    let attester_node = h.node_with(&attester, short);
    let first = h.ledger.publish(EventPayload::NewStorageChallenge { challenge: ChallengeId(1) });
    let second = h.ledger.publish(EventPayload::NewStorageChallenge { challenge: ChallengeId(2) });

    let (proved, checked, stalled) = tokio::join!(
        hoster_node.handle_event(first.clone()),
        attester_node.handle_event(first),
        attester_node.handle_event(second),
    );
    proved.unwrap();
    checked.unwrap();
    assert_matches!(stalled, Err(ProtocolError::PeerUnreachable(key)) if key == dead_hoster.key);

    let responses = h.ledger.storage_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].report.challenge, ChallengeId(1));

    // Both sessions are gone and their topics released.
    assert_eq!(attester_node.context().sessions().live(), 0);
    assert_eq!(attester.transport.joined(), 0);
    assert_eq!(attester.transport.released().len(), 2);
}

#[tokio::test]
async fn test_run_handles_published_events_until_shutdown() {
    let h = Harness::new();
    let (encoder, hoster, attester) = (h.peer(1), h.peer(2), h.peer(3));
    let fixture = feed(1, 3);
    let contracts = h.publish_feed(&fixture, &[(0, 2)]);
    let amendment = h.amend(1, contracts[0], &[&encoder], &[&hoster], &attester);

    let hoster_node = h.node(&hoster);
    let attester_node = h.node(&attester);
    hoster_node.start().await.unwrap();
    attester_node.start().await.unwrap();
    let mut attester_events = attester_node.subscribe();

    let (stop_hoster, hoster_stopped) = oneshot::channel::<()>();
    let (stop_attester, attester_stopped) = oneshot::channel::<()>();
    let hoster_run = tokio::spawn(hoster_node.clone().run(h.ledger.subscribe(), async {
        let _ = hoster_stopped.await;
    }));
    let attester_run = tokio::spawn(attester_node.clone().run(h.ledger.subscribe(), async {
        let _ = attester_stopped.await;
    }));

    h.ledger.publish(EventPayload::NewAmendment { amendment });
    let sim = h.encoder(&encoder);
    sim.serve(attester.key, &fixture, amendment, 0, &[0, 1, 2]).await.unwrap();

    assert_eq!(
        attester_events.recv().await.unwrap(),
        NodeEvent::ReportSubmitted { session: SessionId::hosting_setup(amendment) }
    );

    stop_hoster.send(()).unwrap();
    stop_attester.send(()).unwrap();
    hoster_run.await.unwrap();
    attester_run.await.unwrap();

    assert_eq!(h.ledger.amendment_reports().len(), 1);
    assert_eq!(hoster_node.context().sessions().live(), 0);
    // Closing the node closes feed storage.
    assert!(hoster_node.hoster().registry().get(&fixture.key).is_none());
}

#[tokio::test]
async fn test_run_reports_handler_failure_before_any_session() {
    let h = Harness::new();
    let peer = h.peer(1);
    let node = h.node(&peer);
    let mut events = node.subscribe();

    let (stop, stopped) = oneshot::channel::<()>();
    let run = tokio::spawn(node.clone().run(h.ledger.subscribe(), async {
        let _ = stopped.await;
    }));
    // The amendment was never inserted, so the ledger lookup fails up front.
    let unknown = h.ledger.publish(EventPayload::NewAmendment { amendment: AmendmentId(98) });

    assert_matches!(
        events.recv().await.unwrap(),
        NodeEvent::EventFailed { event, method: "NewAmendment", reason }
            if event == unknown.id && reason.contains("98")
    );
    assert_eq!(node.context().sessions().live(), 0);

    stop.send(()).unwrap();
    run.await.unwrap();
}
