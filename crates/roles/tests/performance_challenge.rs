mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{Harness, SHORT_TIMEOUT, feed, preload};
use tether_ledger::{EventPayload, PerformanceChallenge};
use tether_primitives::{ChallengeId, ScopeId};
use tether_proof::{KeccakPrimitives, ProofPrimitives};
use tether_roles::{ProtocolError, RoleConfig};

const DELAY: Duration = Duration::from_millis(150);

#[tokio::test]
async fn test_report_waits_for_every_hoster() {
    let h = Harness::new();
    let (encoder_1, encoder_2) = (h.peer(1), h.peer(2));
    let (hoster_1, hoster_2, attester) = (h.peer(3), h.peer(4), h.peer(5));
    let fixture = feed(1, 4);
    let contracts = h.publish_feed(&fixture, &[(0, 3)]);
    let amendment =
        h.amend(1, contracts[0], &[&encoder_1, &encoder_2], &[&hoster_1, &hoster_2], &attester);

    let node_1 = h.node(&hoster_1);
    let node_2 = h.node(&hoster_2);
    preload(&node_1, &fixture, &encoder_1, &ScopeId::position(amendment, 0), 0..4).await;
    preload(&node_2, &fixture, &encoder_2, &ScopeId::position(amendment, 1), 0..4).await;
    // Hoster 1 finishes, proof of contact included, before hoster 2 answers
    // its first chunk request.
    h.network.set_delay(hoster_2.key, DELAY);

    h.ledger.insert_performance_challenge(PerformanceChallenge {
        id: ChallengeId(7),
        feed: fixture.id,
        hosters: vec![hoster_1.user, hoster_2.user],
        attesters: vec![attester.user],
    });
    let attester_node = h.node(&attester);
    let event = h.ledger.publish(EventPayload::NewPerformanceChallenge { challenge: ChallengeId(7) });

    let (served_1, served_2, timed) = tokio::join!(
        node_1.handle_event(event.clone()),
        node_2.handle_event(event.clone()),
        attester_node.handle_event(event),
    );
    served_1.unwrap();
    served_2.unwrap();
    timed.unwrap();

    let submissions = h.ledger.performance_reports();
    assert_eq!(submissions.len(), 1);
    let report = &submissions[0].report;
    assert_eq!(report.challenge, ChallengeId(7));
    assert_eq!(report.reports.len(), 2);

    let scope = ScopeId::challenge(ChallengeId(7));
    for hoster in [&hoster_1, &hoster_2] {
        let performance = &report.reports[&hoster.user];
        assert_eq!(performance.stats.served, 1);
        assert_eq!(performance.stats.missed, 0);
        KeccakPrimitives
            .verify_signature(&performance.proof_of_contact, scope.as_bytes(), &hoster.signer.address())
            .unwrap();
    }
    let fast = report.reports[&hoster_1.user].stats.latency.unwrap();
    let slow = report.reports[&hoster_2.user].stats.latency.unwrap();
    assert!(slow >= DELAY);
    assert!(fast < slow);
}

#[tokio::test]
async fn test_missing_hoster_blocks_report() {
    let h = Harness::new();
    let (encoder_1, encoder_2) = (h.peer(1), h.peer(2));
    let (hoster_1, hoster_2, attester) = (h.peer(3), h.peer(4), h.peer(5));
    let fixture = feed(1, 2);
    let contracts = h.publish_feed(&fixture, &[(0, 1)]);
    let amendment =
        h.amend(1, contracts[0], &[&encoder_1, &encoder_2], &[&hoster_1, &hoster_2], &attester);

    let node_1 = h.node(&hoster_1);
    preload(&node_1, &fixture, &encoder_1, &ScopeId::position(amendment, 0), 0..2).await;
    h.ledger.insert_performance_challenge(PerformanceChallenge {
        id: ChallengeId(1),
        feed: fixture.id,
        hosters: vec![hoster_1.user, hoster_2.user],
        attesters: vec![attester.user],
    });
    let short = RoleConfig { session_timeout: SHORT_TIMEOUT, ..Default::default() };
    let attester_node = h.node_with(&attester, short);
    let event = h.ledger.publish(EventPayload::NewPerformanceChallenge { challenge: ChallengeId(1) });

    // Hoster 2 never comes online.
    let (served, timed) =
        tokio::join!(node_1.handle_event(event.clone()), attester_node.handle_event(event));
    served.unwrap();
    assert_matches!(timed, Err(ProtocolError::PeerUnreachable(key)) if key == hoster_2.key);
    assert!(h.ledger.performance_reports().is_empty());
}

#[tokio::test]
async fn test_unserved_chunk_counts_as_missed() {
    let h = Harness::new();
    let (encoder, hoster, attester) = (h.peer(1), h.peer(2), h.peer(3));
    let fixture = feed(1, 4);
    let contracts = h.publish_feed(&fixture, &[(0, 3)]);
    h.amend(1, contracts[0], &[&encoder], &[&hoster], &attester);

    // The hoster lost every chunk of its share.
    let hoster_node = h.node(&hoster);
    let registry = hoster_node.hoster().registry();
    registry
        .add_key(tether_storer::HostedFeed { feed: fixture.key, ranges: Vec::new() })
        .unwrap();
    registry.load(fixture.key).await.unwrap();

    h.ledger.insert_performance_challenge(PerformanceChallenge {
        id: ChallengeId(2),
        feed: fixture.id,
        hosters: vec![hoster.user],
        attesters: vec![attester.user],
    });
    let attester_node = h.node(&attester);
    let event = h.ledger.publish(EventPayload::NewPerformanceChallenge { challenge: ChallengeId(2) });
    let (served, timed) =
        tokio::join!(hoster_node.handle_event(event.clone()), attester_node.handle_event(event));
    served.unwrap();
    timed.unwrap();

    let report = h.ledger.performance_reports().remove(0).report;
    let stats = report.reports[&hoster.user].stats;
    assert_eq!((stats.served, stats.missed, stats.latency), (0, 1, None));
}
