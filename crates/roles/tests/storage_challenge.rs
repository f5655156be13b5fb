mod common;

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::B256;
use assert_matches::assert_matches;
use common::{Harness, Peer, feed, preload};
use tether_ledger::{EventPayload, StorageChallenge};
use tether_primitives::{ChallengeId, ContractId, ScopeId};
use tether_proof::{KeccakPrimitives, ProofPrimitives, VerifyError};
use tether_roles::{FailurePolicy, Node, NodeEvent, ProtocolError, RoleConfig};

struct Setup {
    h: Harness,
    hoster: Peer,
    attester: Peer,
    contracts: Vec<ContractId>,
    hoster_node: Arc<Node>,
}

/// A hoster holding chunk 0 of the first contract and a bundle for chunk 2 of
/// the second contract whose Merkle proof does not reach the commitment.
async fn setup() -> Setup {
    let h = Harness::new();
    let (encoder, hoster, attester) = (h.peer(1), h.peer(2), h.peer(3));
    let fixture = feed(1, 4);
    let contracts = h.publish_feed(&fixture, &[(0, 1), (2, 3)]);
    let first = h.amend(1, contracts[0], &[&encoder], &[&hoster], &attester);
    let second = h.amend(2, contracts[1], &[&encoder], &[&hoster], &attester);

    let hoster_node = h.node(&hoster);
    preload(&hoster_node, &fixture, &encoder, &ScopeId::position(first, 0), [0]).await;
    let mut bad = fixture.bundle(2, &ScopeId::position(second, 0), &encoder.signer).unwrap();
    bad.merkle_proof.leaf = B256::repeat_byte(0xee);
    let store = hoster_node.hoster().registry().get(&fixture.key).unwrap();
    store.store_encoded(&bad).unwrap();

    h.ledger.insert_storage_challenge(StorageChallenge {
        id: ChallengeId(1),
        hoster: hoster.user,
        attester: attester.user,
        checks: BTreeMap::from([(contracts[0], 0), (contracts[1], 2)]),
    });
    Setup { h, hoster, attester, contracts, hoster_node }
}

#[tokio::test]
async fn test_bad_merkle_proof_aborts_without_report() {
    let s = setup().await;
    let attester_node = s.h.node(&s.attester);
    let mut events = attester_node.subscribe();
    let event = s.h.ledger.publish(EventPayload::NewStorageChallenge { challenge: ChallengeId(1) });

    let (proved, checked) = tokio::join!(
        s.hoster_node.handle_event(event.clone()),
        attester_node.handle_event(event),
    );

    let err = checked.unwrap_err();
    assert!(err.is_proof_failure());
    assert_matches!(
        err,
        ProtocolError::InvalidProof { contract: Some(c), index: 2, reason: VerifyError::MerkleRoot(2) }
            if c == s.contracts[1]
    );
    // The attester walked away before asking for proof of contact.
    assert!(proved.is_err());
    assert_eq!(s.h.ledger.submissions(), 0);
    assert_matches!(events.recv().await.unwrap(), NodeEvent::SessionFailed { .. });
}

#[tokio::test]
async fn test_submit_partial_lists_failed_check() {
    let s = setup().await;
    let config =
        RoleConfig { storage_failure_policy: FailurePolicy::SubmitPartial, ..Default::default() };
    let attester_node = s.h.node_with(&s.attester, config);
    let event = s.h.ledger.publish(EventPayload::NewStorageChallenge { challenge: ChallengeId(1) });

    let (proved, checked) = tokio::join!(
        s.hoster_node.handle_event(event.clone()),
        attester_node.handle_event(event),
    );
    proved.unwrap();
    checked.unwrap();

    let submissions = s.h.ledger.storage_responses();
    assert_eq!(submissions.len(), 1);
    let submission = &submissions[0];
    assert_eq!(submission.signer, s.attester.signer.address());
    let response = &submission.report;
    assert_eq!(response.failed, vec![s.contracts[1]]);
    assert_eq!(response.reports.len(), 1);
    assert_eq!(response.reports[0].contract, s.contracts[0]);
    assert_eq!(response.reports[0].proof.index, 0);

    let scope = ScopeId::challenge(ChallengeId(1));
    KeccakPrimitives
        .verify_signature(&response.proof_of_contact, scope.as_bytes(), &s.hoster.signer.address())
        .unwrap();
}

#[tokio::test]
async fn test_challenge_for_other_hoster_is_ignored() {
    let s = setup().await;
    s.h.ledger.insert_storage_challenge(StorageChallenge {
        id: ChallengeId(2),
        hoster: s.attester.user,
        attester: s.hoster.user,
        checks: BTreeMap::from([(s.contracts[0], 0)]),
    });
    let outsider = s.h.peer(9);
    let node = s.h.node(&outsider);
    let event = s.h.ledger.publish(EventPayload::NewStorageChallenge { challenge: ChallengeId(2) });
    node.handle_event(event).await.unwrap();
    assert_eq!(node.context().sessions().live(), 0);
    assert_eq!(s.h.ledger.submissions(), 0);
}
