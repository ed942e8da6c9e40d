//! Verification outcomes that depend on injected collaborators.

mod common;

use aqua_hash::merkle_proof;
use aqua_model::{
    AquaTree, Hash, LinkRevision, Revision, RevisionKind, SignatureItem, SignatureScheme,
};
use aqua_prov::{
    did_key_from_ed25519, ethereum_address, sign_ed25519, sign_eip191, AnchoredRecord,
    CollaboratorError, FailureReason, LedgerReader, MemoryLedger, MemoryRelay,
    MemoryTimestampAuthority, NodeStatus, RelayEvent, RevisionGraphInfo, TreeCollection,
    VerificationGraphData, Verifier, VerifierConfig, NOSTR_NETWORK, TSA_NETWORK,
};
use async_trait::async_trait;
use common::*;
use std::time::Duration;

fn reasons(node: &VerificationGraphData) -> Vec<FailureReason> {
    node.failures.iter().map(|f| f.reason).collect()
}

fn witnessed_tree(network: &str, tx: &str) -> (AquaTree, Hash) {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "anchored document");
    let witness = builder.witness(&genesis, network, tx);
    (builder.build(), witness)
}

struct SlowLedger;

#[async_trait]
impl LedgerReader for SlowLedger {
    async fn get_transaction(
        &self,
        _tx: &str,
    ) -> Result<Option<AnchoredRecord>, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }
}

struct BrokenLedger;

#[async_trait]
impl LedgerReader for BrokenLedger {
    async fn get_transaction(
        &self,
        _tx: &str,
    ) -> Result<Option<AnchoredRecord>, CollaboratorError> {
        Err(CollaboratorError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_mutated_proof_leaf_breaks_witness() {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "document");
    let (root, mut proof) = batch_proof(&genesis);
    let step = &mut proof[0];
    let sibling = step.right_leaf.as_mut().unwrap();
    let flipped = if sibling.starts_with('0') { "1" } else { "0" };
    sibling.replace_range(0..1, flipped);
    let witness = builder.witness_with(&genesis, &root, proof, "sepolia", "0xabc");
    let tree = builder.build();

    let verifier = Verifier::builder().config(VerifierConfig::offline()).build();
    let report = verifier.build(&tree, None).await.unwrap();
    let node = report.find(&witness).unwrap();
    assert_eq!(node.status, NodeStatus::Invalid);

    let Some(RevisionGraphInfo::Witness(data)) = &node.info else {
        panic!("expected witness info");
    };
    assert!(!data.merkle_proof_is_valid);
    assert!(reasons(node)
        .iter()
        .any(|r| matches!(r, FailureReason::ProofChainBroken | FailureReason::MerkleRootMismatch)));
}

#[tokio::test]
async fn test_wrong_claimed_root_is_merkle_mismatch() {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "document");
    let (_, proof) = batch_proof(&genesis);
    let bogus_root = ALGO.digest(b"somebody else's root");
    let witness = builder.witness_with(&genesis, &bogus_root, proof, "sepolia", "0xabc");
    let tree = builder.build();

    let verifier = Verifier::builder().config(VerifierConfig::offline()).build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert_eq!(
        reasons(report.find(&witness).unwrap()),
        vec![FailureReason::MerkleRootMismatch]
    );
}

#[tokio::test]
async fn test_single_document_witness_with_empty_proof() {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "document");
    let witness = builder.witness_with(&genesis, &genesis.clone(), vec![], "sepolia", "0x01");
    let tree = builder.build();

    let ledger = MemoryLedger::new().with_transaction("0x01", genesis.clone(), ANCHOR_TIME);
    let verifier = Verifier::builder().ledger("sepolia", ledger).build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert!(report.find(&witness).unwrap().is_validation_successful);
}

#[tokio::test]
async fn test_missing_transaction_is_error_by_default() {
    let (tree, witness) = witnessed_tree("sepolia", "0xmissing");
    let verifier = Verifier::builder().ledger("sepolia", MemoryLedger::new()).build();
    let report = verifier.build(&tree, None).await.unwrap();

    let node = report.find(&witness).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert_eq!(reasons(node), vec![FailureReason::AnchorNotFound]);
    let Some(RevisionGraphInfo::Witness(data)) = &node.info else {
        panic!("expected witness info");
    };
    assert!(data.merkle_proof_is_valid);
    assert!(!data.anchor_confirmed);
}

#[tokio::test]
async fn test_missing_transaction_can_be_definitive() {
    let (tree, witness) = witnessed_tree("sepolia", "0xmissing");
    let verifier = Verifier::builder()
        .config(VerifierConfig {
            anchor_failures_are_definitive: true,
            ..VerifierConfig::default()
        })
        .ledger("sepolia", MemoryLedger::new())
        .build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert_eq!(report.find(&witness).unwrap().status, NodeStatus::Invalid);
}

#[tokio::test]
async fn test_late_anchor_is_timestamp_mismatch() {
    let (tree, witness) = witnessed_tree("sepolia", "0xabc");
    let ledger = MemoryLedger::new().with_transaction(
        "0xabc",
        witness_root(&tree, &witness),
        ANCHOR_TIME + 3600,
    );
    let verifier = Verifier::builder().ledger("sepolia", ledger).build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert_eq!(
        reasons(report.find(&witness).unwrap()),
        vec![FailureReason::AnchorTimestampMismatch]
    );
}

#[tokio::test]
async fn test_anchor_with_other_value_is_invalid() {
    let (tree, witness) = witnessed_tree("sepolia", "0xabc");
    let ledger = MemoryLedger::new().with_transaction("0xabc", ALGO.digest(b"other"), ANCHOR_TIME);
    let verifier = Verifier::builder().ledger("sepolia", ledger).build();
    let report = verifier.build(&tree, None).await.unwrap();

    let node = report.find(&witness).unwrap();
    assert_eq!(node.status, NodeStatus::Invalid);
    assert_eq!(reasons(node), vec![FailureReason::AnchorValueMismatch]);
}

#[tokio::test]
async fn test_anchor_value_comparison_ignores_prefix_and_case() {
    let (tree, witness) = witnessed_tree("sepolia", "0xabc");
    let anchored = format!("0x{}", witness_root(&tree, &witness).to_uppercase());
    let ledger = MemoryLedger::new().with_transaction("0xabc", anchored, ANCHOR_TIME);
    let verifier = Verifier::builder().ledger("sepolia", ledger).build();
    assert!(verifier.build(&tree, None).await.unwrap().overall_success());
}

#[tokio::test]
async fn test_unknown_network_is_collaborator_error() {
    let (tree, witness) = witnessed_tree("mainnet", "0xabc");
    let verifier = Verifier::builder().ledger("sepolia", MemoryLedger::new()).build();
    let report = verifier.build(&tree, None).await.unwrap();

    let node = report.find(&witness).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert_eq!(reasons(node), vec![FailureReason::CollaboratorUnavailable]);
}

#[tokio::test]
async fn test_ledger_timeout_is_error_never_invalid() {
    let (tree, witness) = witnessed_tree("sepolia", "0xabc");
    let verifier = Verifier::builder()
        .config(VerifierConfig {
            collaborator_timeout_ms: 20,
            ..VerifierConfig::default()
        })
        .ledger("sepolia", SlowLedger)
        .build();
    let report = verifier.build(&tree, None).await.unwrap();

    let node = report.find(&witness).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert_eq!(reasons(node), vec![FailureReason::CollaboratorUnavailable]);
    assert!(node.failures[0].detail.contains("timed out"));
}

#[tokio::test]
async fn test_transport_failure_is_error() {
    let (tree, witness) = witnessed_tree("sepolia", "0xabc");
    let verifier = Verifier::builder().ledger("sepolia", BrokenLedger).build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert_eq!(report.find(&witness).unwrap().status, NodeStatus::Error);
}

#[tokio::test]
async fn test_offline_skips_anchor_lookup() {
    let (tree, witness) = witnessed_tree("mainnet", "0xabc");
    let verifier = Verifier::builder().config(VerifierConfig::offline()).build();
    let report = verifier.build(&tree, None).await.unwrap();

    let node = report.find(&witness).unwrap();
    assert!(node.is_validation_successful);
    let Some(RevisionGraphInfo::Witness(data)) = &node.info else {
        panic!("expected witness info");
    };
    assert!(data.merkle_proof_is_valid);
    assert!(!data.anchor_confirmed);
}

#[tokio::test]
async fn test_relay_witness() {
    let (tree, witness) = witnessed_tree(NOSTR_NETWORK, "event-1");
    let relay = MemoryRelay::new().with_event(
        "event-1",
        RelayEvent {
            content: witness_root(&tree, &witness),
            timestamp: ANCHOR_TIME,
            author: "npub1alice".to_string(),
        },
    );
    let verifier = Verifier::builder().relay(relay).build();
    assert!(verifier.build(&tree, None).await.unwrap().overall_success());

    let early = MemoryRelay::new().with_event(
        "event-1",
        RelayEvent {
            content: witness_root(&tree, &witness),
            timestamp: ANCHOR_TIME - 120,
            author: "npub1alice".to_string(),
        },
    );
    let verifier = Verifier::builder().relay(early).build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert_eq!(
        reasons(report.find(&witness).unwrap()),
        vec![FailureReason::AnchorTimestampMismatch]
    );
}

#[tokio::test]
async fn test_timestamp_authority_witness() {
    let (tree, witness) = witnessed_tree(TSA_NETWORK, "token-1");
    let tsa = MemoryTimestampAuthority::new().with_token(
        "token-1",
        AnchoredRecord {
            anchored_value: witness_root(&tree, &witness),
            timestamp: ANCHOR_TIME,
        },
    );
    let verifier = Verifier::builder().timestamp_authority(tsa).build();
    assert!(verifier.build(&tree, None).await.unwrap().overall_success());

    let verifier = Verifier::builder()
        .timestamp_authority(MemoryTimestampAuthority::new())
        .build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert_eq!(
        reasons(report.find(&witness).unwrap()),
        vec![FailureReason::AnchorNotFound]
    );
}

#[tokio::test]
async fn test_did_key_signature() {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "document");
    let public = ed25519_dalek::SigningKey::from_bytes(&ALICE)
        .verifying_key()
        .to_bytes();
    let did = did_key_from_ed25519(&public);
    let item = SignatureItem {
        protected: String::new(),
        signature: sign_ed25519(&ALICE, genesis.as_bytes()),
    };
    builder.signature(&genesis, SignatureScheme::DidKey, &did, vec![item]);
    let tree = builder.build();

    let report = Verifier::default().build(&tree, None).await.unwrap();
    assert!(report.overall_success(), "{:?}", report.failed_nodes());
}

#[tokio::test]
async fn test_wallet_signature() {
    let key = k256::ecdsa::SigningKey::from_slice(&[5u8; 32]).unwrap();
    let address = ethereum_address(key.verifying_key());

    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "document");
    let item = SignatureItem {
        protected: String::new(),
        signature: sign_eip191(&key, genesis.as_bytes()).unwrap(),
    };
    let sig = builder.signature(&genesis, SignatureScheme::WalletAccount, &address, vec![item]);
    let tree = builder.build();

    let report = Verifier::default().build(&tree, None).await.unwrap();
    let node = report.find(&sig).unwrap();
    assert!(node.is_validation_successful, "{:?}", node.failures);
    let Some(RevisionGraphInfo::Signature(data)) = &node.info else {
        panic!("expected signature info");
    };
    assert_eq!(data.wallet_address, address);
    assert_eq!(data.signature_type, "ethereum:eip-191");
}

#[tokio::test]
async fn test_certificate_without_backend_is_error() {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "document");
    let item = SignatureItem {
        protected: String::new(),
        signature: "3045022100".to_string(),
    };
    let sig = builder.signature(&genesis, SignatureScheme::Certificate, "MIIB", vec![item]);
    let tree = builder.build();

    let report = Verifier::default().build(&tree, None).await.unwrap();
    let node = report.find(&sig).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert_eq!(reasons(node), vec![FailureReason::CollaboratorUnavailable]);
}

#[tokio::test]
async fn test_signature_over_wrong_payload_fails_chain_hash() {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "document");
    let sig = builder.signed_by(&genesis, &ALICE);
    let mut tree = builder.build();

    // Re-point the envelope at another payload and store it under its new hash.
    let other = ALGO.digest(b"something else");
    let mut revision = tree.revisions.remove(&sig).unwrap();
    if let RevisionKind::Signature(s) = &mut revision.kind {
        s.signature.payload = other.clone();
        s.signature.signatures = vec![ed25519_item(&other, &ALICE, None)];
    }
    let new_hash = aqua_hash::hash_revision(&revision, ALGO).unwrap();
    tree.revisions.insert(new_hash.clone(), revision);

    let report = Verifier::default().build(&tree, Some(&new_hash)).await.unwrap();
    let node = report.find(&new_hash).unwrap();
    let Some(RevisionGraphInfo::Signature(data)) = &node.info else {
        panic!("expected signature info");
    };
    assert!(!data.chain_hash_is_valid);
    assert!(reasons(node).iter().all(|r| *r == FailureReason::SignatureRejected));
}

#[tokio::test]
async fn test_unresolved_link_is_error() {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "document");
    let link = builder.link(&genesis, &[&ALGO.digest(b"nowhere")], &[]);
    let tree = builder.build();

    let verifier = Verifier::builder()
        .linked_trees(TreeCollection::default())
        .build();
    let report = verifier.build(&tree, None).await.unwrap();
    let node = report.find(&link).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert_eq!(reasons(node), vec![FailureReason::UnresolvedLink]);

    let report = Verifier::default().build(&tree, None).await.unwrap();
    assert_eq!(report.find(&link).unwrap().status, NodeStatus::Error);
}

#[tokio::test]
async fn test_valid_link_with_file_hash() {
    let mut linked = TreeBuilder::new();
    let y_genesis = linked.embedded_file("", "attachment");
    let y_tree = linked.build();
    let y_file_hash = match &y_tree.revisions[&y_genesis].kind {
        RevisionKind::File(f) => f.file_hash.clone(),
        _ => unreachable!(),
    };

    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "main");
    let link = builder.link(&genesis, &[&y_genesis], &[&y_file_hash]);
    let tree = builder.build();

    let verifier = Verifier::builder()
        .linked_trees(TreeCollection::new(vec![y_tree]))
        .build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert!(report.overall_success(), "{:?}", report.failed_nodes());
    assert_eq!(report.find(&link).unwrap().link_verification_graph_data.len(), 1);

    let wrong = builder_link_with_file(&y_genesis, &ALGO.digest(b"not the attachment"));
    let report = verifier.build(&wrong.0, None).await.unwrap();
    let node = report.find(&wrong.1).unwrap();
    assert_eq!(reasons(node), vec![FailureReason::HashMismatch]);
}

fn builder_link_with_file(target: &str, file_hash: &str) -> (AquaTree, Hash) {
    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "main");
    let link = builder.link(&genesis, &[target], &[file_hash]);
    (builder.build(), link)
}

#[tokio::test]
async fn test_self_referencing_link_terminates() {
    // A tree whose link revision points back at its own storage key.
    let loop_key = ALGO.digest(b"loop");
    let mut looped = AquaTree::new();
    looped.revisions.insert(
        loop_key.clone(),
        Revision::new(
            "",
            "20240101120000",
            RevisionKind::Link(LinkRevision {
                link_type: None,
                link_verification_hashes: vec![loop_key.clone()],
                link_file_hashes: vec![],
            }),
        ),
    );

    let mut builder = TreeBuilder::new();
    let genesis = builder.embedded_file("", "main");
    let link = builder.link(&genesis, &[&loop_key], &[]);
    let tree = builder.build();

    let verifier = Verifier::builder()
        .linked_trees(TreeCollection::new(vec![looped]))
        .build();
    let report = verifier.build(&tree, None).await.unwrap();
    let node = report.find(&link).unwrap();
    assert_eq!(node.status, NodeStatus::Invalid);

    let inner = &node.link_verification_graph_data[0];
    assert!(reasons(inner).contains(&FailureReason::CyclicLink));
}

#[tokio::test]
async fn test_link_depth_limit() {
    let mut inner = TreeBuilder::new();
    let z = inner.embedded_file("", "deepest");
    let z_tree = inner.build();

    let mut middle = TreeBuilder::new();
    let y_genesis = middle.embedded_file("", "middle");
    let y_link = middle.link(&y_genesis, &[&z], &[]);
    let y_tree = middle.build();

    let mut outer = TreeBuilder::new();
    let genesis = outer.embedded_file("", "outer");
    outer.link(&genesis, &[&y_link], &[]);
    let tree = outer.build();

    let verifier = Verifier::builder()
        .config(VerifierConfig {
            max_link_depth: 1,
            ..VerifierConfig::default()
        })
        .linked_trees(TreeCollection::new(vec![y_tree, z_tree]))
        .build();
    let report = verifier.build(&tree, None).await.unwrap();
    assert!(!report.overall_success());
    let y_link_node = report.find(&y_link).unwrap();
    assert_eq!(reasons(y_link_node), vec![FailureReason::UnresolvedLink]);
    assert!(!report.has_invalid());
}

#[tokio::test]
async fn test_merkle_proof_fixture_matches_replayer() {
    let leaves: Vec<Hash> = (0..5u8).map(|i| ALGO.digest(&[i])).collect();
    for index in 0..leaves.len() {
        let proof = merkle_proof(&leaves, index, ALGO).unwrap();
        let root = aqua_hash::replay(&leaves[index], &proof, ALGO).unwrap();
        assert_eq!(root, aqua_hash::merkle_root(&leaves, ALGO).unwrap());
    }
}
