//! Shared fixtures for verification integration tests.
#![allow(dead_code)]

use aqua_hash::{
    form_leaves, hash_file_content, hash_revision, merkle_proof, merkle_root, HashAlgorithm,
};
use aqua_model::{
    AquaTree, FileRevision, FormRevision, Hash, LinkRevision, Revision, RevisionKind,
    SignatureData, SignatureItem, SignatureRevision, SignatureScheme, WitnessMerkleProof,
    WitnessRevision,
};
use aqua_prov::{ed25519_public_hex, sign_ed25519, ProtectedHeader};
use serde_json::Value;

pub const ALGO: HashAlgorithm = HashAlgorithm::Sha3_256;
pub const ALICE: [u8; 32] = [11u8; 32];
pub const BOB: [u8; 32] = [22u8; 32];
/// Claimed anchor time of witness fixtures.
pub const ANCHOR_TIME: u64 = 1_704_110_400;

/// Builds content-addressed trees one revision at a time.
#[derive(Default)]
pub struct TreeBuilder {
    tree: AquaTree,
    clock: u32,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_timestamp(&mut self) -> String {
        self.clock += 1;
        format!("20240101{:02}{:02}00", 12 + self.clock / 60, self.clock % 60)
    }

    /// Hash and store a revision as-is.
    pub fn insert(&mut self, revision: Revision) -> Hash {
        let hash = hash_revision(&revision, ALGO).unwrap();
        self.tree.revisions.insert(hash.clone(), revision);
        hash
    }

    fn push(&mut self, prev: &str, kind: RevisionKind) -> Hash {
        let timestamp = self.next_timestamp();
        self.insert(Revision::new(prev, timestamp, kind))
    }

    /// File revision whose bytes come from the file content provider under `name`.
    pub fn file(&mut self, prev: &str, name: &str, content: &str) -> Hash {
        let hash = self.push(
            prev,
            RevisionKind::File(FileRevision {
                file_hash: hash_file_content(content.as_bytes(), ALGO),
                file_nonce: format!("nonce-{}", self.clock),
                content: None,
            }),
        );
        self.tree.file_index.insert(hash.clone(), name.to_string());
        hash
    }

    /// File revision carrying its own content.
    pub fn embedded_file(&mut self, prev: &str, content: &str) -> Hash {
        self.push(
            prev,
            RevisionKind::File(FileRevision {
                file_hash: hash_file_content(content.as_bytes(), ALGO),
                file_nonce: format!("nonce-{}", self.clock),
                content: Some(content.to_string()),
            }),
        )
    }

    pub fn signature(
        &mut self,
        prev: &str,
        scheme: SignatureScheme,
        public_key: &str,
        items: Vec<SignatureItem>,
    ) -> Hash {
        self.push(
            prev,
            RevisionKind::Signature(SignatureRevision {
                signature: SignatureData {
                    payload: prev.to_string(),
                    signatures: items,
                },
                signature_public_key: public_key.to_string(),
                signature_wallet_address: None,
                signature_type: scheme,
            }),
        )
    }

    /// Ed25519 signature by `secret` over `prev`.
    pub fn signed_by(&mut self, prev: &str, secret: &[u8; 32]) -> Hash {
        let item = ed25519_item(prev, secret, None);
        self.signature(prev, SignatureScheme::LocalKey, &ed25519_public_hex(secret), vec![item])
    }

    /// Witness of `prev` batched with two unrelated leaves.
    pub fn witness(&mut self, prev: &str, network: &str, tx: &str) -> Hash {
        let (root, proof) = batch_proof(prev);
        self.witness_with(prev, &root, proof, network, tx)
    }

    pub fn witness_with(
        &mut self,
        prev: &str,
        root: &str,
        proof: Vec<WitnessMerkleProof>,
        network: &str,
        tx: &str,
    ) -> Hash {
        self.push(
            prev,
            RevisionKind::Witness(WitnessRevision {
                witness_merkle_root: root.to_string(),
                witness_timestamp: ANCHOR_TIME,
                witness_network: network.to_string(),
                witness_transaction_hash: tx.to_string(),
                witness_smart_contract_address: None,
                witness_sender_account_address: None,
                witness_merkle_proof: proof,
            }),
        )
    }

    pub fn link(&mut self, prev: &str, targets: &[&str], file_hashes: &[&str]) -> Hash {
        self.push(
            prev,
            RevisionKind::Link(LinkRevision {
                link_type: Some("aqua".to_string()),
                link_verification_hashes: targets.iter().map(|t| t.to_string()).collect(),
                link_file_hashes: file_hashes.iter().map(|f| f.to_string()).collect(),
            }),
        )
    }

    /// Form revision sealed over every field it carries.
    pub fn form(&mut self, prev: &str, fields: &[(&str, Value)]) -> Hash {
        let timestamp = self.next_timestamp();
        let mut revision = Revision::new(
            prev,
            timestamp,
            RevisionKind::Form(FormRevision {
                fields: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                leaves: vec![],
            }),
        );
        let leaves = form_leaves(&revision, ALGO).into_iter().map(|(_, leaf)| leaf).collect();
        if let RevisionKind::Form(form) = &mut revision.kind {
            form.leaves = leaves;
        }
        self.insert(revision)
    }

    pub fn tree_mut(&mut self) -> &mut AquaTree {
        &mut self.tree
    }

    pub fn build(self) -> AquaTree {
        self.tree
    }
}

pub fn ed25519_item(payload: &str, secret: &[u8; 32], kid: Option<String>) -> SignatureItem {
    let protected = match kid {
        Some(kid) => ProtectedHeader {
            alg: Some("EdDSA".to_string()),
            kid: Some(kid),
        }
        .encode(),
        None => String::new(),
    };
    SignatureItem {
        protected,
        signature: sign_ed25519(secret, payload.as_bytes()),
    }
}

/// Root and inclusion proof of `leaf` in a three-leaf batch.
pub fn batch_proof(leaf: &str) -> (Hash, Vec<WitnessMerkleProof>) {
    let leaves = vec![
        leaf.to_string(),
        ALGO.digest(b"other document"),
        ALGO.digest(b"third document"),
    ];
    let root = merkle_root(&leaves, ALGO).unwrap();
    let proof = merkle_proof(&leaves, 0, ALGO).unwrap();
    (root, proof)
}

/// The root a witness fixture anchors.
pub fn witness_root(tree: &AquaTree, witness: &str) -> Hash {
    match &tree.revisions[witness].kind {
        RevisionKind::Witness(w) => w.witness_merkle_root.clone(),
        other => panic!("not a witness: {other:?}"),
    }
}
