//! Verification engine for Aqua provenance trees.
//!
//! The [`Verifier`] walks an [`AquaTree`](aqua_model::AquaTree) oldest to
//! newest, recomputing each revision's content hash, checking its link to the
//! predecessor and running the check for its kind:
//!
//! - file revisions against their content (embedded, or from a [`FileContentProvider`]),
//! - form revisions by Merkle inclusion of every disclosed field,
//! - signature revisions through a [`SignatureBackend`] per scheme,
//! - witness revisions by proof replay plus ledger, relay or timestamp-authority
//!   confirmation,
//! - link revisions by recursively verifying the linked tree.
//!
//! Per-node failures never abort a run. They are recorded in the returned
//! [`VerificationGraphData`] with a [`FailureReason`] and a terminal
//! [`NodeStatus`]: `Invalid` for evidence that was checked and does not match,
//! `Error` for evidence that could not be obtained.
//!
//! # Example
//!
//! ```
//! use aqua_hash::{hash_file_content, hash_revision, HashAlgorithm};
//! use aqua_model::{AquaTree, FileRevision, Revision, RevisionKind};
//! use aqua_prov::Verifier;
//!
//! # tokio_test_runtime(async {
//! let genesis = Revision::new(
//!     "",
//!     "20240101120000",
//!     RevisionKind::File(FileRevision {
//!         file_hash: hash_file_content(b"Sample content", HashAlgorithm::Sha3_256),
//!         file_nonce: "5a7b".into(),
//!         content: Some("Sample content".into()),
//!     }),
//! );
//! let hash = hash_revision(&genesis, HashAlgorithm::Sha3_256).unwrap();
//! let mut tree = AquaTree::new();
//! tree.revisions.insert(hash.clone(), genesis);
//!
//! let report = Verifier::default().build(&tree, None).await.unwrap();
//! assert!(report.overall_success());
//! assert_eq!(report.hash, hash);
//! # });
//! # fn tokio_test_runtime(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

mod chain;
mod config;
mod crypto;
mod engine;
mod error;
mod graph;
mod memory;
mod provider;
mod report;
mod signature;
mod witness;

pub use chain::NodeVerification;
pub use config::{ConfigError, VerifierConfig};
pub use crypto::{
    did_key_from_ed25519, ed25519_from_did_key, ed25519_public_hex, eip191_hash,
    ethereum_address, sign_ed25519, sign_eip191, DidKeyBackend, Ed25519Backend, Eip191Backend,
};
pub use engine::{Verifier, VerifierBuilder};
pub use error::{Failure, FailureReason, GraphError, NodeStatus};
pub use memory::{MemoryFiles, MemoryLedger, MemoryRelay, MemoryTimestampAuthority, TreeCollection};
pub use provider::{
    AnchoredRecord, CollaboratorError, FileContentProvider, LedgerReader, LinkedTreeResolver,
    RelayEvent, RelayReader, SignatureBackend, TimestampAuthority,
};
pub use report::{
    FileGraphData, FormGraphData, FormKeyGraphData, LinkGraphData, LinkTargetGraphData,
    RevisionGraphInfo, VerificationForest, VerificationGraphData,
};
pub use signature::{
    ProtectedHeader, SignatureBackends, SignatureItemResult, SignatureVerificationGraphData,
};
pub use witness::{WitnessBackends, WitnessVerificationGraphData, NOSTR_NETWORK, TSA_NETWORK};
