//! Data model for Aqua provenance trees.
//!
//! An [`AquaTree`] is a content-addressed store of [`Revision`]s keyed by their
//! verification hash. Chain order, forks and roots are always derived from the
//! `previous_verification_hash` links; the optional cached `tree` and
//! `treeMapping` sections are conveniences for producers and are re-derivable.
//!
//! # Example
//!
//! ```
//! use aqua_model::{AquaTree, LatestPolicy};
//!
//! let json = r#"{
//!     "revisions": {
//!         "aa": {
//!             "previous_verification_hash": "",
//!             "local_timestamp": "20240101120000",
//!             "version": "aqua/v3",
//!             "revision_type": "file",
//!             "file_hash": "ff",
//!             "file_nonce": "01"
//!         }
//!     },
//!     "file_index": { "aa": "notes.txt" }
//! }"#;
//!
//! let tree = AquaTree::from_json(json).unwrap();
//! assert_eq!(tree.latest(LatestPolicy::Timestamp).as_deref(), Some("aa"));
//! ```

mod revision;
mod tree;

pub use revision::{
    FileRevision, FormRevision, Hash, LinkRevision, Revision, RevisionKind, RevisionType,
    SignatureData, SignatureItem, SignatureRevision, SignatureScheme, WitnessMerkleProof,
    WitnessRevision, FORM_KEY_PREFIX,
};
pub use tree::{AquaTree, LatestPolicy, Structure, StructureIssue, TreeMapping, TreeNode};

use thiserror::Error;

/// Version string stamped on revisions built in code.
pub const DEFAULT_VERSION: &str = "https://aqua-protocol.org/docs/v3/schema_2";

/// Errors raised while parsing or navigating the model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("revision is missing required field `{0}`")]
    MissingField(String),

    #[error("revision field `{field}` is malformed: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("unknown revision type `{0}`")]
    UnknownRevisionType(String),

    #[error("unknown signature type `{0}`")]
    UnknownSignatureType(String),

    #[error("revision {0} is not present in the tree")]
    UnknownRevision(Hash),

    #[error("revision chain through {0} loops back on itself")]
    Cycle(Hash),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ModelError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error describes a structurally invalid revision.
    pub fn is_malformed_revision(&self) -> bool {
        matches!(
            self,
            ModelError::MissingField(_)
                | ModelError::InvalidField { .. }
                | ModelError::UnknownRevisionType(_)
                | ModelError::UnknownSignatureType(_)
        )
    }
}
