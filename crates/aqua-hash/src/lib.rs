//! Deterministic hashing for Aqua revisions.
//!
//! Two leaf components live here:
//! - the content hasher ([`hash_revision`]), which canonicalizes a revision's
//!   wire fields and digests them, and
//! - the Merkle proof replayer ([`replay`]), which reconstructs a witness root
//!   from a leaf and an ordered proof path.
//!
//! The digest algorithm is a configuration constant ([`HashAlgorithm`]); every
//! function takes it explicitly so one verification run never mixes digests.

mod content;
mod merkle;

pub use content::{canonical_bytes, field_leaf, form_leaves, hash_file_content, hash_revision};
pub use merkle::{merkle_proof, merkle_root, node_hash, replay, MerkleError};

use aqua_model::ModelError;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256, Sha3_512};
use thiserror::Error;

/// Digest used for content hashes, file hashes and Merkle nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    #[default]
    Sha3_256,
    Sha3_512,
}

impl HashAlgorithm {
    /// Lowercase hex digest of `bytes`.
    pub fn digest(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha3_256 => hex::encode(Sha3_256::digest(bytes)),
            HashAlgorithm::Sha3_512 => hex::encode(Sha3_512::digest(bytes)),
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha3_256 => 32,
            HashAlgorithm::Sha3_512 => 64,
        }
    }
}

/// Errors raised by the content hasher.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("malformed revision: {0}")]
    MalformedRevision(#[from] ModelError),

    #[error("field `{0}` is not covered by the revision's leaves")]
    UncoveredField(String),

    #[error(transparent)]
    Merkle(#[from] MerkleError),
}
