//! Capabilities the verifier consumes from its host.
//!
//! Every trait here is an injected collaborator. "Not found" is an `Ok(None)`
//! answer; `Err` is reserved for calls that could not be answered at all.

use aqua_model::AquaTree;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("call timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The collaborator answered with a definitive refusal (e.g. an undecodable token).
    #[error("rejected: {0}")]
    Rejected(String),
}

/// A value anchored on a ledger or by a timestamp authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredRecord {
    pub anchored_value: String,
    /// Unix seconds.
    pub timestamp: u64,
}

/// An event published to a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub content: String,
    /// Unix seconds.
    pub timestamp: u64,
    pub author: String,
}

/// Raw bytes of files named in a tree's `file_index`.
#[async_trait]
pub trait FileContentProvider: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, CollaboratorError>;
}

/// One signature scheme's cryptographic check.
#[async_trait]
pub trait SignatureBackend: Send + Sync {
    /// Verify `signature` over `payload` for `signer` (a public key, address or DID).
    async fn verify(
        &self,
        payload: &[u8],
        signature: &str,
        signer: &str,
    ) -> Result<bool, CollaboratorError>;
}

/// Transaction lookup on one chain-based network.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn get_transaction(
        &self,
        tx_hash: &str,
    ) -> Result<Option<AnchoredRecord>, CollaboratorError>;
}

/// Event lookup on a relay network.
#[async_trait]
pub trait RelayReader: Send + Sync {
    async fn get_event_by_id(&self, id: &str) -> Result<Option<RelayEvent>, CollaboratorError>;
}

/// Decoder for signed timestamp-authority tokens.
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    async fn decode(&self, token: &str) -> Result<AnchoredRecord, CollaboratorError>;
}

/// Source of Aqua trees referenced by link revisions.
#[async_trait]
pub trait LinkedTreeResolver: Send + Sync {
    /// Return a tree whose revisions contain `verification_hash`.
    async fn resolve(&self, verification_hash: &str)
        -> Result<Option<AquaTree>, CollaboratorError>;
}
