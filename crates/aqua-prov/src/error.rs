//! Failure taxonomy and node states.

use aqua_model::{Hash, ModelError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle of one node during a verification run.
///
/// Nodes start `Pending` and settle exactly once into a terminal state.
/// `Invalid` means the evidence was resolved and does not match; `Error`
/// means some external dependency could not be resolved at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Valid,
    Invalid,
    Error,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeStatus::Pending)
    }

    /// Terminal state for a node that recorded `failures`.
    ///
    /// Any definitive mismatch outranks an unresolved dependency.
    pub fn settle(failures: &[Failure]) -> NodeStatus {
        if failures.iter().any(|f| f.status == NodeStatus::Invalid) {
            NodeStatus::Invalid
        } else if failures.is_empty() {
            NodeStatus::Valid
        } else {
            NodeStatus::Error
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Valid => "valid",
            NodeStatus::Invalid => "invalid",
            NodeStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Why a node did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    MalformedRevision,
    HashMismatch,
    ChainLinkMismatch,
    ProofChainBroken,
    MerkleRootMismatch,
    AnchorNotFound,
    AnchorTimestampMismatch,
    /// The anchor record exists but carries a different value.
    AnchorValueMismatch,
    SignatureRejected,
    UnresolvedLink,
    CyclicLink,
    /// A linked tree resolved but did not verify.
    LinkedTreeFailed,
    /// No bytes could be obtained for a file revision.
    FileContentUnavailable,
    /// Timeout, transport failure, or no backend registered for the call.
    CollaboratorUnavailable,
}

impl FailureReason {
    /// Default terminal state for this reason.
    pub fn default_status(&self) -> NodeStatus {
        match self {
            FailureReason::AnchorNotFound
            | FailureReason::AnchorTimestampMismatch
            | FailureReason::UnresolvedLink
            | FailureReason::FileContentUnavailable
            | FailureReason::CollaboratorUnavailable => NodeStatus::Error,
            _ => NodeStatus::Invalid,
        }
    }

    /// Whether re-running verification later could change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureReason::AnchorNotFound
                | FailureReason::AnchorTimestampMismatch
                | FailureReason::UnresolvedLink
                | FailureReason::FileContentUnavailable
                | FailureReason::CollaboratorUnavailable
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One recorded failure on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{reason}: {detail}")]
pub struct Failure {
    pub reason: FailureReason,
    pub status: NodeStatus,
    pub detail: String,
}

impl Failure {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            status: reason.default_status(),
            detail: detail.into(),
        }
    }

    /// Same failure with an explicit terminal state.
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }
}

/// Errors that abort a whole verification run.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("aqua tree has no revisions")]
    EmptyTree,

    #[error("revision {0} is not present in the tree")]
    UnknownRevision(Hash),

    #[error("no latest revision could be selected: every revision sits on a cycle")]
    NoLatestRevision,

    #[error(transparent)]
    Model(#[from] ModelError),
}
