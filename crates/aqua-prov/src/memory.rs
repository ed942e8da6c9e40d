//! In-memory collaborators for embedding and tests.

use crate::provider::{
    AnchoredRecord, CollaboratorError, FileContentProvider, LedgerReader, LinkedTreeResolver,
    RelayEvent, RelayReader, TimestampAuthority,
};
use aqua_model::AquaTree;
use async_trait::async_trait;
use std::collections::HashMap;

/// File contents keyed by logical file name.
#[derive(Debug, Clone, Default)]
pub struct MemoryFiles {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(name.into(), bytes.into());
        self
    }
}

#[async_trait]
impl FileContentProvider for MemoryFiles {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, CollaboratorError> {
        Ok(self.files.get(path).cloned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    transactions: HashMap<String, AnchoredRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transaction(
        mut self,
        tx_hash: impl Into<String>,
        anchored_value: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        self.transactions.insert(
            tx_hash.into(),
            AnchoredRecord {
                anchored_value: anchored_value.into(),
                timestamp,
            },
        );
        self
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn get_transaction(
        &self,
        tx_hash: &str,
    ) -> Result<Option<AnchoredRecord>, CollaboratorError> {
        Ok(self.transactions.get(tx_hash).cloned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    events: HashMap<String, RelayEvent>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, id: impl Into<String>, event: RelayEvent) -> Self {
        self.events.insert(id.into(), event);
        self
    }
}

#[async_trait]
impl RelayReader for MemoryRelay {
    async fn get_event_by_id(&self, id: &str) -> Result<Option<RelayEvent>, CollaboratorError> {
        Ok(self.events.get(id).cloned())
    }
}

/// Tokens are looked up verbatim; unknown tokens are rejected.
#[derive(Debug, Clone, Default)]
pub struct MemoryTimestampAuthority {
    tokens: HashMap<String, AnchoredRecord>,
}

impl MemoryTimestampAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, record: AnchoredRecord) -> Self {
        self.tokens.insert(token.into(), record);
        self
    }
}

#[async_trait]
impl TimestampAuthority for MemoryTimestampAuthority {
    async fn decode(&self, token: &str) -> Result<AnchoredRecord, CollaboratorError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| CollaboratorError::Rejected(format!("token {token} does not decode")))
    }
}

/// A fixed set of trees searched by revision hash.
#[derive(Debug, Clone, Default)]
pub struct TreeCollection {
    trees: Vec<AquaTree>,
}

impl TreeCollection {
    pub fn new(trees: Vec<AquaTree>) -> Self {
        Self { trees }
    }

    pub fn push(&mut self, tree: AquaTree) {
        self.trees.push(tree);
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[async_trait]
impl LinkedTreeResolver for TreeCollection {
    async fn resolve(
        &self,
        verification_hash: &str,
    ) -> Result<Option<AquaTree>, CollaboratorError> {
        Ok(self
            .trees
            .iter()
            .find(|tree| tree.revisions.contains_key(verification_hash))
            .cloned())
    }
}
