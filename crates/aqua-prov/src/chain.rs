//! Per-node validation along one chain.
//!
//! A node is checked in three steps: its stored hash against the content
//! hasher, its `previous_verification_hash` against the predecessor's
//! recomputed hash, and finally the type-specific check. Every failure is
//! recorded on the node; nothing here aborts the run.

use crate::engine::Verifier;
use crate::error::{Failure, FailureReason, NodeStatus};
use crate::report::{
    FileGraphData, FormGraphData, FormKeyGraphData, RevisionGraphInfo, VerificationGraphData,
};
use aqua_hash::{
    field_leaf, form_leaves, hash_file_content, hash_revision, merkle_proof, merkle_root, replay,
    HashError,
};
use aqua_model::{AquaTree, FileRevision, FormRevision, Hash, Revision, RevisionKind, RevisionType};
use tracing::{debug, warn};

/// Result of validating one node, before it is placed in a report graph.
#[derive(Debug, Clone)]
pub struct NodeVerification {
    pub hash: Hash,
    pub revision_type: RevisionType,
    pub status: NodeStatus,
    /// Content hash recomputed from the revision's fields, when it could be computed.
    pub computed_hash: Option<Hash>,
    pub failures: Vec<Failure>,
    pub info: Option<RevisionGraphInfo>,
    pub link_graphs: Vec<VerificationGraphData>,
}

impl NodeVerification {
    pub fn is_valid(&self) -> bool {
        self.status == NodeStatus::Valid
    }

    /// Hash successors should link to.
    pub(crate) fn link_hash(&self) -> &Hash {
        self.computed_hash.as_ref().unwrap_or(&self.hash)
    }

    pub(crate) fn into_graph(
        self,
        revision: &Revision,
        successors: Vec<VerificationGraphData>,
    ) -> VerificationGraphData {
        VerificationGraphData {
            hash: self.hash,
            previous_verification_hash: revision.previous_verification_hash.clone(),
            timestamp: revision.local_timestamp.clone(),
            is_validation_successful: self.status == NodeStatus::Valid,
            status: self.status,
            revision_type: self.revision_type,
            info: self.info,
            failures: self.failures,
            verification_graph_data: successors,
            link_verification_graph_data: self.link_graphs,
        }
    }
}

/// Target hashes already entered on the current path of linked trees.
#[derive(Debug, Clone, Default)]
pub(crate) struct LinkTrail {
    targets: Vec<Hash>,
}

impl LinkTrail {
    pub(crate) fn depth(&self) -> usize {
        self.targets.len()
    }

    pub(crate) fn contains(&self, hash: &str) -> bool {
        self.targets.iter().any(|t| t == hash)
    }

    pub(crate) fn descend(&self, hash: &str) -> LinkTrail {
        let mut targets = self.targets.clone();
        targets.push(hash.to_string());
        LinkTrail { targets }
    }
}

impl Verifier {
    /// Validate every node of the chain ending at `start`, oldest first.
    ///
    /// Nodes are processed strictly in order; each one is checked against its
    /// predecessor's recomputed hash.
    pub async fn validate_chain(
        &self,
        tree: &AquaTree,
        start: &str,
    ) -> Result<Vec<NodeVerification>, crate::GraphError> {
        if !tree.revisions.contains_key(start) {
            return Err(crate::GraphError::UnknownRevision(start.to_string()));
        }
        let chain = tree.chain_to(start)?;
        Ok(self.walk_chain(tree, &chain, &LinkTrail::default()).await)
    }

    pub(crate) async fn walk_chain(
        &self,
        tree: &AquaTree,
        chain: &[Hash],
        trail: &LinkTrail,
    ) -> Vec<NodeVerification> {
        let mut results: Vec<NodeVerification> = Vec::with_capacity(chain.len());
        for hash in chain {
            let predecessor = results.last().map(|node| node.link_hash().clone());
            let node = self
                .validate_node(tree, hash, predecessor.as_deref(), trail)
                .await;
            results.push(node);
        }
        results
    }

    /// Validate one stored revision.
    ///
    /// `predecessor` is the recomputed hash of the revision's parent, or `None`
    /// when the parent is not in the tree.
    pub(crate) async fn validate_node(
        &self,
        tree: &AquaTree,
        hash: &str,
        predecessor: Option<&str>,
        trail: &LinkTrail,
    ) -> NodeVerification {
        let Some(revision) = tree.get(hash) else {
            // Unreachable for hashes taken from the tree itself.
            return NodeVerification {
                hash: hash.to_string(),
                revision_type: RevisionType::File,
                status: NodeStatus::Invalid,
                computed_hash: None,
                failures: vec![Failure::new(
                    FailureReason::MalformedRevision,
                    format!("revision {hash} is not in the tree"),
                )],
                info: None,
                link_graphs: Vec::new(),
            };
        };

        let mut failures = Vec::new();
        let computed_hash = self.check_content_hash(hash, revision, &mut failures);
        check_predecessor(revision, predecessor, &mut failures);

        let mut link_graphs = Vec::new();
        let info = if failures
            .iter()
            .any(|f| f.reason == FailureReason::MalformedRevision)
        {
            None
        } else {
            Some(match &revision.kind {
                RevisionKind::File(file) => {
                    RevisionGraphInfo::File(self.check_file(tree, hash, file, &mut failures).await)
                }
                RevisionKind::Form(form) => {
                    RevisionGraphInfo::Form(self.check_form(revision, form, &mut failures))
                }
                RevisionKind::Witness(witness) => {
                    let (data, found) = self
                        .verify_witness(witness, &revision.previous_verification_hash)
                        .await;
                    failures.extend(found);
                    RevisionGraphInfo::Witness(data)
                }
                RevisionKind::Signature(sig) => {
                    let (data, found) = self.verify_signature(revision, sig).await;
                    failures.extend(found);
                    RevisionGraphInfo::Signature(data)
                }
                RevisionKind::Link(link) => {
                    let (data, found, graphs) = self.verify_links(link, trail).await;
                    failures.extend(found);
                    link_graphs = graphs;
                    RevisionGraphInfo::Link(data)
                }
            })
        };

        let status = NodeStatus::settle(&failures);
        if status == NodeStatus::Valid {
            debug!(hash, revision_type = %revision.revision_type(), "revision verified");
        } else {
            let reasons: Vec<String> = failures.iter().map(|f| f.reason.to_string()).collect();
            warn!(
                hash,
                revision_type = %revision.revision_type(),
                %status,
                ?reasons,
                "revision failed verification"
            );
        }

        NodeVerification {
            hash: hash.to_string(),
            revision_type: revision.revision_type(),
            status,
            computed_hash,
            failures,
            info,
            link_graphs,
        }
    }

    fn check_content_hash(
        &self,
        hash: &str,
        revision: &Revision,
        failures: &mut Vec<Failure>,
    ) -> Option<Hash> {
        match hash_revision(revision, self.config().hash_algorithm) {
            Ok(computed) => {
                if computed != hash {
                    failures.push(Failure::new(
                        FailureReason::HashMismatch,
                        format!("stored under {hash}, content hashes to {computed}"),
                    ));
                }
                Some(computed)
            }
            Err(HashError::UncoveredField(key)) => {
                failures.push(Failure::new(
                    FailureReason::HashMismatch,
                    format!("field `{key}` is not covered by the revision's leaves"),
                ));
                None
            }
            Err(e) => {
                failures.push(Failure::new(FailureReason::MalformedRevision, e.to_string()));
                None
            }
        }
    }

    async fn check_file(
        &self,
        tree: &AquaTree,
        hash: &str,
        file: &FileRevision,
        failures: &mut Vec<Failure>,
    ) -> FileGraphData {
        let file_name = tree
            .file_name(hash)
            .or_else(|| tree.file_name(&file.file_hash))
            .map(str::to_string);
        let mut data = FileGraphData {
            file_name: file_name.clone(),
            file_hash: file.file_hash.clone(),
            embedded_content: file.content.is_some(),
            content_hash_is_valid: false,
        };

        let bytes = if let Some(content) = &file.content {
            content.clone().into_bytes()
        } else {
            let Some(name) = file_name else {
                failures.push(Failure::new(
                    FailureReason::FileContentUnavailable,
                    "no file_index entry names this file",
                ));
                return data;
            };
            let Some(files) = self.files() else {
                failures.push(Failure::new(
                    FailureReason::FileContentUnavailable,
                    format!("no file content provider to read {name}"),
                ));
                return data;
            };
            match self.call(files.read(&name)).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    failures.push(Failure::new(
                        FailureReason::FileContentUnavailable,
                        format!("{name} not found"),
                    ));
                    return data;
                }
                Err(e) => {
                    failures.push(Failure::new(
                        FailureReason::CollaboratorUnavailable,
                        format!("reading {name}: {e}"),
                    ));
                    return data;
                }
            }
        };

        let actual = hash_file_content(&bytes, self.config().hash_algorithm);
        data.content_hash_is_valid = actual.eq_ignore_ascii_case(&file.file_hash);
        if !data.content_hash_is_valid {
            failures.push(Failure::new(
                FailureReason::HashMismatch,
                format!("file content hashes to {actual}, revision records {}", file.file_hash),
            ));
        }
        data
    }

    /// Each disclosed form key must prove inclusion in the revision's leaves.
    fn check_form(
        &self,
        revision: &Revision,
        form: &FormRevision,
        failures: &mut Vec<Failure>,
    ) -> FormGraphData {
        let algorithm = self.config().hash_algorithm;
        let root = merkle_root(&form.leaves, algorithm).ok();

        let keys: Vec<FormKeyGraphData> = form
            .form_keys()
            .map(|(key, value)| {
                let leaf = field_leaf(key, value, algorithm);
                let included = match (&root, form.leaves.iter().position(|l| *l == leaf)) {
                    (Some(root), Some(index)) => merkle_proof(&form.leaves, index, algorithm)
                        .and_then(|proof| replay(&leaf, &proof, algorithm))
                        .map(|computed| computed == *root)
                        .unwrap_or(false),
                    _ => false,
                };
                if !included {
                    failures.push(Failure::new(
                        FailureReason::HashMismatch,
                        format!("form field `{key}` is not included in the leaves"),
                    ));
                }
                FormKeyGraphData {
                    key: key.clone(),
                    value: value.clone(),
                    leaf,
                    is_valid: included,
                }
            })
            .collect();

        let disclosed = form_leaves(revision, algorithm).len();
        FormGraphData {
            keys,
            withheld_leaves: form.leaves.len().saturating_sub(disclosed),
        }
    }
}

fn check_predecessor(revision: &Revision, predecessor: Option<&str>, failures: &mut Vec<Failure>) {
    if revision.is_genesis() {
        return;
    }
    match predecessor {
        Some(expected) if expected == revision.previous_verification_hash => {}
        Some(expected) => failures.push(Failure::new(
            FailureReason::ChainLinkMismatch,
            format!(
                "links to {}, predecessor hashes to {expected}",
                revision.previous_verification_hash
            ),
        )),
        None => failures.push(Failure::new(
            FailureReason::ChainLinkMismatch,
            format!(
                "predecessor {} is not in the tree",
                revision.previous_verification_hash
            ),
        )),
    }
}
