//! Graph builder: turns an Aqua tree into a recursive verification report.

use crate::chain::{LinkTrail, NodeVerification};
use crate::engine::Verifier;
use crate::error::{Failure, FailureReason, GraphError, NodeStatus};
use crate::report::{LinkGraphData, LinkTargetGraphData, VerificationForest, VerificationGraphData};
use aqua_model::{AquaTree, Hash, LinkRevision, RevisionKind, Structure};
use futures::future::{join_all, BoxFuture, FutureExt};
use tracing::{debug, info, warn};

impl Verifier {
    /// Verify the chain ending at `start` (default: the tree's latest revision).
    ///
    /// The report is rooted at the chain's oldest revision; each node's
    /// `verificationGraphData` holds its successor. Link revisions carry the
    /// linked trees' own reports in `linkVerificationGraphData`.
    pub async fn build(
        &self,
        tree: &AquaTree,
        start: Option<&str>,
    ) -> Result<VerificationGraphData, GraphError> {
        let start = self.resolve_start(tree, start)?;
        let graph = self
            .build_chain(tree, start.clone(), LinkTrail::default())
            .await?;
        info!(
            %start,
            nodes = graph.flatten().len(),
            success = graph.overall_success(),
            "verification graph built"
        );
        Ok(graph)
    }

    /// Verify every branch of every root, forks included.
    pub async fn build_forest(&self, tree: &AquaTree) -> Result<VerificationForest, GraphError> {
        if tree.is_empty() {
            return Err(GraphError::EmptyTree);
        }
        for issue in tree.check_structure() {
            warn!(?issue, "tree structure issue");
        }
        let structure = tree.derive_structure();
        let trail = LinkTrail::default();
        let branches = structure
            .roots
            .iter()
            .map(|root| self.build_branch(tree, &structure, root, None, &trail));
        let forest = VerificationForest {
            roots: join_all(branches).await,
            unreachable: structure.unreachable.clone(),
        };
        info!(
            roots = forest.roots.len(),
            nodes = forest.flatten().len(),
            unreachable = forest.unreachable.len(),
            success = forest.overall_success(),
            "verification forest built"
        );
        Ok(forest)
    }

    fn resolve_start(&self, tree: &AquaTree, start: Option<&str>) -> Result<Hash, GraphError> {
        if tree.is_empty() {
            return Err(GraphError::EmptyTree);
        }
        match start {
            Some(hash) if tree.revisions.contains_key(hash) => Ok(hash.to_string()),
            Some(hash) => Err(GraphError::UnknownRevision(hash.to_string())),
            None => tree
                .latest(self.config().latest_policy)
                .ok_or(GraphError::NoLatestRevision),
        }
    }

    /// Linear report from the root of `start`'s chain down to `start`.
    fn build_chain<'a>(
        &'a self,
        tree: &'a AquaTree,
        start: Hash,
        trail: LinkTrail,
    ) -> BoxFuture<'a, Result<VerificationGraphData, GraphError>> {
        async move {
            let chain = tree.chain_to(&start)?;
            debug!(%start, length = chain.len(), depth = trail.depth(), "walking chain");
            let nodes = self.walk_chain(tree, &chain, &trail).await;

            let mut graph: Option<VerificationGraphData> = None;
            for node in nodes.into_iter().rev() {
                let successors = graph.take().into_iter().collect();
                graph = Some(into_graph(tree, node, successors));
            }
            graph.ok_or(GraphError::EmptyTree)
        }
        .boxed()
    }

    /// Report for `hash` and all of its descendants.
    ///
    /// A linear run is validated in a loop up to the next fork or tip; only
    /// the branches of a fork are verified concurrently.
    fn build_branch<'a>(
        &'a self,
        tree: &'a AquaTree,
        structure: &'a Structure,
        hash: &'a Hash,
        predecessor: Option<Hash>,
        trail: &'a LinkTrail,
    ) -> BoxFuture<'a, VerificationGraphData> {
        async move {
            let mut node = self
                .validate_node(tree, hash, predecessor.as_deref(), trail)
                .await;
            let mut current = hash;
            let mut run = Vec::new();
            while let [next] = structure.children_of(current) {
                let successor = self
                    .validate_node(tree, next, Some(node.link_hash().as_str()), trail)
                    .await;
                run.push(std::mem::replace(&mut node, successor));
                current = next;
            }

            let link_hash = node.link_hash().clone();
            let forks = structure.children_of(current).iter().map(|child| {
                self.build_branch(tree, structure, child, Some(link_hash.clone()), trail)
            });
            let mut graph = into_graph(tree, node, join_all(forks).await);
            while let Some(earlier) = run.pop() {
                graph = into_graph(tree, earlier, vec![graph]);
            }
            graph
        }
        .boxed()
    }

    /// Verify every target of a link revision against its own tree.
    pub(crate) fn verify_links<'a>(
        &'a self,
        link: &'a LinkRevision,
        trail: &'a LinkTrail,
    ) -> BoxFuture<'a, (LinkGraphData, Vec<Failure>, Vec<VerificationGraphData>)> {
        async move {
            let targets = link
                .link_verification_hashes
                .iter()
                .enumerate()
                .map(|(i, target)| {
                    self.verify_link_target(target, link.link_file_hashes.get(i), trail)
                });
            let outcomes = join_all(targets).await;

            let mut data = LinkGraphData {
                link_type: link.link_type.clone(),
                targets: Vec::with_capacity(outcomes.len()),
            };
            let mut failures = Vec::new();
            let mut graphs = Vec::new();
            for (target, found, graph) in outcomes {
                data.targets.push(target);
                failures.extend(found);
                graphs.extend(graph);
            }
            (data, failures, graphs)
        }
        .boxed()
    }

    async fn verify_link_target(
        &self,
        target: &Hash,
        file_hash: Option<&Hash>,
        trail: &LinkTrail,
    ) -> LinkTargetOutcome {
        let mut data = LinkTargetGraphData {
            verification_hash: target.clone(),
            file_hash: file_hash.cloned(),
            resolved: false,
            is_valid: false,
        };
        if trail.contains(target) {
            return unverified(
                data,
                FailureReason::CyclicLink,
                format!("link to {target} loops back into its own path"),
            );
        }
        let max_depth = self.config().max_link_depth;
        if trail.depth() >= max_depth {
            return unverified(
                data,
                FailureReason::UnresolvedLink,
                format!("link to {target} exceeds the maximum link depth of {max_depth}"),
            );
        }
        let Some(resolver) = self.linked_trees() else {
            return unverified(
                data,
                FailureReason::UnresolvedLink,
                format!("no linked tree resolver for {target}"),
            );
        };
        let linked = match self.call(resolver.resolve(target)).await {
            Ok(Some(tree)) => tree,
            Ok(None) => {
                return unverified(
                    data,
                    FailureReason::UnresolvedLink,
                    format!("no tree contains {target}"),
                )
            }
            Err(e) => {
                return unverified(
                    data,
                    FailureReason::CollaboratorUnavailable,
                    format!("resolving {target}: {e}"),
                )
            }
        };
        data.resolved = true;

        let mut failures = Vec::new();
        if let Some(file_hash) = file_hash {
            if !names_file(&linked, file_hash) {
                failures.push(Failure::new(
                    FailureReason::HashMismatch,
                    format!("linked tree of {target} has no file {file_hash}"),
                ));
            }
        }

        let graph = match self
            .build_chain(&linked, target.clone(), trail.descend(target))
            .await
        {
            Ok(graph) => graph,
            Err(e) => {
                failures.push(Failure::new(
                    FailureReason::LinkedTreeFailed,
                    format!("linked tree of {target} cannot be walked: {e}"),
                ));
                return (data, failures, None);
            }
        };
        if !graph.overall_success() {
            let status = if graph.has_invalid() {
                NodeStatus::Invalid
            } else {
                NodeStatus::Error
            };
            let failed: Vec<&str> = graph
                .failed_nodes()
                .iter()
                .map(|n| n.hash.as_str())
                .collect();
            failures.push(
                Failure::new(
                    FailureReason::LinkedTreeFailed,
                    format!("linked tree of {target} failed at {}", failed.join(", ")),
                )
                .with_status(status),
            );
        }
        data.is_valid = failures.is_empty();
        (data, failures, Some(graph))
    }
}

type LinkTargetOutcome = (LinkTargetGraphData, Vec<Failure>, Option<VerificationGraphData>);

fn unverified(
    data: LinkTargetGraphData,
    reason: FailureReason,
    detail: String,
) -> LinkTargetOutcome {
    (data, vec![Failure::new(reason, detail)], None)
}

fn into_graph(
    tree: &AquaTree,
    node: NodeVerification,
    successors: Vec<VerificationGraphData>,
) -> VerificationGraphData {
    match tree.get(&node.hash) {
        Some(revision) => node.into_graph(revision, successors),
        None => VerificationGraphData {
            hash: node.hash,
            previous_verification_hash: Hash::new(),
            timestamp: String::new(),
            is_validation_successful: false,
            status: node.status,
            revision_type: node.revision_type,
            info: node.info,
            failures: node.failures,
            verification_graph_data: successors,
            link_verification_graph_data: node.link_graphs,
        },
    }
}

/// Whether `file_hash` names a file of `tree`, by content hash or `file_index` key.
fn names_file(tree: &AquaTree, file_hash: &str) -> bool {
    tree.file_index.contains_key(file_hash)
        || tree.revisions.values().any(|revision| {
            matches!(&revision.kind, RevisionKind::File(file) if file.file_hash == file_hash)
        })
}
