//! Verification report types.

use crate::error::{Failure, NodeStatus};
use crate::signature::SignatureVerificationGraphData;
use crate::witness::WitnessVerificationGraphData;
use aqua_model::{Hash, RevisionType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGraphData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub file_hash: Hash,
    /// Content came from the revision itself rather than the file provider.
    pub embedded_content: bool,
    pub content_hash_is_valid: bool,
}

/// Result for one disclosed form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormKeyGraphData {
    pub key: String,
    pub value: Value,
    pub leaf: Hash,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormGraphData {
    pub keys: Vec<FormKeyGraphData>,
    /// Leaves with no disclosed field.
    pub withheld_leaves: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTargetGraphData {
    pub verification_hash: Hash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<Hash>,
    pub resolved: bool,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkGraphData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    pub targets: Vec<LinkTargetGraphData>,
}

/// Type-specific evidence of a node, tagged like its revision type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum RevisionGraphInfo {
    File(FileGraphData),
    Witness(WitnessVerificationGraphData),
    Signature(SignatureVerificationGraphData),
    Form(FormGraphData),
    Link(LinkGraphData),
}

/// Recursive verification report for one revision and everything after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationGraphData {
    pub hash: Hash,
    pub previous_verification_hash: Hash,
    pub timestamp: String,
    #[serde(rename = "isValidationSucessful")]
    pub is_validation_successful: bool,
    pub status: NodeStatus,
    pub revision_type: RevisionType,
    /// Absent when the revision was too malformed to check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<RevisionGraphInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
    #[serde(default)]
    pub verification_graph_data: Vec<VerificationGraphData>,
    #[serde(default)]
    pub link_verification_graph_data: Vec<VerificationGraphData>,
}

impl VerificationGraphData {
    /// AND of this node, its successors and every linked sub-graph.
    pub fn overall_success(&self) -> bool {
        self.nodes().all(|node| node.is_validation_successful)
    }

    /// Hashes of this graph in pre-order, excluding linked sub-graphs.
    pub fn flatten(&self) -> Vec<&Hash> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(&node.hash);
            stack.extend(node.verification_graph_data.iter().rev());
        }
        out
    }

    /// Find a node by hash, searching linked sub-graphs too.
    pub fn find(&self, hash: &str) -> Option<&VerificationGraphData> {
        self.nodes().find(|node| node.hash == hash)
    }

    /// Every node that did not validate, linked sub-graphs included.
    pub fn failed_nodes(&self) -> Vec<&VerificationGraphData> {
        self.nodes()
            .filter(|node| !node.is_validation_successful)
            .collect()
    }

    /// True if any node here or below settled `Invalid`.
    pub fn has_invalid(&self) -> bool {
        self.nodes().any(|node| node.status == NodeStatus::Invalid)
    }

    /// Pre-order walk over successors and linked sub-graphs.
    fn nodes(&self) -> Nodes<'_> {
        Nodes { stack: vec![self] }
    }
}

struct Nodes<'a> {
    stack: Vec<&'a VerificationGraphData>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a VerificationGraphData;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack
            .extend(node.link_verification_graph_data.iter().rev());
        self.stack.extend(node.verification_graph_data.iter().rev());
        Some(node)
    }
}

// Long chains nest one level per revision; unlink them without recursing.
impl Drop for VerificationGraphData {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.verification_graph_data);
        pending.append(&mut self.link_verification_graph_data);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.verification_graph_data);
            pending.append(&mut node.link_verification_graph_data);
        }
    }
}

/// Reports for every root of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationForest {
    pub roots: Vec<VerificationGraphData>,
    /// Revisions not reachable from any root (predecessor cycles).
    #[serde(default)]
    pub unreachable: Vec<Hash>,
}

impl VerificationForest {
    pub fn overall_success(&self) -> bool {
        self.unreachable.is_empty()
            && self.roots.iter().all(VerificationGraphData::overall_success)
    }

    pub fn flatten(&self) -> Vec<&Hash> {
        self.roots.iter().flat_map(VerificationGraphData::flatten).collect()
    }

    pub fn find(&self, hash: &str) -> Option<&VerificationGraphData> {
        self.roots.iter().find_map(|root| root.find(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;

    fn node(hash: &str, ok: bool, children: Vec<VerificationGraphData>) -> VerificationGraphData {
        let failures = if ok {
            vec![]
        } else {
            vec![Failure::new(FailureReason::HashMismatch, "bad")]
        };
        VerificationGraphData {
            hash: hash.into(),
            previous_verification_hash: String::new(),
            timestamp: "20240101120000".into(),
            is_validation_successful: ok,
            status: NodeStatus::settle(&failures),
            revision_type: RevisionType::File,
            info: None,
            failures,
            verification_graph_data: children,
            link_verification_graph_data: vec![],
        }
    }

    #[test]
    fn test_flatten_is_preorder() {
        let graph = node(
            "a",
            true,
            vec![node("b", true, vec![node("c", true, vec![])]), node("d", true, vec![])],
        );
        assert_eq!(graph.flatten(), vec!["a", "b", "c", "d"]);
        assert!(graph.overall_success());
    }

    #[test]
    fn test_failure_below_root_fails_overall() {
        let graph = node("a", true, vec![node("b", false, vec![])]);
        assert!(!graph.overall_success());
        assert!(graph.has_invalid());
        assert_eq!(graph.failed_nodes().len(), 1);
        assert_eq!(graph.failed_nodes()[0].hash, "b");
    }

    #[test]
    fn test_find_searches_links() {
        let mut graph = node("a", true, vec![]);
        graph.link_verification_graph_data.push(node("y", false, vec![]));
        assert!(graph.find("y").is_some());
        assert!(!graph.overall_success());
        assert_eq!(graph.flatten(), vec!["a"]);
    }

    #[test]
    fn test_helpers_handle_deep_nesting() {
        let mut graph = node("n0", true, vec![]);
        for i in 1..50_000 {
            graph = node(&format!("n{i}"), i != 25_000, vec![graph]);
        }
        assert_eq!(graph.flatten().len(), 50_000);
        assert!(!graph.overall_success());
        assert!(graph.has_invalid());
        assert_eq!(graph.failed_nodes()[0].hash, "n25000");
        assert!(graph.find("n0").is_some());
    }

    #[test]
    fn test_report_field_names() {
        let json = serde_json::to_value(node("a", true, vec![])).unwrap();
        assert_eq!(json["isValidationSucessful"], true);
        assert_eq!(json["revisionType"], "file");
        assert_eq!(json["status"], "valid");
        assert!(json["verificationGraphData"].as_array().unwrap().is_empty());
        assert!(json.get("failures").is_none());
    }
}
