//! Aqua tree container and structure derivation.

use crate::revision::{Hash, Revision};
use crate::ModelError;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// A node of the materialized tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub hash: Hash,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

/// Precomputed branch index.
///
/// `paths` is keyed by branch tip; each value runs from the branch root to that tip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMapping {
    pub paths: BTreeMap<Hash, Vec<Hash>>,
    #[serde(rename = "latestHash", default)]
    pub latest_hash: Hash,
}

/// Rule for picking the "latest" revision when a tree has several tips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LatestPolicy {
    /// Honour `treeMapping.latestHash` when it names a known tip, else fall back to timestamps.
    #[default]
    ExplicitPointer,
    /// Highest `local_timestamp`; ties go to the lexicographically greatest hash.
    Timestamp,
}

/// A provenance graph for one or more related files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AquaTree {
    pub revisions: BTreeMap<Hash, Revision>,
    #[serde(default)]
    pub file_index: BTreeMap<Hash, String>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "one_or_many::serialize",
        deserialize_with = "one_or_many::deserialize"
    )]
    pub tree: Vec<TreeNode>,
    #[serde(rename = "treeMapping", default, skip_serializing_if = "Option::is_none")]
    pub tree_mapping: Option<TreeMapping>,
}

/// Parent/child adjacency derived from `previous_verification_hash` links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    /// Genesis revisions plus revisions whose predecessor is absent.
    pub roots: Vec<Hash>,
    pub children: BTreeMap<Hash, Vec<Hash>>,
    /// Reachable revisions with no children.
    pub tips: Vec<Hash>,
    /// Non-genesis revisions whose predecessor is missing from the store.
    pub dangling: Vec<Hash>,
    /// Revisions on (or hanging off) a predecessor cycle.
    pub unreachable: Vec<Hash>,
}

impl Structure {
    pub fn children_of(&self, hash: &str) -> &[Hash] {
        self.children.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Structural defects found by [`AquaTree::check_structure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureIssue {
    DanglingPredecessor { hash: Hash, missing: Hash },
    UnknownTreeHash(Hash),
    UnknownMappingHash(Hash),
    Cycle(Vec<Hash>),
}

impl AquaTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<&Revision> {
        self.revisions.get(hash)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load an Aqua tree from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Save the Aqua tree to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Derive roots, forks and tips from the revision store.
    pub fn derive_structure(&self) -> Structure {
        let mut structure = Structure::default();

        for (hash, revision) in &self.revisions {
            let prev = &revision.previous_verification_hash;
            if prev.is_empty() {
                structure.roots.push(hash.clone());
            } else if self.revisions.contains_key(prev) {
                structure
                    .children
                    .entry(prev.clone())
                    .or_default()
                    .push(hash.clone());
            } else {
                structure.roots.push(hash.clone());
                structure.dangling.push(hash.clone());
            }
        }

        for children in structure.children.values_mut() {
            children.sort_by(|a, b| self.order_key(a).cmp(&self.order_key(b)));
        }
        structure
            .roots
            .sort_by(|a, b| self.order_key(a).cmp(&self.order_key(b)));

        let mut reachable = BTreeSet::new();
        let mut tips = Vec::new();
        let mut stack: Vec<&Hash> = structure.roots.iter().collect();
        while let Some(hash) = stack.pop() {
            if !reachable.insert(hash.clone()) {
                continue;
            }
            let children = structure.children_of(hash);
            if children.is_empty() {
                tips.push(hash.clone());
            }
            stack.extend(children.iter());
        }
        tips.sort_by(|a, b| self.order_key(a).cmp(&self.order_key(b)));
        structure.tips = tips;

        structure.unreachable = self
            .revisions
            .keys()
            .filter(|hash| !reachable.contains(*hash))
            .cloned()
            .collect();
        structure
    }

    /// Return a copy whose `tree` and `treeMapping` are recomputed from `revisions`.
    pub fn with_derived_structure(mut self, policy: LatestPolicy) -> Self {
        let structure = self.derive_structure();
        self.tree = structure
            .roots
            .iter()
            .map(|root| build_node(root, &structure))
            .collect();

        let mut paths = BTreeMap::new();
        for tip in &structure.tips {
            if let Ok(path) = self.chain_to(tip) {
                paths.insert(tip.clone(), path);
            }
        }
        // Drop the stale pointer before picking so it cannot win.
        self.tree_mapping = None;
        let latest_hash = self.latest(policy).unwrap_or_default();
        self.tree_mapping = Some(TreeMapping { paths, latest_hash });
        self
    }

    /// Report dangling links, cycles, and cached-structure entries unknown to the store.
    pub fn check_structure(&self) -> Vec<StructureIssue> {
        let structure = self.derive_structure();
        let mut issues = Vec::new();

        for hash in &structure.dangling {
            let missing = self.revisions[hash].previous_verification_hash.clone();
            issues.push(StructureIssue::DanglingPredecessor {
                hash: hash.clone(),
                missing,
            });
        }

        let mut stack: Vec<&TreeNode> = self.tree.iter().collect();
        while let Some(node) = stack.pop() {
            if !self.revisions.contains_key(&node.hash) {
                issues.push(StructureIssue::UnknownTreeHash(node.hash.clone()));
            }
            stack.extend(node.children.iter());
        }

        if let Some(mapping) = &self.tree_mapping {
            let mut seen = BTreeSet::new();
            let referenced = mapping
                .paths
                .iter()
                .flat_map(|(tip, path)| std::iter::once(tip).chain(path.iter()))
                .chain((!mapping.latest_hash.is_empty()).then_some(&mapping.latest_hash));
            for hash in referenced {
                if !self.revisions.contains_key(hash) && seen.insert(hash.clone()) {
                    issues.push(StructureIssue::UnknownMappingHash(hash.clone()));
                }
            }
        }

        if !structure.unreachable.is_empty() {
            issues.push(StructureIssue::Cycle(structure.unreachable));
        }
        issues
    }

    /// Hashes from the chain's root to `hash`, oldest first.
    ///
    /// The walk stops at a genesis revision or at a revision whose predecessor
    /// is absent from the store.
    pub fn chain_to(&self, hash: &str) -> Result<Vec<Hash>, ModelError> {
        let mut current = self
            .revisions
            .get_key_value(hash)
            .ok_or_else(|| ModelError::UnknownRevision(hash.to_string()))?;
        let mut visited = BTreeSet::new();
        let mut chain = Vec::new();

        loop {
            let (current_hash, revision) = current;
            if !visited.insert(current_hash.clone()) {
                return Err(ModelError::Cycle(current_hash.clone()));
            }
            chain.push(current_hash.clone());
            match self
                .revisions
                .get_key_value(&revision.previous_verification_hash)
            {
                Some(prev) if !revision.is_genesis() => current = prev,
                _ => break,
            }
        }

        chain.reverse();
        Ok(chain)
    }

    /// Current tip according to `policy`, or `None` for an empty or fully cyclic tree.
    pub fn latest(&self, policy: LatestPolicy) -> Option<Hash> {
        let tips = self.derive_structure().tips;
        if policy == LatestPolicy::ExplicitPointer {
            if let Some(mapping) = &self.tree_mapping {
                if tips.contains(&mapping.latest_hash) {
                    return Some(mapping.latest_hash.clone());
                }
            }
        }
        tips.into_iter()
            .max_by(|a, b| self.order_key(a).cmp(&self.order_key(b)))
    }

    /// Lookup the logical file name recorded for a hash.
    pub fn file_name(&self, hash: &str) -> Option<&str> {
        self.file_index.get(hash).map(String::as_str)
    }

    fn order_key<'a>(&'a self, hash: &'a str) -> (Option<NaiveDateTime>, &'a str, &'a str) {
        let raw = self
            .revisions
            .get(hash)
            .map(|r| r.local_timestamp.as_str())
            .unwrap_or("");
        (parse_timestamp(raw), raw, hash)
    }
}

/// Parse `YYYYMMDDHHMMSS` or RFC 3339 timestamps.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|t| t.naive_utc()))
}

fn build_node(hash: &Hash, structure: &Structure) -> TreeNode {
    TreeNode {
        hash: hash.clone(),
        children: structure
            .children_of(hash)
            .iter()
            .map(|child| build_node(child, structure))
            .collect(),
    }
}

/// `tree` is a single node on the wire for one root and an array otherwise.
mod one_or_many {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        One(TreeNode),
        Many(Vec<TreeNode>),
    }

    pub fn serialize<S: Serializer>(nodes: &[TreeNode], serializer: S) -> Result<S::Ok, S::Error> {
        match nodes {
            [single] => single.serialize(serializer),
            many => many.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<TreeNode>, D::Error> {
        Ok(match Option::<Shape>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(Shape::One(node)) => vec![node],
            Some(Shape::Many(nodes)) => nodes,
        })
    }
}
