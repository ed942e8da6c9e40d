//! Content hashing of revisions.

use crate::merkle::merkle_root;
use crate::{HashAlgorithm, HashError};
use aqua_model::{Hash, Revision, RevisionKind};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Canonical JSON of a revision: recursively key-sorted, compact, UTF-8.
pub fn canonical_bytes(revision: &Revision) -> Vec<u8> {
    let canonical = canonicalize(&Value::Object(revision.to_fields()));
    canonical.to_string().into_bytes()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (key, value) in sorted {
                out.insert(key.clone(), value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compute the verification hash of a revision.
///
/// Scalar kinds digest their canonical JSON. Form revisions are hashed as the
/// Merkle root of their stored `leaves`, after checking that every field still
/// present on the revision is covered by one of those leaves.
pub fn hash_revision(revision: &Revision, algorithm: HashAlgorithm) -> Result<Hash, HashError> {
    revision.validate()?;
    match &revision.kind {
        RevisionKind::Form(form) => {
            for (key, leaf) in form_leaves(revision, algorithm) {
                if !form.leaves.contains(&leaf) {
                    return Err(HashError::UncoveredField(key));
                }
            }
            Ok(merkle_root(&form.leaves, algorithm)?)
        }
        _ => Ok(algorithm.digest(&canonical_bytes(revision))),
    }
}

/// Leaf digest of one field: `digest("key:value")`.
///
/// String values contribute their raw text, everything else its canonical JSON.
pub fn field_leaf(key: &str, value: &Value, algorithm: HashAlgorithm) -> Hash {
    let text = match value {
        Value::String(s) => s.clone(),
        other => canonicalize(other).to_string(),
    };
    algorithm.digest(format!("{key}:{text}").as_bytes())
}

/// Leaves for every field of a revision except `leaves` itself, in key order.
pub fn form_leaves(revision: &Revision, algorithm: HashAlgorithm) -> Vec<(String, Hash)> {
    let fields: BTreeMap<String, Value> = revision.to_fields().into_iter().collect();
    fields
        .iter()
        .filter(|(key, _)| key.as_str() != "leaves")
        .map(|(key, value)| (key.clone(), field_leaf(key, value, algorithm)))
        .collect()
}

/// Digest of raw file bytes, as recorded in `file_hash`.
pub fn hash_file_content(bytes: &[u8], algorithm: HashAlgorithm) -> Hash {
    algorithm.digest(bytes)
}
