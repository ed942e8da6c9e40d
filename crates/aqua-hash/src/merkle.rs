//! Merkle tree construction and proof replay.
//!
//! Interior nodes are `digest(left_bytes ++ right_bytes)` over the hex-decoded
//! children. A trailing odd node is promoted to the next level unchanged.

use crate::HashAlgorithm;
use aqua_model::{Hash, WitnessMerkleProof};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("proof chain broken at depth {depth}: {reason}")]
    ProofChainBroken { depth: u32, reason: String },

    #[error("`{0}` is not a hex digest")]
    InvalidDigest(String),

    #[error("cannot build a Merkle tree without leaves")]
    Empty,

    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },
}

fn broken(depth: u32, reason: impl Into<String>) -> MerkleError {
    MerkleError::ProofChainBroken {
        depth,
        reason: reason.into(),
    }
}

/// Hash two sibling digests into their parent.
pub fn node_hash(left: &str, right: &str, algorithm: HashAlgorithm) -> Result<Hash, MerkleError> {
    let mut bytes = decode(left)?;
    bytes.extend(decode(right)?);
    Ok(algorithm.digest(&bytes))
}

fn decode(digest: &str) -> Result<Vec<u8>, MerkleError> {
    match hex::decode(digest) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Err(MerkleError::InvalidDigest(digest.to_string())),
    }
}

/// Reconstruct the root reached from `leaf` by walking `proof`.
///
/// Steps are applied in ascending `depth`. The running hash entering each
/// step must be one of that step's leaves, and each step's recorded
/// `successor` must be what the step actually produces. An empty proof
/// returns `leaf` itself.
pub fn replay(
    leaf: &str,
    proof: &[WitnessMerkleProof],
    algorithm: HashAlgorithm,
) -> Result<Hash, MerkleError> {
    let mut steps: Vec<&WitnessMerkleProof> = proof.iter().collect();
    steps.sort_by_key(|step| step.depth);

    let mut running = leaf.to_string();
    let mut last_depth = None;
    for step in steps {
        if last_depth == Some(step.depth) {
            return Err(broken(step.depth, "depth appears twice"));
        }
        last_depth = Some(step.depth);

        match &step.right_leaf {
            Some(right) => {
                if running != step.left_leaf && running != *right {
                    return Err(broken(step.depth, "running hash matches neither leaf"));
                }
                let produced = node_hash(&step.left_leaf, right, algorithm)?;
                if produced != step.successor {
                    return Err(broken(step.depth, "successor is not the hash of its leaves"));
                }
                running = produced;
            }
            None => {
                if running != step.left_leaf {
                    return Err(broken(step.depth, "promoted leaf is not the running hash"));
                }
                if step.successor != step.left_leaf {
                    return Err(broken(step.depth, "promoted successor differs from its leaf"));
                }
            }
        }
    }
    Ok(running)
}

fn next_level(level: &[Hash], algorithm: HashAlgorithm) -> Result<Vec<Hash>, MerkleError> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right, algorithm),
            [single] => Ok(single.clone()),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Root of the tree built over `leaves` in order.
pub fn merkle_root(leaves: &[Hash], algorithm: HashAlgorithm) -> Result<Hash, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::Empty);
    }
    for leaf in leaves {
        decode(leaf)?;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level, algorithm)?;
    }
    Ok(level.remove(0))
}

/// Inclusion proof for `leaves[index]`, in the step shape [`replay`] consumes.
pub fn merkle_proof(
    leaves: &[Hash],
    index: usize,
    algorithm: HashAlgorithm,
) -> Result<Vec<WitnessMerkleProof>, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::Empty);
    }
    if index >= leaves.len() {
        return Err(MerkleError::IndexOutOfRange {
            index,
            len: leaves.len(),
        });
    }

    let mut level = leaves.to_vec();
    let mut idx = index;
    let mut depth = 0u32;
    let mut steps = Vec::new();

    while level.len() > 1 {
        let pair_start = idx - idx % 2;
        if pair_start + 1 < level.len() {
            let left = level[pair_start].clone();
            let right = level[pair_start + 1].clone();
            let successor = node_hash(&left, &right, algorithm)?;
            steps.push(WitnessMerkleProof {
                depth,
                left_leaf: left,
                right_leaf: Some(right),
                successor,
            });
        } else {
            steps.push(WitnessMerkleProof {
                depth,
                left_leaf: level[idx].clone(),
                right_leaf: None,
                successor: level[idx].clone(),
            });
        }
        level = next_level(&level, algorithm)?;
        idx /= 2;
        depth += 1;
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALGO: HashAlgorithm = HashAlgorithm::Sha3_256;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| ALGO.digest(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn test_replay_reconstructs_root_for_every_leaf() {
        for n in 1..=7 {
            let leaves = leaves(n);
            let root = merkle_root(&leaves, ALGO).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = merkle_proof(&leaves, i, ALGO).unwrap();
                assert_eq!(replay(leaf, &proof, ALGO).unwrap(), root, "n={n} i={i}");
            }
        }
    }

    #[test]
    fn test_empty_proof_returns_leaf() {
        let leaf = ALGO.digest(b"only");
        assert_eq!(replay(&leaf, &[], ALGO).unwrap(), leaf);
        assert_eq!(merkle_root(&[leaf.clone()], ALGO).unwrap(), leaf);
        assert!(merkle_proof(&[leaf], 0, ALGO).unwrap().is_empty());
    }

    #[test]
    fn test_odd_node_is_promoted() {
        let leaves = leaves(3);
        let proof = merkle_proof(&leaves, 2, ALGO).unwrap();
        assert_eq!(proof[0].right_leaf, None);
        assert_eq!(proof[0].successor, leaves[2]);
        assert_eq!(proof[1].right_leaf.as_deref(), Some(leaves[2].as_str()));
    }

    #[test]
    fn test_steps_are_replayed_by_depth_not_position() {
        let leaves = leaves(4);
        let root = merkle_root(&leaves, ALGO).unwrap();
        let mut proof = merkle_proof(&leaves, 1, ALGO).unwrap();
        proof.reverse();
        assert_eq!(replay(&leaves[1], &proof, ALGO).unwrap(), root);
    }

    #[test]
    fn test_mutated_sibling_flips_result() {
        let leaves = leaves(4);
        let root = merkle_root(&leaves, ALGO).unwrap();
        let proof = merkle_proof(&leaves, 0, ALGO).unwrap();

        for step in 0..proof.len() {
            for right in [false, true] {
                let mut tampered = proof.clone();
                let target = if right {
                    tampered[step].right_leaf.as_mut().unwrap()
                } else {
                    &mut tampered[step].left_leaf
                };
                let flipped = if target.starts_with('0') { "1" } else { "0" };
                target.replace_range(0..1, flipped);

                match replay(&leaves[0], &tampered, ALGO) {
                    Ok(candidate) => assert_ne!(candidate, root),
                    Err(err) => assert!(matches!(err, MerkleError::ProofChainBroken { .. })),
                }
            }
        }
    }

    #[test]
    fn test_wrong_leaf_breaks_chain() {
        let leaves = leaves(4);
        let proof = merkle_proof(&leaves, 0, ALGO).unwrap();
        let outsider = ALGO.digest(b"outsider");
        assert!(matches!(
            replay(&outsider, &proof, ALGO),
            Err(MerkleError::ProofChainBroken { depth: 0, .. })
        ));
    }

    #[test]
    fn test_forged_successor_breaks_chain() {
        let leaves = leaves(2);
        let mut proof = merkle_proof(&leaves, 0, ALGO).unwrap();
        proof[0].successor = ALGO.digest(b"forged");
        assert!(matches!(
            replay(&leaves[0], &proof, ALGO),
            Err(MerkleError::ProofChainBroken { .. })
        ));
    }

    #[test]
    fn test_duplicate_depth_rejected() {
        let leaves = leaves(2);
        let mut proof = merkle_proof(&leaves, 0, ALGO).unwrap();
        proof.push(proof[0].clone());
        assert!(replay(&leaves[0], &proof, ALGO).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(merkle_root(&[], ALGO), Err(MerkleError::Empty));
        assert!(matches!(
            merkle_root(&["zz".to_string()], ALGO),
            Err(MerkleError::InvalidDigest(_))
        ));
        assert!(matches!(
            merkle_proof(&leaves(2), 2, ALGO),
            Err(MerkleError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }
}
