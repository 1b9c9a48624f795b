//! Off-chain tree builder: deterministic, stateless replay of the full
//! commitment sequence into a root.
//!
//! Any party can run this against the ledger's range-read interface. Two
//! honest parties given the same sequence always compute the same root,
//! which is what keeps the root submitter semi-trusted: it can delay a
//! root, never forge one.

use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::hash::{self, TREE_DEPTH, ZEROS};
use crate::ledger::LEDGER_CAPACITY;

/// Fold an ordered commitment sequence into the ledger root.
pub fn compute_root(commitments: &[[u8; 32]]) -> Result<[u8; 32]> {
    if commitments.len() as u64 > LEDGER_CAPACITY {
        return Err(ProtocolError::CapacityExceeded(LEDGER_CAPACITY));
    }

    let mut level: HashMap<u64, [u8; 32]> = HashMap::with_capacity(commitments.len());
    for (i, commitment) in commitments.iter().enumerate() {
        level.insert(i as u64, hash::leaf_hash(commitment)?);
    }

    for depth in 0..TREE_DEPTH {
        level = fold_level(&level, depth)?;
    }

    Ok(level.get(&0).copied().unwrap_or(ZEROS[TREE_DEPTH]))
}

/// Extract the sibling path and per-level direction bits for one leaf.
/// The path is opaque material for the proof system; the core never
/// verifies it.
pub fn merkle_path(
    commitments: &[[u8; 32]],
    leaf_index: u64,
) -> Result<(Vec<[u8; 32]>, Vec<u8>)> {
    if leaf_index as usize >= commitments.len() {
        return Err(ProtocolError::InvalidInput(format!(
            "leaf index {} out of range ({} commitments)",
            leaf_index,
            commitments.len()
        )));
    }

    let mut level: HashMap<u64, [u8; 32]> = HashMap::with_capacity(commitments.len());
    for (i, commitment) in commitments.iter().enumerate() {
        level.insert(i as u64, hash::leaf_hash(commitment)?);
    }

    let mut siblings = Vec::with_capacity(TREE_DEPTH);
    let mut path_indices = Vec::with_capacity(TREE_DEPTH);
    let mut index = leaf_index;

    for depth in 0..TREE_DEPTH {
        let sibling = level.get(&(index ^ 1)).copied().unwrap_or(ZEROS[depth]);
        siblings.push(sibling);
        path_indices.push((index & 1) as u8);

        level = fold_level(&level, depth)?;
        index >>= 1;
    }

    Ok((siblings, path_indices))
}

fn fold_level(level: &HashMap<u64, [u8; 32]>, depth: usize) -> Result<HashMap<u64, [u8; 32]>> {
    let mut parents: Vec<u64> = level.keys().map(|i| i >> 1).collect();
    parents.sort_unstable();
    parents.dedup();

    let mut next = HashMap::with_capacity(parents.len());
    for parent in parents {
        let left = level.get(&(parent << 1)).copied().unwrap_or(ZEROS[depth]);
        let right = level
            .get(&((parent << 1) | 1))
            .copied()
            .unwrap_or(ZEROS[depth]);
        next.insert(parent, hash::node_hash(&left, &right)?);
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::random_field_element;

    #[test]
    fn empty_sequence_yields_empty_root() {
        assert_eq!(compute_root(&[]).unwrap(), hash::empty_root());
    }

    #[test]
    fn replay_is_deterministic() {
        let commitments: Vec<[u8; 32]> = (0..5).map(|_| random_field_element()).collect();
        let a = compute_root(&commitments).unwrap();
        let b = compute_root(&commitments).unwrap();
        assert_eq!(a, b);

        let mut extended = commitments.clone();
        extended.push(random_field_element());
        assert_ne!(a, compute_root(&extended).unwrap());
    }

    #[test]
    fn two_leaf_root_matches_manual_fold() {
        let c1 = random_field_element();
        let c2 = random_field_element();

        let mut node = hash::node_hash(
            &hash::leaf_hash(&c1).unwrap(),
            &hash::leaf_hash(&c2).unwrap(),
        )
        .unwrap();
        for depth in 1..TREE_DEPTH {
            node = hash::node_hash(&node, &ZEROS[depth]).unwrap();
        }

        assert_eq!(compute_root(&[c1, c2]).unwrap(), node);
    }

    #[test]
    fn merkle_path_folds_back_to_root() {
        let commitments: Vec<[u8; 32]> = (0..7).map(|_| random_field_element()).collect();
        let root = compute_root(&commitments).unwrap();

        for leaf_index in [0u64, 3, 6] {
            let (siblings, bits) = merkle_path(&commitments, leaf_index).unwrap();
            assert_eq!(siblings.len(), TREE_DEPTH);
            assert_eq!(bits.len(), TREE_DEPTH);

            let mut node = hash::leaf_hash(&commitments[leaf_index as usize]).unwrap();
            for (sibling, bit) in siblings.iter().zip(&bits) {
                node = if *bit == 0 {
                    hash::node_hash(&node, sibling).unwrap()
                } else {
                    hash::node_hash(sibling, &node).unwrap()
                };
            }
            assert_eq!(node, root);
        }
    }

    #[test]
    fn merkle_path_rejects_out_of_range_leaf() {
        let commitments = vec![random_field_element()];
        assert!(merkle_path(&commitments, 1).is_err());
    }
}
