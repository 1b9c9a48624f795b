use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonBytesHasher};
use once_cell::sync::Lazy;
use rand::RngCore;

use crate::error::{ProtocolError, Result};

/// Merkle tree depth. The ledger holds at most 2^TREE_DEPTH commitments.
pub const TREE_DEPTH: usize = 20;

// Domain tags for hash separation (MUST match the redemption circuit).
// A leaf hash can never collide with a node hash because the leading
// tag differs.
pub const TAG_LEAF: u64 = 0;
pub const TAG_NODE: u64 = 1;
pub const DOMAIN_COMMIT: u64 = 1668246637; // "comm" as u32
pub const DOMAIN_NULLIFIER: u64 = 1853189228; // "null" as u32

/// Encode a u64 as a big-endian 256-bit field element.
pub fn field_from_u64(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..32].copy_from_slice(&value.to_be_bytes());
    out
}

/// Poseidon hash of multiple 32-byte inputs (circom parameterization,
/// big-endian bytes).
pub fn poseidon_hash(inputs: &[&[u8; 32]]) -> Result<[u8; 32]> {
    let mut poseidon = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|e| ProtocolError::Crypto(format!("Poseidon init failed: {}", e)))?;

    let inputs_as_slices: Vec<&[u8]> = inputs.iter().map(|arr| arr.as_slice()).collect();

    poseidon
        .hash_bytes_be(&inputs_as_slices)
        .map_err(|e| ProtocolError::Crypto(format!("Poseidon hash failed: {}", e)))
}

pub fn poseidon_hash_with_domain(domain: u64, inputs: &[&[u8; 32]]) -> Result<[u8; 32]> {
    let domain_bytes = field_from_u64(domain);

    let mut all_inputs = vec![&domain_bytes];
    all_inputs.extend(inputs);

    poseidon_hash(&all_inputs)
}

/// Two-input hash used for tree construction.
pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> Result<[u8; 32]> {
    poseidon_hash(&[left, right])
}

/// `leaf_hash(v) = H(TAG_LEAF, v)`
pub fn leaf_hash(value: &[u8; 32]) -> Result<[u8; 32]> {
    hash_pair(&field_from_u64(TAG_LEAF), value)
}

/// `node_hash(l, r) = H(H(TAG_NODE, l), r)`
pub fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> Result<[u8; 32]> {
    let tagged_left = hash_pair(&field_from_u64(TAG_NODE), left)?;
    hash_pair(&tagged_left, right)
}

/// Empty-subtree table, computed once and shared by every consumer.
/// `ZEROS[i]` is the root of an empty subtree with 2^i leaves;
/// `ZEROS[TREE_DEPTH]` is the empty-ledger root.
pub static ZEROS: Lazy<[[u8; 32]; TREE_DEPTH + 1]> = Lazy::new(|| {
    let mut zeros = [[0u8; 32]; TREE_DEPTH + 1];
    zeros[0] = leaf_hash(&[0u8; 32]).expect("width-2 Poseidon parameters are built in");
    for i in 1..=TREE_DEPTH {
        zeros[i] =
            node_hash(&zeros[i - 1], &zeros[i - 1]).expect("width-2 Poseidon parameters are built in");
    }
    zeros
});

/// Root of the empty ledger.
pub fn empty_root() -> [u8; 32] {
    ZEROS[TREE_DEPTH]
}

/// Generate a random 32-byte value that is valid for the BN254 field
/// (guaranteed non-zero and less than the field modulus).
pub fn random_field_element() -> [u8; 32] {
    let mut value = [0u8; 32];
    loop {
        rand::thread_rng().fill_bytes(&mut value);
        // BN254 modulus starts with 0x30; masking the top bits keeps the
        // value below it.
        value[0] &= 0x1F;
        if value.iter().any(|&b| b != 0) {
            return value;
        }
    }
}

pub fn validate_non_zero(value: &[u8; 32], what: &str) -> Result<()> {
    if value.iter().all(|&b| b == 0) {
        return Err(ProtocolError::InvalidInput(format!(
            "{} must be non-zero",
            what
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_table_is_deterministic() {
        let z0 = leaf_hash(&[0u8; 32]).unwrap();
        assert_eq!(ZEROS[0], z0);

        let z1 = node_hash(&z0, &z0).unwrap();
        assert_eq!(ZEROS[1], z1);

        assert_eq!(
            empty_root(),
            node_hash(&ZEROS[TREE_DEPTH - 1], &ZEROS[TREE_DEPTH - 1]).unwrap()
        );
    }

    #[test]
    fn leaf_and_node_hashes_are_domain_separated() {
        let v = random_field_element();
        let leaf = leaf_hash(&v).unwrap();
        let node = node_hash(&v, &v).unwrap();
        assert_ne!(leaf, node);
    }

    #[test]
    fn random_elements_are_field_valid() {
        for _ in 0..32 {
            let v = random_field_element();
            assert!(v[0] < 0x20);
            assert!(v.iter().any(|&b| b != 0));
        }
    }

    #[test]
    fn domain_tag_changes_hash() {
        let v = random_field_element();
        let a = poseidon_hash_with_domain(DOMAIN_COMMIT, &[&v]).unwrap();
        let b = poseidon_hash_with_domain(DOMAIN_NULLIFIER, &[&v]).unwrap();
        assert_ne!(a, b);
    }
}
