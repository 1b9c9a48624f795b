//! Off-chain voucher: the sole evidence linking a deposit to a future
//! redemption. Never persisted by the core.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::hash::{
    field_from_u64, poseidon_hash_with_domain, random_field_element, validate_non_zero,
    DOMAIN_COMMIT, DOMAIN_NULLIFIER,
};

/// Nullifier derivation is (secret, random seed):
/// `nullifier = Poseidon(DOMAIN_NULLIFIER, seed)`. The coordinator treats
/// nullifiers as opaque tokens either way; this choice binds only the
/// voucher/circuit pair.
#[derive(Clone, Serialize, Deserialize)]
pub struct Voucher {
    /// Secret used in the commitment (must be non-zero).
    pub secret: [u8; 32],
    /// Seed the nullifier is derived from (must be non-zero).
    pub nullifier_seed: [u8; 32],
    /// Amount ghosted.
    pub amount: u64,
    /// Asset the value belongs to.
    pub asset_id: [u8; 32],
    /// Leaf index in the ledger (set once the deposit is confirmed).
    pub leaf_index: Option<u64>,
}

impl Voucher {
    pub fn new(amount: u64, asset_id: [u8; 32]) -> Self {
        Self {
            secret: random_field_element(),
            nullifier_seed: random_field_element(),
            amount,
            asset_id,
            leaf_index: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_non_zero(&self.secret, "secret")?;
        validate_non_zero(&self.nullifier_seed, "nullifier seed")?;
        if self.amount == 0 {
            return Err(ProtocolError::InvalidInput("amount must be non-zero".into()));
        }
        Ok(())
    }

    /// `Poseidon(DOMAIN_NULLIFIER, seed)`
    pub fn nullifier(&self) -> Result<[u8; 32]> {
        validate_non_zero(&self.nullifier_seed, "nullifier seed")?;
        poseidon_hash_with_domain(DOMAIN_NULLIFIER, &[&self.nullifier_seed])
    }

    /// `Poseidon(DOMAIN_COMMIT, seed, secret, amount, asset_id)`
    pub fn commitment(&self) -> Result<[u8; 32]> {
        self.validate()?;
        let amount_bytes = field_from_u64(self.amount);
        poseidon_hash_with_domain(
            DOMAIN_COMMIT,
            &[
                &self.nullifier_seed,
                &self.secret,
                &amount_bytes,
                &self.asset_id,
            ],
        )
    }

    pub fn set_leaf_index(&mut self, index: u64) {
        self.leaf_index = Some(index);
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Crypto(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Crypto(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_is_deterministic_and_binding() {
        let voucher = Voucher::new(1_000, [1u8; 32]);

        assert_eq!(voucher.commitment().unwrap(), voucher.commitment().unwrap());

        let mut other = voucher.clone();
        other.secret = random_field_element();
        assert_ne!(voucher.commitment().unwrap(), other.commitment().unwrap());

        let mut other_asset = voucher.clone();
        other_asset.asset_id = [2u8; 32];
        assert_ne!(
            voucher.commitment().unwrap(),
            other_asset.commitment().unwrap()
        );
    }

    #[test]
    fn nullifier_differs_from_commitment() {
        let voucher = Voucher::new(1_000, [1u8; 32]);
        assert_ne!(voucher.nullifier().unwrap(), voucher.commitment().unwrap());
    }

    #[test]
    fn zero_amount_rejected() {
        let mut voucher = Voucher::new(1_000, [1u8; 32]);
        voucher.amount = 0;
        assert!(voucher.validate().is_err());
        assert!(voucher.commitment().is_err());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut voucher = Voucher::new(42, [7u8; 32]);
        voucher.set_leaf_index(9);

        let bytes = voucher.to_bytes().unwrap();
        let restored = Voucher::from_bytes(&bytes).unwrap();
        assert_eq!(voucher.secret, restored.secret);
        assert_eq!(voucher.nullifier_seed, restored.nullifier_seed);
        assert_eq!(restored.leaf_index, Some(9));
    }
}
