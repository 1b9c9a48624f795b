//! Proof verifier boundary.
//!
//! The coordinator treats proof verification as a boolean oracle: `true`
//! means "the prover knows a secret consistent with some ledger member
//! whose derived nullifier matches, without revealing which member". The
//! public-input ordering below is contractual and must round-trip
//! byte-for-byte with the circuit that produced the proof.

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::auth::Address;
use crate::error::{ProtocolError, Result};
use crate::hash::field_from_u64;

/// Serialized proof length: a (64) + b (128) + c (64).
pub const PROOF_BYTES: usize = 256;

/// Groth16-shaped opaque proof.
#[derive(Clone, Serialize, Deserialize)]
pub struct ZkProof {
    #[serde(with = "BigArray")]
    pub a: [u8; 64],
    #[serde(with = "BigArray")]
    pub b: [u8; 128],
    #[serde(with = "BigArray")]
    pub c: [u8; 64],
}

impl ZkProof {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PROOF_BYTES {
            return Err(ProtocolError::InvalidInput(format!(
                "proof must be {} bytes, got {}",
                PROOF_BYTES,
                bytes.len()
            )));
        }
        let mut a = [0u8; 64];
        let mut b = [0u8; 128];
        let mut c = [0u8; 64];
        a.copy_from_slice(&bytes[..64]);
        b.copy_from_slice(&bytes[64..192]);
        c.copy_from_slice(&bytes[192..]);
        Ok(Self { a, b, c })
    }

    pub fn to_bytes(&self) -> [u8; PROOF_BYTES] {
        let mut out = [0u8; PROOF_BYTES];
        out[..64].copy_from_slice(&self.a);
        out[64..192].copy_from_slice(&self.b);
        out[192..].copy_from_slice(&self.c);
        out
    }
}

/// Public inputs for a full redemption.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedemptionPublicInputs {
    pub root: [u8; 32],
    pub nullifier: [u8; 32],
    pub amount: u64,
    pub asset_id: [u8; 32],
    pub recipient: Address,
}

impl RedemptionPublicInputs {
    /// Ordered field elements, exactly as the circuit consumes them:
    /// root, nullifier, amount, asset_id, recipient.
    pub fn to_field_elements(&self) -> Vec<[u8; 32]> {
        vec![
            self.root,
            self.nullifier,
            field_from_u64(self.amount),
            self.asset_id,
            self.recipient.0,
        ]
    }
}

/// Public inputs for a partial redemption with a change commitment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartialRedemptionPublicInputs {
    pub root: [u8; 32],
    pub old_nullifier: [u8; 32],
    pub redeem_amount: u64,
    pub asset_id: [u8; 32],
    pub recipient: Address,
    pub original_amount: u64,
    pub new_commitment: [u8; 32],
}

impl PartialRedemptionPublicInputs {
    /// Ordered field elements: root, old_nullifier, redeem_amount,
    /// asset_id, recipient, original_amount, redeem_amount, new_commitment.
    /// redeem_amount appears twice in the circuit layout; the repetition is
    /// contractual.
    pub fn to_field_elements(&self) -> Vec<[u8; 32]> {
        vec![
            self.root,
            self.old_nullifier,
            field_from_u64(self.redeem_amount),
            self.asset_id,
            self.recipient.0,
            field_from_u64(self.original_amount),
            field_from_u64(self.redeem_amount),
            self.new_commitment,
        ]
    }
}

/// Boolean oracle over redemption proofs. The merkle path material is
/// forwarded untouched; the core never inspects it.
pub trait ProofVerifier: Send + Sync {
    fn verify_redemption(
        &self,
        proof: &ZkProof,
        inputs: &RedemptionPublicInputs,
        merkle_path: &[[u8; 32]],
        path_indices: &[u8],
    ) -> bool;

    fn verify_partial_redemption(
        &self,
        proof: &ZkProof,
        inputs: &PartialRedemptionPublicInputs,
        merkle_path: &[[u8; 32]],
        path_indices: &[u8],
    ) -> bool;
}

/// Deterministic verifier for driving the coordinator without a proving
/// system: fixed verdict, or a scripted verdict sequence.
pub struct StubVerifier {
    default_verdict: bool,
    scripted: Mutex<VecDeque<bool>>,
}

impl StubVerifier {
    pub fn accept_all() -> Self {
        Self {
            default_verdict: true,
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn reject_all() -> Self {
        Self {
            default_verdict: false,
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Pop verdicts from the given sequence first, then fall back to
    /// `fallback`.
    pub fn scripted(verdicts: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            default_verdict: fallback,
            scripted: Mutex::new(verdicts.into_iter().collect()),
        }
    }

    fn next_verdict(&self) -> bool {
        match self.scripted.lock() {
            Ok(mut queue) => queue.pop_front().unwrap_or(self.default_verdict),
            Err(_) => self.default_verdict,
        }
    }
}

impl ProofVerifier for StubVerifier {
    fn verify_redemption(
        &self,
        _proof: &ZkProof,
        _inputs: &RedemptionPublicInputs,
        _merkle_path: &[[u8; 32]],
        _path_indices: &[u8],
    ) -> bool {
        self.next_verdict()
    }

    fn verify_partial_redemption(
        &self,
        _proof: &ZkProof,
        _inputs: &PartialRedemptionPublicInputs,
        _merkle_path: &[[u8; 32]],
        _path_indices: &[u8],
    ) -> bool {
        self.next_verdict()
    }
}
