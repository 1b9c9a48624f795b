use std::collections::HashSet;
use tracing::debug;

use crate::auth::{AccessControl, Address};
use crate::error::{ProtocolError, Result};

/// Single-use-token tracker preventing double redemption.
///
/// Only the bare nullifier set is stored; nothing links a nullifier back
/// to a commitment or an amount.
pub struct NullifierRegistry {
    access: AccessControl,
    spent: HashSet<[u8; 32]>,
    spent_count: u64,
}

impl NullifierRegistry {
    pub fn new(owner: Address) -> Self {
        Self {
            access: AccessControl::new(owner, owner),
            spent: HashSet::new(),
            spent_count: 0,
        }
    }

    pub fn is_spent(&self, nullifier: &[u8; 32]) -> bool {
        self.spent.contains(nullifier)
    }

    pub fn batch_is_spent(&self, nullifiers: &[[u8; 32]]) -> Vec<bool> {
        nullifiers.iter().map(|n| self.is_spent(n)).collect()
    }

    /// Mark a nullifier spent. Irreversible; a marked nullifier can never
    /// be un-marked.
    pub fn mark_spent(&mut self, caller: Address, nullifier: [u8; 32]) -> Result<()> {
        if nullifier == [0u8; 32] {
            return Err(ProtocolError::InvalidInput(
                "the zero nullifier is reserved".into(),
            ));
        }
        if self.spent.contains(&nullifier) {
            return Err(ProtocolError::AlreadySpent);
        }
        self.access.require_spender(caller)?;

        self.spent.insert(nullifier);
        self.spent_count += 1;
        debug!("nullifier {} marked spent", hex::encode(nullifier));
        Ok(())
    }

    pub fn spent_count(&self) -> u64 {
        self.spent_count
    }

    /// Snapshot of the spent set, for host-side persistence.
    pub fn snapshot(&self) -> Vec<[u8; 32]> {
        self.spent.iter().copied().collect()
    }

    pub fn authorize_spender(&mut self, caller: Address, who: Address) -> Result<()> {
        self.access.allow_spender(caller, who)
    }

    pub fn revoke_spender(&mut self, caller: Address, who: Address) -> Result<()> {
        self.access.revoke_spender(caller, who)
    }
}
