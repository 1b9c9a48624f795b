//! Redemption coordinator: the ghost / redeem / redeem_partial state
//! machine over a shared commitment ledger and nullifier registry.
//!
//! Several coordinators (one per asset) may share one ledger and registry;
//! each acts against them under its own principal, which the host
//! allow-lists for insert/mark. Every mutating operation holds the write
//! locks for its full duration (ledger before registry) and either fully
//! commits or fully aborts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::auth::Address;
use crate::error::{ProtocolError, Result};
use crate::ledger::CommitmentLedger;
use crate::nullifier::NullifierRegistry;
use crate::verifier::{
    PartialRedemptionPublicInputs, ProofVerifier, RedemptionPublicInputs, ZkProof,
};

pub type SharedLedger = Arc<RwLock<CommitmentLedger>>;
pub type SharedNullifiers = Arc<RwLock<NullifierRegistry>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionEvent {
    Ghosted {
        caller: Address,
        amount: u64,
        commitment: [u8; 32],
        leaf_index: u64,
    },
    Redeemed {
        submitter: Address,
        recipient: Address,
        amount: u64,
        nullifier: [u8; 32],
    },
    PartiallyRedeemed {
        submitter: Address,
        recipient: Address,
        amount: u64,
        nullifier: [u8; 32],
        change_leaf_index: Option<u64>,
    },
    Funded {
        account: Address,
        amount: u64,
    },
}

pub struct RedemptionCoordinator {
    /// Principal this coordinator acts under against the ledger/registry.
    principal: Address,
    owner: Address,
    asset_id: [u8; 32],
    ledger: SharedLedger,
    nullifiers: SharedNullifiers,
    verifier: Arc<dyn ProofVerifier>,
    balances: HashMap<Address, u64>,
    total_ghosted: u64,
    total_redeemed: u64,
    events: Vec<RedemptionEvent>,
}

impl RedemptionCoordinator {
    pub fn new(
        principal: Address,
        owner: Address,
        asset_id: [u8; 32],
        ledger: SharedLedger,
        nullifiers: SharedNullifiers,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Self {
        Self {
            principal,
            owner,
            asset_id,
            ledger,
            nullifiers,
            verifier,
            balances: HashMap::new(),
            total_ghosted: 0,
            total_redeemed: 0,
            events: Vec::new(),
        }
    }

    /// Convert transferable balance into a hidden claim. Ghosting is
    /// deliberately public; privacy derives entirely from the
    /// unlinkability of the later redemption.
    pub fn ghost(&mut self, caller: Address, amount: u64, commitment: [u8; 32]) -> Result<u64> {
        if amount == 0 {
            return Err(ProtocolError::InvalidInput("amount must be non-zero".into()));
        }
        let balance = self.balance_of(caller);
        if balance < amount {
            return Err(ProtocolError::InsufficientBalance {
                available: balance,
                required: amount,
            });
        }
        let new_total = self
            .total_ghosted
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;

        let leaf_index = self.ledger_write()?.insert(self.principal, commitment)?;

        self.balances.insert(caller, balance - amount);
        self.total_ghosted = new_total;
        self.events.push(RedemptionEvent::Ghosted {
            caller,
            amount,
            commitment,
            leaf_index,
        });
        info!(
            "ghosted {} from {} as commitment {} (leaf {})",
            amount,
            caller,
            hex::encode(commitment),
            leaf_index
        );
        Ok(leaf_index)
    }

    /// Redeem a voucher in full. The gate order is a security invariant:
    /// the nullifier is marked spent strictly before the recipient is
    /// credited, closing the double-mint window.
    #[allow(clippy::too_many_arguments)]
    pub fn redeem(
        &mut self,
        submitter: Address,
        amount: u64,
        recipient: Address,
        nullifier: [u8; 32],
        root: [u8; 32],
        merkle_path: &[[u8; 32]],
        path_indices: &[u8],
        proof: &ZkProof,
    ) -> Result<()> {
        self.check_amount_and_recipient(amount, recipient)?;
        let (new_balance, new_total) = self.prepared_credit(recipient, amount)?;

        let ledger = self.ledger_read()?;
        let mut spent = self.nullifiers_write()?;

        if spent.is_spent(&nullifier) {
            return Err(ProtocolError::AlreadySpent);
        }
        if !ledger.is_known_root(&root) {
            return Err(ProtocolError::UnknownRoot);
        }

        let inputs = RedemptionPublicInputs {
            root,
            nullifier,
            amount,
            asset_id: self.asset_id,
            recipient,
        };
        if !self
            .verifier
            .verify_redemption(proof, &inputs, merkle_path, path_indices)
        {
            return Err(ProtocolError::ProofRejected);
        }

        spent.mark_spent(self.principal, nullifier)?;
        drop(spent);
        drop(ledger);

        self.balances.insert(recipient, new_balance);
        self.total_redeemed = new_total;
        self.events.push(RedemptionEvent::Redeemed {
            submitter,
            recipient,
            amount,
            nullifier,
        });
        info!(
            "redeemed {} to {} (submitted by {})",
            amount, recipient, submitter
        );
        Ok(())
    }

    /// Redeem part of a voucher, carrying the remainder forward as a fresh
    /// change commitment. This is the only path by which redemption grows
    /// the ledger. Returns the change commitment's leaf index, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn redeem_partial(
        &mut self,
        submitter: Address,
        redeem_amount: u64,
        original_amount: u64,
        recipient: Address,
        old_nullifier: [u8; 32],
        new_commitment: [u8; 32],
        root: [u8; 32],
        merkle_path: &[[u8; 32]],
        path_indices: &[u8],
        proof: &ZkProof,
    ) -> Result<Option<u64>> {
        self.check_amount_and_recipient(redeem_amount, recipient)?;
        if redeem_amount > original_amount {
            return Err(ProtocolError::AmountInvariantViolated {
                redeem: redeem_amount,
                original: original_amount,
            });
        }
        let change = original_amount - redeem_amount;
        let (new_balance, new_total) = self.prepared_credit(recipient, redeem_amount)?;

        let mut ledger = self.ledger_write()?;
        let mut spent = self.nullifiers_write()?;

        if spent.is_spent(&old_nullifier) {
            return Err(ProtocolError::AlreadySpent);
        }
        if !ledger.is_known_root(&root) {
            return Err(ProtocolError::UnknownRoot);
        }

        let inputs = PartialRedemptionPublicInputs {
            root,
            old_nullifier,
            redeem_amount,
            asset_id: self.asset_id,
            recipient,
            original_amount,
            new_commitment,
        };
        if !self
            .verifier
            .verify_partial_redemption(proof, &inputs, merkle_path, path_indices)
        {
            return Err(ProtocolError::ProofRejected);
        }

        // The change insert must not be able to fail once the nullifier is
        // marked.
        if change > 0 {
            ledger.ensure_insertable(self.principal)?;
        }

        spent.mark_spent(self.principal, old_nullifier)?;
        drop(spent);

        let change_leaf_index = if change > 0 {
            Some(ledger.insert(self.principal, new_commitment)?)
        } else {
            None
        };
        drop(ledger);

        self.balances.insert(recipient, new_balance);
        self.total_redeemed = new_total;
        self.events.push(RedemptionEvent::PartiallyRedeemed {
            submitter,
            recipient,
            amount: redeem_amount,
            nullifier: old_nullifier,
            change_leaf_index,
        });
        info!(
            "partially redeemed {} of {} to {} (change leaf: {:?})",
            redeem_amount, original_amount, recipient, change_leaf_index
        );
        Ok(change_leaf_index)
    }

    /// Owner-gated entry point for transferable value; stands in for the
    /// external bridge.
    pub fn fund(&mut self, caller: Address, account: Address, amount: u64) -> Result<u64> {
        if caller != self.owner {
            return Err(ProtocolError::Unauthorized("caller is not the owner"));
        }
        if amount == 0 {
            return Err(ProtocolError::InvalidInput("amount must be non-zero".into()));
        }
        let balance = self.balance_of(account);
        let new_balance = balance
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        self.balances.insert(account, new_balance);
        self.events
            .push(RedemptionEvent::Funded { account, amount });
        info!("funded {} with {}", account, amount);
        Ok(new_balance)
    }

    fn check_amount_and_recipient(&self, amount: u64, recipient: Address) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidInput("amount must be non-zero".into()));
        }
        if recipient.is_zero() {
            return Err(ProtocolError::InvalidInput(
                "recipient must be a non-zero address".into(),
            ));
        }
        Ok(())
    }

    /// Pre-compute the post-credit balance and counter so that nothing can
    /// fail after the nullifier mark.
    fn prepared_credit(&self, recipient: Address, amount: u64) -> Result<(u64, u64)> {
        let new_balance = self
            .balance_of(recipient)
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        let new_total = self
            .total_redeemed
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        Ok((new_balance, new_total))
    }

    pub fn balance_of(&self, account: Address) -> u64 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    pub fn total_ghosted(&self) -> u64 {
        self.total_ghosted
    }

    pub fn total_redeemed(&self) -> u64 {
        self.total_redeemed
    }

    /// `total_ghosted - total_redeemed`; never negative.
    pub fn outstanding(&self) -> u64 {
        self.total_ghosted - self.total_redeemed
    }

    pub fn asset_id(&self) -> [u8; 32] {
        self.asset_id
    }

    pub fn principal(&self) -> Address {
        self.principal
    }

    pub fn drain_events(&mut self) -> Vec<RedemptionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[RedemptionEvent] {
        &self.events
    }

    fn ledger_read(&self) -> Result<RwLockReadGuard<'_, CommitmentLedger>> {
        self.ledger
            .read()
            .map_err(|_| ProtocolError::Internal("commitment ledger lock poisoned".into()))
    }

    fn ledger_write(&self) -> Result<RwLockWriteGuard<'_, CommitmentLedger>> {
        self.ledger
            .write()
            .map_err(|_| ProtocolError::Internal("commitment ledger lock poisoned".into()))
    }

    fn nullifiers_write(&self) -> Result<RwLockWriteGuard<'_, NullifierRegistry>> {
        self.nullifiers
            .write()
            .map_err(|_| ProtocolError::Internal("nullifier registry lock poisoned".into()))
    }
}
