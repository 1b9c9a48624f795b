use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::auth::{AccessControl, Address};
use crate::error::{ProtocolError, Result};
use crate::hash::{self, TREE_DEPTH};

/// Size of the root recency ring buffer. Membership in the permanent
/// known-root set does not expire when the buffer wraps.
pub const ROOT_HISTORY_SIZE: usize = 64;

/// Maximum number of commitments the ledger can hold.
pub const LEDGER_CAPACITY: u64 = 1 << TREE_DEPTH;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    CommitmentInserted {
        commitment: [u8; 32],
        leaf_index: u64,
    },
    RootSubmitted {
        root: [u8; 32],
        leaf_count: u64,
    },
}

/// Append-only commitment ledger with externally-verifiable root history.
///
/// The ledger is the canonical source of truth: any root it accepts must be
/// reproducible by replaying the commitment sequence through the tree
/// builder. The ledger itself never hashes; roots arrive from the
/// designated submitter.
pub struct CommitmentLedger {
    access: AccessControl,
    commitments: Vec<[u8; 32]>,
    current_root: [u8; 32],
    recent_roots: [[u8; 32]; ROOT_HISTORY_SIZE],
    write_index: usize,
    known_roots: HashSet<[u8; 32]>,
    events: Vec<LedgerEvent>,
}

impl CommitmentLedger {
    pub fn new(owner: Address, root_submitter: Address) -> Self {
        let initial_root = hash::empty_root();
        let mut recent_roots = [[0u8; 32]; ROOT_HISTORY_SIZE];
        recent_roots[0] = initial_root;

        let mut known_roots = HashSet::new();
        known_roots.insert(initial_root);

        Self {
            access: AccessControl::new(owner, root_submitter),
            commitments: Vec::new(),
            current_root: initial_root,
            recent_roots,
            write_index: 1,
            known_roots,
            events: Vec::new(),
        }
    }

    /// Append a commitment. Callable by allow-listed inserters or the owner.
    pub fn insert(&mut self, caller: Address, commitment: [u8; 32]) -> Result<u64> {
        self.access.require_inserter(caller)?;
        self.ensure_capacity()?;

        let leaf_index = self.commitments.len() as u64;
        self.commitments.push(commitment);
        self.events.push(LedgerEvent::CommitmentInserted {
            commitment,
            leaf_index,
        });
        debug!(
            "inserted commitment {} at leaf index {}",
            hex::encode(commitment),
            leaf_index
        );
        Ok(leaf_index)
    }

    /// Advance the active root. `leaf_count` must match the ledger length
    /// the root was computed for, exactly.
    pub fn submit_root(
        &mut self,
        caller: Address,
        new_root: [u8; 32],
        leaf_count: u64,
    ) -> Result<()> {
        self.access.require_root_submitter(caller)?;

        let current = self.commitments.len() as u64;
        if leaf_count != current {
            return Err(ProtocolError::StaleOrMismatchedState {
                computed_at: leaf_count,
                current,
            });
        }
        if new_root == self.current_root {
            return Err(ProtocolError::DuplicateSubmission);
        }

        self.activate_root(new_root, leaf_count);
        Ok(())
    }

    /// Atomic insert + root update for a trusted fast-path relayer.
    pub fn insert_and_update_root(
        &mut self,
        caller: Address,
        commitment: [u8; 32],
        new_root: [u8; 32],
    ) -> Result<u64> {
        self.access.require_root_submitter(caller)?;
        self.ensure_capacity()?;
        if new_root == self.current_root {
            return Err(ProtocolError::DuplicateSubmission);
        }

        let leaf_index = self.commitments.len() as u64;
        self.commitments.push(commitment);
        self.events.push(LedgerEvent::CommitmentInserted {
            commitment,
            leaf_index,
        });
        self.activate_root(new_root, self.commitments.len() as u64);
        Ok(leaf_index)
    }

    fn activate_root(&mut self, root: [u8; 32], leaf_count: u64) {
        self.current_root = root;
        self.recent_roots[self.write_index % ROOT_HISTORY_SIZE] = root;
        self.write_index = (self.write_index + 1) % ROOT_HISTORY_SIZE;
        self.known_roots.insert(root);
        self.events.push(LedgerEvent::RootSubmitted { root, leaf_count });
        info!(
            "root advanced to {} at {} leaves",
            hex::encode(root),
            leaf_count
        );
    }

    fn ensure_capacity(&self) -> Result<()> {
        if self.commitments.len() as u64 >= LEDGER_CAPACITY {
            return Err(ProtocolError::CapacityExceeded(LEDGER_CAPACITY));
        }
        Ok(())
    }

    /// Pre-flight check for hosts that must guarantee a later insert in the
    /// same atomic operation cannot fail.
    pub fn ensure_insertable(&self, caller: Address) -> Result<()> {
        self.access.require_inserter(caller)?;
        self.ensure_capacity()
    }

    /// O(1) membership test against the permanent known-root set.
    pub fn is_known_root(&self, root: &[u8; 32]) -> bool {
        self.known_roots.contains(root)
    }

    /// Indexed read into the bounded recency buffer; wraps modulo
    /// `ROOT_HISTORY_SIZE`. A convenience view, distinct from
    /// `is_known_root`.
    pub fn historical_root(&self, index: usize) -> [u8; 32] {
        self.recent_roots[index % ROOT_HISTORY_SIZE]
    }

    /// Merkle path verification is the redemption circuit's job; the ledger
    /// keeps no hashing on its own execution path.
    pub fn verify_proof(
        &self,
        _leaf: &[u8; 32],
        _merkle_path: &[[u8; 32]],
        _path_indices: &[u8],
    ) -> Result<()> {
        Err(ProtocolError::Unsupported(
            "merkle path verification is delegated to the redemption circuit",
        ))
    }

    pub fn root(&self) -> [u8; 32] {
        self.current_root
    }

    pub fn next_leaf_index(&self) -> u64 {
        self.commitments.len() as u64
    }

    pub fn commitment_count(&self) -> u64 {
        self.commitments.len() as u64
    }

    pub fn commitment(&self, index: u64) -> Result<[u8; 32]> {
        self.commitments
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                ProtocolError::InvalidInput(format!(
                    "leaf index {} out of range ({} commitments)",
                    index,
                    self.commitments.len()
                ))
            })
    }

    /// Bounded range read for replay by external parties. The range is
    /// clamped to the ledger length.
    pub fn commitments(&self, start: u64, count: u64) -> Vec<[u8; 32]> {
        let len = self.commitments.len() as u64;
        let start = start.min(len) as usize;
        let end = (start as u64).saturating_add(count).min(len) as usize;
        self.commitments[start..end].to_vec()
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn authorize_inserter(&mut self, caller: Address, who: Address) -> Result<()> {
        self.access.allow_inserter(caller, who)
    }

    pub fn revoke_inserter(&mut self, caller: Address, who: Address) -> Result<()> {
        self.access.revoke_inserter(caller, who)
    }

    pub fn set_root_submitter(&mut self, caller: Address, who: Address) -> Result<()> {
        self.access.set_root_submitter(caller, who)
    }
}
