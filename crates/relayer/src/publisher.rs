use tracing::{debug, info, warn};

use ghostpool_protocol::{builder, Address, ProtocolError, SharedLedger};

use crate::error::{RelayerError, Result};

/// Replays the ledger through the off-chain tree builder and submits fresh
/// roots as the designated submitter. A misbehaving publisher can only
/// delay a root, never forge one: any verifier replaying the same
/// commitment sequence computes the same root.
pub struct RootPublisher {
    ledger: SharedLedger,
    submitter: Address,
}

impl RootPublisher {
    pub fn new(ledger: SharedLedger, submitter: Address) -> Self {
        Self { ledger, submitter }
    }

    /// Rebuild the root for the current commitment sequence and submit it.
    /// Returns the newly active root, or `None` when the root is already
    /// current.
    pub fn publish(&self) -> Result<Option<[u8; 32]>> {
        let (commitments, leaf_count, current_root) = {
            let ledger = self
                .ledger
                .read()
                .map_err(|_| RelayerError::Internal("ledger lock poisoned".into()))?;
            (
                ledger.commitments(0, u64::MAX),
                ledger.next_leaf_index(),
                ledger.root(),
            )
        };

        let root = builder::compute_root(&commitments)?;
        if root == current_root {
            debug!("root unchanged at {} leaves", leaf_count);
            return Ok(None);
        }

        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| RelayerError::Internal("ledger lock poisoned".into()))?;
        match ledger.submit_root(self.submitter, root, leaf_count) {
            Ok(()) => {
                info!(
                    "published root {} at {} leaves",
                    hex::encode(root),
                    leaf_count
                );
                Ok(Some(root))
            }
            // Inserts landed between replay and submission; the next pass
            // replays them.
            Err(ProtocolError::StaleOrMismatchedState { .. }) => {
                warn!("ledger advanced during replay, skipping root submission");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghostpool_protocol::CommitmentLedger;
    use std::sync::{Arc, RwLock};

    const OWNER: Address = Address([1u8; 32]);
    const RELAYER: Address = Address([2u8; 32]);

    #[test]
    fn publishes_once_per_ledger_state() {
        let mut ledger = CommitmentLedger::new(OWNER, RELAYER);
        ledger.authorize_inserter(OWNER, RELAYER).unwrap();
        let ledger: SharedLedger = Arc::new(RwLock::new(ledger));

        let publisher = RootPublisher::new(ledger.clone(), RELAYER);

        // Nothing to publish for the empty ledger.
        assert!(publisher.publish().unwrap().is_none());

        ledger.write().unwrap().insert(RELAYER, [7u8; 32]).unwrap();
        let root = publisher.publish().unwrap().expect("fresh root");
        assert!(ledger.read().unwrap().is_known_root(&root));
        assert_eq!(ledger.read().unwrap().root(), root);

        // Idempotent until the ledger changes again.
        assert!(publisher.publish().unwrap().is_none());

        ledger.write().unwrap().insert(RELAYER, [8u8; 32]).unwrap();
        let root2 = publisher.publish().unwrap().expect("fresh root");
        assert_ne!(root, root2);
        assert!(ledger.read().unwrap().is_known_root(&root));
    }
}
