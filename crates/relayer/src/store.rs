use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::error::{RelayerError, Result};

/// Checksummed snapshot of the protocol-critical state: the commitment
/// sequence (roots are rebuildable from it) and the spent-nullifier set.
/// Balances and counters belong to the bridge layer and are not persisted.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    commitments: Vec<[u8; 32]>,
    nullifiers: Vec<[u8; 32]>,
    checksum: [u8; 32],
}

impl Snapshot {
    fn compute_checksum(commitments: &[[u8; 32]], nullifiers: &[[u8; 32]]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"ghostpool_ledger_state_v1:");
        hasher.update((commitments.len() as u64).to_le_bytes());
        for commitment in commitments {
            hasher.update(commitment);
        }
        hasher.update((nullifiers.len() as u64).to_le_bytes());
        for nullifier in nullifiers {
            hasher.update(nullifier);
        }
        let result = hasher.finalize();

        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&result);
        checksum
    }

    fn new(commitments: Vec<[u8; 32]>, nullifiers: Vec<[u8; 32]>) -> Self {
        let checksum = Self::compute_checksum(&commitments, &nullifiers);
        Self {
            commitments,
            nullifiers,
            checksum,
        }
    }

    fn verify(&self) -> bool {
        Self::compute_checksum(&self.commitments, &self.nullifiers) == self.checksum
    }
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        if let Err(e) = std::fs::create_dir_all(&path) {
            warn!("Failed to create state directory: {}", e);
        }
        Self { path }
    }

    fn file_path(&self) -> PathBuf {
        self.path.join("ledger_state.json")
    }

    pub fn load(&self) -> Option<(Vec<[u8; 32]>, Vec<[u8; 32]>)> {
        let path = self.file_path();
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<Snapshot>(&data) {
                Ok(snapshot) if snapshot.verify() => {
                    info!(
                        "Loaded {} commitments and {} spent nullifiers (verified)",
                        snapshot.commitments.len(),
                        snapshot.nullifiers.len()
                    );
                    Some((snapshot.commitments, snapshot.nullifiers))
                }
                Ok(_) => {
                    error!("Checksum mismatch in ledger snapshot - data corrupted");
                    None
                }
                Err(e) => {
                    error!("Failed to parse ledger snapshot: {}", e);
                    None
                }
            },
            Err(e) => {
                error!("Failed to read ledger snapshot: {}", e);
                None
            }
        }
    }

    pub fn save(&self, commitments: &[[u8; 32]], nullifiers: &[[u8; 32]]) -> Result<()> {
        let snapshot = Snapshot::new(commitments.to_vec(), nullifiers.to_vec());
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| RelayerError::Store(format!("Serialize failed: {}", e)))?;

        let path = self.file_path();
        let temp_path = path.with_extension("tmp");

        std::fs::write(&temp_path, &json)
            .map_err(|e| RelayerError::Store(format!("Write failed: {}", e)))?;
        std::fs::rename(&temp_path, &path)
            .map_err(|e| RelayerError::Store(format!("Rename failed: {}", e)))?;

        Ok(())
    }
}
