use sha2::{Digest, Sha256};
use std::path::PathBuf;

use ghostpool_protocol::Address;

#[derive(Clone)]
pub struct RelayerConfig {
    pub host: String,
    pub port: u16,
    /// Directory the ledger snapshot lives in.
    pub state_path: PathBuf,
    /// Seconds between root publications.
    pub publish_interval_secs: u64,
    /// Owner principal of the ledger, registry and coordinator.
    pub owner: Address,
    /// The relayer's own principal: allow-listed inserter/spender and the
    /// designated root submitter.
    pub relayer: Address,
    pub asset_id: [u8; 32],
    /// Balance minted to the owner at startup (bridge stand-in).
    pub initial_funding: u64,
    /// PROOF_MODE=accept skips proof verification entirely. Development
    /// only; the default rejects every proof until a verifier is wired in.
    pub accept_dev_proofs: bool,
}

impl RelayerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let state_path = std::env::var("STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ledger_state"));

        let publish_interval_secs = std::env::var("PUBLISH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let owner = address_from_env("OWNER_ADDRESS", "owner")?;
        let relayer = address_from_env("RELAYER_ADDRESS", "relayer")?;
        let asset_id = element_from_env("ASSET_ID", "asset")?;

        let initial_funding = std::env::var("INITIAL_FUNDING")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let accept_dev_proofs = std::env::var("PROOF_MODE")
            .map(|s| s.eq_ignore_ascii_case("accept"))
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            state_path,
            publish_interval_secs,
            owner,
            relayer,
            asset_id,
            initial_funding,
            accept_dev_proofs,
        })
    }
}

/// Deterministic 32-byte element for unset development config.
fn dev_element(label: &str) -> [u8; 32] {
    let digest = Sha256::digest(format!("ghostpool-dev:{}", label).as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn address_from_env(var: &str, label: &str) -> anyhow::Result<Address> {
    match std::env::var(var) {
        Ok(s) => Address::from_hex(&s)
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", var, e)),
        Err(_) => {
            tracing::warn!("{} not set, deriving a development address", var);
            Ok(Address(dev_element(label)))
        }
    }
}

fn element_from_env(var: &str, label: &str) -> anyhow::Result<[u8; 32]> {
    match std::env::var(var) {
        Ok(s) => {
            let bytes = hex::decode(&s)
                .map_err(|e| anyhow::anyhow!("invalid {}: {}", var, e))?;
            bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("{} must be 32 bytes", var))
        }
        Err(_) => Ok(dev_element(label)),
    }
}
