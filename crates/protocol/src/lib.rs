pub mod auth;
pub mod builder;
pub mod coordinator;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod nullifier;
pub mod verifier;
pub mod voucher;

pub use auth::{AccessControl, Address};
pub use coordinator::{RedemptionCoordinator, RedemptionEvent, SharedLedger, SharedNullifiers};
pub use error::{ProtocolError, Result};
pub use ledger::{CommitmentLedger, LedgerEvent, LEDGER_CAPACITY, ROOT_HISTORY_SIZE};
pub use nullifier::NullifierRegistry;
pub use verifier::{
    PartialRedemptionPublicInputs, ProofVerifier, RedemptionPublicInputs, StubVerifier, ZkProof,
};
pub use voucher::Voucher;
