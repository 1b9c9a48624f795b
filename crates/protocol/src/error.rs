use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("ledger capacity of {0} leaves exceeded")]
    CapacityExceeded(u64),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("stale or mismatched state: root computed at {computed_at} leaves, ledger has {current}")]
    StaleOrMismatchedState { computed_at: u64, current: u64 },

    #[error("root is already active")]
    DuplicateSubmission,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("nullifier already spent")]
    AlreadySpent,

    #[error("unknown merkle root")]
    UnknownRoot,

    #[error("proof rejected by verifier")]
    ProofRejected,

    #[error("redeem amount {redeem} exceeds original amount {original}")]
    AmountInvariantViolated { redeem: u64, original: u64 },

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("internal error: {0}")]
    Internal(String),
}
