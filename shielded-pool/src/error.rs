//! Errors surfaced by pool entry points.
//!
//! Every variant leaves the pool exactly as it was before the call.

use crate::deployment::Address;
use crate::merkle::MerkleError;
use crate::types::PublicInputError;
use crate::verifier::VerifierFamily;
use crate::withdrawal::MessageError;
use ark_bn254::Fr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("{0} proof rejected")]
    InvalidProof(VerifierFamily),

    #[error("nullifier {0} already spent")]
    NullifierAlreadySpent(Fr),

    #[error("note commitment {0} was already collected")]
    CommitmentAlreadyCollected(Fr),

    #[error("root mismatch: expected {expected}, got {got}")]
    RootMismatch { expected: Fr, got: Fr },

    #[error("accumulator capacity exceeded ({capacity} leaves)")]
    CapacityExceeded { capacity: u64 },

    #[error("token transfer failed: {0}")]
    TokenTransferFailed(String),

    #[error("withdrawal {key} expired at {expires_at}")]
    WithdrawalExpired { key: Fr, expires_at: String },

    #[error("withdrawal {key} can be cancelled from {cancellable_at}")]
    WithdrawalNotExpired { key: Fr, cancellable_at: String },

    #[error("withdrawal {0} is not pending")]
    UnknownWithdrawal(Fr),

    #[error("malformed public inputs: {0}")]
    MalformedPublicInputs(#[from] PublicInputError),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("token {0} is not accepted by this pool")]
    UnsupportedToken(Address),

    #[error("{0} is not authorized")]
    Unauthorized(Address),

    #[error("cross-domain message rejected: {0}")]
    Message(#[from] MessageError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<MerkleError> for PoolError {
    fn from(e: MerkleError) -> Self {
        match e {
            MerkleError::CapacityExceeded { capacity } => PoolError::CapacityExceeded { capacity },
            other => PoolError::Config(other.to_string()),
        }
    }
}
