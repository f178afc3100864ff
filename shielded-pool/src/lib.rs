//! Shielded-value pool over BN254.
//!
//! This crate contains:
//! - Field encoding, the Poseidon commitment hash, notes and the note Merkle tree.
//! - Keypairs, stealth addresses and the Hash2 ownership circuit with its Groth16 prover.
//! - The pool state machine (`transact`, `collect`, trustless withdrawal) behind
//!   verifier and token-ledger seams.
//! - The cross-domain message coordinator used by trustless withdrawal.

pub mod circuit;
pub mod client;
pub mod config;
pub mod constants;
pub mod deployment;
pub mod error;
pub mod events;
pub mod field;
pub mod groth16;
pub mod hash;
pub mod keys;
pub mod merkle;
pub mod note;
pub mod pool;
pub mod state;
pub mod token;
pub mod types;
pub mod verifier;
pub mod withdrawal;

pub use config::{CollectMode, PoolConfig};
pub use deployment::Address;
pub use error::PoolError;
pub use events::PoolEvent;
pub use keys::{Keypair, StealthOwner};
pub use merkle::NoteMerkleTree;
pub use note::Note;
pub use pool::{CollectReceipt, CollectRequest, FinalizeOutcome, Pool};
pub use token::{InMemoryLedger, TokenLedger};
pub use verifier::{ProofVerifier, VerifierFamily, VerifierSet};
pub use withdrawal::{Envelope, WithdrawalMessage};
