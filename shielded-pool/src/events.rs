//! Events emitted by committed pool calls.
//!
//! Indexers and the cross-domain relayer learn about state changes only from these.

use crate::deployment::Address;
use ark_bn254::Fr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A commitment and the leaf index it landed at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedLeaf {
    pub index: u64,
    #[serde(with = "crate::field::hex_serde")]
    pub commitment: Fr,
}

/// Serialised internally tagged (`"kind"`), so it is write-only: serde cannot buffer
/// the 128-bit amounts back out of a tagged map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolEvent {
    Transacted {
        #[serde(with = "crate::field::hex_serde")]
        old_root: Fr,
        #[serde(with = "crate::field::hex_serde")]
        new_root: Fr,
        #[serde(with = "crate::field::hex_vec_serde")]
        nullifiers: Vec<Fr>,
        commitments: Vec<InsertedLeaf>,
        external_amount: i128,
    },
    Collected {
        token: Address,
        stealth_address: Address,
        amount: u128,
        #[serde(with = "crate::field::hex_serde")]
        commitment: Fr,
        leaf_index: u64,
        #[serde(with = "crate::field::hex_serde")]
        root: Fr,
    },
    TrustlessWithdrawInit {
        #[serde(with = "crate::field::hex_serde")]
        key: Fr,
        #[serde(with = "crate::field::hex_serde")]
        nullifier: Fr,
        amount: u128,
        recipient: Address,
        destination_domain: u32,
        expires_at: DateTime<Utc>,
    },
    TrustlessWithdrawFinalized {
        #[serde(with = "crate::field::hex_serde")]
        key: Fr,
        origin_domain: u32,
        amount: u128,
        recipient: Address,
    },
    TrustlessWithdrawAcknowledged {
        #[serde(with = "crate::field::hex_serde")]
        key: Fr,
        #[serde(with = "crate::field::hex_serde")]
        nullifier: Fr,
    },
    TrustlessWithdrawCancelled {
        #[serde(with = "crate::field::hex_serde")]
        key: Fr,
        #[serde(with = "crate::field::hex_serde")]
        nullifier: Fr,
    },
    RemoteEnrolled {
        domain: u32,
        pool: Address,
    },
}

impl PoolEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PoolEvent::Transacted { .. } => "transacted",
            PoolEvent::Collected { .. } => "collected",
            PoolEvent::TrustlessWithdrawInit { .. } => "trustless_withdraw_init",
            PoolEvent::TrustlessWithdrawFinalized { .. } => "trustless_withdraw_finalized",
            PoolEvent::TrustlessWithdrawAcknowledged { .. } => "trustless_withdraw_acknowledged",
            PoolEvent::TrustlessWithdrawCancelled { .. } => "trustless_withdraw_cancelled",
            PoolEvent::RemoteEnrolled { .. } => "remote_enrolled",
        }
    }
}
