use ark_bn254::Fr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shielded_pool::merkle::MerklePath;
use shielded_pool::state::WithdrawalStatus;
use shielded_pool::{Address, CollectMode, CollectRequest};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolInfoResponse {
    pub address: Address,
    pub domain: u32,
    pub token: Address,
    pub owner: Address,
    /// Collector init-code hash used to derive stealth addresses.
    pub init_code_hash_hex: String,
    #[serde(with = "shielded_pool::field::hex_serde")]
    pub current_root: Fr,
    pub leaf_count: u64,
    pub tree_depth: u8,
    pub collect_mode: CollectMode,
    pub custody: u128,
    pub version: u64,
    /// Verifier address per circuit family.
    pub verifiers: BTreeMap<String, Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TreePathResponse {
    #[serde(with = "shielded_pool::field::hex_serde")]
    pub leaf: Fr,
    #[serde(with = "shielded_pool::field::hex_serde")]
    pub root: Fr,
    pub path: MerklePath,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageParams {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventListResponse {
    pub offset: u64,
    pub limit: u64,
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: u64,
    /// keccak256 over the envelope fields, hex.
    pub envelope_id: String,
    pub envelope: shielded_pool::Envelope,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutboxListResponse {
    pub offset: u64,
    pub limit: u64,
    pub envelopes: Vec<OutboxRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ZkVkResponse {
    pub family: String,
    pub curve: String,
    pub proof_system: String,
    pub vk_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub token: Address,
    pub account: Address,
    pub balance: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactRequest {
    pub caller: Address,
    #[serde(with = "shielded_pool::verifier::proof_hex")]
    pub proof: Vec<u8>,
    #[serde(with = "shielded_pool::field::hex_vec_serde")]
    pub public_inputs: Vec<Fr>,
    #[serde(with = "shielded_pool::field::hex_serde")]
    pub new_root: Fr,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactResponse {
    #[serde(with = "shielded_pool::field::hex_serde")]
    pub root: Fr,
    pub leaf_count: u64,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectCall {
    pub caller: Address,
    pub request: CollectRequest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawInitRequest {
    pub caller: Address,
    #[serde(with = "shielded_pool::verifier::proof_hex")]
    pub proof: Vec<u8>,
    #[serde(with = "shielded_pool::field::hex_vec_serde")]
    pub public_inputs: Vec<Fr>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    #[serde(with = "shielded_pool::field::hex_serde")]
    pub key: Fr,
    pub status: WithdrawalStatus,
    pub destination_domain: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub amount: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MintRequest {
    pub token: Address,
    pub to: Address,
    pub amount: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollRemoteRequest {
    pub caller: Address,
    pub domain: u32,
    pub pool: Address,
}
