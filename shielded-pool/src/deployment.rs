//! Addresses and deterministic (CREATE2-style) deployment.
//!
//! The pool's address must be known before it exists, because stealth addresses are
//! derived from it. It is therefore computed from a fixed factory, a fixed salt and the
//! hash of its creation code, never from a deployer nonce.

use crate::constants::{COLLECTOR_CODE_TAG, POOL_CODE_TAG};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// A 20-byte account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Last 20 bytes of a 32-byte digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("invalid address: {0}")]
pub struct AddressParseError(String);

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| AddressParseError(e.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| AddressParseError(format!("expected 20 bytes, got {}", v.len())))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// `keccak256(0xff ‖ deployer ‖ salt ‖ init_code_hash)[12..]`
pub fn create2_address(deployer: &Address, salt: &[u8; 32], init_code_hash: &[u8; 32]) -> Address {
    let mut hasher = Keccak256::new();
    hasher.update([0xffu8]);
    hasher.update(deployer.as_bytes());
    hasher.update(salt);
    hasher.update(init_code_hash);
    let digest: [u8; 32] = hasher.finalize().into();
    Address::from_digest(&digest)
}

/// Init-code hash of the per-salt stealth collector a pool deploys to sweep a stealth
/// address. Stealth addresses are `create2_address(pool, salt, collector_init_code_hash(pool))`.
pub fn collector_init_code_hash(pool: &Address) -> [u8; 32] {
    let mut code = Vec::with_capacity(COLLECTOR_CODE_TAG.len() + 20);
    code.extend_from_slice(COLLECTOR_CODE_TAG);
    code.extend_from_slice(pool.as_bytes());
    keccak256(&code)
}

/// Everything that determines a pool's address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployment {
    pub factory: Address,
    pub salt: [u8; 32],
    /// Constructor arguments, ABI-style concatenation of 32-byte words.
    pub constructor_args: Vec<u8>,
}

impl Deployment {
    pub fn init_code(&self) -> Vec<u8> {
        let mut code = Vec::with_capacity(POOL_CODE_TAG.len() + self.constructor_args.len());
        code.extend_from_slice(POOL_CODE_TAG);
        code.extend_from_slice(&self.constructor_args);
        code
    }

    pub fn init_code_hash(&self) -> [u8; 32] {
        keccak256(&self.init_code())
    }

    pub fn address(&self) -> Address {
        create2_address(&self.factory, &self.salt, &self.init_code_hash())
    }
}

/// Left-pad an address into a 32-byte word.
pub fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

pub fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}
