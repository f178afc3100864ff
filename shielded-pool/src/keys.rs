//! Keypairs and stealth addresses.
//!
//! A stealth address is a counterfactual collector address: it can receive plain token
//! transfers before anything is deployed there, and its owner later proves in zero
//! knowledge that they know the key behind its salt.

use crate::constants::VIEWING_KEY_TAG;
use crate::deployment::{create2_address, Address};
use crate::field::to_bytes_be;
use crate::groth16::{prove_hash2, serialize_proof, ZkError};
use crate::hash::{hash1, hash2};
use ark_bn254::{Bn254, Fr};
use ark_groth16::ProvingKey;
use ark_std::UniformRand;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthAddress {
    pub address: Address,
    #[serde(with = "crate::field::hex_serde")]
    pub salt: Fr,
}

/// Proof that the caller knows the key behind `salt`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthOwnershipProof {
    pub proof: Vec<u8>,
    #[serde(with = "crate::field::hex_serde")]
    pub salt: Fr,
}

/// Capability to receive at, and later claim, stealth addresses.
pub trait StealthOwner {
    fn stealth_salt(&self, index: u64) -> Fr;

    /// Pure function of the key material, `index`, the pool and its collector init code.
    fn derive_stealth_address(&self, index: u64, pool: &Address, init_code_hash: &[u8; 32]) -> StealthAddress {
        let salt = self.stealth_salt(index);
        StealthAddress {
            address: create2_address(pool, &to_bytes_be(&salt), init_code_hash),
            salt,
        }
    }

    fn prove_stealth_address_ownership<R: RngCore + CryptoRng>(
        &self,
        index: u64,
        prover: &StealthProver,
        rng: &mut R,
    ) -> Result<StealthOwnershipProof, ZkError>;
}

/// Spending key plus the viewing key derived from it.
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    spending_key: Fr,
    viewing_key: Fr,
}

impl Keypair {
    pub fn from_spending_key(spending_key: Fr) -> Self {
        Self {
            spending_key,
            viewing_key: hash2(spending_key, Fr::from(VIEWING_KEY_TAG)),
        }
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_spending_key(Fr::rand(rng))
    }

    pub fn spending_key(&self) -> Fr {
        self.spending_key
    }

    pub fn viewing_key(&self) -> Fr {
        self.viewing_key
    }

    /// Public owner value written into notes.
    pub fn owner(&self) -> Fr {
        hash1(self.spending_key)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("owner", &crate::field::to_hex(&self.owner()))
            .finish_non_exhaustive()
    }
}

impl StealthOwner for Keypair {
    fn stealth_salt(&self, index: u64) -> Fr {
        hash2(self.spending_key, Fr::from(index))
    }

    fn prove_stealth_address_ownership<R: RngCore + CryptoRng>(
        &self,
        index: u64,
        prover: &StealthProver,
        rng: &mut R,
    ) -> Result<StealthOwnershipProof, ZkError> {
        let (proof, salt) = prove_hash2(rng, &prover.pk, self.spending_key, Fr::from(index))?;
        Ok(StealthOwnershipProof {
            proof: serialize_proof(&proof)?,
            salt,
        })
    }
}

/// Proving key for the Hash2 circuit.
#[derive(Clone)]
pub struct StealthProver {
    pk: ProvingKey<Bn254>,
}

impl StealthProver {
    pub fn new(pk: ProvingKey<Bn254>) -> Self {
        Self { pk }
    }
}
