//! Groth16 prover/verifier orchestration for the Hash2 circuit, plus a generic
//! verifying-key backed [`ProofVerifier`].
//!
//! SECURITY NOTE: Groth16 requires a trusted setup that produces a proving key (PK)
//! and verifying key (VK). `setup_hash2_keys` generates keys locally; production
//! deployments load keys from a ceremony instead.

use crate::circuit::Hash2PreimageCircuit;
use crate::deployment::{keccak256, Address};
use crate::hash::hash2;
use crate::verifier::ProofVerifier;
use ark_bn254::{Bn254, Fr};
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("proof verification failed")]
    VerificationFailed,

    #[error("arkworks error: {0}")]
    Ark(String),
}

/// Generate a Groth16 keypair for the Hash2 circuit.
pub fn setup_hash2_keys(rng: &mut impl RngCore) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError> {
    // Constraints do not depend on the witness; any satisfying assignment works.
    let left = Fr::from(0u64);
    let right = Fr::from(0u64);
    let circuit = Hash2PreimageCircuit { left, right, digest: hash2(left, right) };

    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(circuit, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Prove knowledge of `(left, right)` with `hash2(left, right) = digest`. Returns the digest.
pub fn prove_hash2(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    left: Fr,
    right: Fr,
) -> Result<(Proof<Bn254>, Fr), ZkError> {
    let digest = hash2(left, right);
    let circuit = Hash2PreimageCircuit { left, right, digest };

    let proof = Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    Ok((proof, digest))
}

pub fn verify_hash2(vk: &VerifyingKey<Bn254>, proof: &Proof<Bn254>, digest: Fr) -> Result<(), ZkError> {
    let pvk = prepare_verifying_key(vk);
    let ok = Groth16::<Bn254>::verify_proof(&pvk, proof, &[digest])
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !ok {
        return Err(ZkError::VerificationFailed);
    }
    Ok(())
}

pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    pk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_vk(vk: &VerifyingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    vk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, ZkError> {
    VerifyingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_proof(proof: &Proof<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    proof
        .serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_proof(bytes: &[u8]) -> Result<Proof<Bn254>, ZkError> {
    Proof::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

/// Verifier oracle for any circuit family with a BN254 Groth16 verifying key.
#[derive(Clone)]
pub struct Groth16Verifier {
    pvk: PreparedVerifyingKey<Bn254>,
    id: Address,
}

impl Groth16Verifier {
    pub fn new(vk: &VerifyingKey<Bn254>) -> Result<Self, ZkError> {
        let vk_bytes = serialize_vk(vk)?;
        Ok(Self {
            pvk: prepare_verifying_key(vk),
            id: Address::from_digest(&keccak256(&vk_bytes)),
        })
    }

    pub fn from_vk_bytes(bytes: &[u8]) -> Result<Self, ZkError> {
        Self::new(&deserialize_vk(bytes)?)
    }
}

impl ProofVerifier for Groth16Verifier {
    fn id(&self) -> Address {
        self.id
    }

    fn verify(&self, proof: &[u8], public_inputs: &[Fr]) -> Result<bool, ZkError> {
        let proof = deserialize_proof(proof)?;
        Groth16::<Bn254>::verify_proof(&self.pvk, &proof, public_inputs)
            .map_err(|e| ZkError::Ark(format!("{e}")))
    }
}
