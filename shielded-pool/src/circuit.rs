//! R1CS circuit for the 2-ary hash family.
//!
//! What this circuit proves:
//! 1) The prover knows two private field elements `(left, right)`.
//! 2) A public digest `D` equals `hash2(left, right)`.
//!
//! Stealth-address ownership is an instance of it: `left` is the spending key,
//! `right` the stealth index, and `D` the stealth salt. The salt is public; which key
//! produced it is not.

use crate::constants::poseidon_config;
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

/// Circuit proving knowledge of a Poseidon 2-ary preimage.
#[derive(Clone, Debug)]
pub struct Hash2PreimageCircuit {
    /// Private preimage.
    pub left: Fr,
    pub right: Fr,

    /// Public digest.
    pub digest: Fr,
}

impl ConstraintSynthesizer<Fr> for Hash2PreimageCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // IMPORTANT: Public input ordering MUST match `types::StealthPublicInputs::to_field_elements`.
        let public_digest = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.digest))?;

        let left = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.left))?;
        let right = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.right))?;

        // Same absorption as `hash::hash_fields`: arity tag, then the inputs.
        let poseidon_cfg = poseidon_config();
        let mut sponge = PoseidonSpongeVar::<Fr>::new(cs.clone(), &poseidon_cfg);
        let arity = FpVar::<Fr>::Constant(Fr::from(2u64));
        sponge.absorb(&vec![arity, left, right])?;

        let digest = sponge.squeeze_field_elements(1)?[0].clone();
        digest.enforce_equal(&public_digest)?;

        Ok(())
    }
}
