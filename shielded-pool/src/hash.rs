//! Fixed-arity Poseidon hashes used for commitments, nullifiers, tree nodes and stealth salts.
//!
//! The circuit re-derives these values, so any change here must be mirrored in
//! `circuit.rs`. Each hash absorbs its arity before the inputs.

use crate::constants::poseidon_config;
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;

/// Hash an arbitrary-length sequence, tagged with its length.
pub fn hash_fields(inputs: &[Fr]) -> Fr {
    let cfg = poseidon_config();
    let mut sponge = PoseidonSponge::<Fr>::new(&cfg);

    let mut absorbed = Vec::with_capacity(inputs.len() + 1);
    absorbed.push(Fr::from(inputs.len() as u64));
    absorbed.extend_from_slice(inputs);
    sponge.absorb(&absorbed);

    sponge.squeeze_field_elements::<Fr>(1)[0]
}

pub fn hash1(a: Fr) -> Fr {
    hash_fields(&[a])
}

pub fn hash2(a: Fr, b: Fr) -> Fr {
    hash_fields(&[a, b])
}

pub fn hash3(a: Fr, b: Fr, c: Fr) -> Fr {
    hash_fields(&[a, b, c])
}
