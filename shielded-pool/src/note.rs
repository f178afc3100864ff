//! Private notes and their public commitments / nullifiers.

use crate::field::encode_amount;
use crate::hash::{hash2, hash3};
use crate::keys::Keypair;
use ark_bn254::Fr;
use ark_std::UniformRand;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// A private record of value. Only its commitment is ever published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub amount: u128,
    #[serde(with = "crate::field::hex_serde")]
    pub owner: Fr,
    #[serde(with = "crate::field::hex_serde")]
    pub blinding: Fr,
}

impl Note {
    pub fn new(amount: u128, keypair: &Keypair, blinding: Fr) -> Self {
        Self {
            amount,
            owner: keypair.owner(),
            blinding,
        }
    }

    /// A note for `owner` with a fresh blinding factor.
    pub fn random<R: RngCore + CryptoRng>(amount: u128, owner: Fr, rng: &mut R) -> Self {
        Self {
            amount,
            owner,
            blinding: Fr::rand(rng),
        }
    }

    /// `H3(amount, owner, blinding)`
    pub fn commitment(&self) -> Fr {
        hash3(encode_amount(self.amount), self.owner, self.blinding)
    }

    /// `H2(commitment, spending_key)`. Only the holder of the spending key can compute it.
    pub fn nullifier(&self, keypair: &Keypair) -> Fr {
        hash2(self.commitment(), keypair.spending_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn commitment_binds_every_field() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let kp = Keypair::random(&mut rng);
        let note = Note::random(100, kp.owner(), &mut rng);

        let mut other_amount = note.clone();
        other_amount.amount = 101;
        let mut other_blinding = note.clone();
        other_blinding.blinding += Fr::from(1u64);

        assert_ne!(note.commitment(), other_amount.commitment());
        assert_ne!(note.commitment(), other_blinding.commitment());
    }

    #[test]
    fn nullifier_depends_on_spending_key() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let alice = Keypair::random(&mut rng);
        let mallory = Keypair::random(&mut rng);
        let note = Note::random(5, alice.owner(), &mut rng);

        assert_eq!(note.nullifier(&alice), note.nullifier(&alice));
        assert_ne!(note.nullifier(&alice), note.nullifier(&mallory));
    }
}
