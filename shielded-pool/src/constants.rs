//! Crate-wide constants shared by the native hasher, the circuit, and the pool.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;
use std::sync::OnceLock;

/// Default accumulator depth (2^32 notes).
pub const DEFAULT_TREE_DEPTH: u8 = 32;

/// Largest depth the leaf index type can address.
pub const MAX_TREE_DEPTH: u8 = 32;

/// Input note slots in a split/join transaction.
pub const MAX_INPUTS: usize = 2;

/// Output note slots in a split/join transaction.
pub const MAX_OUTPUTS: usize = 2;

/// Length of the split/join public-input vector:
/// old root, new root, nullifiers, commitments, external amount, recipient.
pub const TRANSACT_PUBLIC_INPUTS: usize = 2 + MAX_INPUTS + MAX_OUTPUTS + 2;

/// Default bound on how long a trustless withdrawal may wait for its release.
pub const DEFAULT_WITHDRAWAL_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Extra time the origin waits for a late acknowledgement before allowing a cancel.
pub const DEFAULT_ACK_GRACE_SECS: u64 = 24 * 60 * 60;

/// Upper bound for the withdrawal window and the ack grace (ten years).
pub const MAX_WITHDRAWAL_PERIOD_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Domain tag mixed into the spending key to derive the viewing key.
pub const VIEWING_KEY_TAG: u64 = 0x7669_6577;

/// Prefix of the stealth collector's creation code. The pool address is appended.
pub const COLLECTOR_CODE_TAG: &[u8] = b"shielded-pool/stealth-collector/v1";

/// Prefix of the pool's own creation code. The constructor arguments are appended.
pub const POOL_CODE_TAG: &[u8] = b"shielded-pool/pool/v1";

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1). Every hash absorbs its arity tag first,
// so a 2-ary hash is three absorbed elements.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;

pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Deterministically derive Poseidon parameters for BN254::Fr.
///
/// This uses arkworks' parameter derivation helper (Ark + MDS) so both the native hasher
/// and the in-circuit gadget agree on the same constants. The derivation runs once per
/// process; callers get a clone of the cached config.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

    CONFIG
        .get_or_init(|| {
            let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

            let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
                prime_bits,
                POSEIDON_RATE,
                POSEIDON_FULL_ROUNDS as u64,
                POSEIDON_PARTIAL_ROUNDS as u64,
                0,
            );

            PoseidonConfig::new(
                POSEIDON_FULL_ROUNDS,
                POSEIDON_PARTIAL_ROUNDS,
                POSEIDON_ALPHA,
                mds,
                ark,
                POSEIDON_RATE,
                POSEIDON_CAPACITY,
            )
        })
        .clone()
}
