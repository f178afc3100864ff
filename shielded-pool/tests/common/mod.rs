#![allow(dead_code)]

use ark_bn254::Fr;
use chrono::{DateTime, TimeZone, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use shielded_pool::client::build_transaction;
use shielded_pool::deployment::keccak256;
use shielded_pool::field::to_bytes_be;
use shielded_pool::groth16::{setup_hash2_keys, Groth16Verifier, ZkError};
use shielded_pool::keys::StealthProver;
use shielded_pool::token::LedgerError;
use shielded_pool::types::TransactPublicInputs;
use shielded_pool::{
    Address, InMemoryLedger, Keypair, Note, NoteMerkleTree, Pool, PoolConfig, PoolError, ProofVerifier, TokenLedger,
    VerifierFamily, VerifierSet,
};
use std::sync::Arc;

pub const TOKEN: Address = Address([0xaa; 20]);
pub const OWNER: Address = Address([0x0e; 20]);
pub const USER: Address = Address([0x05; 20]);
pub const RECIPIENT: Address = Address([0x7e; 20]);
pub const DEPTH: u8 = 16;

/// Accepts exactly one "proof" per public-input vector: a keccak digest over the family
/// name and the inputs. Stands in for circuits whose provers live outside this crate.
pub struct BindingVerifier(pub VerifierFamily);

impl BindingVerifier {
    pub fn prove(family: VerifierFamily, public_inputs: &[Fr]) -> Vec<u8> {
        let mut buf = family.as_str().as_bytes().to_vec();
        for x in public_inputs {
            buf.extend_from_slice(&to_bytes_be(x));
        }
        keccak256(&buf).to_vec()
    }
}

impl ProofVerifier for BindingVerifier {
    fn id(&self) -> Address {
        Address::from_digest(&keccak256(self.0.as_str().as_bytes()))
    }

    fn verify(&self, proof: &[u8], public_inputs: &[Fr]) -> Result<bool, ZkError> {
        Ok(proof == Self::prove(self.0, public_inputs).as_slice())
    }
}

pub fn binding_verifiers() -> VerifierSet {
    VerifierSet {
        split_join: Arc::new(BindingVerifier(VerifierFamily::SplitJoin)),
        hash2: Arc::new(BindingVerifier(VerifierFamily::Hash2)),
        note: Arc::new(BindingVerifier(VerifierFamily::Note)),
        input: Arc::new(BindingVerifier(VerifierFamily::Input)),
    }
}

/// Binding verifiers everywhere except Hash2, which gets a real Groth16 key.
pub fn groth16_stealth_verifiers(rng: &mut ChaCha20Rng) -> (VerifierSet, StealthProver) {
    let (pk, vk) = setup_hash2_keys(rng).unwrap();
    let mut set = binding_verifiers();
    set.hash2 = Arc::new(Groth16Verifier::new(&vk).unwrap());
    (set, StealthProver::new(pk))
}

pub fn config(domain: u32) -> PoolConfig {
    PoolConfig {
        domain,
        token: TOKEN,
        owner: OWNER,
        tree_depth: DEPTH,
        ..PoolConfig::default()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

/// A user's keys, RNG and local mirror of one pool's tree.
pub struct Wallet {
    pub keypair: Keypair,
    pub tree: NoteMerkleTree,
    pub rng: ChaCha20Rng,
}

impl Wallet {
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        Self {
            keypair: Keypair::random(&mut rng),
            tree: NoteMerkleTree::new(DEPTH).unwrap(),
            rng,
        }
    }

    pub fn note(&mut self, amount: u128) -> Note {
        Note::random(amount, self.keypair.owner(), &mut self.rng)
    }

    pub fn transaction(&mut self, inputs: &[Note], outputs: &[Note], external: i128, to: Address) -> TransactPublicInputs {
        build_transaction(&mut self.tree, &self.keypair, inputs, outputs, external, to).unwrap()
    }
}

pub fn submit<L: TokenLedger>(pool: &mut Pool, ledger: &mut L, tx: &TransactPublicInputs) -> Result<(), PoolError> {
    let fields = tx.to_field_elements();
    let proof = BindingVerifier::prove(VerifierFamily::SplitJoin, &fields);
    pool.transact(ledger, &USER, &proof, &fields, tx.new_root)
}

/// Fund USER, approve the pool and deposit `amount` into a fresh note.
pub fn deposit(pool: &mut Pool, ledger: &mut InMemoryLedger, wallet: &mut Wallet, amount: u128) -> Note {
    ledger.mint(&TOKEN, &USER, amount).unwrap();
    ledger.approve(&TOKEN, &USER, &pool.address(), amount);
    let note = wallet.note(amount);
    let tx = wallet.transaction(&[], &[note.clone()], amount as i128, Address::ZERO);
    submit(pool, ledger, &tx).unwrap();
    note
}

/// Snapshot of everything a rejected call must leave untouched.
#[derive(Debug, PartialEq, Eq)]
pub struct Observed {
    pub root: Fr,
    pub leaves: u64,
    pub version: u64,
    pub events: usize,
    pub outbox: usize,
    pub custody: u128,
}

pub fn observe(pool: &Pool, ledger: &impl TokenLedger) -> Observed {
    Observed {
        root: pool.current_root(),
        leaves: pool.leaf_count(),
        version: pool.version(),
        events: pool.events().len(),
        outbox: pool.outbox().len(),
        custody: pool.custody(ledger, &TOKEN),
    }
}

/// Ledger whose outgoing transfers can be switched off.
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    pub down: bool,
}

impl TokenLedger for FlakyLedger {
    fn transfer(&mut self, token: &Address, from: &Address, to: &Address, amount: u128) -> Result<bool, LedgerError> {
        if self.down {
            return Err(LedgerError::Unavailable("token contract reverted".into()));
        }
        self.inner.transfer(token, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<bool, LedgerError> {
        if self.down {
            return Err(LedgerError::Unavailable("token contract reverted".into()));
        }
        self.inner.transfer_from(token, spender, from, to, amount)
    }

    fn balance_of(&self, token: &Address, account: &Address) -> u128 {
        self.inner.balance_of(token, account)
    }
}
