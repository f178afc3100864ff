//! Wallet-side helpers: build the public inputs a prover needs from notes and a local
//! mirror of the pool's tree.
//!
//! The mirror must track the pool exactly. `build_transaction` appends the outputs to
//! it; take a [`checkpoint`](NoteMerkleTree::checkpoint) first if the transaction may
//! be rejected and roll back on failure.

use crate::constants::{MAX_INPUTS, MAX_OUTPUTS};
use crate::deployment::Address;
use crate::keys::Keypair;
use crate::merkle::{MerkleError, MerklePath, NoteMerkleTree};
use crate::note::Note;
use crate::types::{InputPublicInputs, TransactPublicInputs};
use ark_bn254::Fr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("at most {max} notes per side, got {got}")]
    TooManyNotes { max: usize, got: usize },

    #[error("value not conserved: in {inputs} + external {external} != out {outputs}")]
    Unbalanced { inputs: u128, outputs: u128, external: i128 },

    #[error("note {0} is not in the tree")]
    NoteNotFound(Fr),

    #[error("note {0} is not owned by this keypair")]
    ForeignNote(Fr),

    #[error("withdrawal needs a non-zero recipient")]
    MissingRecipient,

    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

/// A spendable note located in the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedNote {
    pub note: Note,
    pub path: MerklePath,
    pub nullifier: Fr,
}

/// Locate `note` in `tree` and derive its nullifier.
pub fn locate(tree: &NoteMerkleTree, note: &Note, keypair: &Keypair) -> Result<OwnedNote, ClientError> {
    let commitment = note.commitment();
    if note.owner != keypair.owner() {
        return Err(ClientError::ForeignNote(commitment));
    }
    let index = tree
        .leaves()
        .iter()
        .position(|leaf| *leaf == commitment)
        .ok_or(ClientError::NoteNotFound(commitment))?;
    Ok(OwnedNote {
        note: note.clone(),
        path: tree.path_to(index as u64)?,
        nullifier: note.nullifier(keypair),
    })
}

/// Public inputs for a split/join transaction spending `inputs` into `outputs`.
///
/// `external_amount > 0` deposits, `< 0` withdraws to `recipient`. Value must balance:
/// `sum(inputs) + deposit == sum(outputs) + withdrawal`.
pub fn build_transaction(
    tree: &mut NoteMerkleTree,
    keypair: &Keypair,
    inputs: &[Note],
    outputs: &[Note],
    external_amount: i128,
    recipient: Address,
) -> Result<TransactPublicInputs, ClientError> {
    if inputs.len() > MAX_INPUTS {
        return Err(ClientError::TooManyNotes { max: MAX_INPUTS, got: inputs.len() });
    }
    if outputs.len() > MAX_OUTPUTS {
        return Err(ClientError::TooManyNotes { max: MAX_OUTPUTS, got: outputs.len() });
    }
    if external_amount < 0 && recipient.is_zero() {
        return Err(ClientError::MissingRecipient);
    }

    let in_total = checked_sum(inputs);
    let out_total = checked_sum(outputs);
    let unbalanced = || ClientError::Unbalanced {
        inputs: in_total.unwrap_or(u128::MAX),
        outputs: out_total.unwrap_or(u128::MAX),
        external: external_amount,
    };
    let (in_total, out_total) = match (in_total, out_total) {
        (Some(i), Some(o)) => (i, o),
        _ => return Err(unbalanced()),
    };
    let magnitude = external_amount.unsigned_abs();
    let balanced = if external_amount >= 0 {
        in_total.checked_add(magnitude) == Some(out_total)
    } else {
        out_total.checked_add(magnitude) == Some(in_total)
    };
    if !balanced {
        return Err(unbalanced());
    }

    let nullifiers = inputs
        .iter()
        .map(|note| locate(tree, note, keypair).map(|owned| owned.nullifier))
        .collect::<Result<Vec<_>, _>>()?;
    let commitments: Vec<Fr> = outputs.iter().map(Note::commitment).collect();

    let old_root = tree.root();
    tree.insert_batch(&commitments)?;

    Ok(TransactPublicInputs {
        old_root,
        new_root: tree.root(),
        nullifiers,
        commitments,
        external_amount,
        withdraw_address: if external_amount < 0 { recipient } else { Address::ZERO },
    })
}

/// Public inputs for withdrawing `note` in full through the trustless path.
pub fn build_input(
    tree: &NoteMerkleTree,
    note: &Note,
    keypair: &Keypair,
    recipient: Address,
) -> Result<InputPublicInputs, ClientError> {
    if recipient.is_zero() {
        return Err(ClientError::MissingRecipient);
    }
    let owned = locate(tree, note, keypair)?;
    Ok(InputPublicInputs {
        root: tree.root(),
        nullifier: owned.nullifier,
        amount: note.amount,
        recipient,
    })
}

fn checked_sum(notes: &[Note]) -> Option<u128> {
    notes.iter().try_fold(0u128, |acc, n| acc.checked_add(n.amount))
}
