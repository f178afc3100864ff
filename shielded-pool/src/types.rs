//! Public-input layouts shared between the off-ledger prover and the pool.
//!
//! Ordering MUST match the circuits' public input allocation order. The pool receives
//! raw field-element sequences and parses them with `from_field_elements`, which also
//! range-checks amounts and addresses.

use crate::constants::{MAX_INPUTS, MAX_OUTPUTS, TRANSACT_PUBLIC_INPUTS};
use crate::deployment::Address;
use crate::field::{
    address_to_field, decode_amount, decode_signed, encode_amount, encode_signed, field_to_address, FieldError,
};
use crate::hash::hash_fields;
use ark_bn254::Fr;
use ark_std::Zero;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublicInputError {
    #[error("expected {expected} public inputs, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("{what}: {source}")]
    Field {
        what: &'static str,
        #[source]
        source: FieldError,
    },
}

fn expect_len(inputs: &[Fr], expected: usize) -> Result<(), PublicInputError> {
    if inputs.len() != expected {
        return Err(PublicInputError::WrongLength {
            expected,
            got: inputs.len(),
        });
    }
    Ok(())
}

fn field_err(what: &'static str) -> impl FnOnce(FieldError) -> PublicInputError {
    move |source| PublicInputError::Field { what, source }
}

/// Split/join transaction.
///
/// Layout: `[old_root, new_root, nullifiers.., commitments.., external_amount, withdraw_address]`.
/// A zero nullifier or commitment is an unused slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactPublicInputs {
    #[serde(with = "crate::field::hex_serde")]
    pub old_root: Fr,
    #[serde(with = "crate::field::hex_serde")]
    pub new_root: Fr,
    #[serde(with = "crate::field::hex_vec_serde")]
    pub nullifiers: Vec<Fr>,
    #[serde(with = "crate::field::hex_vec_serde")]
    pub commitments: Vec<Fr>,
    /// Positive deposits into the pool, negative withdraws out of it.
    pub external_amount: i128,
    /// Ignored unless `external_amount < 0`.
    pub withdraw_address: Address,
}

impl TransactPublicInputs {
    pub fn to_field_elements(&self) -> Vec<Fr> {
        let mut v = Vec::with_capacity(TRANSACT_PUBLIC_INPUTS);
        v.push(self.old_root);
        v.push(self.new_root);
        v.extend(padded(&self.nullifiers, MAX_INPUTS));
        v.extend(padded(&self.commitments, MAX_OUTPUTS));
        v.push(encode_signed(self.external_amount));
        v.push(address_to_field(&self.withdraw_address));
        v
    }

    pub fn from_field_elements(inputs: &[Fr]) -> Result<Self, PublicInputError> {
        expect_len(inputs, TRANSACT_PUBLIC_INPUTS)?;

        let nf_start = 2;
        let cm_start = nf_start + MAX_INPUTS;
        let tail = cm_start + MAX_OUTPUTS;

        Ok(Self {
            old_root: inputs[0],
            new_root: inputs[1],
            nullifiers: inputs[nf_start..cm_start].to_vec(),
            commitments: inputs[cm_start..tail].to_vec(),
            external_amount: decode_signed(&inputs[tail]).map_err(field_err("external amount"))?,
            withdraw_address: field_to_address(&inputs[tail + 1]).map_err(field_err("withdraw address"))?,
        })
    }

    /// Nullifiers of the notes actually being spent.
    pub fn spent_nullifiers(&self) -> Vec<Fr> {
        self.nullifiers.iter().copied().filter(|n| !n.is_zero()).collect()
    }

    /// Commitments of the notes actually being created, in insertion order.
    pub fn new_commitments(&self) -> Vec<Fr> {
        self.commitments.iter().copied().filter(|c| !c.is_zero()).collect()
    }
}

fn padded(values: &[Fr], width: usize) -> impl Iterator<Item = Fr> + '_ {
    values
        .iter()
        .copied()
        .chain(std::iter::repeat(Fr::zero()))
        .take(width)
}

/// Stealth-address ownership (Hash2 family). Layout: `[salt]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StealthPublicInputs {
    pub salt: Fr,
}

impl StealthPublicInputs {
    pub fn to_field_elements(&self) -> Vec<Fr> {
        vec![self.salt]
    }
}

/// Note well-formedness (Note family).
///
/// Layout: `[commitment, amount, salt]`, followed by `root` when the note must already
/// be in the accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotePublicInputs {
    pub commitment: Fr,
    pub amount: u128,
    /// Stealth salt of the same owner; binds the note to the stealth proof.
    pub salt: Fr,
    pub root: Option<Fr>,
}

impl NotePublicInputs {
    pub fn to_field_elements(&self) -> Vec<Fr> {
        let mut v = vec![self.commitment, encode_amount(self.amount), self.salt];
        if let Some(root) = self.root {
            v.push(root);
        }
        v
    }
}

/// Single-note spend used by trustless withdrawal (Input family).
///
/// Layout: `[root, nullifier, amount, recipient]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPublicInputs {
    #[serde(with = "crate::field::hex_serde")]
    pub root: Fr,
    #[serde(with = "crate::field::hex_serde")]
    pub nullifier: Fr,
    pub amount: u128,
    pub recipient: Address,
}

impl InputPublicInputs {
    pub const LEN: usize = 4;

    pub fn to_field_elements(&self) -> Vec<Fr> {
        vec![
            self.root,
            self.nullifier,
            encode_amount(self.amount),
            address_to_field(&self.recipient),
        ]
    }

    pub fn from_field_elements(inputs: &[Fr]) -> Result<Self, PublicInputError> {
        expect_len(inputs, Self::LEN)?;
        Ok(Self {
            root: inputs[0],
            nullifier: inputs[1],
            amount: decode_amount(&inputs[2]).map_err(field_err("amount"))?,
            recipient: field_to_address(&inputs[3]).map_err(field_err("recipient"))?,
        })
    }

    /// Commitment over the public inputs; identifies a withdrawal request on both domains.
    pub fn key(&self) -> Fr {
        hash_fields(&self.to_field_elements())
    }
}
