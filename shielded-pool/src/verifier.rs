//! The verifier oracle seam.
//!
//! The pool never looks inside a proof. Each circuit family is a black box
//! `verify(proof, public_inputs) -> bool`, which lets proof backends be swapped
//! without touching the state machine.

use crate::deployment::Address;
use crate::groth16::ZkError;
use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub trait ProofVerifier: Send + Sync {
    /// Stable identity of this verifier (its deployed address, or a key fingerprint).
    fn id(&self) -> Address;

    /// Pure and deterministic. `Err` means the proof could not even be decoded.
    fn verify(&self, proof: &[u8], public_inputs: &[Fr]) -> Result<bool, ZkError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierFamily {
    /// Split/join transaction over the note tree.
    SplitJoin,
    /// 2-ary hash preimage (stealth ownership).
    Hash2,
    /// Well-formed note bound to a stealth owner.
    Note,
    /// Single input note spend, used by trustless withdrawal.
    Input,
}

impl VerifierFamily {
    pub const ALL: [VerifierFamily; 4] = [
        VerifierFamily::SplitJoin,
        VerifierFamily::Hash2,
        VerifierFamily::Note,
        VerifierFamily::Input,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerifierFamily::SplitJoin => "split_join",
            VerifierFamily::Hash2 => "hash2",
            VerifierFamily::Note => "note",
            VerifierFamily::Input => "input",
        }
    }
}

impl fmt::Display for VerifierFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verifier per circuit family, fixed at deployment.
#[derive(Clone)]
pub struct VerifierSet {
    pub split_join: Arc<dyn ProofVerifier>,
    pub hash2: Arc<dyn ProofVerifier>,
    pub note: Arc<dyn ProofVerifier>,
    pub input: Arc<dyn ProofVerifier>,
}

impl VerifierSet {
    pub fn get(&self, family: VerifierFamily) -> &Arc<dyn ProofVerifier> {
        match family {
            VerifierFamily::SplitJoin => &self.split_join,
            VerifierFamily::Hash2 => &self.hash2,
            VerifierFamily::Note => &self.note,
            VerifierFamily::Input => &self.input,
        }
    }

    /// Run the family's verifier. A decoding error counts as a rejection.
    pub fn accepts(&self, family: VerifierFamily, proof: &[u8], public_inputs: &[Fr]) -> bool {
        match self.get(family).verify(proof, public_inputs) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::debug!(%family, error = %e, "verifier could not decode proof");
                false
            }
        }
    }
}

impl fmt::Debug for VerifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierSet")
            .field("split_join", &self.split_join.id())
            .field("hash2", &self.hash2.id())
            .field("note", &self.note.id())
            .field("input", &self.input.id())
            .finish()
    }
}

/// Proof bytes as `0x`-prefixed hex in JSON.
pub mod proof_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(proof: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(proof)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}
