//! Canonical encodings of BN254 scalar field elements.
//!
//! Every value the pool stores or compares is an `Fr`, reduced into `[0, p)` by
//! construction. On the wire a field element is 32 bytes big-endian, written as a
//! `0x`-prefixed hex string. Decoding rejects anything that is not already reduced.

use crate::deployment::Address;
use ark_bn254::Fr;
use ark_ff::{BigInteger, BigInteger256, PrimeField};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("value is not a canonical field element")]
    NonCanonical,

    #[error("field element does not encode an amount in range")]
    AmountOutOfRange,

    #[error("field element does not encode a 20-byte address")]
    AddressOutOfRange,
}

/// Big-endian 32-byte encoding.
pub fn to_bytes_be(x: &Fr) -> [u8; 32] {
    let bytes = x.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Decode a big-endian 32-byte value, rejecting values `>= p`.
pub fn from_bytes_be(bytes: &[u8]) -> Result<Fr, FieldError> {
    if bytes.len() != 32 {
        return Err(FieldError::InvalidLength(bytes.len()));
    }

    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let end = 32 - 8 * i;
        let mut chunk = [0u8; 8];
        chunk.copy_from_slice(&bytes[end - 8..end]);
        *limb = u64::from_be_bytes(chunk);
    }

    Fr::from_bigint(BigInteger256::new(limbs)).ok_or(FieldError::NonCanonical)
}

pub fn to_hex(x: &Fr) -> String {
    format!("0x{}", hex::encode(to_bytes_be(x)))
}

pub fn from_hex(s: &str) -> Result<Fr, FieldError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| FieldError::InvalidHex(e.to_string()))?;
    from_bytes_be(&bytes)
}

/// The value as a `u128`, if it fits.
fn to_u128(x: &Fr) -> Option<u128> {
    let limbs = x.into_bigint().0;
    if limbs[2] != 0 || limbs[3] != 0 {
        return None;
    }
    Some(limbs[0] as u128 | ((limbs[1] as u128) << 64))
}

pub fn encode_amount(amount: u128) -> Fr {
    Fr::from(amount)
}

pub fn decode_amount(x: &Fr) -> Result<u128, FieldError> {
    to_u128(x).ok_or(FieldError::AmountOutOfRange)
}

/// Map a signed amount into the field: `v` for `v >= 0`, `p - |v|` otherwise.
pub fn encode_signed(amount: i128) -> Fr {
    let magnitude = Fr::from(amount.unsigned_abs());
    if amount < 0 { -magnitude } else { magnitude }
}

/// Inverse of [`encode_signed`]. Values outside the image of the encoding are rejected
/// rather than wrapped.
pub fn decode_signed(x: &Fr) -> Result<i128, FieldError> {
    if let Some(v) = to_u128(x) {
        if let Ok(v) = i128::try_from(v) {
            return Ok(v);
        }
    }

    let magnitude = to_u128(&-*x).ok_or(FieldError::AmountOutOfRange)?;
    0i128
        .checked_sub_unsigned(magnitude)
        .ok_or(FieldError::AmountOutOfRange)
}

/// Addresses enter the field as 160-bit big-endian integers.
pub fn address_to_field(address: &Address) -> Fr {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_bytes());
    Fr::from_be_bytes_mod_order(&bytes)
}

pub fn field_to_address(x: &Fr) -> Result<Address, FieldError> {
    let bytes = to_bytes_be(x);
    if bytes[..12].iter().any(|b| *b != 0) {
        return Err(FieldError::AddressOutOfRange);
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes[12..]);
    Ok(Address(out))
}

/// Serde adapter: `#[serde(with = "crate::field::hex_serde")]` on an `Fr` field.
pub mod hex_serde {
    use ark_bn254::Fr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(x: &Fr, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::to_hex(x))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Fr, D::Error> {
        let s = String::deserialize(d)?;
        super::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Vec<Fr>`.
pub mod hex_vec_serde {
    use ark_bn254::Fr;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(xs: &[Fr], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(xs.len()))?;
        for x in xs {
            seq.serialize_element(&super::to_hex(x))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Fr>, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        raw.iter()
            .map(|s| super::from_hex(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Serde adapter for `Option<Fr>`.
pub mod hex_opt_serde {
    use ark_bn254::Fr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(x: &Option<Fr>, s: S) -> Result<S::Ok, S::Error> {
        match x {
            Some(x) => s.serialize_some(&super::to_hex(x)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Fr>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|s| super::from_hex(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
