//! Cross-domain coordination for trustless withdrawals.
//!
//! The transport is assumed authenticated and at-least-once: it tells us truthfully which
//! `(domain, sender)` an envelope came from, but it may deliver the same envelope more
//! than once and in any order. Replay protection is the receiving pool's job.
//!
//! Two messages flow:
//! - `Release`: origin pool → destination pool, "pay `amount` to `recipient` before `expires_at`".
//! - `Acknowledge`: destination → origin, "paid"; the origin then burns the reserved nullifier.

use crate::deployment::{keccak256, Address};
use crate::types::InputPublicInputs;
use ark_bn254::Fr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("sender {sender} on domain {domain} is not an enrolled pool")]
    UntrustedOrigin { domain: u32, sender: Address },

    #[error("message for {recipient} on domain {domain} delivered to the wrong pool")]
    Misrouted { domain: u32, recipient: Address },

    #[error("no enrolled pool on domain {0}")]
    NoRoute(u32),

    #[error("acknowledgement from domain {domain}, but the withdrawal was sent to domain {expected}")]
    WrongAcknowledger { domain: u32, expected: u32 },

    #[error("withdrawal key does not match the release order")]
    KeyMismatch,

    #[error("malformed message body: {0}")]
    Malformed(String),
}

/// Transport unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin_domain: u32,
    pub sender: Address,
    pub destination_domain: u32,
    pub recipient: Address,
    pub nonce: u64,
    #[serde(with = "body_b64")]
    pub body: Vec<u8>,
}

impl Envelope {
    /// Stable identifier, for relayer bookkeeping.
    pub fn id(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(4 + 20 + 4 + 20 + 8 + self.body.len());
        buf.extend_from_slice(&self.origin_domain.to_be_bytes());
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(&self.destination_domain.to_be_bytes());
        buf.extend_from_slice(self.recipient.as_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.body);
        keccak256(&buf)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOrder {
    #[serde(with = "crate::field::hex_serde")]
    pub key: Fr,
    #[serde(with = "crate::field::hex_serde")]
    pub root: Fr,
    #[serde(with = "crate::field::hex_serde")]
    pub nullifier: Fr,
    pub amount: u128,
    pub recipient: Address,
    pub expires_at: DateTime<Utc>,
}

impl ReleaseOrder {
    pub fn new(inputs: &InputPublicInputs, expires_at: DateTime<Utc>) -> Self {
        Self {
            key: inputs.key(),
            root: inputs.root,
            nullifier: inputs.nullifier,
            amount: inputs.amount,
            recipient: inputs.recipient,
            expires_at,
        }
    }

    pub fn inputs(&self) -> InputPublicInputs {
        InputPublicInputs {
            root: self.root,
            nullifier: self.nullifier,
            amount: self.amount,
            recipient: self.recipient,
        }
    }

    /// The key must be the commitment over the carried public inputs.
    pub fn check_key(&self) -> Result<(), MessageError> {
        if self.inputs().key() != self.key {
            return Err(MessageError::KeyMismatch);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalMessage {
    Release(ReleaseOrder),
    Acknowledge {
        #[serde(with = "crate::field::hex_serde")]
        key: Fr,
    },
}

impl WithdrawalMessage {
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Malformed(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(|e| MessageError::Malformed(e.to_string()))
    }
}

/// A pool's view of the message channel: who it is, whom it trusts, what it has queued.
#[derive(Clone, Debug)]
pub struct WithdrawalCoordinator {
    local_domain: u32,
    local_address: Address,
    remotes: BTreeMap<u32, Address>,
    nonce: u64,
    outbox: Vec<Envelope>,
}

impl WithdrawalCoordinator {
    pub fn new(local_domain: u32, local_address: Address) -> Self {
        Self {
            local_domain,
            local_address,
            remotes: BTreeMap::new(),
            nonce: 0,
            outbox: Vec::new(),
        }
    }

    pub fn local_domain(&self) -> u32 {
        self.local_domain
    }

    pub fn enroll(&mut self, domain: u32, pool: Address) {
        self.remotes.insert(domain, pool);
    }

    pub fn remote(&self, domain: u32) -> Option<Address> {
        self.remotes.get(&domain).copied()
    }

    /// A pool always trusts itself, which makes same-domain (loopback) release work.
    pub fn is_trusted(&self, domain: u32, sender: &Address) -> bool {
        if domain == self.local_domain && *sender == self.local_address {
            return true;
        }
        self.remotes.get(&domain) == Some(sender)
    }

    pub fn route(&self, destination_domain: u32) -> Result<Address, MessageError> {
        if destination_domain == self.local_domain {
            return Ok(self.local_address);
        }
        self.remote(destination_domain)
            .ok_or(MessageError::NoRoute(destination_domain))
    }

    /// Build the envelope for `message` without queueing it.
    pub fn prepare(&self, destination_domain: u32, message: &WithdrawalMessage) -> Result<Envelope, MessageError> {
        Ok(Envelope {
            origin_domain: self.local_domain,
            sender: self.local_address,
            destination_domain,
            recipient: self.route(destination_domain)?,
            nonce: self.nonce,
            body: message.encode()?,
        })
    }

    /// Queue a prepared envelope.
    pub fn post(&mut self, mut envelope: Envelope) {
        envelope.nonce = self.nonce;
        self.nonce += 1;
        self.outbox.push(envelope);
    }

    /// Authenticate, route-check and decode an inbound envelope.
    pub fn open(&self, envelope: &Envelope) -> Result<WithdrawalMessage, MessageError> {
        if !self.is_trusted(envelope.origin_domain, &envelope.sender) {
            return Err(MessageError::UntrustedOrigin {
                domain: envelope.origin_domain,
                sender: envelope.sender,
            });
        }
        if envelope.destination_domain != self.local_domain || envelope.recipient != self.local_address {
            return Err(MessageError::Misrouted {
                domain: envelope.destination_domain,
                recipient: envelope.recipient,
            });
        }

        let message = WithdrawalMessage::decode(&envelope.body)?;
        if let WithdrawalMessage::Release(order) = &message {
            order.check_key()?;
        }
        Ok(message)
    }

    pub fn outbox(&self) -> &[Envelope] {
        &self.outbox
    }

    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }
}

mod body_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: Address = Address([0x01; 20]);
    const DEST: Address = Address([0x02; 20]);

    fn order() -> ReleaseOrder {
        let inputs = InputPublicInputs {
            root: Fr::from(1u64),
            nullifier: Fr::from(2u64),
            amount: 40,
            recipient: Address([0x33; 20]),
        };
        ReleaseOrder::new(&inputs, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn envelope_survives_the_wire() {
        let mut origin = WithdrawalCoordinator::new(1, ORIGIN);
        origin.enroll(2, DEST);

        let env = origin.prepare(2, &WithdrawalMessage::Release(order())).unwrap();
        origin.post(env);
        let env = origin.drain_outbox().remove(0);

        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.id(), env.id());

        let mut dest = WithdrawalCoordinator::new(2, DEST);
        dest.enroll(1, ORIGIN);
        assert_eq!(dest.open(&back).unwrap(), WithdrawalMessage::Release(order()));
    }

    #[test]
    fn rejects_unenrolled_senders_and_misrouting() {
        let origin = WithdrawalCoordinator::new(1, ORIGIN);
        assert_eq!(
            origin.prepare(2, &WithdrawalMessage::Release(order())),
            Err(MessageError::NoRoute(2))
        );

        let mut enrolled = WithdrawalCoordinator::new(1, ORIGIN);
        enrolled.enroll(2, DEST);
        let env = enrolled.prepare(2, &WithdrawalMessage::Release(order())).unwrap();

        let stranger = WithdrawalCoordinator::new(2, DEST);
        assert!(matches!(stranger.open(&env), Err(MessageError::UntrustedOrigin { .. })));

        let mut wrong_domain = WithdrawalCoordinator::new(3, DEST);
        wrong_domain.enroll(1, ORIGIN);
        assert!(matches!(wrong_domain.open(&env), Err(MessageError::Misrouted { .. })));
    }

    #[test]
    fn tampered_release_is_rejected() {
        let mut origin = WithdrawalCoordinator::new(1, ORIGIN);
        origin.enroll(2, DEST);

        let mut forged = order();
        forged.amount = 4_000;
        let env = origin.prepare(2, &WithdrawalMessage::Release(forged)).unwrap();

        let mut dest = WithdrawalCoordinator::new(2, DEST);
        dest.enroll(1, ORIGIN);
        assert_eq!(dest.open(&env), Err(MessageError::KeyMismatch));
    }

    #[test]
    fn nonces_increase_per_post() {
        let mut c = WithdrawalCoordinator::new(1, ORIGIN);
        let ack = WithdrawalMessage::Acknowledge { key: Fr::from(5u64) };
        for _ in 0..3 {
            let env = c.prepare(1, &ack).unwrap();
            c.post(env);
        }
        let nonces: Vec<u64> = c.drain_outbox().iter().map(|e| e.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
        assert!(c.outbox().is_empty());
    }
}
