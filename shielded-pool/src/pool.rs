//! The pool state machine.
//!
//! Every entry point validates first, then stages its changes, then settles with the
//! token ledger, and only commits once everything succeeded. On any `Err` the pool is
//! byte-for-byte what it was before the call.

use crate::config::{CollectMode, PoolConfig};
use crate::deployment::{address_word, collector_init_code_hash, create2_address, u64_word, Address, Deployment};
use crate::error::PoolError;
use crate::events::{InsertedLeaf, PoolEvent};
use crate::field::to_bytes_be;
use crate::merkle::NoteMerkleTree;
use crate::state::{PendingWithdrawal, PoolState, WithdrawalStatus};
use crate::token::{LedgerError, TokenLedger};
use crate::types::{InputPublicInputs, NotePublicInputs, PublicInputError, StealthPublicInputs, TransactPublicInputs};
use crate::verifier::{VerifierFamily, VerifierSet};
use crate::withdrawal::{Envelope, MessageError, ReleaseOrder, WithdrawalCoordinator, WithdrawalMessage};
use ark_bn254::Fr;
use ark_std::Zero;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Credit a stealth address's token balance to the pool as a note.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectRequest {
    pub token: Address,
    pub amount: u128,
    #[serde(with = "crate::field::hex_serde")]
    pub stealth_salt: Fr,
    #[serde(with = "crate::verifier::proof_hex")]
    pub stealth_proof: Vec<u8>,
    #[serde(with = "crate::field::hex_serde")]
    pub note_commitment: Fr,
    #[serde(with = "crate::verifier::proof_hex")]
    pub note_proof: Vec<u8>,
    #[serde(default, with = "crate::field::hex_opt_serde")]
    pub root: Option<Fr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectReceipt {
    pub stealth_address: Address,
    pub leaf_index: u64,
    #[serde(with = "crate::field::hex_serde")]
    pub root: Fr,
}

/// What an inbound cross-domain message did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// Destination side: funds released to the recipient.
    Released {
        #[serde(with = "crate::field::hex_serde")]
        key: Fr,
    },
    /// Origin side: the reserved nullifier is now spent.
    Acknowledged {
        #[serde(with = "crate::field::hex_serde")]
        key: Fr,
    },
    /// Redelivery of a message already acted on; nothing changed.
    Duplicate {
        #[serde(with = "crate::field::hex_serde")]
        key: Fr,
    },
}

pub struct Pool {
    config: PoolConfig,
    deployment: Deployment,
    address: Address,
    collector_code_hash: [u8; 32],
    verifiers: VerifierSet,
    state: PoolState,
    coordinator: WithdrawalCoordinator,
}

impl Pool {
    /// Deterministic deployment: the address depends only on the factory, the salt and
    /// the constructor arguments (verifiers, token, owner, depth, domain).
    pub fn deploy(config: PoolConfig, verifiers: VerifierSet) -> Result<Self, PoolError> {
        config.validate()?;
        let deployment = Self::deployment_for(&config, &verifiers);
        let address = deployment.address();
        let state = PoolState::new(config.tree_depth)?;

        info!(
            %address,
            domain = config.domain,
            token = %config.token,
            depth = config.tree_depth,
            mode = ?config.collect_mode,
            "pool deployed"
        );

        Ok(Self {
            collector_code_hash: collector_init_code_hash(&address),
            coordinator: WithdrawalCoordinator::new(config.domain, address),
            config,
            deployment,
            address,
            verifiers,
            state,
        })
    }

    pub fn deployment_for(config: &PoolConfig, verifiers: &VerifierSet) -> Deployment {
        let mut args = Vec::with_capacity(32 * 8);
        for family in VerifierFamily::ALL {
            args.extend_from_slice(&address_word(&verifiers.get(family).id()));
        }
        args.extend_from_slice(&address_word(&config.token));
        args.extend_from_slice(&address_word(&config.owner));
        args.extend_from_slice(&u64_word(u64::from(config.tree_depth)));
        args.extend_from_slice(&u64_word(u64::from(config.domain)));

        Deployment {
            factory: config.factory,
            salt: config.deployment_salt,
            constructor_args: args,
        }
    }

    // --- reads ---

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Init-code hash of the stealth collector, for stealth address derivation.
    pub fn init_code_hash(&self) -> [u8; 32] {
        self.collector_code_hash
    }

    pub fn stealth_address(&self, salt: &Fr) -> Address {
        create2_address(&self.address, &to_bytes_be(salt), &self.collector_code_hash)
    }

    pub fn current_root(&self) -> Fr {
        self.state.current_root
    }

    pub fn leaf_count(&self) -> u64 {
        self.state.tree.len()
    }

    pub fn tree(&self) -> &NoteMerkleTree {
        &self.state.tree
    }

    pub fn verifier_address(&self, family: VerifierFamily) -> Address {
        self.verifiers.get(family).id()
    }

    pub fn is_spent(&self, nullifier: &Fr) -> bool {
        self.state.spent.contains(nullifier)
    }

    pub fn is_reserved(&self, nullifier: &Fr) -> bool {
        self.state.reserved.contains_key(nullifier)
    }

    pub fn pending_withdrawal(&self, key: &Fr) -> Option<&PendingWithdrawal> {
        self.state.withdrawals.get(key)
    }

    pub fn is_collected(&self, commitment: &Fr) -> bool {
        self.state.collected.contains(commitment)
    }

    pub fn is_processed(&self, key: &Fr) -> bool {
        self.state.processed.contains(key)
    }

    pub fn custody(&self, ledger: &impl TokenLedger, token: &Address) -> u128 {
        ledger.balance_of(token, &self.address)
    }

    pub fn remote(&self, domain: u32) -> Option<Address> {
        self.coordinator.remote(domain)
    }

    /// Number of committed state-changing calls.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.state.events
    }

    pub fn outbox(&self) -> &[Envelope] {
        self.coordinator.outbox()
    }

    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        self.coordinator.drain_outbox()
    }

    // --- writes ---

    /// Spend up to `MAX_INPUTS` notes and create up to `MAX_OUTPUTS`, moving
    /// `external_amount` across the pool boundary.
    pub fn transact<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        caller: &Address,
        proof: &[u8],
        public_inputs: &[Fr],
        new_root: Fr,
    ) -> Result<(), PoolError> {
        let result = self.try_transact(ledger, caller, proof, public_inputs, new_root);
        rejected("transact", result)
    }

    fn try_transact<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        caller: &Address,
        proof: &[u8],
        public_inputs: &[Fr],
        new_root: Fr,
    ) -> Result<(), PoolError> {
        let inputs = TransactPublicInputs::from_field_elements(public_inputs)?;

        if inputs.old_root != self.state.current_root {
            return Err(PoolError::RootMismatch {
                expected: self.state.current_root,
                got: inputs.old_root,
            });
        }
        if new_root != inputs.new_root {
            return Err(PoolError::RootMismatch {
                expected: inputs.new_root,
                got: new_root,
            });
        }

        let nullifiers = inputs.spent_nullifiers();
        let mut seen = HashSet::with_capacity(nullifiers.len());
        for nf in &nullifiers {
            if self.state.is_consumed(nf) || !seen.insert(*nf) {
                return Err(PoolError::NullifierAlreadySpent(*nf));
            }
        }

        if inputs.external_amount < 0 && inputs.withdraw_address.is_zero() {
            return Err(PoolError::InvalidAmount("withdrawal needs a non-zero recipient".into()));
        }

        if !self.verifiers.accepts(VerifierFamily::SplitJoin, proof, public_inputs) {
            return Err(PoolError::InvalidProof(VerifierFamily::SplitJoin));
        }

        let commitments = inputs.new_commitments();
        let token = self.config.token;
        let pool = self.address;
        let old_root = self.state.current_root;

        let mut staged = self.state.stage();
        let indices = staged.append(&commitments)?;
        let root = staged.state().tree.root();
        if root != new_root {
            return Err(PoolError::RootMismatch {
                expected: root,
                got: new_root,
            });
        }
        staged.set_root(root);
        for nf in &nullifiers {
            staged.spend(*nf);
        }

        let amount = inputs.external_amount.unsigned_abs();
        match inputs.external_amount.cmp(&0) {
            Ordering::Greater => settle(ledger.transfer_from(&token, &pool, caller, &pool, amount), "deposit")?,
            Ordering::Less => settle(
                ledger.transfer(&token, &pool, &inputs.withdraw_address, amount),
                "withdrawal",
            )?,
            Ordering::Equal => {}
        }

        staged.emit(PoolEvent::Transacted {
            old_root,
            new_root: root,
            nullifiers: nullifiers.clone(),
            commitments: indices
                .iter()
                .zip(&commitments)
                .map(|(&index, &commitment)| InsertedLeaf { index, commitment })
                .collect(),
            external_amount: inputs.external_amount,
        });
        let outgoing = staged.commit();
        self.post(outgoing);

        info!(
            %caller,
            spent = nullifiers.len(),
            created = commitments.len(),
            external_amount = inputs.external_amount,
            leaves = self.state.tree.len(),
            "transact committed"
        );
        Ok(())
    }

    /// Move funds sitting at a stealth address into the pool as a note.
    pub fn collect<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        caller: &Address,
        request: &CollectRequest,
    ) -> Result<CollectReceipt, PoolError> {
        let result = self.try_collect(ledger, caller, request);
        rejected("collect", result)
    }

    fn try_collect<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        caller: &Address,
        request: &CollectRequest,
    ) -> Result<CollectReceipt, PoolError> {
        if request.token != self.config.token {
            return Err(PoolError::UnsupportedToken(request.token));
        }
        if request.amount == 0 {
            return Err(PoolError::InvalidAmount("collect amount must be positive".into()));
        }

        let stealth = StealthPublicInputs { salt: request.stealth_salt };
        if !self
            .verifiers
            .accepts(VerifierFamily::Hash2, &request.stealth_proof, &stealth.to_field_elements())
        {
            return Err(PoolError::InvalidProof(VerifierFamily::Hash2));
        }

        let stealth_address = self.stealth_address(&request.stealth_salt);
        let mut note = NotePublicInputs {
            commitment: request.note_commitment,
            amount: request.amount,
            salt: request.stealth_salt,
            root: None,
        };

        if self.state.collected.contains(&request.note_commitment) {
            return Err(PoolError::CommitmentAlreadyCollected(request.note_commitment));
        }

        // Included mode proves the note against the root it was built on, before the append.
        if self.config.collect_mode == CollectMode::Included {
            let Some(root) = request.root else {
                return Err(PublicInputError::WrongLength { expected: 4, got: 3 }.into());
            };
            if root != self.state.current_root {
                return Err(PoolError::RootMismatch {
                    expected: self.state.current_root,
                    got: root,
                });
            }
            note.root = Some(root);
        }

        if !self
            .verifiers
            .accepts(VerifierFamily::Note, &request.note_proof, &note.to_field_elements())
        {
            return Err(PoolError::InvalidProof(VerifierFamily::Note));
        }

        let token = self.config.token;
        let pool = self.address;
        let mode = self.config.collect_mode;

        let mut staged = self.state.stage();
        let leaf_index = staged.append(&[request.note_commitment])?[0];
        let root = staged.state().tree.root();
        if mode == CollectMode::Mint {
            if let Some(expected) = request.root {
                if expected != root {
                    return Err(PoolError::RootMismatch { expected: root, got: expected });
                }
            }
        }
        staged.set_root(root);
        staged.mark_collected(request.note_commitment);

        settle(
            ledger.transfer(&token, &stealth_address, &pool, request.amount),
            "collect",
        )?;

        staged.emit(PoolEvent::Collected {
            token,
            stealth_address,
            amount: request.amount,
            commitment: request.note_commitment,
            leaf_index,
            root,
        });
        let outgoing = staged.commit();
        self.post(outgoing);

        info!(%caller, %stealth_address, amount = request.amount, leaf_index, ?mode, "collect committed");
        Ok(CollectReceipt {
            stealth_address,
            leaf_index,
            root,
        })
    }

    /// Reserve a note's nullifier and ask the destination domain to pay out.
    /// Returns the withdrawal key.
    pub fn trustless_withdraw_init(
        &mut self,
        caller: &Address,
        proof: &[u8],
        public_inputs: &[Fr],
        now: DateTime<Utc>,
    ) -> Result<Fr, PoolError> {
        let result = self.try_withdraw_init(caller, proof, public_inputs, now);
        rejected("trustless_withdraw_init", result)
    }

    fn try_withdraw_init(
        &mut self,
        caller: &Address,
        proof: &[u8],
        public_inputs: &[Fr],
        now: DateTime<Utc>,
    ) -> Result<Fr, PoolError> {
        let inputs = InputPublicInputs::from_field_elements(public_inputs)?;

        if inputs.root != self.state.current_root {
            return Err(PoolError::RootMismatch {
                expected: self.state.current_root,
                got: inputs.root,
            });
        }
        if inputs.nullifier.is_zero() || self.state.is_consumed(&inputs.nullifier) {
            return Err(PoolError::NullifierAlreadySpent(inputs.nullifier));
        }
        if inputs.amount == 0 {
            return Err(PoolError::InvalidAmount("withdrawal amount must be positive".into()));
        }
        if inputs.recipient.is_zero() {
            return Err(PoolError::InvalidAmount("withdrawal needs a non-zero recipient".into()));
        }
        if !self.verifiers.accepts(VerifierFamily::Input, proof, public_inputs) {
            return Err(PoolError::InvalidProof(VerifierFamily::Input));
        }

        let key = inputs.key();
        let expires_at = now
            .checked_add_signed(self.config.withdrawal_window())
            .ok_or_else(|| PoolError::Config(format!("withdrawal deadline out of range for {now}")))?;
        let destination_domain = self.config.destination_domain();
        let release = WithdrawalMessage::Release(ReleaseOrder::new(&inputs, expires_at));
        let envelope = self.coordinator.prepare(destination_domain, &release)?;

        let mut staged = self.state.stage();
        staged.reserve(inputs.nullifier, key);
        staged.put_withdrawal(PendingWithdrawal {
            key,
            inputs,
            destination_domain,
            status: WithdrawalStatus::Initiated,
            initiated_at: now,
            expires_at,
        });
        staged.emit(PoolEvent::TrustlessWithdrawInit {
            key,
            nullifier: inputs.nullifier,
            amount: inputs.amount,
            recipient: inputs.recipient,
            destination_domain,
            expires_at,
        });
        staged.send(envelope);
        let outgoing = staged.commit();
        self.post(outgoing);

        info!(%caller, %key, amount = inputs.amount, destination_domain, %expires_at, "trustless withdrawal initiated");
        Ok(key)
    }

    /// Deliver an inbound envelope from the authenticated transport.
    pub fn handle_message<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        envelope: &Envelope,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome, PoolError> {
        let result = self.try_handle_message(ledger, envelope, now);
        rejected("handle_message", result)
    }

    fn try_handle_message<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        envelope: &Envelope,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome, PoolError> {
        match self.coordinator.open(envelope)? {
            WithdrawalMessage::Release(order) => self.finalize_release(ledger, envelope.origin_domain, order, now),
            WithdrawalMessage::Acknowledge { key } => self.acknowledge(envelope.origin_domain, key),
        }
    }

    fn finalize_release<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        origin_domain: u32,
        order: ReleaseOrder,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome, PoolError> {
        let key = order.key;
        if self.state.processed.contains(&key) {
            info!(%key, origin_domain, "duplicate release ignored");
            return Ok(FinalizeOutcome::Duplicate { key });
        }
        if now > order.expires_at {
            return Err(PoolError::WithdrawalExpired {
                key,
                expires_at: order.expires_at.to_rfc3339(),
            });
        }

        // Loopback: the origin side settles in this same step and no ack is sent.
        let loopback = origin_domain == self.config.domain;
        let pending = if loopback {
            match self.state.withdrawals.get(&key) {
                Some(p) if p.status == WithdrawalStatus::Initiated => Some(p.clone()),
                Some(p) => {
                    return Err(PoolError::WithdrawalExpired {
                        key,
                        expires_at: p.expires_at.to_rfc3339(),
                    });
                }
                None => return Err(PoolError::UnknownWithdrawal(key)),
            }
        } else {
            None
        };
        let ack = if loopback {
            None
        } else {
            Some(
                self.coordinator
                    .prepare(origin_domain, &WithdrawalMessage::Acknowledge { key })?,
            )
        };
        let token = self.config.token;
        let pool = self.address;

        let mut staged = self.state.stage();
        staged.mark_processed(key);
        settle(ledger.transfer(&token, &pool, &order.recipient, order.amount), "release")?;
        staged.emit(PoolEvent::TrustlessWithdrawFinalized {
            key,
            origin_domain,
            amount: order.amount,
            recipient: order.recipient,
        });
        if let Some(pending) = pending {
            let nullifier = pending.inputs.nullifier;
            staged.release(nullifier);
            staged.spend(nullifier);
            staged.put_withdrawal(PendingWithdrawal {
                status: WithdrawalStatus::Finalized,
                ..pending
            });
            staged.emit(PoolEvent::TrustlessWithdrawAcknowledged { key, nullifier });
        }
        if let Some(ack) = ack {
            staged.send(ack);
        }
        let outgoing = staged.commit();
        self.post(outgoing);

        info!(%key, origin_domain, loopback, amount = order.amount, recipient = %order.recipient, "trustless withdrawal released");
        Ok(FinalizeOutcome::Released { key })
    }

    fn acknowledge(&mut self, origin_domain: u32, key: Fr) -> Result<FinalizeOutcome, PoolError> {
        let Some(pending) = self.state.withdrawals.get(&key).cloned() else {
            return Err(PoolError::UnknownWithdrawal(key));
        };
        if origin_domain != pending.destination_domain {
            return Err(MessageError::WrongAcknowledger {
                domain: origin_domain,
                expected: pending.destination_domain,
            }
            .into());
        }

        match pending.status {
            WithdrawalStatus::Finalized => {
                info!(%key, "duplicate acknowledgement ignored");
                Ok(FinalizeOutcome::Duplicate { key })
            }
            WithdrawalStatus::Expired => {
                error!(
                    %key,
                    nullifier = %pending.inputs.nullifier,
                    "release acknowledged after the withdrawal was cancelled"
                );
                Err(PoolError::WithdrawalExpired {
                    key,
                    expires_at: pending.expires_at.to_rfc3339(),
                })
            }
            WithdrawalStatus::Initiated => {
                let nullifier = pending.inputs.nullifier;
                let mut staged = self.state.stage();
                staged.release(nullifier);
                staged.spend(nullifier);
                staged.put_withdrawal(PendingWithdrawal {
                    status: WithdrawalStatus::Finalized,
                    ..pending
                });
                staged.emit(PoolEvent::TrustlessWithdrawAcknowledged { key, nullifier });
                let outgoing = staged.commit();
                self.post(outgoing);

                info!(%key, %nullifier, "trustless withdrawal acknowledged");
                Ok(FinalizeOutcome::Acknowledged { key })
            }
        }
    }

    /// Give up on an unacknowledged withdrawal and make its note spendable again.
    pub fn trustless_withdraw_cancel(&mut self, key: &Fr, now: DateTime<Utc>) -> Result<(), PoolError> {
        let result = self.try_withdraw_cancel(key, now);
        rejected("trustless_withdraw_cancel", result)
    }

    fn try_withdraw_cancel(&mut self, key: &Fr, now: DateTime<Utc>) -> Result<(), PoolError> {
        let pending = match self.state.withdrawals.get(key) {
            Some(p) if p.status == WithdrawalStatus::Initiated => p.clone(),
            _ => return Err(PoolError::UnknownWithdrawal(*key)),
        };

        let cancellable_at = pending.cancellable_at(self.config.ack_grace());
        if now < cancellable_at {
            return Err(PoolError::WithdrawalNotExpired {
                key: *key,
                cancellable_at: cancellable_at.to_rfc3339(),
            });
        }

        let nullifier = pending.inputs.nullifier;
        let mut staged = self.state.stage();
        staged.release(nullifier);
        staged.put_withdrawal(PendingWithdrawal {
            status: WithdrawalStatus::Expired,
            ..pending
        });
        staged.emit(PoolEvent::TrustlessWithdrawCancelled { key: *key, nullifier });
        let outgoing = staged.commit();
        self.post(outgoing);

        warn!(%key, %nullifier, "trustless withdrawal cancelled, nullifier released");
        Ok(())
    }

    /// Trust `pool` on `domain` as a withdrawal counterparty.
    pub fn enroll_remote(&mut self, caller: &Address, domain: u32, pool: Address) -> Result<(), PoolError> {
        if *caller != self.config.owner {
            warn!(%caller, domain, "enroll_remote rejected: not the owner");
            return Err(PoolError::Unauthorized(*caller));
        }
        if domain == self.config.domain {
            return Err(PoolError::Config(format!("domain {domain} is this pool's own domain")));
        }

        let mut staged = self.state.stage();
        staged.emit(PoolEvent::RemoteEnrolled { domain, pool });
        let outgoing = staged.commit();
        self.post(outgoing);
        self.coordinator.enroll(domain, pool);

        info!(domain, %pool, "remote pool enrolled");
        Ok(())
    }

    fn post(&mut self, outgoing: Vec<Envelope>) {
        for envelope in outgoing {
            self.coordinator.post(envelope);
        }
    }
}

fn settle(result: Result<bool, LedgerError>, what: &str) -> Result<(), PoolError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(PoolError::TokenTransferFailed(format!("{what} transfer refused"))),
        Err(e) => Err(PoolError::TokenTransferFailed(format!("{what}: {e}"))),
    }
}

fn rejected<T>(op: &'static str, result: Result<T, PoolError>) -> Result<T, PoolError> {
    if let Err(e) = &result {
        warn!(op, error = %e, "call rejected");
    }
    result
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("address", &self.address)
            .field("domain", &self.config.domain)
            .field("leaves", &self.state.tree.len())
            .field("version", &self.state.version)
            .finish_non_exhaustive()
    }
}
