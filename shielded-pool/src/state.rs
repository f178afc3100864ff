//! Persistent pool state and the staged-transaction journal.
//!
//! Entry points never mutate `PoolState` directly. They open a [`Staged`] view, make
//! their changes through it, and either `commit` or drop it. Dropping an uncommitted
//! stage replays the undo journal in reverse, so a failed call leaves no trace.

use crate::events::PoolEvent;
use crate::merkle::{MerkleError, NoteMerkleTree, TreeCheckpoint};
use crate::types::InputPublicInputs;
use crate::withdrawal::Envelope;
use ark_bn254::Fr;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Initiated,
    Finalized,
    Expired,
}

/// Origin-side record of a trustless withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    #[serde(with = "crate::field::hex_serde")]
    pub key: Fr,
    pub inputs: InputPublicInputs,
    pub destination_domain: u32,
    pub status: WithdrawalStatus,
    pub initiated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingWithdrawal {
    /// Saturates at the latest representable time.
    pub fn cancellable_at(&self, ack_grace: Duration) -> DateTime<Utc> {
        self.expires_at
            .checked_add_signed(ack_grace)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug)]
pub struct PoolState {
    pub(crate) tree: NoteMerkleTree,
    pub(crate) current_root: Fr,
    pub(crate) spent: HashSet<Fr>,
    /// nullifier -> withdrawal key
    pub(crate) reserved: HashMap<Fr, Fr>,
    pub(crate) withdrawals: HashMap<Fr, PendingWithdrawal>,
    /// Release keys already paid out on this domain.
    pub(crate) processed: HashSet<Fr>,
    /// Note commitments credited by `collect`.
    pub(crate) collected: HashSet<Fr>,
    pub(crate) events: Vec<PoolEvent>,
    pub(crate) version: u64,
}

impl PoolState {
    pub fn new(depth: u8) -> Result<Self, MerkleError> {
        let tree = NoteMerkleTree::new(depth)?;
        let current_root = tree.root();
        Ok(Self {
            tree,
            current_root,
            spent: HashSet::new(),
            reserved: HashMap::new(),
            withdrawals: HashMap::new(),
            processed: HashSet::new(),
            collected: HashSet::new(),
            events: Vec::new(),
            version: 0,
        })
    }

    /// Spent or reserved by an in-flight withdrawal.
    pub fn is_consumed(&self, nullifier: &Fr) -> bool {
        self.spent.contains(nullifier) || self.reserved.contains_key(nullifier)
    }

    pub fn stage(&mut self) -> Staged<'_> {
        Staged {
            state: self,
            undo: Vec::new(),
            events: Vec::new(),
            outgoing: Vec::new(),
            committed: false,
        }
    }
}

enum Undo {
    Tree(TreeCheckpoint),
    Root(Fr),
    Spend(Fr),
    Reserve(Fr),
    Release { nullifier: Fr, key: Fr },
    Withdrawal { key: Fr, previous: Option<PendingWithdrawal> },
    Process(Fr),
    Collect(Fr),
}

/// Uncommitted changes to a [`PoolState`].
pub struct Staged<'a> {
    state: &'a mut PoolState,
    undo: Vec<Undo>,
    events: Vec<PoolEvent>,
    outgoing: Vec<Envelope>,
    committed: bool,
}

impl Staged<'_> {
    pub fn state(&self) -> &PoolState {
        &*self.state
    }

    /// Appends all commitments or none.
    pub fn append(&mut self, commitments: &[Fr]) -> Result<Vec<u64>, MerkleError> {
        let cp = self.state.tree.checkpoint();
        let indices = self.state.tree.insert_batch(commitments)?;
        self.undo.push(Undo::Tree(cp));
        Ok(indices)
    }

    pub fn set_root(&mut self, root: Fr) {
        let previous = std::mem::replace(&mut self.state.current_root, root);
        self.undo.push(Undo::Root(previous));
    }

    pub fn spend(&mut self, nullifier: Fr) {
        if self.state.spent.insert(nullifier) {
            self.undo.push(Undo::Spend(nullifier));
        }
    }

    pub fn reserve(&mut self, nullifier: Fr, key: Fr) {
        if self.state.reserved.insert(nullifier, key).is_none() {
            self.undo.push(Undo::Reserve(nullifier));
        }
    }

    pub fn release(&mut self, nullifier: Fr) {
        if let Some(key) = self.state.reserved.remove(&nullifier) {
            self.undo.push(Undo::Release { nullifier, key });
        }
    }

    pub fn put_withdrawal(&mut self, withdrawal: PendingWithdrawal) {
        let key = withdrawal.key;
        let previous = self.state.withdrawals.insert(key, withdrawal);
        self.undo.push(Undo::Withdrawal { key, previous });
    }

    pub fn mark_processed(&mut self, key: Fr) {
        if self.state.processed.insert(key) {
            self.undo.push(Undo::Process(key));
        }
    }

    pub fn mark_collected(&mut self, commitment: Fr) {
        if self.state.collected.insert(commitment) {
            self.undo.push(Undo::Collect(commitment));
        }
    }

    pub fn emit(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    /// Queued for the outbox on commit.
    pub fn send(&mut self, envelope: Envelope) {
        self.outgoing.push(envelope);
    }

    /// Publish events, bump the version and hand back the envelopes to post.
    pub fn commit(mut self) -> Vec<Envelope> {
        self.committed = true;
        self.state.events.append(&mut self.events);
        self.state.version += 1;
        std::mem::take(&mut self.outgoing)
    }

    fn rollback(&mut self) {
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Tree(cp) => self.state.tree.rollback(cp),
                Undo::Root(root) => self.state.current_root = root,
                Undo::Spend(nf) => {
                    self.state.spent.remove(&nf);
                }
                Undo::Reserve(nf) => {
                    self.state.reserved.remove(&nf);
                }
                Undo::Release { nullifier, key } => {
                    self.state.reserved.insert(nullifier, key);
                }
                Undo::Withdrawal { key, previous } => match previous {
                    Some(w) => {
                        self.state.withdrawals.insert(key, w);
                    }
                    None => {
                        self.state.withdrawals.remove(&key);
                    }
                },
                Undo::Process(key) => {
                    self.state.processed.remove(&key);
                }
                Undo::Collect(commitment) => {
                    self.state.collected.remove(&commitment);
                }
            }
        }
    }
}

impl Drop for Staged<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::Address;

    fn withdrawal(key: u64) -> PendingWithdrawal {
        PendingWithdrawal {
            key: Fr::from(key),
            inputs: InputPublicInputs {
                root: Fr::from(0u64),
                nullifier: Fr::from(key + 100),
                amount: 1,
                recipient: Address::ZERO,
            },
            destination_domain: 1,
            status: WithdrawalStatus::Initiated,
            initiated_at: DateTime::<Utc>::UNIX_EPOCH,
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn dropped_stage_restores_everything() {
        let mut state = PoolState::new(4).unwrap();
        {
            let mut s = state.stage();
            s.append(&[Fr::from(1u64)]).unwrap();
            let root = s.state().tree.root();
            s.set_root(root);
            s.spend(Fr::from(9u64));
            s.reserve(Fr::from(101u64), Fr::from(1u64));
            s.commit();
        }
        let root = state.current_root;

        {
            let mut s = state.stage();
            s.append(&[Fr::from(2u64), Fr::from(3u64)]).unwrap();
            let new_root = s.state().tree.root();
            s.set_root(new_root);
            s.spend(Fr::from(10u64));
            s.release(Fr::from(101u64));
            s.put_withdrawal(withdrawal(1));
            s.mark_processed(Fr::from(77u64));
            s.mark_collected(Fr::from(2u64));
            s.emit(PoolEvent::RemoteEnrolled {
                domain: 2,
                pool: Address::ZERO,
            });
        }

        assert_eq!(state.current_root, root);
        assert_eq!(state.tree.root(), root);
        assert_eq!(state.tree.len(), 1);
        assert!(state.spent.contains(&Fr::from(9u64)));
        assert!(!state.spent.contains(&Fr::from(10u64)));
        assert_eq!(state.reserved.get(&Fr::from(101u64)), Some(&Fr::from(1u64)));
        assert!(state.withdrawals.is_empty());
        assert!(state.processed.is_empty());
        assert!(state.collected.is_empty());
        assert!(state.events.is_empty());
        assert_eq!(state.version, 1);
    }

    #[test]
    fn overwritten_withdrawal_is_restored() {
        let mut state = PoolState::new(4).unwrap();
        {
            let mut s = state.stage();
            s.put_withdrawal(withdrawal(5));
            s.commit();
        }
        {
            let mut s = state.stage();
            let mut w = withdrawal(5);
            w.status = WithdrawalStatus::Expired;
            s.put_withdrawal(w);
        }
        assert_eq!(state.withdrawals[&Fr::from(5u64)].status, WithdrawalStatus::Initiated);
    }

    #[test]
    fn failed_append_leaves_no_undo_entry() {
        let mut state = PoolState::new(1).unwrap();
        let mut s = state.stage();
        assert!(s.append(&[Fr::from(1u64); 3]).is_err());
        s.append(&[Fr::from(1u64), Fr::from(2u64)]).unwrap();
        drop(s);
        assert!(state.tree.is_empty());
    }
}
