//! The fungible-token ledger seam.
//!
//! Calls return `Ok(false)` when the ledger refuses a transfer (ERC-20 style) and `Err`
//! when the call itself fails. Callers must treat both as failure.

use crate::deployment::Address;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("balance overflow for {account} in {token}")]
    Overflow { token: Address, account: Address },

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

pub trait TokenLedger {
    /// Move `amount` of `token` out of `from`, acting as `from`.
    fn transfer(&mut self, token: &Address, from: &Address, to: &Address, amount: u128) -> Result<bool, LedgerError>;

    /// Move `amount` of `token` from `from` to `to` using `spender`'s allowance.
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<bool, LedgerError>;

    fn balance_of(&self, token: &Address, account: &Address) -> u128;
}

/// Multi-token in-memory ledger.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    balances: HashMap<(Address, Address), u128>,
    /// `(token, owner, spender) -> allowance`
    allowances: HashMap<(Address, Address, Address), u128>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, token: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        let balance = self.balances.entry((*token, *to)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow {
            token: *token,
            account: *to,
        })?;
        Ok(())
    }

    pub fn approve(&mut self, token: &Address, owner: &Address, spender: &Address, amount: u128) {
        self.allowances.insert((*token, *owner, *spender), amount);
    }

    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(&(*token, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn move_balance(&mut self, token: &Address, from: &Address, to: &Address, amount: u128) -> Result<bool, LedgerError> {
        let from_balance = self.balance_of(token, from);
        if from_balance < amount {
            return Ok(false);
        }
        if from == to {
            return Ok(true);
        }

        let to_balance = self.balance_of(token, to);
        let new_to = to_balance.checked_add(amount).ok_or(LedgerError::Overflow {
            token: *token,
            account: *to,
        })?;

        self.balances.insert((*token, *from), from_balance - amount);
        self.balances.insert((*token, *to), new_to);
        Ok(true)
    }
}

impl TokenLedger for InMemoryLedger {
    fn transfer(&mut self, token: &Address, from: &Address, to: &Address, amount: u128) -> Result<bool, LedgerError> {
        self.move_balance(token, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<bool, LedgerError> {
        let allowance = self.allowance(token, from, spender);
        if allowance < amount {
            return Ok(false);
        }
        if !self.move_balance(token, from, to, amount)? {
            return Ok(false);
        }
        self.allowances
            .insert((*token, *from, *spender), allowance - amount);
        Ok(true)
    }

    fn balance_of(&self, token: &Address, account: &Address) -> u128 {
        self.balances
            .get(&(*token, *account))
            .copied()
            .unwrap_or(0)
    }
}
