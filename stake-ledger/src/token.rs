//! Fungible-token collaborator
//!
//! The ledger never implements token balances itself. It consumes a
//! [`TokenLedger`] that can report balances and move funds between accounts.
//! Multi-leg settlements go through [`TokenLedger::settle`], which must be
//! all-or-nothing. The provided default applies legs in order and reverses
//! the ones already applied when a later leg fails. Backends with a native
//! atomic batch (database transaction, chain batch call) should override it.

use crate::types::{AccountId, Amount};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Result type for token operations
pub type TokenResult<T> = std::result::Result<T, TokenError>;

/// Token collaborator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Source account cannot cover the transfer
    #[error("insufficient balance in {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        /// Debited account
        account: String,
        /// Amount requested
        needed: Amount,
        /// Amount held
        available: Amount,
    },

    /// Transfer not authorized by the token
    #[error("transfer not authorized: {0}")]
    Unauthorized(String),

    /// Backend refused or failed the transfer
    #[error("transfer rejected: {0}")]
    Rejected(String),

    /// A failed batch could not be reversed; token balances need manual repair
    #[error("compensation failed: {0}")]
    CompensationFailed(String),
}

/// Single movement of funds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLeg {
    /// Debited account
    pub from: AccountId,
    /// Credited account
    pub to: AccountId,
    /// Amount moved
    pub amount: Amount,
}

impl TransferLeg {
    /// Create a new leg
    pub fn new(from: &AccountId, to: &AccountId, amount: Amount) -> Self {
        Self {
            from: from.clone(),
            to: to.clone(),
            amount,
        }
    }
}

/// Token balance collaborator
pub trait TokenLedger: Send + Sync {
    /// Balance held by `account`
    fn balance_of(&self, account: &AccountId) -> TokenResult<Amount>;

    /// Move `amount` from `from` to `to`
    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> TokenResult<()>;

    /// Apply every leg or none of them
    fn settle(&self, legs: &[TransferLeg]) -> TokenResult<()> {
        for (applied, leg) in legs.iter().enumerate() {
            let Err(err) = self.transfer(&leg.from, &leg.to, leg.amount) else {
                continue;
            };

            for done in legs[..applied].iter().rev() {
                if let Err(undo) = self.transfer(&done.to, &done.from, done.amount) {
                    tracing::error!(
                        from = %done.from,
                        to = %done.to,
                        amount = done.amount,
                        "Failed to reverse transfer leg: {}",
                        undo
                    );
                    return Err(TokenError::CompensationFailed(format!(
                        "{} while reversing after: {}",
                        undo, err
                    )));
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

impl<T: TokenLedger + ?Sized> TokenLedger for Arc<T> {
    fn balance_of(&self, account: &AccountId) -> TokenResult<Amount> {
        (**self).balance_of(account)
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> TokenResult<()> {
        (**self).transfer(from, to, amount)
    }

    fn settle(&self, legs: &[TransferLeg]) -> TokenResult<()> {
        (**self).settle(legs)
    }
}

/// Callback observing every transfer attempt
pub type TransferHook = Arc<dyn Fn(&TransferLeg) + Send + Sync>;

/// In-memory token balances
///
/// Used by the server binary and tests. Supports failure injection and a hook
/// invoked on every transfer attempt, which lets tests act as a malicious
/// token that calls back into the ledger mid-transfer.
#[derive(Default)]
pub struct MemoryToken {
    balances: Mutex<HashMap<AccountId, Amount>>,
    failing_accounts: Mutex<Vec<AccountId>>,
    hook: Mutex<Option<TransferHook>>,
}

impl std::fmt::Debug for MemoryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryToken")
            .field("accounts", &self.balances.lock().len())
            .finish()
    }
}

impl MemoryToken {
    /// Empty token
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `account` out of thin air
    pub fn mint(&self, account: &AccountId, amount: Amount) {
        let mut balances = self.balances.lock();
        let balance = balances.entry(account.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Token seeded with previously exported balances
    pub fn with_balances(balances: impl IntoIterator<Item = (AccountId, Amount)>) -> Self {
        Self {
            balances: Mutex::new(balances.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Every non-zero balance, ordered by account
    pub fn balances(&self) -> BTreeMap<AccountId, Amount> {
        self.balances
            .lock()
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(account, amount)| (account.clone(), *amount))
            .collect()
    }

    /// Current balance, zero for unknown accounts
    pub fn balance(&self, account: &AccountId) -> Amount {
        self.balances.lock().get(account).copied().unwrap_or(0)
    }

    /// Reject every transfer touching `account` until cleared
    pub fn fail_transfers_for(&self, account: &AccountId) {
        self.failing_accounts.lock().push(account.clone());
    }

    /// Clear injected failures
    pub fn clear_failures(&self) {
        self.failing_accounts.lock().clear();
    }

    /// Install a hook called before each transfer is applied
    pub fn set_hook(&self, hook: TransferHook) {
        *self.hook.lock() = Some(hook);
    }
}

impl TokenLedger for MemoryToken {
    fn balance_of(&self, account: &AccountId) -> TokenResult<Amount> {
        Ok(self.balance(account))
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> TokenResult<()> {
        // Cloned out so the hook runs without any token lock held
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&TransferLeg::new(from, to, amount));
        }

        {
            let failing = self.failing_accounts.lock();
            if failing.iter().any(|a| a == from || a == to) {
                return Err(TokenError::Rejected(format!(
                    "injected failure for {} -> {}",
                    from, to
                )));
            }
        }

        let mut balances = self.balances.lock();
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                account: from.to_string(),
                needed: amount,
                available,
            });
        }

        if from == to {
            return Ok(());
        }
        let credited = balances
            .get(to)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(|| TokenError::Rejected(format!("balance overflow for {}", to)))?;

        balances.insert(from.clone(), available - amount);
        balances.insert(to.clone(), credited);
        Ok(())
    }
}
