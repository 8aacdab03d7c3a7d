//! Stake positions and the two-phase withdrawal state machine
//!
//! The store never mutates on the planning path: each `plan_*` method
//! validates the request against the current position and returns the
//! position as it would look afterwards. The ledger commits a plan only after
//! pool-wide checks (cap, pause, roles) have passed, which keeps every
//! validation error free of side effects.
//!
//! ```text
//!            deposit                 initiate_withdrawal
//!   (none) ─────────► Active ───────────────────────────► PendingWithdrawal
//!                       ▲                                        │
//!                       │ partial: remainder re-opens            │ delay elapses
//!                       │                                        ▼
//!                       └──────────── execute_withdrawal ◄── Withdrawable
//!                                        │ full
//!                                        ▼
//!                                      (none)
//! ```

use crate::{
    accumulator::{reward_owed, RewardPoint},
    types::{AccountId, Amount, PositionStatus, PositionView, Timestamp},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Open withdrawal request, folded into its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Principal requested
    pub amount: Amount,

    /// Accumulator reading when the request was made
    pub exit_point: RewardPoint,

    /// Request timestamp
    pub initiated_at: Timestamp,
}

impl WithdrawalRequest {
    /// Seconds left before the request can execute
    pub fn remaining_delay(&self, now: Timestamp, unstaking_delay: u64) -> u64 {
        let elapsed = u64::try_from(now.saturating_sub(self.initiated_at)).unwrap_or(0);
        unstaking_delay.saturating_sub(elapsed)
    }
}

/// Per-account stake record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    /// Principal, including any amount requested but not yet settled
    pub principal: Amount,

    /// Accumulator reading at the last deposit, top-up or re-open
    pub entry_point: RewardPoint,

    /// First deposit of this position
    pub started_at: Timestamp,

    /// Open withdrawal request
    pub withdrawal: Option<WithdrawalRequest>,
}

impl StakePosition {
    /// Open a fresh position
    pub fn open(principal: Amount, entry_point: RewardPoint, started_at: Timestamp) -> Self {
        Self {
            principal,
            entry_point,
            started_at,
            withdrawal: None,
        }
    }

    /// Principal still counted in the pool's total stake
    pub fn active_principal(&self) -> Amount {
        let requested = self.withdrawal.map_or(0, |w| w.amount);
        self.principal.saturating_sub(requested)
    }

    /// Current lifecycle status
    pub fn status(&self, now: Timestamp, unstaking_delay: u64) -> PositionStatus {
        match self.withdrawal {
            None => PositionStatus::Active,
            Some(w) if w.remaining_delay(now, unstaking_delay) == 0 => PositionStatus::Withdrawable,
            Some(_) => PositionStatus::PendingWithdrawal,
        }
    }

    /// Reward owed at this instant
    ///
    /// Active positions accrue against the live accumulator on their whole
    /// principal. Once a withdrawal is requested the owed reward is frozen at
    /// the exit point and covers only the requested amount.
    pub fn owed_reward(&self, live: RewardPoint) -> Result<Amount> {
        match self.withdrawal {
            None => reward_owed(self.principal, self.entry_point, live),
            Some(w) => reward_owed(w.amount, self.entry_point, w.exit_point),
        }
    }
}

/// Outcome of a validated deposit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositPlan {
    /// Position after the deposit
    pub position: StakePosition,

    /// Accrued reward folded into principal
    pub compounded: Amount,

    /// Amount added to the pool's total stake (deposit + compounded reward)
    pub stake_added: Amount,

    /// True when the account had no position before
    pub opened: bool,
}

/// Outcome of a validated withdrawal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalPlan {
    /// Position carrying the new request
    pub position: StakePosition,

    /// Principal leaving the pool's total stake
    pub amount: Amount,
}

/// Outcome of a validated withdrawal execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    /// Re-opened remainder, `None` when the position is fully withdrawn
    pub position: Option<StakePosition>,

    /// Principal paid out
    pub principal: Amount,

    /// Reward paid out
    pub reward: Amount,
}

/// Per-account ledger entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionStore {
    positions: HashMap<AccountId, StakePosition>,
}

impl PositionStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a position
    pub fn get(&self, account: &AccountId) -> Option<&StakePosition> {
        self.positions.get(account)
    }

    /// Number of open positions
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when no positions exist
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate over all positions (audit only, never on an operation path)
    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &StakePosition)> {
        self.positions.iter()
    }

    /// Store `position` for `account`, or remove the entry when `None`
    ///
    /// Returns the previous entry so callers can undo the write.
    pub fn replace(
        &mut self,
        account: &AccountId,
        position: Option<StakePosition>,
    ) -> Option<StakePosition> {
        match position {
            Some(position) => self.positions.insert(account.clone(), position),
            None => self.positions.remove(account),
        }
    }

    /// Validate a deposit and compute the resulting position
    pub fn plan_deposit(
        &self,
        account: &AccountId,
        amount: Amount,
        live: RewardPoint,
        now: Timestamp,
    ) -> Result<DepositPlan> {
        if amount == 0 {
            return Err(Error::InvalidAmount("deposit must be positive".to_string()));
        }

        let Some(current) = self.positions.get(account) else {
            return Ok(DepositPlan {
                position: StakePosition::open(amount, live, now),
                compounded: 0,
                stake_added: amount,
                opened: true,
            });
        };

        if current.withdrawal.is_some() {
            return Err(Error::WithdrawalPending(account.to_string()));
        }

        let compounded = reward_owed(current.principal, current.entry_point, live)?;
        let stake_added = amount
            .checked_add(compounded)
            .ok_or_else(|| Error::Overflow("deposit plus compounded reward".to_string()))?;
        let principal = current
            .principal
            .checked_add(stake_added)
            .ok_or_else(|| Error::Overflow("position principal".to_string()))?;

        Ok(DepositPlan {
            position: StakePosition::open(principal, live, current.started_at),
            compounded,
            stake_added,
            opened: false,
        })
    }

    /// Validate a withdrawal request and snapshot the exit point
    pub fn plan_withdrawal(
        &self,
        account: &AccountId,
        amount: Amount,
        live: RewardPoint,
        now: Timestamp,
    ) -> Result<WithdrawalPlan> {
        let current = self
            .positions
            .get(account)
            .filter(|p| p.principal > 0)
            .ok_or_else(|| Error::NoPosition(account.to_string()))?;

        if current.withdrawal.is_some() {
            return Err(Error::AlreadyPending(account.to_string()));
        }

        if amount == 0 || amount > current.principal {
            return Err(Error::InvalidAmount(format!(
                "withdrawal of {} outside 1..={}",
                amount, current.principal
            )));
        }

        let mut position = current.clone();
        position.withdrawal = Some(WithdrawalRequest {
            amount,
            exit_point: live,
            initiated_at: now,
        });

        Ok(WithdrawalPlan { position, amount })
    }

    /// Validate a withdrawal execution and compute the payout
    pub fn plan_settlement(
        &self,
        account: &AccountId,
        live: RewardPoint,
        now: Timestamp,
        unstaking_delay: u64,
    ) -> Result<SettlementPlan> {
        let current = self
            .positions
            .get(account)
            .ok_or_else(|| Error::NotInitiated(account.to_string()))?;
        let request = current
            .withdrawal
            .ok_or_else(|| Error::NotInitiated(account.to_string()))?;

        let remaining_secs = request.remaining_delay(now, unstaking_delay);
        if remaining_secs > 0 {
            return Err(Error::DelayNotElapsed { remaining_secs });
        }

        let reward = reward_owed(request.amount, current.entry_point, request.exit_point)?;
        let left = current.principal.checked_sub(request.amount).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "request {} exceeds principal {} for {}",
                request.amount, current.principal, account
            ))
        })?;

        let position = (left > 0).then(|| StakePosition::open(left, live, current.started_at));

        Ok(SettlementPlan {
            position,
            principal: request.amount,
            reward,
        })
    }

    /// Read-only view for `position_of`
    pub fn view(
        &self,
        account: &AccountId,
        live: RewardPoint,
        now: Timestamp,
        unstaking_delay: u64,
    ) -> Result<Option<PositionView>> {
        let Some(position) = self.positions.get(account) else {
            return Ok(None);
        };

        Ok(Some(PositionView {
            account: account.clone(),
            principal: position.principal,
            started_at: position.started_at,
            pending_since: position.withdrawal.map(|w| w.initiated_at),
            requested: position.withdrawal.map(|w| w.amount),
            owed_reward: position.owed_reward(live)?,
            status: position.status(now, unstaking_delay),
        }))
    }
}
