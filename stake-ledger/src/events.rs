//! Ledger events
//!
//! Every committed operation appends one event to the ledger journal. Events
//! are never produced for rejected or rolled-back operations.

use crate::{
    access::Role,
    types::{AccountId, Amount, Timestamp},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Committed state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Ledger time of the commit
    pub timestamp: Timestamp,

    /// What happened
    pub kind: EventKind,
}

impl LedgerEvent {
    /// Stamp a new event
    pub fn new(timestamp: Timestamp, kind: EventKind) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            timestamp,
            kind,
        }
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Deposit or top-up
    Deposited {
        /// Depositor
        account: AccountId,
        /// Deposited amount
        amount: Amount,
        /// Accrued reward folded into principal
        compounded: Amount,
        /// Principal afterwards
        principal: Amount,
    },

    /// Withdrawal request opened
    WithdrawalInitiated {
        /// Position owner
        account: AccountId,
        /// Requested principal
        amount: Amount,
    },

    /// Withdrawal paid out
    WithdrawalExecuted {
        /// Position owner
        account: AccountId,
        /// Principal paid
        principal: Amount,
        /// Reward paid
        reward: Amount,
        /// Principal left in the re-opened position
        remaining: Amount,
    },

    /// Reward folded into the accumulator
    RewardsDistributed {
        /// Caller
        distributor: AccountId,
        /// Newly distributed reward
        amount: Amount,
        /// Accumulator afterwards (decimal string)
        accumulator: String,
        /// Total stake the reward was spread over
        total_staked: Amount,
    },

    /// Ledger paused
    Paused {
        /// Operator
        by: AccountId,
    },

    /// Ledger unpaused
    Unpaused {
        /// Operator
        by: AccountId,
    },

    /// Pool configuration changed
    ConfigUpdated {
        /// Operator
        by: AccountId,
        /// Staking cap afterwards
        staking_cap: Amount,
        /// Unstaking delay afterwards
        unstaking_delay_secs: u64,
        /// Reward source afterwards
        reward_source: AccountId,
    },

    /// Role granted
    RoleGranted {
        /// Role
        role: Role,
        /// Grantee
        account: AccountId,
    },

    /// Role revoked
    RoleRevoked {
        /// Role
        role: Role,
        /// Former member
        account: AccountId,
    },
}
