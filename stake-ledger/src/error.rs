//! Error types for the stake ledger

use crate::token::TokenError;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every rejected operation maps to exactly one variant so integrators can branch on it.
/// Validation variants are raised before any state is touched.
#[derive(Error, Debug)]
pub enum Error {
    /// Zero or otherwise unusable amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Rewards cannot be distributed to a pool with nothing staked
    #[error("Pool is empty: nothing is staked")]
    EmptyPool,

    /// Reward source holds no tokens
    #[error("No rewards available to distribute")]
    NoRewards,

    /// Reward source balance fell below what was already distributed
    #[error("Reward pool shrank: balance {balance} + withdrawn {withdrawn} < distributed {distributed}")]
    RewardPoolShrank {
        /// Current reward source balance
        balance: u128,
        /// Reward paid out since the last distribution
        withdrawn: u128,
        /// Balance recorded at the last distribution
        distributed: u128,
    },

    /// Deposit would push total stake above the configured cap
    #[error("Staking cap exceeded: {requested} requested, {available} available under cap {cap}")]
    CapExceeded {
        /// Amount the operation would add to total stake
        requested: u128,
        /// Room left under the cap
        available: u128,
        /// Configured cap
        cap: u128,
    },

    /// Deposit attempted while a withdrawal request is open
    #[error("Withdrawal pending for account {0}")]
    WithdrawalPending(String),

    /// Second withdrawal request while one is already open
    #[error("Withdrawal already pending for account {0}")]
    AlreadyPending(String),

    /// No stake position for the account
    #[error("No stake position for account {0}")]
    NoPosition(String),

    /// Execute attempted without an open withdrawal request
    #[error("Withdrawal not initiated for account {0}")]
    NotInitiated(String),

    /// Unstaking delay has not elapsed yet
    #[error("Unstaking delay not elapsed: {remaining_secs}s remaining")]
    DelayNotElapsed {
        /// Seconds left until the withdrawal can execute
        remaining_secs: u64,
    },

    /// Ledger is paused
    #[error("Ledger is paused")]
    Paused,

    /// Operation requires the ledger to be paused
    #[error("Ledger is not paused")]
    NotPaused,

    /// Caller lacks the required role
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Operation invoked while another operation on the same ledger is in flight
    #[error("Reentrant call rejected")]
    Reentrant,

    /// Token collaborator failure
    #[error("Token transfer failed: {0}")]
    Token(#[from] TokenError),

    /// Arithmetic overflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Invariant violation (corrupted snapshot, conservation failure)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Snapshot storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::EmptyPool => "empty_pool",
            Error::NoRewards => "no_rewards",
            Error::RewardPoolShrank { .. } => "reward_pool_shrank",
            Error::CapExceeded { .. } => "cap_exceeded",
            Error::WithdrawalPending(_) => "withdrawal_pending",
            Error::AlreadyPending(_) => "already_pending",
            Error::NoPosition(_) => "no_position",
            Error::NotInitiated(_) => "not_initiated",
            Error::DelayNotElapsed { .. } => "delay_not_elapsed",
            Error::Paused => "paused",
            Error::NotPaused => "not_paused",
            Error::Unauthorized(_) => "unauthorized",
            Error::Reentrant => "reentrant",
            Error::Token(_) => "token",
            Error::Overflow(_) => "overflow",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }

    /// True for errors the caller can resolve by waiting
    pub fn is_temporal(&self) -> bool {
        matches!(self, Error::DelayNotElapsed { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("Failed to parse config: {}", err))
    }
}
