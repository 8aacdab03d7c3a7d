//! Core types for the stake ledger
//!
//! All amounts are unsigned integers in the token's base units. Timestamps are
//! unix seconds. Nothing in the accounting path uses floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token amount in base units
pub type Amount = u128;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Account identifier (wallet address, custody account, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle status of a stake position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PositionStatus {
    /// Earning reward, no withdrawal requested
    Active = 1,
    /// Withdrawal requested, unstaking delay still running
    PendingWithdrawal = 2,
    /// Withdrawal requested and the delay has elapsed
    Withdrawable = 3,
}

/// Read-only view of a position, as returned by `position_of`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    /// Account owning the position
    pub account: AccountId,

    /// Principal currently staked, including any amount requested but not yet settled
    pub principal: Amount,

    /// Timestamp of the first deposit of this position
    pub started_at: Timestamp,

    /// Timestamp the open withdrawal was initiated, if any
    pub pending_since: Option<Timestamp>,

    /// Amount requested by the open withdrawal, if any
    pub requested: Option<Amount>,

    /// Reward owed at this instant
    pub owed_reward: Amount,

    /// Lifecycle status
    pub status: PositionStatus,
}

/// Receipt for an opened withdrawal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalTicket {
    /// Position owner
    pub account: AccountId,

    /// Requested principal
    pub amount: Amount,

    /// Request timestamp
    pub initiated_at: Timestamp,

    /// Earliest time the withdrawal can execute
    pub executable_at: Timestamp,
}

/// Receipt for an executed withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Position owner
    pub account: AccountId,

    /// Principal paid from the vault
    pub principal: Amount,

    /// Reward paid from the reward source
    pub reward: Amount,

    /// Principal left in the re-opened position (zero on full withdrawal)
    pub remaining: Amount,
}

impl Payout {
    /// Principal plus reward
    pub fn total(&self) -> Amount {
        self.principal.saturating_add(self.reward)
    }
}

/// Snapshot of pool-wide counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    /// Sum of all active principals
    pub total_staked: Amount,

    /// Configured staking cap
    pub staking_cap: Amount,

    /// Accumulator value, decimal string of the scaled 256-bit integer
    pub accumulator: String,

    /// Reward source balance recorded at the last distribution
    pub distributed_total: Amount,

    /// Reward paid or compounded since the last distribution
    pub withdrawn_since_last_distribution: Amount,

    /// Sum of every distributed delta
    pub lifetime_distributed: Amount,

    /// Sum of every reward paid out or compounded
    pub lifetime_paid: Amount,

    /// Number of open positions
    pub positions: usize,

    /// Pause flag
    pub paused: bool,
}

/// Serde adapter for amounts in human-edited formats
///
/// TOML integers stop at `i64::MAX`, well below 18-decimal token supplies, so
/// amounts are written as decimal strings and read from either form.
pub mod amount_serde {
    use super::Amount;
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    /// Serialize as a decimal string
    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    /// Deserialize from a decimal string or a non-negative integer
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                Amount::try_from(v).map_err(|_| E::custom(format!("negative amount {}", v)))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(v)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.replace('_', "")
                    .parse()
                    .map_err(|_| E::custom(format!("invalid amount {:?}", v)))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Largest decimals value a `Decimal` can represent
pub const MAX_TOKEN_DECIMALS: u32 = 28;

/// Convert base units into a human-readable token amount
///
/// Returns `None` when the value does not fit a `Decimal` or `decimals` exceeds 28.
pub fn to_token_units(amount: Amount, decimals: u32) -> Option<Decimal> {
    let amount = i128::try_from(amount).ok()?;
    Decimal::try_from_i128_with_scale(amount, decimals).ok()
}

/// Token amount for log output, falling back to base units
pub fn display_tokens(amount: Amount, decimals: u32) -> String {
    match to_token_units(amount, decimals) {
        Some(tokens) => tokens.normalize().to_string(),
        None => format!("{} base units", amount),
    }
}
