//! Fixed-point reward accumulator
//!
//! The accumulator holds "reward earned per unit of stake since inception",
//! scaled by [`SCALE`]. Any position's owed reward is computed from two
//! readings of it, so no operation ever iterates over participants.
//!
//! All arithmetic is integer with floor division. The fraction below
//! `1 / SCALE` per unit stake lost on each accrual is never attributed to
//! anyone; that dust stays in the reward source.

use crate::{types::Amount, Error, Result};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point scale factor (10^18)
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Accumulator reading captured at a specific moment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardPoint(U256);

impl RewardPoint {
    /// Accumulator origin
    pub const ZERO: RewardPoint = RewardPoint(U256::zero());

    /// Wrap a raw scaled value
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    /// Raw scaled value
    pub fn raw(&self) -> U256 {
        self.0
    }
}

impl From<u128> for RewardPoint {
    fn from(raw: u128) -> Self {
        Self(U256::from(raw))
    }
}

impl fmt::Display for RewardPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cumulative reward-per-unit-stake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulator {
    value: RewardPoint,
}

impl Accumulator {
    /// Start at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously captured reading
    pub fn from_point(value: RewardPoint) -> Self {
        Self { value }
    }

    /// Current reading
    pub fn current(&self) -> RewardPoint {
        self.value
    }

    /// Fold `delta` reward into the accumulator, pro-rata over `total_staked`
    ///
    /// Returns the increment applied. Fails with [`Error::EmptyPool`] when nothing
    /// is staked; the accumulator is left untouched on any error.
    pub fn accrue(&mut self, delta: Amount, total_staked: Amount) -> Result<RewardPoint> {
        let increment = Self::increment_for(delta, total_staked)?;
        let next = self
            .value
            .0
            .checked_add(increment.0)
            .ok_or_else(|| Error::Overflow("accumulator exceeds 256 bits".to_string()))?;

        tracing::debug!(
            delta,
            total_staked,
            increment = %increment,
            accumulator = %next,
            "Accrued reward"
        );

        self.value = RewardPoint(next);
        Ok(increment)
    }

    /// Increment `accrue` would apply, without applying it
    pub fn increment_for(delta: Amount, total_staked: Amount) -> Result<RewardPoint> {
        if total_staked == 0 {
            return Err(Error::EmptyPool);
        }

        // delta < 2^128 and SCALE < 2^60, so the product always fits 256 bits
        let scaled = U256::from(delta) * U256::from(SCALE);
        Ok(RewardPoint(scaled / U256::from(total_staked)))
    }
}

/// Reward owed to `principal` staked between `entry_point` and `reference_point`
///
/// `principal * (reference_point - entry_point) / SCALE`, floored. A reference
/// point below the entry point means a position snapshot is corrupted.
pub fn reward_owed(
    principal: Amount,
    entry_point: RewardPoint,
    reference_point: RewardPoint,
) -> Result<Amount> {
    let growth = reference_point.0.checked_sub(entry_point.0).ok_or_else(|| {
        Error::InvariantViolation(format!(
            "reference point {} precedes entry point {}",
            reference_point, entry_point
        ))
    })?;

    let owed = U256::from(principal)
        .checked_mul(growth)
        .ok_or_else(|| Error::Overflow("reward computation exceeds 256 bits".to_string()))?
        / U256::from(SCALE);

    if owed.bits() > 128 {
        return Err(Error::Overflow(format!("owed reward {} exceeds amount range", owed)));
    }
    Ok(owed.low_u128())
}
