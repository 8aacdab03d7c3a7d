//! Distribution controller
//!
//! Detects reward-source balance growth since the previous distribution and
//! hands it to the accumulator exactly once. Rewards paid out (or compounded)
//! between distributions lower the reward-source balance, so they are added
//! back before comparing against the last recorded balance:
//!
//! ```text
//! newly_added = pool_balance + withdrawn_since_last_distribution - distributed_total
//! ```

use crate::{
    accumulator::{Accumulator, RewardPoint},
    types::Amount,
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// Result of a committed distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Reward folded into the accumulator by this call
    pub newly_added: Amount,

    /// Accumulator increment applied
    pub increment: RewardPoint,

    /// Accumulator after the call
    pub accumulator: RewardPoint,

    /// Total stake the reward was spread over
    pub total_staked: Amount,
}

/// Running counters behind the distribution delta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCounters {
    /// Reward-source balance recorded at the last distribution
    pub distributed_total: Amount,

    /// Reward paid or compounded since the last distribution
    pub withdrawn_since_last_distribution: Amount,

    /// Sum of every distributed delta
    pub lifetime_distributed: Amount,

    /// Sum of every reward paid or compounded
    pub lifetime_paid: Amount,
}

impl RewardCounters {
    /// Reward that arrived since the last distribution
    pub fn newly_added(&self, pool_balance: Amount) -> Result<Amount> {
        pool_balance
            .checked_add(self.withdrawn_since_last_distribution)
            .and_then(|gross| gross.checked_sub(self.distributed_total))
            .ok_or(Error::RewardPoolShrank {
                balance: pool_balance,
                withdrawn: self.withdrawn_since_last_distribution,
                distributed: self.distributed_total,
            })
    }

    /// Record reward leaving the reward source
    pub fn record_payout(&mut self, reward: Amount) -> Result<()> {
        self.withdrawn_since_last_distribution = self
            .withdrawn_since_last_distribution
            .checked_add(reward)
            .ok_or_else(|| Error::Overflow("withdrawn since last distribution".to_string()))?;
        self.lifetime_paid = self
            .lifetime_paid
            .checked_add(reward)
            .ok_or_else(|| Error::Overflow("lifetime paid".to_string()))?;
        Ok(())
    }

    /// Fold the balance growth into `accumulator` and reset the delta counters
    ///
    /// Nothing is modified unless every check passes.
    pub fn distribute(
        &mut self,
        accumulator: &mut Accumulator,
        pool_balance: Amount,
        total_staked: Amount,
    ) -> Result<Distribution> {
        if total_staked == 0 {
            return Err(Error::EmptyPool);
        }
        if pool_balance == 0 {
            return Err(Error::NoRewards);
        }

        let newly_added = self.newly_added(pool_balance)?;
        let lifetime_distributed = self
            .lifetime_distributed
            .checked_add(newly_added)
            .ok_or_else(|| Error::Overflow("lifetime distributed".to_string()))?;

        let increment = accumulator.accrue(newly_added, total_staked)?;

        self.distributed_total = pool_balance;
        self.withdrawn_since_last_distribution = 0;
        self.lifetime_distributed = lifetime_distributed;

        Ok(Distribution {
            newly_added,
            increment,
            accumulator: accumulator.current(),
            total_staked,
        })
    }
}
