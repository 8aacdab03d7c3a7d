//! Main ledger orchestration layer
//!
//! This module ties together the accumulator, position store, distribution
//! controller and token collaborator into the public staking API.
//!
//! # Single writer
//!
//! All pool state lives in one `Book` behind a re-entrant mutex wrapping a
//! `RefCell`. Other threads block on the mutex, so concurrent callers are
//! serialized. A call arriving on the thread that already holds the lock (a
//! token callback re-entering the ledger mid-transfer) gets past the mutex but
//! fails to borrow the cell and is rejected with [`Error::Reentrant`].
//!
//! # Commit order
//!
//! Every mutating operation validates first, commits its state change, and
//! only then calls the token. When the token fails, the staged change is
//! rolled back from an O(1) checkpoint (one position plus the pool scalars).
//!
//! # Example
//!
//! ```
//! use stake_ledger::{AccountId, ManualClock, MemoryToken, PoolConfig, StakingLedger};
//! use std::sync::Arc;
//!
//! # fn main() -> stake_ledger::Result<()> {
//! let token = Arc::new(MemoryToken::new());
//! let clock = Arc::new(ManualClock::new(0));
//! let config = PoolConfig::default();
//! let ledger = StakingLedger::new(&config, token.clone(), clock)?;
//!
//! let alice = AccountId::new("alice");
//! token.mint(&alice, 1_000);
//! ledger.deposit(&alice, 1_000)?;
//! assert_eq!(ledger.position_of(&alice)?.unwrap().principal, 1_000);
//! # Ok(())
//! # }
//! ```

use crate::{
    access::{AccessControl, Role},
    accumulator::Accumulator,
    clock::Clock,
    config::PoolConfig,
    distribution::{Distribution, RewardCounters},
    events::{EventKind, LedgerEvent},
    metrics::Metrics,
    position::{PositionStore, StakePosition},
    storage::LedgerSnapshot,
    token::{TokenLedger, TransferLeg},
    types::{
        display_tokens, AccountId, Amount, Payout, PoolSummary, PositionView, Timestamp,
        WithdrawalTicket, MAX_TOKEN_DECIMALS,
    },
    Error, Result,
};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// Events kept in the journal before the oldest are dropped
const MAX_JOURNAL_EVENTS: usize = 10_000;

/// Runtime pool parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    /// Maximum total stake
    pub staking_cap: Amount,

    /// Waiting period between initiating and executing a withdrawal
    pub unstaking_delay_secs: u64,

    /// Token account holding staked principal
    pub vault: AccountId,

    /// Token account holding injected rewards
    pub reward_source: AccountId,

    /// Token decimals for log output
    pub token_decimals: u32,
}

impl PoolParams {
    /// Extract from configuration
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            staking_cap: config.staking_cap,
            unstaking_delay_secs: config.unstaking_delay_secs,
            vault: config.vault_account.clone(),
            reward_source: config.reward_source.clone(),
            token_decimals: config.token_decimals,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.staking_cap == 0 {
            return Err(Error::Config("staking cap must be positive".to_string()));
        }
        if self.vault == self.reward_source {
            return Err(Error::Config(
                "vault and reward source must be distinct accounts".to_string(),
            ));
        }
        if self.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(Error::Config(format!(
                "token decimals must be at most {}",
                MAX_TOKEN_DECIMALS
            )));
        }
        Ok(())
    }
}

/// Pool-wide accounting state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// Sum of all active principals
    pub total_staked: Amount,

    /// Cumulative reward per unit stake
    pub accumulator: Accumulator,

    /// Distribution counters
    pub counters: RewardCounters,
}

/// Operator change to pool parameters; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolUpdate {
    /// New staking cap
    pub staking_cap: Option<Amount>,

    /// New unstaking delay
    pub unstaking_delay_secs: Option<u64>,

    /// New reward source account
    pub reward_source: Option<AccountId>,
}

/// Result of a full conservation audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationReport {
    /// Pool counter of active stake
    pub total_staked: Amount,

    /// Sum of active principals over all positions
    pub active_principal: Amount,

    /// Sum of all principals, pending requests included
    pub principal: Amount,

    /// Vault balance reported by the token
    pub vault_balance: Amount,

    /// Sum of owed reward over all positions
    pub owed_rewards: Amount,

    /// Reward source balance reported by the token
    pub reward_source_balance: Amount,

    /// Sum of every distributed delta
    pub lifetime_distributed: Amount,

    /// Sum of every reward paid or compounded
    pub lifetime_paid: Amount,
}

/// Everything guarded by the single-writer lock
struct Book {
    pool: PoolState,
    positions: PositionStore,
    params: PoolParams,
    access: AccessControl,
    paused: bool,
    journal: VecDeque<LedgerEvent>,
}

/// Undo record for one operation
struct Checkpoint {
    account: AccountId,
    position: Option<StakePosition>,
    pool: PoolState,
}

impl Book {
    fn ensure_live(&self) -> Result<()> {
        if self.paused {
            Err(Error::Paused)
        } else {
            Ok(())
        }
    }

    fn checkpoint(&self, account: &AccountId) -> Checkpoint {
        Checkpoint {
            account: account.clone(),
            position: self.positions.get(account).cloned(),
            pool: self.pool.clone(),
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.positions.replace(&checkpoint.account, checkpoint.position);
        self.pool = checkpoint.pool;
    }

    fn record(&mut self, timestamp: Timestamp, kind: EventKind) {
        if self.journal.len() >= MAX_JOURNAL_EVENTS {
            self.journal.pop_front();
            warn!("Event journal full, dropping oldest event");
        }
        self.journal.push_back(LedgerEvent::new(timestamp, kind));
    }

    fn summary(&self) -> PoolSummary {
        PoolSummary {
            total_staked: self.pool.total_staked,
            staking_cap: self.params.staking_cap,
            accumulator: self.pool.accumulator.current().to_string(),
            distributed_total: self.pool.counters.distributed_total,
            withdrawn_since_last_distribution: self.pool.counters.withdrawn_since_last_distribution,
            lifetime_distributed: self.pool.counters.lifetime_distributed,
            lifetime_paid: self.pool.counters.lifetime_paid,
            positions: self.positions.len(),
            paused: self.paused,
        }
    }

    /// Σ active principal must equal the pool counter
    fn check_total_staked(&self) -> Result<(Amount, Amount)> {
        let mut active: Amount = 0;
        let mut principal: Amount = 0;
        for (_, position) in self.positions.iter() {
            active = active
                .checked_add(position.active_principal())
                .ok_or_else(|| Error::Overflow("active principal sum".to_string()))?;
            principal = principal
                .checked_add(position.principal)
                .ok_or_else(|| Error::Overflow("principal sum".to_string()))?;
        }

        if active != self.pool.total_staked {
            return Err(Error::InvariantViolation(format!(
                "total staked {} != sum of active principal {}",
                self.pool.total_staked, active
            )));
        }
        Ok((active, principal))
    }
}

/// Staking reward-distribution ledger
pub struct StakingLedger<T: TokenLedger> {
    book: ReentrantMutex<RefCell<Book>>,
    token: T,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl<T: TokenLedger> std::fmt::Debug for StakingLedger<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StakingLedger")
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl<T: TokenLedger> StakingLedger<T> {
    /// Create an empty ledger
    pub fn new(config: &PoolConfig, token: T, clock: Arc<dyn Clock>) -> Result<Self> {
        let params = PoolParams::from_config(config);
        params.validate()?;

        let mut access = AccessControl::with_operator(config.operator.clone());
        for distributor in &config.distributors {
            access.grant(Role::Distributor, distributor.clone());
        }

        let book = Book {
            pool: PoolState::default(),
            positions: PositionStore::new(),
            params,
            access,
            paused: false,
            journal: VecDeque::new(),
        };

        info!(
            cap = config.staking_cap,
            delay_secs = config.unstaking_delay_secs,
            vault = %config.vault_account,
            reward_source = %config.reward_source,
            "Stake ledger initialized"
        );

        Self::from_book(book, token, clock)
    }

    /// Rebuild a ledger from a snapshot
    ///
    /// Fails with [`Error::InvariantViolation`] when the snapshot's positions
    /// do not add up to its total stake.
    pub fn restore(snapshot: LedgerSnapshot, token: T, clock: Arc<dyn Clock>) -> Result<Self> {
        snapshot.params.validate()?;

        let book = Book {
            pool: snapshot.pool,
            positions: snapshot.positions,
            params: snapshot.params,
            access: snapshot.access,
            paused: snapshot.paused,
            journal: VecDeque::new(),
        };
        book.check_total_staked()?;

        let positions = book.positions.len();
        let total_staked = display_tokens(book.pool.total_staked, book.params.token_decimals);
        let ledger = Self::from_book(book, token, clock)?;

        // Restored principals must still be held by the token backend
        let report = ledger.verify_conservation()?;

        info!(
            positions,
            total_staked = %total_staked,
            vault_balance = report.vault_balance,
            taken_at = snapshot.taken_at,
            "Stake ledger restored from snapshot"
        );
        Ok(ledger)
    }

    fn from_book(book: Book, token: T, clock: Arc<dyn Clock>) -> Result<Self> {
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;
        metrics.update_pool(book.pool.total_staked, book.positions.len());

        Ok(Self {
            book: ReentrantMutex::new(RefCell::new(book)),
            token,
            clock,
            metrics,
        })
    }

    /// Token collaborator
    pub fn token(&self) -> &T {
        &self.token
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run a mutating operation under the single-writer lock
    fn with_book<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Book, Timestamp) -> Result<R>,
    ) -> Result<R> {
        let guard = self.book.lock();
        let result = match guard.try_borrow_mut() {
            Ok(mut book) => {
                let result = f(&mut book, self.clock.now());
                if result.is_ok() {
                    self.metrics
                        .update_pool(book.pool.total_staked, book.positions.len());
                }
                result
            }
            Err(_) => Err(Error::Reentrant),
        };

        if let Err(e) = &result {
            warn!(operation, kind = e.kind(), "Operation rejected: {}", e);
            self.metrics.record_rejection(e.kind());
        }
        result
    }

    /// Run a read-only operation under the single-writer lock
    fn read_book<R>(&self, f: impl FnOnce(&Book, Timestamp) -> Result<R>) -> Result<R> {
        let guard = self.book.lock();
        let book = guard.try_borrow().map_err(|_| Error::Reentrant)?;
        f(&book, self.clock.now())
    }

    /// Submit transfer legs; undo the staged change if the token refuses
    fn settle_or_rollback(
        &self,
        book: &mut Book,
        checkpoint: Checkpoint,
        legs: &[TransferLeg],
    ) -> Result<()> {
        let legs: Vec<TransferLeg> = legs.iter().filter(|l| l.amount > 0).cloned().collect();
        if let Err(e) = self.token.settle(&legs) {
            warn!(account = %checkpoint.account, "Token settlement failed, rolling back: {}", e);
            book.rollback(checkpoint);
            return Err(e.into());
        }
        Ok(())
    }

    /// Stake `amount` from `account`
    ///
    /// A top-up of an active position compounds: reward accrued so far is
    /// folded into principal instead of being paid out. Returns the principal
    /// after the deposit.
    pub fn deposit(&self, account: &AccountId, amount: Amount) -> Result<Amount> {
        self.with_book("deposit", |book, now| {
            book.ensure_live()?;

            let live = book.pool.accumulator.current();
            let plan = book.positions.plan_deposit(account, amount, live, now)?;

            let cap = book.params.staking_cap;
            let total_staked = book
                .pool
                .total_staked
                .checked_add(plan.stake_added)
                .filter(|total| *total <= cap)
                .ok_or(Error::CapExceeded {
                    requested: plan.stake_added,
                    available: cap.saturating_sub(book.pool.total_staked),
                    cap,
                })?;

            let mut counters = book.pool.counters;
            counters.record_payout(plan.compounded)?;

            let checkpoint = book.checkpoint(account);
            book.positions.replace(account, Some(plan.position.clone()));
            book.pool.total_staked = total_staked;
            book.pool.counters = counters;

            let legs = [
                TransferLeg::new(account, &book.params.vault, amount),
                TransferLeg::new(&book.params.reward_source, &book.params.vault, plan.compounded),
            ];
            self.settle_or_rollback(book, checkpoint, &legs)?;

            let principal = plan.position.principal;
            book.record(
                now,
                EventKind::Deposited {
                    account: account.clone(),
                    amount,
                    compounded: plan.compounded,
                    principal,
                },
            );
            self.metrics.deposits_total.inc();

            info!(
                account = %account,
                amount,
                compounded = plan.compounded,
                principal,
                total_staked = %display_tokens(total_staked, book.params.token_decimals),
                opened = plan.opened,
                "Deposit committed"
            );
            Ok(principal)
        })
    }

    /// Open a withdrawal request for `amount` of `account`'s principal
    ///
    /// The requested amount stops earning immediately and the owed reward on
    /// it is frozen at the current accumulator.
    pub fn initiate_withdrawal(
        &self,
        account: &AccountId,
        amount: Amount,
    ) -> Result<WithdrawalTicket> {
        self.with_book("initiate_withdrawal", |book, now| {
            book.ensure_live()?;

            let live = book.pool.accumulator.current();
            let plan = book.positions.plan_withdrawal(account, amount, live, now)?;

            let total_staked = book.pool.total_staked.checked_sub(plan.amount).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "withdrawal of {} exceeds total staked {}",
                    plan.amount, book.pool.total_staked
                ))
            })?;

            book.positions.replace(account, Some(plan.position));
            book.pool.total_staked = total_staked;
            book.record(
                now,
                EventKind::WithdrawalInitiated {
                    account: account.clone(),
                    amount,
                },
            );
            self.metrics.withdrawals_initiated_total.inc();

            let delay = book.params.unstaking_delay_secs;
            let executable_at = now.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX));

            info!(
                account = %account,
                amount,
                executable_at,
                total_staked,
                "Withdrawal initiated"
            );
            Ok(WithdrawalTicket {
                account: account.clone(),
                amount,
                initiated_at: now,
                executable_at,
            })
        })
    }

    /// Pay out `account`'s open withdrawal request
    ///
    /// Pays the requested principal from the vault and the reward frozen at
    /// the exit point from the reward source. A partial withdrawal re-opens
    /// the remainder at the live accumulator.
    pub fn execute_withdrawal(&self, account: &AccountId) -> Result<Payout> {
        self.with_book("execute_withdrawal", |book, now| {
            book.ensure_live()?;

            let live = book.pool.accumulator.current();
            let delay = book.params.unstaking_delay_secs;
            let plan = book.positions.plan_settlement(account, live, now, delay)?;

            let mut counters = book.pool.counters;
            counters.record_payout(plan.reward)?;

            let remaining = plan.position.as_ref().map_or(0, |p| p.principal);
            let checkpoint = book.checkpoint(account);
            book.positions.replace(account, plan.position);
            book.pool.counters = counters;

            let legs = [
                TransferLeg::new(&book.params.vault, account, plan.principal),
                TransferLeg::new(&book.params.reward_source, account, plan.reward),
            ];
            self.settle_or_rollback(book, checkpoint, &legs)?;

            book.record(
                now,
                EventKind::WithdrawalExecuted {
                    account: account.clone(),
                    principal: plan.principal,
                    reward: plan.reward,
                    remaining,
                },
            );
            self.metrics.withdrawals_executed_total.inc();

            info!(
                account = %account,
                principal = plan.principal,
                reward = plan.reward,
                remaining,
                paid = %display_tokens(
                    plan.principal.saturating_add(plan.reward),
                    book.params.token_decimals
                ),
                "Withdrawal executed"
            );
            Ok(Payout {
                account: account.clone(),
                principal: plan.principal,
                reward: plan.reward,
                remaining,
            })
        })
    }

    /// Fold reward that arrived in the reward source since the last call
    /// into the accumulator
    pub fn distribute(&self, caller: &AccountId) -> Result<Distribution> {
        self.with_book("distribute", |book, now| {
            book.ensure_live()?;
            book.access.require_distributor(caller)?;

            let pool_balance = self.token.balance_of(&book.params.reward_source)?;
            let total_staked = book.pool.total_staked;

            let pool = &mut book.pool;
            let distribution =
                pool.counters
                    .distribute(&mut pool.accumulator, pool_balance, total_staked)?;

            book.record(
                now,
                EventKind::RewardsDistributed {
                    distributor: caller.clone(),
                    amount: distribution.newly_added,
                    accumulator: distribution.accumulator.to_string(),
                    total_staked,
                },
            );
            self.metrics.distributions_total.inc();

            info!(
                distributor = %caller,
                amount = distribution.newly_added,
                increment = %distribution.increment,
                accumulator = %distribution.accumulator,
                total_staked,
                "Rewards distributed"
            );
            Ok(distribution)
        })
    }

    /// Refuse state-mutating operations until unpaused
    pub fn pause(&self, by: &AccountId) -> Result<()> {
        self.with_book("pause", |book, now| {
            book.access.require(Role::Operator, by)?;
            book.ensure_live()?;
            book.paused = true;
            book.record(now, EventKind::Paused { by: by.clone() });
            info!(by = %by, "Ledger paused");
            Ok(())
        })
    }

    /// Resume normal operation
    pub fn unpause(&self, by: &AccountId) -> Result<()> {
        self.with_book("unpause", |book, now| {
            book.access.require(Role::Operator, by)?;
            if !book.paused {
                return Err(Error::NotPaused);
            }
            book.paused = false;
            book.record(now, EventKind::Unpaused { by: by.clone() });
            info!(by = %by, "Ledger unpaused");
            Ok(())
        })
    }

    /// Change pool parameters; only while paused
    ///
    /// Switching the reward source keeps the distribution counters, so the
    /// operator must move the old source's balance to the new one first.
    pub fn update_config(&self, by: &AccountId, update: PoolUpdate) -> Result<PoolParams> {
        self.with_book("update_config", |book, now| {
            book.access.require(Role::Operator, by)?;
            if !book.paused {
                return Err(Error::NotPaused);
            }

            let mut params = book.params.clone();
            if let Some(cap) = update.staking_cap {
                params.staking_cap = cap;
            }
            if let Some(delay) = update.unstaking_delay_secs {
                params.unstaking_delay_secs = delay;
            }
            if let Some(source) = update.reward_source {
                params.reward_source = source;
            }
            params.validate()?;

            if params.staking_cap < book.pool.total_staked {
                warn!(
                    cap = params.staking_cap,
                    total_staked = book.pool.total_staked,
                    "Staking cap below current stake, deposits blocked until withdrawals"
                );
            }

            book.params = params.clone();
            book.record(
                now,
                EventKind::ConfigUpdated {
                    by: by.clone(),
                    staking_cap: params.staking_cap,
                    unstaking_delay_secs: params.unstaking_delay_secs,
                    reward_source: params.reward_source.clone(),
                },
            );
            info!(by = %by, ?params, "Pool configuration updated");
            Ok(params)
        })
    }

    /// Grant `role` to `account`
    pub fn grant_role(&self, by: &AccountId, role: Role, account: &AccountId) -> Result<bool> {
        self.with_book("grant_role", |book, now| {
            book.access.require(Role::Operator, by)?;
            let added = book.access.grant(role, account.clone());
            if added {
                book.record(
                    now,
                    EventKind::RoleGranted {
                        role,
                        account: account.clone(),
                    },
                );
                info!(by = %by, %role, account = %account, "Role granted");
            }
            Ok(added)
        })
    }

    /// Revoke `role` from `account`
    pub fn revoke_role(&self, by: &AccountId, role: Role, account: &AccountId) -> Result<bool> {
        self.with_book("revoke_role", |book, now| {
            book.access.require(Role::Operator, by)?;
            let removed = book.access.revoke(role, account)?;
            if removed {
                book.record(
                    now,
                    EventKind::RoleRevoked {
                        role,
                        account: account.clone(),
                    },
                );
                info!(by = %by, %role, account = %account, "Role revoked");
            }
            Ok(removed)
        })
    }

    /// Position of `account`, `None` when it never deposited or fully withdrew
    pub fn position_of(&self, account: &AccountId) -> Result<Option<PositionView>> {
        self.read_book(|book, now| {
            book.positions.view(
                account,
                book.pool.accumulator.current(),
                now,
                book.params.unstaking_delay_secs,
            )
        })
    }

    /// Pool-wide counters
    pub fn pool(&self) -> Result<PoolSummary> {
        self.read_book(|book, _| Ok(book.summary()))
    }

    /// Current pool parameters
    pub fn params(&self) -> Result<PoolParams> {
        self.read_book(|book, _| Ok(book.params.clone()))
    }

    /// Pause flag
    pub fn is_paused(&self) -> Result<bool> {
        self.read_book(|book, _| Ok(book.paused))
    }

    /// Drain the event journal
    pub fn take_events(&self) -> Result<Vec<LedgerEvent>> {
        self.with_book("take_events", |book, _| Ok(book.journal.drain(..).collect()))
    }

    /// Capture the full ledger state
    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.read_book(|book, now| {
            Ok(LedgerSnapshot::new(
                now,
                book.pool.clone(),
                book.positions.clone(),
                book.params.clone(),
                book.access.clone(),
                book.paused,
            ))
        })
    }

    /// Audit every conservation invariant
    ///
    /// Walks all positions, so this is an offline check and never part of an
    /// operation path.
    pub fn verify_conservation(&self) -> Result<ConservationReport> {
        self.read_book(|book, _| {
            let (active_principal, principal) = book.check_total_staked()?;

            let live = book.pool.accumulator.current();
            let mut owed_rewards: Amount = 0;
            for (_, position) in book.positions.iter() {
                owed_rewards = owed_rewards
                    .checked_add(position.owed_reward(live)?)
                    .ok_or_else(|| Error::Overflow("owed reward sum".to_string()))?;
            }

            let vault_balance = self.token.balance_of(&book.params.vault)?;
            let reward_source_balance = self.token.balance_of(&book.params.reward_source)?;
            let counters = book.pool.counters;

            if vault_balance < principal {
                return Err(Error::InvariantViolation(format!(
                    "vault holds {} but positions hold {}",
                    vault_balance, principal
                )));
            }
            if owed_rewards > reward_source_balance {
                return Err(Error::InvariantViolation(format!(
                    "owed rewards {} exceed reward source balance {}",
                    owed_rewards, reward_source_balance
                )));
            }
            if counters.lifetime_paid > counters.lifetime_distributed {
                return Err(Error::InvariantViolation(format!(
                    "paid {} exceeds distributed {}",
                    counters.lifetime_paid, counters.lifetime_distributed
                )));
            }

            Ok(ConservationReport {
                total_staked: book.pool.total_staked,
                active_principal,
                principal,
                vault_balance,
                owed_rewards,
                reward_source_balance,
                lifetime_distributed: counters.lifetime_distributed,
                lifetime_paid: counters.lifetime_paid,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accumulator::{RewardPoint, SCALE},
        clock::ManualClock,
        token::MemoryToken,
        types::PositionStatus,
    };
    use parking_lot::Mutex;

    struct Fixture {
        ledger: StakingLedger<Arc<MemoryToken>>,
        token: Arc<MemoryToken>,
        clock: Arc<ManualClock>,
    }

    fn account(id: &str) -> AccountId {
        AccountId::new(id)
    }

    fn fixture() -> Fixture {
        let token = Arc::new(MemoryToken::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let config = PoolConfig {
            staking_cap: 10_000,
            unstaking_delay_secs: 60,
            distributors: vec![account("keeper")],
            ..Default::default()
        };
        let ledger = StakingLedger::new(&config, token.clone(), clock.clone()).unwrap();

        for id in ["alice", "bob", "mallory"] {
            token.mint(&account(id), 5_000);
        }
        Fixture {
            ledger,
            token,
            clock,
        }
    }

    fn reward_source() -> AccountId {
        PoolConfig::default().reward_source
    }

    fn operator() -> AccountId {
        PoolConfig::default().operator
    }

    #[test]
    fn test_deposit_moves_tokens_into_vault() {
        let f = fixture();
        let principal = f.ledger.deposit(&account("alice"), 1_000).unwrap();
        assert_eq!(principal, 1_000);
        assert_eq!(f.token.balance(&account("alice")), 4_000);
        assert_eq!(f.token.balance(&PoolConfig::default().vault_account), 1_000);

        let view = f.ledger.position_of(&account("alice")).unwrap().unwrap();
        assert_eq!(view.started_at, 1_000);
        assert_eq!(view.status, PositionStatus::Active);
        assert_eq!(f.ledger.pool().unwrap().total_staked, 1_000);
    }

    #[test]
    fn test_cap_exceeded_leaves_state_unchanged() {
        let f = fixture();
        f.ledger.deposit(&account("alice"), 5_000).unwrap();
        f.ledger.deposit(&account("bob"), 4_000).unwrap();
        let before = f.ledger.pool().unwrap();

        let err = f.ledger.deposit(&account("mallory"), 1_001).unwrap_err();
        assert!(matches!(
            err,
            Error::CapExceeded {
                requested: 1_001,
                available: 1_000,
                cap: 10_000
            }
        ));
        assert_eq!(f.ledger.pool().unwrap(), before);
        assert!(f.ledger.position_of(&account("mallory")).unwrap().is_none());
        assert_eq!(f.token.balance(&account("mallory")), 5_000);

        // exactly at the cap is fine
        f.ledger.deposit(&account("mallory"), 1_000).unwrap();
    }

    #[test]
    fn test_top_up_compounds_and_moves_reward() {
        let f = fixture();
        f.ledger.deposit(&account("alice"), 1_000).unwrap();
        f.token.mint(&reward_source(), 500);
        f.ledger.distribute(&account("keeper")).unwrap();

        let principal = f.ledger.deposit(&account("alice"), 100).unwrap();
        assert_eq!(principal, 1_600);
        assert_eq!(f.token.balance(&reward_source()), 0);

        let pool = f.ledger.pool().unwrap();
        assert_eq!(pool.total_staked, 1_600);
        assert_eq!(pool.withdrawn_since_last_distribution, 500);

        // compounded reward is not distributed a second time
        let d = f.ledger.distribute(&account("keeper"));
        assert!(matches!(d, Err(Error::NoRewards)));
        f.ledger.verify_conservation().unwrap();
    }

    #[test]
    fn test_failed_transfer_rolls_back_deposit() {
        let f = fixture();
        f.token.fail_transfers_for(&account("alice"));

        let err = f.ledger.deposit(&account("alice"), 1_000).unwrap_err();
        assert!(matches!(err, Error::Token(_)));
        assert!(f.ledger.position_of(&account("alice")).unwrap().is_none());
        assert_eq!(f.ledger.pool().unwrap().total_staked, 0);
        assert!(f.ledger.take_events().unwrap().is_empty());
    }

    #[test]
    fn test_failed_reward_leg_rolls_back_withdrawal() {
        let f = fixture();
        f.ledger.deposit(&account("alice"), 1_000).unwrap();
        f.token.mint(&reward_source(), 100);
        f.ledger.distribute(&operator()).unwrap();
        f.ledger.initiate_withdrawal(&account("alice"), 1_000).unwrap();
        f.clock.advance(60);

        f.token.fail_transfers_for(&reward_source());
        let before = f.ledger.pool().unwrap();
        let err = f.ledger.execute_withdrawal(&account("alice")).unwrap_err();
        assert!(matches!(err, Error::Token(_)));

        // principal leg was reversed, position and counters restored
        assert_eq!(f.token.balance(&account("alice")), 4_000);
        assert_eq!(f.ledger.pool().unwrap(), before);
        let view = f.ledger.position_of(&account("alice")).unwrap().unwrap();
        assert_eq!(view.status, PositionStatus::Withdrawable);

        f.token.clear_failures();
        let payout = f.ledger.execute_withdrawal(&account("alice")).unwrap();
        assert_eq!(payout.total(), 1_100);
    }

    #[test]
    fn test_reentrant_call_from_token_is_rejected() {
        let f = fixture();
        let ledger = Arc::new(f.ledger);
        let weak = Arc::downgrade(&ledger);
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let observed = seen.clone();
        f.token.set_hook(Arc::new(move |_leg: &TransferLeg| {
            if let Some(ledger) = weak.upgrade() {
                if let Err(e) = ledger.deposit(&account("mallory"), 1) {
                    observed.lock().push(e.kind());
                }
                if let Err(e) = ledger.position_of(&account("alice")) {
                    observed.lock().push(e.kind());
                }
            }
        }));

        ledger.deposit(&account("alice"), 1_000).unwrap();
        assert_eq!(*seen.lock(), vec!["reentrant", "reentrant"]);
        assert!(ledger.position_of(&account("mallory")).unwrap().is_none());
        assert_eq!(ledger.pool().unwrap().total_staked, 1_000);
    }

    #[test]
    fn test_pause_blocks_mutations() {
        let f = fixture();
        f.ledger.deposit(&account("alice"), 1_000).unwrap();
        f.ledger.pause(&operator()).unwrap();

        assert!(matches!(
            f.ledger.deposit(&account("alice"), 1),
            Err(Error::Paused)
        ));
        assert!(matches!(
            f.ledger.initiate_withdrawal(&account("alice"), 1),
            Err(Error::Paused)
        ));
        assert!(matches!(
            f.ledger.execute_withdrawal(&account("alice")),
            Err(Error::Paused)
        ));
        assert!(matches!(
            f.ledger.distribute(&operator()),
            Err(Error::Paused)
        ));
        assert!(matches!(f.ledger.pause(&operator()), Err(Error::Paused)));

        // reads still work
        assert!(f.ledger.position_of(&account("alice")).unwrap().is_some());

        f.ledger.unpause(&operator()).unwrap();
        assert!(matches!(f.ledger.unpause(&operator()), Err(Error::NotPaused)));
        f.ledger.deposit(&account("alice"), 1).unwrap();
    }

    #[test]
    fn test_only_operator_pauses() {
        let f = fixture();
        assert!(matches!(
            f.ledger.pause(&account("alice")),
            Err(Error::Unauthorized(_))
        ));
        assert!(!f.ledger.is_paused().unwrap());
    }

    #[test]
    fn test_distribute_requires_role() {
        let f = fixture();
        f.ledger.deposit(&account("alice"), 1_000).unwrap();
        f.token.mint(&reward_source(), 10);

        assert!(matches!(
            f.ledger.distribute(&account("alice")),
            Err(Error::Unauthorized(_))
        ));

        f.ledger
            .grant_role(&operator(), Role::Distributor, &account("alice"))
            .unwrap();
        f.ledger.distribute(&account("alice")).unwrap();

        f.ledger
            .revoke_role(&operator(), Role::Distributor, &account("alice"))
            .unwrap();
        assert!(f.ledger.distribute(&account("alice")).is_err());
    }

    #[test]
    fn test_update_config_requires_pause() {
        let f = fixture();
        let update = PoolUpdate {
            staking_cap: Some(20_000),
            unstaking_delay_secs: Some(120),
            reward_source: Some(account("treasury")),
        };

        assert!(matches!(
            f.ledger.update_config(&operator(), update.clone()),
            Err(Error::NotPaused)
        ));

        f.ledger.pause(&operator()).unwrap();
        assert!(matches!(
            f.ledger.update_config(&account("alice"), update.clone()),
            Err(Error::Unauthorized(_))
        ));

        let params = f.ledger.update_config(&operator(), update).unwrap();
        assert_eq!(params.staking_cap, 20_000);
        assert_eq!(params.unstaking_delay_secs, 120);
        assert_eq!(params.reward_source, account("treasury"));
        assert_eq!(f.ledger.params().unwrap(), params);

        let bad = PoolUpdate {
            reward_source: Some(PoolConfig::default().vault_account),
            ..Default::default()
        };
        assert!(matches!(
            f.ledger.update_config(&operator(), bad),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_events_follow_commits() {
        let f = fixture();
        f.ledger.deposit(&account("alice"), 1_000).unwrap();
        let _ = f.ledger.deposit(&account("alice"), 0);
        f.ledger.initiate_withdrawal(&account("alice"), 400).unwrap();

        let events = f.ledger.take_events().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, EventKind::Deposited { amount: 1_000, .. }));
        assert!(matches!(
            events[1].kind,
            EventKind::WithdrawalInitiated { amount: 400, .. }
        ));
        assert!(f.ledger.take_events().unwrap().is_empty());
    }

    #[test]
    fn test_rejections_are_counted() {
        let f = fixture();
        let _ = f.ledger.execute_withdrawal(&account("alice"));
        let _ = f.ledger.execute_withdrawal(&account("alice"));
        assert_eq!(
            f.ledger
                .metrics()
                .rejected_total
                .with_label_values(&["not_initiated"])
                .get(),
            2
        );
    }

    #[test]
    fn test_pending_remainder_does_not_earn() {
        let f = fixture();
        f.ledger.deposit(&account("alice"), 1_000).unwrap();
        f.ledger.initiate_withdrawal(&account("alice"), 400).unwrap();

        // 600 still staked and earning for the pool, reward frozen for alice
        f.token.mint(&reward_source(), 600);
        let d = f.ledger.distribute(&operator()).unwrap();
        assert_eq!(d.total_staked, 600);
        assert_eq!(d.accumulator, RewardPoint::from(SCALE));

        let view = f.ledger.position_of(&account("alice")).unwrap().unwrap();
        assert_eq!(view.owed_reward, 0);

        f.clock.advance(60);
        let payout = f.ledger.execute_withdrawal(&account("alice")).unwrap();
        assert_eq!(payout.reward, 0);
        assert_eq!(payout.remaining, 600);

        let view = f.ledger.position_of(&account("alice")).unwrap().unwrap();
        assert_eq!(view.owed_reward, 0);
        assert_eq!(view.status, PositionStatus::Active);
        f.ledger.verify_conservation().unwrap();
    }
}
