//! Stake Ledger
//!
//! Staking reward-distribution ledger: participants lock tokens, reward
//! injected into a reward source is spread pro rata over active stake, and
//! withdrawals go through a timed two-phase exit.
//!
//! # Architecture
//!
//! - **Accumulator**: One scaled reward-per-unit-stake value; every operation is O(1)
//! - **Single Writer**: One lock per ledger; re-entrant calls are rejected
//! - **Commit Then Settle**: State is committed before token transfers and rolled back on failure
//! - **Actor Front-End**: Async callers queue on a bounded mailbox
//!
//! # Invariants
//!
//! - Conservation: Σ(active principal) == total staked
//! - Reward paid never exceeds reward distributed
//! - The accumulator never decreases
//! - Floor rounding everywhere; dust stays in the reward source

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod access;
pub mod accumulator;
pub mod actor;
pub mod clock;
pub mod config;
pub mod distribution;
pub mod error;
pub mod events;
pub mod exporter;
pub mod ledger;
pub mod metrics;
pub mod position;
pub mod storage;
pub mod token;
pub mod types;

// Re-exports
pub use access::Role;
pub use accumulator::{RewardPoint, SCALE};
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, PoolConfig, TOKEN_UNIT};
pub use distribution::Distribution;
pub use error::{Error, Result};
pub use events::{EventKind, LedgerEvent};
pub use exporter::{bind_metrics, metrics_router, serve_metrics};
pub use metrics::Metrics;
pub use ledger::{ConservationReport, PoolParams, PoolUpdate, StakingLedger};
pub use storage::{BalanceSnapshot, LedgerSnapshot, SnapshotStore};
pub use token::{MemoryToken, TokenError, TokenLedger, TransferLeg};
pub use types::{
    display_tokens, AccountId, Amount, Payout, PoolSummary, PositionStatus, PositionView,
    Timestamp, WithdrawalTicket,
};
