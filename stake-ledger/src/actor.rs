//! Actor front-end for async callers
//!
//! The ledger itself is synchronous and serializes writers with a lock. This
//! module puts a single Tokio task in front of it so async callers queue on a
//! bounded mailbox instead of blocking a runtime thread on the lock.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │        StakingLedger::{deposit, distribute, ..}       │
//! │                       │                               │
//! │                       ▼  on shutdown                  │
//! │              SnapshotStore::save()                    │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{
    distribution::Distribution,
    ledger::{PoolParams, PoolUpdate, StakingLedger},
    storage::{LedgerSnapshot, SnapshotStore},
    token::TokenLedger,
    types::{AccountId, Amount, Payout, PoolSummary, PositionView, WithdrawalTicket},
    Error, LedgerEvent, Result,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Stake tokens
    Deposit {
        account: AccountId,
        amount: Amount,
        response: Reply<Amount>,
    },

    /// Open a withdrawal request
    InitiateWithdrawal {
        account: AccountId,
        amount: Amount,
        response: Reply<WithdrawalTicket>,
    },

    /// Pay out a withdrawal request
    ExecuteWithdrawal {
        account: AccountId,
        response: Reply<Payout>,
    },

    /// Distribute newly injected reward
    Distribute {
        caller: AccountId,
        response: Reply<Distribution>,
    },

    /// Pause the ledger
    Pause {
        by: AccountId,
        response: Reply<()>,
    },

    /// Unpause the ledger
    Unpause {
        by: AccountId,
        response: Reply<()>,
    },

    /// Change pool parameters
    UpdateConfig {
        by: AccountId,
        update: PoolUpdate,
        response: Reply<PoolParams>,
    },

    /// Read a position
    PositionOf {
        account: AccountId,
        response: Reply<Option<PositionView>>,
    },

    /// Read pool counters
    Pool { response: Reply<PoolSummary> },

    /// Drain the event journal
    TakeEvents { response: Reply<Vec<LedgerEvent>> },

    /// Capture state, writing it to the snapshot store when one is configured
    Snapshot { response: Reply<LedgerSnapshot> },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor<T: TokenLedger> {
    ledger: Arc<StakingLedger<T>>,
    mailbox: mpsc::Receiver<LedgerMessage>,
    snapshots: Option<SnapshotStore>,
}

impl<T: TokenLedger> LedgerActor<T> {
    /// Create new actor
    pub fn new(
        ledger: Arc<StakingLedger<T>>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        snapshots: Option<SnapshotStore>,
    ) -> Self {
        Self {
            ledger,
            mailbox,
            snapshots,
        }
    }

    /// Run the actor event loop until shutdown or every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                break;
            }
            self.handle_message(msg);
        }

        if self.snapshots.is_some() {
            if let Err(e) = self.write_snapshot() {
                tracing::error!("Failed to write final snapshot: {}", e);
            }
        }
        tracing::info!("Ledger actor stopped");
    }

    fn handle_message(&self, msg: LedgerMessage) {
        let ledger = &self.ledger;

        // A dropped receiver means the caller gave up; nothing to do
        match msg {
            LedgerMessage::Deposit {
                account,
                amount,
                response,
            } => {
                let _ = response.send(ledger.deposit(&account, amount));
            }

            LedgerMessage::InitiateWithdrawal {
                account,
                amount,
                response,
            } => {
                let _ = response.send(ledger.initiate_withdrawal(&account, amount));
            }

            LedgerMessage::ExecuteWithdrawal { account, response } => {
                let _ = response.send(ledger.execute_withdrawal(&account));
            }

            LedgerMessage::Distribute { caller, response } => {
                let _ = response.send(ledger.distribute(&caller));
            }

            LedgerMessage::Pause { by, response } => {
                let _ = response.send(ledger.pause(&by));
            }

            LedgerMessage::Unpause { by, response } => {
                let _ = response.send(ledger.unpause(&by));
            }

            LedgerMessage::UpdateConfig {
                by,
                update,
                response,
            } => {
                let _ = response.send(ledger.update_config(&by, update));
            }

            LedgerMessage::PositionOf { account, response } => {
                let _ = response.send(ledger.position_of(&account));
            }

            LedgerMessage::Pool { response } => {
                let _ = response.send(ledger.pool());
            }

            LedgerMessage::TakeEvents { response } => {
                let _ = response.send(ledger.take_events());
            }

            LedgerMessage::Snapshot { response } => {
                let _ = response.send(self.write_snapshot());
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn write_snapshot(&self) -> Result<LedgerSnapshot> {
        let snapshot = self.ledger.snapshot()?;
        if let Some(store) = &self.snapshots {
            store.save(&snapshot)?;
        }
        Ok(snapshot)
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<R>(&self, build: impl FnOnce(Reply<R>) -> LedgerMessage) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Stake tokens
    pub async fn deposit(&self, account: AccountId, amount: Amount) -> Result<Amount> {
        self.request(|response| LedgerMessage::Deposit {
            account,
            amount,
            response,
        })
        .await
    }

    /// Open a withdrawal request
    pub async fn initiate_withdrawal(
        &self,
        account: AccountId,
        amount: Amount,
    ) -> Result<WithdrawalTicket> {
        self.request(|response| LedgerMessage::InitiateWithdrawal {
            account,
            amount,
            response,
        })
        .await
    }

    /// Pay out a withdrawal request
    pub async fn execute_withdrawal(&self, account: AccountId) -> Result<Payout> {
        self.request(|response| LedgerMessage::ExecuteWithdrawal { account, response })
            .await
    }

    /// Distribute newly injected reward
    pub async fn distribute(&self, caller: AccountId) -> Result<Distribution> {
        self.request(|response| LedgerMessage::Distribute { caller, response })
            .await
    }

    /// Pause the ledger
    pub async fn pause(&self, by: AccountId) -> Result<()> {
        self.request(|response| LedgerMessage::Pause { by, response })
            .await
    }

    /// Unpause the ledger
    pub async fn unpause(&self, by: AccountId) -> Result<()> {
        self.request(|response| LedgerMessage::Unpause { by, response })
            .await
    }

    /// Change pool parameters
    pub async fn update_config(&self, by: AccountId, update: PoolUpdate) -> Result<PoolParams> {
        self.request(|response| LedgerMessage::UpdateConfig {
            by,
            update,
            response,
        })
        .await
    }

    /// Read a position
    pub async fn position_of(&self, account: AccountId) -> Result<Option<PositionView>> {
        self.request(|response| LedgerMessage::PositionOf { account, response })
            .await
    }

    /// Read pool counters
    pub async fn pool(&self) -> Result<PoolSummary> {
        self.request(|response| LedgerMessage::Pool { response })
            .await
    }

    /// Drain the event journal
    pub async fn take_events(&self) -> Result<Vec<LedgerEvent>> {
        self.request(|response| LedgerMessage::TakeEvents { response })
            .await
    }

    /// Capture state and persist it when a snapshot store is configured
    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.request(|response| LedgerMessage::Snapshot { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
///
/// The returned join handle completes once the actor has stopped and written
/// its final snapshot.
pub fn spawn_ledger_actor<T: TokenLedger + 'static>(
    ledger: Arc<StakingLedger<T>>,
    mailbox_capacity: usize,
    snapshots: Option<SnapshotStore>,
) -> (LedgerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1)); // Bounded channel for backpressure
    let actor = LedgerActor::new(ledger, rx, snapshots);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (LedgerHandle::new(tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, token::MemoryToken, PoolConfig};
    use tempfile::TempDir;

    fn setup() -> (Arc<StakingLedger<Arc<MemoryToken>>>, Arc<MemoryToken>) {
        let token = Arc::new(MemoryToken::new());
        let clock = Arc::new(ManualClock::new(0));
        let config = PoolConfig {
            staking_cap: 1_000_000,
            unstaking_delay_secs: 0,
            ..Default::default()
        };
        let ledger = StakingLedger::new(&config, token.clone(), clock).unwrap();
        (Arc::new(ledger), token)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (ledger, _token) = setup();
        let (handle, task) = spawn_ledger_actor(ledger, 16, None);

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let err = handle.pool().await.unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }

    #[tokio::test]
    async fn test_actor_round_trip() {
        let (ledger, token) = setup();
        let alice = AccountId::new("alice");
        let operator = PoolConfig::default().operator;
        token.mint(&alice, 1_000);

        let (handle, task) = spawn_ledger_actor(ledger, 16, None);

        assert_eq!(handle.deposit(alice.clone(), 1_000).await.unwrap(), 1_000);
        token.mint(&PoolConfig::default().reward_source, 250);
        let d = handle.distribute(operator).await.unwrap();
        assert_eq!(d.newly_added, 250);

        let view = handle.position_of(alice.clone()).await.unwrap().unwrap();
        assert_eq!(view.owed_reward, 250);

        handle.initiate_withdrawal(alice.clone(), 1_000).await.unwrap();
        let payout = handle.execute_withdrawal(alice.clone()).await.unwrap();
        assert_eq!(payout.total(), 1_250);
        assert_eq!(token.balance(&alice), 1_250);

        assert_eq!(handle.take_events().await.unwrap().len(), 4);
        assert_eq!(handle.pool().await.unwrap().total_staked, 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_propagates_errors() {
        let (ledger, _token) = setup();
        let (handle, task) = spawn_ledger_actor(ledger, 16, None);

        let err = handle
            .execute_withdrawal(AccountId::new("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotInitiated(_)));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_handles_serialize() {
        let (ledger, token) = setup();
        for i in 0..8 {
            token.mint(&AccountId::new(format!("user-{}", i)), 100);
        }

        let (handle, task) = spawn_ledger_actor(ledger, 4, None);
        let mut joins = Vec::new();
        for i in 0..8 {
            let handle = handle.clone();
            joins.push(tokio::spawn(async move {
                handle
                    .deposit(AccountId::new(format!("user-{}", i)), 100)
                    .await
            }));
        }
        for join in joins {
            join.await.unwrap().unwrap();
        }

        let pool = handle.pool().await.unwrap();
        assert_eq!(pool.total_staked, 800);
        assert_eq!(pool.positions, 8);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_writes_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().join("snapshot.bin"));
        let (ledger, token) = setup();
        let alice = AccountId::new("alice");
        token.mint(&alice, 500);

        let (handle, task) = spawn_ledger_actor(ledger, 16, Some(store.clone()));
        handle.deposit(alice.clone(), 500).await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.pool.total_staked, 500);

        let restored =
            StakingLedger::restore(snapshot, token.clone(), Arc::new(ManualClock::new(0)))
                .unwrap();
        assert_eq!(restored.position_of(&alice).unwrap().unwrap().principal, 500);
    }
}
