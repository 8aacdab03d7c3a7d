//! Stake ledger server binary

use anyhow::Context;
use stake_ledger::{
    bind_metrics, display_tokens, serve_metrics, spawn_ledger_actor, BalanceSnapshot, Clock,
    Config, LedgerHandle, MemoryToken, SnapshotStore, StakingLedger, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn load_config() -> anyhow::Result<Config> {
    match std::env::var("STAKE_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading config {}", path)),
        Err(_) => Config::from_env().context("loading config from environment"),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Log drained events as JSON lines
async fn drain_events(handle: &LedgerHandle) -> stake_ledger::Result<usize> {
    let events = handle.take_events().await?;
    for event in &events {
        match serde_json::to_string(event) {
            Ok(line) => tracing::info!(target: "stake_ledger::events", "{}", line),
            Err(e) => tracing::warn!("Failed to encode event {}: {}", event.event_id, e),
        }
    }
    Ok(events.len())
}

/// Export the event journal every few seconds, then once more on stop
async fn export_events(handle: LedgerHandle, mut stop: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if drain_events(&handle).await.is_err() {
                    return; // actor stopped
                }
            }
            _ = &mut stop => break,
        }
    }

    match drain_events(&handle).await {
        Ok(count) => tracing::info!(count, "Final events exported"),
        Err(e) => tracing::warn!("Final event export failed: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(config.telemetry.log_json);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting stake ledger server"
    );

    let clock = Arc::new(SystemClock);
    let store = config
        .snapshot
        .enabled
        .then(|| SnapshotStore::new(config.snapshot.path.clone()));

    let (restored, balances) = match &store {
        Some(store) => (
            store.load_if_present().context("reading snapshot")?,
            store
                .load_balances_if_present()
                .context("reading token balances")?,
        ),
        None => (None, None),
    };
    let token = Arc::new(match balances {
        Some(snapshot) => MemoryToken::with_balances(snapshot.balances),
        None => MemoryToken::new(),
    });

    let ledger = match restored {
        Some(snapshot) => StakingLedger::restore(snapshot, token.clone(), clock.clone())
            .context("restoring ledger; snapshot does not match token balances")?,
        None => StakingLedger::new(&config.pool, token.clone(), clock.clone())?,
    };
    let ledger = Arc::new(ledger);

    let listener = bind_metrics(&config.telemetry.metrics_listen_addr)
        .await
        .with_context(|| {
            format!(
                "binding metrics listener on {}",
                config.telemetry.metrics_listen_addr
            )
        })?;
    let mut metrics_task = tokio::spawn(serve_metrics(listener, ledger.metrics().clone()));

    let (handle, actor_task) =
        spawn_ledger_actor(ledger.clone(), config.actor.mailbox_capacity, store.clone());
    let pool = handle.pool().await?;
    let decimals = ledger.params()?.token_decimals;
    tracing::info!(
        total_staked = %display_tokens(pool.total_staked, decimals),
        positions = pool.positions,
        paused = pool.paused,
        "Ledger ready"
    );

    let (stop_export, stop) = oneshot::channel();
    let export_task = tokio::spawn(export_events(handle.clone(), stop));

    let metrics_failure = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutting down stake ledger server");
            None
        }
        served = &mut metrics_task => {
            let reason = match served {
                Ok(Ok(())) => "stopped unexpectedly".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };
            tracing::error!("Metrics server failed, shutting down: {}", reason);
            Some(reason)
        }
    };

    let _ = stop_export.send(());
    export_task.await?;
    handle.shutdown().await?;
    actor_task.await?;
    metrics_task.abort();

    if let Some(store) = &store {
        store
            .save_balances(&BalanceSnapshot {
                taken_at: clock.now(),
                balances: token.balances(),
            })
            .context("writing token balances")?;
    }

    if let Some(reason) = metrics_failure {
        anyhow::bail!("metrics server failed: {}", reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stake_ledger::{AccountId, ManualClock, PoolConfig};

    #[tokio::test]
    async fn test_stop_exports_remaining_events() {
        let token = Arc::new(MemoryToken::new());
        let ledger = StakingLedger::new(
            &PoolConfig::default(),
            token.clone(),
            Arc::new(ManualClock::new(1_700_000_000)),
        )
        .unwrap();
        let (handle, actor_task) = spawn_ledger_actor(Arc::new(ledger), 16, None);

        let (stop_export, stop) = oneshot::channel();
        let export_task = tokio::spawn(export_events(handle.clone(), stop));

        let alice = AccountId::new("alice");
        token.mint(&alice, 100);
        handle.deposit(alice, 100).await.unwrap();

        stop_export.send(()).unwrap();
        export_task.await.unwrap();
        assert!(handle.take_events().await.unwrap().is_empty());

        handle.shutdown().await.unwrap();
        actor_task.await.unwrap();
    }
}
