//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `stake_ledger_deposits_total` - Committed deposits and top-ups
//! - `stake_ledger_withdrawals_initiated_total` - Withdrawal requests opened
//! - `stake_ledger_withdrawals_executed_total` - Withdrawals paid out
//! - `stake_ledger_distributions_total` - Committed distributions
//! - `stake_ledger_rejected_total{kind}` - Rejected operations by error kind
//! - `stake_ledger_total_staked` - Total active stake (lossy f64)
//! - `stake_ledger_positions` - Open positions

use prometheus::{Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed deposits
    pub deposits_total: IntCounter,

    /// Withdrawal requests opened
    pub withdrawals_initiated_total: IntCounter,

    /// Withdrawals paid out
    pub withdrawals_executed_total: IntCounter,

    /// Committed distributions
    pub distributions_total: IntCounter,

    /// Rejected operations by error kind
    pub rejected_total: IntCounterVec,

    /// Total active stake
    pub total_staked: Gauge,

    /// Open positions
    pub positions: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("deposits_total", &self.deposits_total.get())
            .field("distributions_total", &self.distributions_total.get())
            .field("positions", &self.positions.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deposits_total = IntCounter::new(
            "stake_ledger_deposits_total",
            "Committed deposits and top-ups",
        )?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_initiated_total = IntCounter::new(
            "stake_ledger_withdrawals_initiated_total",
            "Withdrawal requests opened",
        )?;
        registry.register(Box::new(withdrawals_initiated_total.clone()))?;

        let withdrawals_executed_total = IntCounter::new(
            "stake_ledger_withdrawals_executed_total",
            "Withdrawals paid out",
        )?;
        registry.register(Box::new(withdrawals_executed_total.clone()))?;

        let distributions_total = IntCounter::new(
            "stake_ledger_distributions_total",
            "Committed reward distributions",
        )?;
        registry.register(Box::new(distributions_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new("stake_ledger_rejected_total", "Rejected operations by error kind"),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let total_staked = Gauge::new("stake_ledger_total_staked", "Total active stake")?;
        registry.register(Box::new(total_staked.clone()))?;

        let positions = IntGauge::new("stake_ledger_positions", "Open positions")?;
        registry.register(Box::new(positions.clone()))?;

        Ok(Self {
            deposits_total,
            withdrawals_initiated_total,
            withdrawals_executed_total,
            distributions_total,
            rejected_total,
            total_staked,
            positions,
            registry,
        })
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, kind: &str) {
        self.rejected_total.with_label_values(&[kind]).inc();
    }

    /// Update pool gauges
    pub fn update_pool(&self, total_staked: u128, positions: usize) {
        // Display only; precision loss above 2^53 is acceptable here
        self.total_staked.set(total_staked as f64);
        self.positions.set(i64::try_from(positions).unwrap_or(i64::MAX));
    }

    /// Registry holding every ledger metric
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.deposits_total.get(), 0);
        assert_eq!(metrics.distributions_total.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.deposits_total.inc();
        assert_eq!(a.deposits_total.get(), 1);
        assert_eq!(b.deposits_total.get(), 0);
    }

    #[test]
    fn test_record_rejection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejection("cap_exceeded");
        metrics.record_rejection("cap_exceeded");
        assert_eq!(
            metrics.rejected_total.with_label_values(&["cap_exceeded"]).get(),
            2
        );
    }

    #[test]
    fn test_registry_gathers_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.update_pool(1_000, 3);

        let families = metrics.registry().gather();
        let positions = families
            .iter()
            .find(|f| f.get_name() == "stake_ledger_positions")
            .unwrap();
        assert_eq!(positions.get_metric()[0].get_gauge().get_value(), 3.0);

        let staked = families
            .iter()
            .find(|f| f.get_name() == "stake_ledger_total_staked")
            .unwrap();
        assert_eq!(staked.get_metric()[0].get_gauge().get_value(), 1_000.0);
    }
}
