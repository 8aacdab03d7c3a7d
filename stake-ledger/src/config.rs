//! Configuration for the stake ledger

use crate::types::{amount_serde, AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One token with 18 decimals, in base units
pub const TOKEN_UNIT: Amount = 1_000_000_000_000_000_000;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Pool parameters
    pub pool: PoolConfig,

    /// Snapshot configuration
    pub snapshot: SnapshotConfig,

    /// Logging and metrics
    pub telemetry: TelemetryConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "stake-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            pool: PoolConfig::default(),
            snapshot: SnapshotConfig::default(),
            telemetry: TelemetryConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// Pool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum total stake (base units)
    #[serde(with = "amount_serde")]
    pub staking_cap: Amount,

    /// Waiting period between initiating and executing a withdrawal
    pub unstaking_delay_secs: u64,

    /// Token account holding staked principal
    pub vault_account: AccountId,

    /// Token account holding injected rewards
    pub reward_source: AccountId,

    /// Initial operator
    pub operator: AccountId,

    /// Accounts allowed to trigger distribution
    pub distributors: Vec<AccountId>,

    /// Token decimals for log output
    pub token_decimals: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            staking_cap: 50_000_000 * TOKEN_UNIT, // 50M tokens
            unstaking_delay_secs: 7 * 24 * 60 * 60, // 7 days
            vault_account: AccountId::new("stake-vault"),
            reward_source: AccountId::new("reward-pool"),
            operator: AccountId::new("operator"),
            distributors: Vec::new(),
            token_decimals: 18,
        }
    }
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Snapshot file
    pub path: PathBuf,

    /// Restore on start and write on shutdown
    pub enabled: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/stake-ledger/snapshot.bin"),
            enabled: true,
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Emit JSON log lines
    pub log_json: bool,

    /// Metrics listen address
    pub metrics_listen_addr: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_json: false,
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox capacity
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000, // Bounded channel for backpressure
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults with environment overrides
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STAKE_LEDGER_*` environment overrides
    pub fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(cap) = std::env::var("STAKE_LEDGER_STAKING_CAP") {
            self.pool.staking_cap = cap
                .parse()
                .map_err(|_| crate::Error::Config(format!("Invalid staking cap: {}", cap)))?;
        }

        if let Ok(delay) = std::env::var("STAKE_LEDGER_UNSTAKING_DELAY_SECS") {
            self.pool.unstaking_delay_secs = delay
                .parse()
                .map_err(|_| crate::Error::Config(format!("Invalid unstaking delay: {}", delay)))?;
        }

        if let Ok(source) = std::env::var("STAKE_LEDGER_REWARD_SOURCE") {
            self.pool.reward_source = AccountId::new(source);
        }

        if let Ok(path) = std::env::var("STAKE_LEDGER_SNAPSHOT_PATH") {
            self.snapshot.path = PathBuf::from(path);
        }

        if let Ok(addr) = std::env::var("STAKE_LEDGER_METRICS_ADDR") {
            self.telemetry.metrics_listen_addr = addr;
        }

        if let Ok(json) = std::env::var("STAKE_LEDGER_LOG_JSON") {
            self.telemetry.log_json = matches!(json.as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Reject configurations the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.pool.staking_cap == 0 {
            return Err(crate::Error::Config("staking cap must be positive".to_string()));
        }
        if self.pool.vault_account == self.pool.reward_source {
            return Err(crate::Error::Config(
                "vault and reward source must be distinct accounts".to_string(),
            ));
        }
        if self.pool.token_decimals > crate::types::MAX_TOKEN_DECIMALS {
            return Err(crate::Error::Config(format!(
                "token decimals must be at most {}",
                crate::types::MAX_TOKEN_DECIMALS
            )));
        }
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config("mailbox capacity must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "stake-ledger");
        assert_eq!(config.pool.staking_cap, 50_000_000 * TOKEN_UNIT);
        assert_eq!(config.pool.unstaking_delay_secs, 604_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_with_large_cap() {
        let config: Config = toml::from_str(
            r#"
            [pool]
            staking_cap = "50_000_000_000000000000000000"
            unstaking_delay_secs = 3600
            reward_source = "treasury"
            distributors = ["keeper"]
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.staking_cap, 50_000_000 * TOKEN_UNIT);
        assert_eq!(config.pool.unstaking_delay_secs, 3600);
        assert_eq!(config.pool.reward_source, AccountId::new("treasury"));
        assert_eq!(config.pool.distributors, vec![AccountId::new("keeper")]);
        assert_eq!(config.pool.vault_account, AccountId::new("stake-vault"));
    }

    #[test]
    fn test_parse_toml_with_integer_cap() {
        let config: Config = toml::from_str("[pool]\nstaking_cap = 1000\n").unwrap();
        assert_eq!(config.pool.staking_cap, 1000);
    }

    #[test]
    fn test_validate_rejects_shared_accounts() {
        let mut config = Config::default();
        config.pool.reward_source = config.pool.vault_account.clone();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        let mut config = Config::default();
        config.pool.staking_cap = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pool.token_decimals = 29;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
