//! Snapshot persistence
//!
//! # File layout
//!
//! A snapshot file is a bincode-encoded envelope:
//!
//! - `format_version` - rejected when it does not match [`SNAPSHOT_FORMAT_VERSION`]
//! - `digest` - SHA-256 over `payload`
//! - `payload` - bincode-encoded [`LedgerSnapshot`]
//!
//! Writes go to a sibling temp file which is fsynced and renamed over the
//! target, so a crash mid-write leaves the previous snapshot intact.
//!
//! Token balances of an in-process token backend are stored in a second file
//! next to the ledger snapshot (same envelope, `.balances` extension). They
//! are written after the ledger has stopped so both files describe the same
//! instant.

use crate::{
    access::AccessControl,
    error::{Error, Result},
    ledger::{PoolParams, PoolState},
    position::PositionStore,
    types::{AccountId, Amount, Timestamp},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current snapshot envelope version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Full ledger state at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Unique snapshot ID (UUIDv7 for time-ordering)
    pub snapshot_id: Uuid,

    /// Ledger time the snapshot was taken
    pub taken_at: Timestamp,

    /// Pool accounting state
    pub pool: PoolState,

    /// All open positions
    pub positions: PositionStore,

    /// Pool parameters
    pub params: PoolParams,

    /// Role assignments
    pub access: AccessControl,

    /// Pause flag
    pub paused: bool,
}

impl LedgerSnapshot {
    /// Stamp a new snapshot
    pub fn new(
        taken_at: Timestamp,
        pool: PoolState,
        positions: PositionStore,
        params: PoolParams,
        access: AccessControl,
        paused: bool,
    ) -> Self {
        Self {
            snapshot_id: Uuid::now_v7(),
            taken_at,
            pool,
            positions,
            params,
            access,
            paused,
        }
    }
}

/// Token balances held outside the ledger, saved alongside its snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Ledger time the balances were exported
    pub taken_at: Timestamp,

    /// Non-zero balances by account
    pub balances: BTreeMap<AccountId, Amount>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    digest: [u8; 32],
    payload: Vec<u8>,
}

fn digest(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

fn write_envelope<T: Serialize>(path: &Path, value: &T) -> Result<usize> {
    let payload = bincode::serialize(value)?;
    let envelope = Envelope {
        format_version: SNAPSHOT_FORMAT_VERSION,
        digest: digest(&payload),
        payload,
    };
    let bytes = bincode::serialize(&envelope)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(bytes.len())
}

fn read_envelope<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    let envelope: Envelope = bincode::deserialize(&bytes)?;

    if envelope.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(Error::Storage(format!(
            "Unsupported snapshot format {} (expected {})",
            envelope.format_version, SNAPSHOT_FORMAT_VERSION
        )));
    }

    if digest(&envelope.payload) != envelope.digest {
        return Err(Error::Storage(format!(
            "Snapshot digest mismatch in {:?}",
            path
        )));
    }

    Ok(bincode::deserialize(&envelope.payload)?)
}

/// Snapshot file store
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when a snapshot file exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Location of the token balance file
    pub fn balances_path(&self) -> PathBuf {
        self.path.with_extension("balances")
    }

    /// Atomically replace the stored snapshot
    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let bytes = write_envelope(&self.path, snapshot)?;
        tracing::info!(
            snapshot_id = %snapshot.snapshot_id,
            positions = snapshot.positions.len(),
            bytes,
            path = ?self.path,
            "Snapshot written"
        );
        Ok(())
    }

    /// Load and verify the stored snapshot
    pub fn load(&self) -> Result<LedgerSnapshot> {
        let snapshot: LedgerSnapshot = read_envelope(&self.path)?;
        tracing::info!(
            snapshot_id = %snapshot.snapshot_id,
            taken_at = snapshot.taken_at,
            path = ?self.path,
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Atomically replace the stored token balances
    pub fn save_balances(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        let path = self.balances_path();
        let bytes = write_envelope(&path, snapshot)?;
        tracing::info!(
            accounts = snapshot.balances.len(),
            bytes,
            path = ?path,
            "Token balances written"
        );
        Ok(())
    }

    /// Load the stored token balances, `None` when no file exists yet
    pub fn load_balances_if_present(&self) -> Result<Option<BalanceSnapshot>> {
        let path = self.balances_path();
        if !path.is_file() {
            return Ok(None);
        }
        read_envelope(&path).map(Some)
    }

    /// Load the stored snapshot, `None` when no file exists yet
    pub fn load_if_present(&self) -> Result<Option<LedgerSnapshot>> {
        if !self.exists() {
            return Ok(None);
        }
        self.load().map(Some)
    }
}
