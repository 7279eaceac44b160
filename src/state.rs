//! Cursor & dedup store
//!
//! Persists [`RelayState`] as a small JSON file:
//!
//! ```json
//! { "last_block": 23084945, "processed_txs": ["0xabc...", "0xdef..."] }
//! ```
//!
//! ## Durability
//! Saves go to `<path>.tmp`, are fsynced, then renamed over `<path>`, so a
//! crash mid-write leaves either the old or the new file, never a torn one.
//!
//! ## Corruption
//! `load` never fails the process. An unreadable or unparseable file is moved
//! aside to `<path>.corrupt-<unix-ts>` and defaults are returned. The dedup
//! set in the moved file is needed for manual reconciliation before the next
//! forced rescan.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::bounded_cache::BoundedIdSet;

/// Durable relay progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayState {
    /// Last source block whose events were all paid or skipped
    pub cursor: u64,
    /// Source transactions already paid out
    pub processed: BoundedIdSet,
}

impl RelayState {
    pub fn new(cursor: u64, capacity: usize) -> Self {
        Self {
            cursor,
            processed: BoundedIdSet::new(capacity),
        }
    }

    pub fn is_processed(&self, tx_id: &str) -> bool {
        self.processed.contains(tx_id)
    }

    pub fn mark_processed(&mut self, tx_id: String) -> bool {
        self.processed.insert(tx_id)
    }

    /// Forced-rescan: move the cursor to `start_block`, keeping the dedup set.
    pub fn rewind_to(&mut self, start_block: u64) {
        self.cursor = start_block;
    }
}

/// On-disk shape of the state file
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    last_block: Option<u64>,
    #[serde(default)]
    processed_txs: Vec<String>,
}

/// File-backed store for [`RelayState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    start_block: u64,
    capacity: usize,
}

impl StateStore {
    /// `start_block` is the cursor used when no state exists yet.
    pub fn new(path: impl Into<PathBuf>, start_block: u64, capacity: usize) -> Self {
        Self {
            path: path.into(),
            start_block,
            capacity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_state(&self) -> RelayState {
        RelayState::new(self.start_block, self.capacity)
    }

    /// Load state from disk, falling back to defaults on absence or corruption.
    pub fn load(&self) -> RelayState {
        if !self.path.exists() {
            info!(
                path = %self.path.display(),
                start_block = self.start_block,
                "No state file found, starting from defaults"
            );
            return self.default_state();
        }

        match self.read() {
            Ok(state) => {
                info!(
                    path = %self.path.display(),
                    cursor = state.cursor,
                    processed = state.processed.len(),
                    "Loaded relay state"
                );
                state
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "State file is unreadable, starting from defaults"
                );
                self.quarantine();
                self.default_state()
            }
        }
    }

    fn read(&self) -> Result<RelayState> {
        let raw = fs::read(&self.path)
            .wrap_err_with(|| format!("Failed to read {}", self.path.display()))?;
        let file: StateFile =
            serde_json::from_slice(&raw).wrap_err("State file is not valid JSON")?;

        Ok(RelayState {
            cursor: file.last_block.unwrap_or(self.start_block),
            processed: BoundedIdSet::from_ids(
                file.processed_txs.into_iter().map(|id| id.to_lowercase()),
                self.capacity,
            ),
        })
    }

    /// Move a corrupt file out of the way so it is not overwritten.
    fn quarantine(&self) {
        let mut target = self.path.clone().into_os_string();
        target.push(format!(".corrupt-{}", chrono::Utc::now().timestamp()));
        let target = PathBuf::from(target);

        match fs::rename(&self.path, &target) {
            Ok(()) => warn!(
                from = %self.path.display(),
                to = %target.display(),
                "Moved corrupt state file aside"
            ),
            Err(e) => error!(
                path = %self.path.display(),
                error = %e,
                "Failed to move corrupt state file aside"
            ),
        }
    }

    /// Atomically replace the state file.
    pub fn save(&self, state: &RelayState) -> Result<()> {
        let file = StateFile {
            last_block: Some(state.cursor),
            processed_txs: state.processed.iter().cloned().collect(),
        };
        let body = serde_json::to_vec_pretty(&file).wrap_err("Failed to encode state")?;

        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        {
            let mut tmp = File::create(&tmp_path)
                .wrap_err_with(|| format!("Failed to create {}", tmp_path.display()))?;
            tmp.write_all(&body)
                .wrap_err_with(|| format!("Failed to write {}", tmp_path.display()))?;
            tmp.sync_all()
                .wrap_err_with(|| format!("Failed to sync {}", tmp_path.display()))?;
        }

        fs::rename(&tmp_path, &self.path).wrap_err_with(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;

        debug!(
            cursor = state.cursor,
            processed = state.processed.len(),
            "Relay state saved"
        );
        Ok(())
    }
}
