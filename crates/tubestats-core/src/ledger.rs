//! Deletion ledger: first-observed-absence time per video.
//!
//! Persisted as `deleted.json`, an object keyed by id whose values repeat
//! the id next to the deletion time:
//!
//! ```text
//! {"42": {"id": 42, "deleted": "2024-03-02T00:00:00Z"}}
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::persist::{read_json_opt, write_json_atomic};

/// File name of the ledger inside the data folder.
pub const LEDGER_FILE: &str = "deleted.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct DeletedVideo {
    id: i64,
    deleted: DateTime<Utc>,
}

/// Owned ledger contents used while reconciling.
pub type LedgerState = BTreeMap<i64, DateTime<Utc>>;

#[derive(Debug, Default)]
pub struct DeletionLedger {
    entries: RwLock<Arc<LedgerState>>,
}

impl DeletionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `deleted.json` from `data_dir`; a missing file yields an empty ledger.
    pub fn load(data_dir: &Path) -> Result<Self, StateError> {
        let raw: BTreeMap<i64, DeletedVideo> =
            read_json_opt(&data_dir.join(LEDGER_FILE))?.unwrap_or_default();
        let entries = raw
            .into_values()
            .map(|entry| (entry.id, entry.deleted))
            .collect::<LedgerState>();
        Ok(Self {
            entries: RwLock::new(Arc::new(entries)),
        })
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), StateError> {
        Self::save_state(data_dir, &self.state())
    }

    /// Persist an uncommitted state.
    pub fn save_state(data_dir: &Path, state: &LedgerState) -> Result<(), StateError> {
        let raw: BTreeMap<i64, DeletedVideo> = state
            .iter()
            .map(|(&id, &deleted)| (id, DeletedVideo { id, deleted }))
            .collect();
        write_json_atomic(&data_dir.join(LEDGER_FILE), &raw)
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<DateTime<Utc>> {
        self.entries.read().get(&id).copied()
    }

    /// Record `id` as absent since `ts`, replacing any previous record.
    pub fn mark(&self, id: i64, ts: DateTime<Utc>) {
        Arc::make_mut(&mut self.entries.write()).insert(id, ts);
    }

    /// Forget the deletion of `id`, returning the removed timestamp.
    pub fn clear(&self, id: i64) -> Option<DateTime<Utc>> {
        Arc::make_mut(&mut self.entries.write()).remove(&id)
    }

    /// True when `id` was recorded absent strictly before `ts`.
    #[must_use]
    pub fn is_deleted_at(&self, id: i64, ts: DateTime<Utc>) -> bool {
        self.get(id).is_some_and(|deleted| deleted < ts)
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<LedgerState> {
        Arc::clone(&*self.entries.read())
    }

    #[must_use]
    pub fn state(&self) -> LedgerState {
        (**self.entries.read()).clone()
    }

    pub fn commit(&self, state: LedgerState) {
        *self.entries.write() = Arc::new(state);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
