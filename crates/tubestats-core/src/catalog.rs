//! Latest-known metadata of every video ever seen.
//!
//! The catalog is a typed `id → VideoRecord` map. Records are never removed
//! (a deleted video still needs its last metadata for frozen stats) and
//! never edited field by field: reconciliation swaps whole records.
//!
//! Readers take an [`Arc`] snapshot under a short read lock; writers build
//! a new map and publish it with [`Catalog::commit`], so a report never
//! observes a reconciliation half applied.
//!
//! On disk the catalog is `videoDB.json` (object keyed by id) plus the
//! sidecar `videoDB.observed.json` holding the collection time of each
//! record, which lets backfilled snapshots avoid overwriting newer data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::StateError;
use crate::model::VideoRecord;
use crate::persist::{read_json_opt, write_json_atomic};

/// File name of the catalog dump inside the data folder.
pub const CATALOG_FILE: &str = "videoDB.json";
/// File name of the observation-time sidecar.
pub const OBSERVED_FILE: &str = "videoDB.observed.json";

/// Owned, mutable catalog contents used while reconciling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogState {
    pub videos: BTreeMap<i64, VideoRecord>,
    pub observed: BTreeMap<i64, DateTime<Utc>>,
}

impl CatalogState {
    /// Replace the whole record of `id`.
    pub fn replace(&mut self, id: i64, record: VideoRecord, observed_at: DateTime<Utc>) {
        self.videos.insert(id, record);
        self.observed.insert(id, observed_at);
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    videos: RwLock<Arc<BTreeMap<i64, VideoRecord>>>,
    observed: RwLock<Arc<BTreeMap<i64, DateTime<Utc>>>>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog dump from `data_dir`; an absent dump yields an empty catalog.
    pub fn load(data_dir: &Path) -> Result<Self, StateError> {
        let videos: BTreeMap<i64, VideoRecord> =
            read_json_opt(&data_dir.join(CATALOG_FILE))?.unwrap_or_default();
        let observed: BTreeMap<i64, DateTime<Utc>> =
            read_json_opt(&data_dir.join(OBSERVED_FILE))?.unwrap_or_default();
        tracing::debug!(videos = videos.len(), "catalog loaded");
        Ok(Self {
            videos: RwLock::new(Arc::new(videos)),
            observed: RwLock::new(Arc::new(observed)),
        })
    }

    /// Persist catalog and sidecar atomically into `data_dir`.
    pub fn save(&self, data_dir: &Path) -> Result<(), StateError> {
        Self::save_state(data_dir, &self.state())
    }

    /// Persist an uncommitted state; used to make disk durable before memory is swapped.
    pub fn save_state(data_dir: &Path, state: &CatalogState) -> Result<(), StateError> {
        write_json_atomic(&data_dir.join(CATALOG_FILE), &state.videos)?;
        write_json_atomic(&data_dir.join(OBSERVED_FILE), &state.observed)
    }

    /// Consistent point-in-time view for read-only consumers.
    #[must_use]
    pub fn snapshot(&self) -> Arc<BTreeMap<i64, VideoRecord>> {
        Arc::clone(&*self.videos.read())
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<VideoRecord> {
        self.videos.read().get(&id).cloned()
    }

    /// Collection time of the record currently held for `id`, when known.
    #[must_use]
    pub fn observed_at(&self, id: i64) -> Option<DateTime<Utc>> {
        self.observed.read().get(&id).copied()
    }

    /// Replace the whole record of one video.
    pub fn replace(&self, id: i64, record: VideoRecord, observed_at: DateTime<Utc>) {
        Arc::make_mut(&mut self.videos.write()).insert(id, record);
        Arc::make_mut(&mut self.observed.write()).insert(id, observed_at);
    }

    /// Owned copy of the catalog contents for a reconciliation pass.
    #[must_use]
    pub fn state(&self) -> CatalogState {
        CatalogState {
            videos: (**self.videos.read()).clone(),
            observed: (**self.observed.read()).clone(),
        }
    }

    /// Publish a reconciled state.
    pub fn commit(&self, state: CatalogState) {
        *self.videos.write() = Arc::new(state.videos);
        *self.observed.write() = Arc::new(state.observed);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.videos.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.videos.read().is_empty()
    }
}

/// Path of the catalog dump for `data_dir`.
#[must_use]
pub fn catalog_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CATALOG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn video(id: i64, views: i64) -> VideoRecord {
        VideoRecord {
            id,
            name: format!("video {id}"),
            views,
            ..VideoRecord::default()
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).single().expect("valid ts")
    }

    #[test]
    fn load_without_dump_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let catalog = Catalog::load(dir.path()).expect("load");
        assert!(catalog.is_empty());
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let catalog = Catalog::new();
        catalog.replace(1, video(1, 10), ts(1));
        let before = catalog.snapshot();

        catalog.replace(1, video(1, 20), ts(2));
        catalog.replace(2, video(2, 5), ts(2));

        assert_eq!(before.len(), 1);
        assert_eq!(before[&1].views, 10);
        assert_eq!(catalog.get(1).map(|v| v.views), Some(20));
        assert_eq!(catalog.observed_at(1), Some(ts(2)));
    }

    #[test]
    fn save_and_load_round_trip_with_sidecar() {
        let dir = TempDir::new().expect("tempdir");
        let catalog = Catalog::new();
        catalog.replace(7, video(7, 70), ts(3));
        catalog.save(dir.path()).expect("save");

        let raw = std::fs::read_to_string(catalog_path(dir.path())).expect("read dump");
        assert!(raw.starts_with("{\"7\":"), "dump is keyed by id: {raw}");

        let loaded = Catalog::load(dir.path()).expect("load");
        assert_eq!(loaded.get(7), Some(video(7, 70)));
        assert_eq!(loaded.observed_at(7), Some(ts(3)));
    }

    #[test]
    fn commit_publishes_whole_state() {
        let catalog = Catalog::new();
        let mut state = catalog.state();
        state.replace(3, video(3, 1), ts(4));
        assert!(catalog.get(3).is_none());

        catalog.commit(state);
        assert_eq!(catalog.len(), 1);
    }
}
