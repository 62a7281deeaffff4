//! The stats store: one handle over a data folder.
//!
//! [`StatsStore::open`] loads catalog, deletion ledger and time series (or
//! rebuilds the series from raw day files) and hands out a store that
//! answers queries and accepts imports until [`StatsStore::close`].
//!
//! # Import pipeline
//!
//! 1. take the in-process import mutex and the cross-process file lock;
//! 2. write the raw day file durably;
//! 3. reconcile against owned copies of catalog and ledger;
//! 4. persist the new catalog and ledger;
//! 5. publish them in memory and record the day's samples.
//!
//! A failure before step 5 leaves memory untouched, and the raw day file
//! written in step 2 lets [`StatsStore::import_day`] retry the pass.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};

use crate::catalog::{Catalog, CatalogState};
use crate::config::StoreConfig;
use crate::error::{StateError, StatsError};
use crate::export::{self, DateRange, Granularity};
use crate::ledger::DeletionLedger;
use crate::lock::ImportLock;
use crate::model::{LikeView, VideoRecord, VideoStat};
use crate::pool::run_bounded;
use crate::query::StatsQuery;
use crate::reconcile::{ReconcileReport, index_snapshot, reconcile};
use crate::report;
use crate::snapshot::{SnapshotStore, day_start};
use crate::timeseries::{BootstrapReport, SaveReport, TimeSeriesStore, rebuild_from_snapshots};

/// Advisory lock file serializing imports across processes.
pub const IMPORT_LOCK_FILE: &str = ".import.lock";

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Raw output of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCollection {
    /// Undecoded listing pages, stored verbatim.
    pub pages: Vec<Vec<u8>>,
    /// Version reported by the upstream server.
    pub server_version: String,
}

/// Produces a full listing of the platform's videos.
pub trait SnapshotSource {
    fn collect(&self) -> anyhow::Result<RawCollection>;
}

/// Downloads a thumbnail given its server-relative path.
pub trait ThumbnailFetcher: Send + Sync {
    fn fetch(&self, thumbnail_path: &str) -> anyhow::Result<Vec<u8>>;
}

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub day: NaiveDate,
    pub collected_at: DateTime<Utc>,
    /// Raw day file backing this import.
    pub snapshot_path: PathBuf,
    /// Records decoded from the day file.
    pub videos: usize,
    pub reconcile: ReconcileReport,
    pub thumbnails_fetched: usize,
    pub thumbnails_failed: usize,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct StatsStore {
    config: StoreConfig,
    snapshots: SnapshotStore,
    catalog: Catalog,
    ledger: DeletionLedger,
    series: TimeSeriesStore,
    first_data_available: RwLock<Option<DateTime<Utc>>>,
    import_gate: Mutex<()>,
}

impl StatsStore {
    /// Open the data folder named by `config`, creating it if needed.
    ///
    /// Without a saved time-series index the series are rebuilt from every
    /// raw day file and saved.
    ///
    /// # Errors
    ///
    /// Fails when the folder cannot be created, a state file is unreadable,
    /// or the rebuild hits an I/O error.
    pub fn open(config: StoreConfig) -> Result<Self, StatsError> {
        let data_dir = config.data_dir.clone();
        fs::create_dir_all(&data_dir).map_err(|e| StateError::io(&data_dir, e))?;

        let snapshots = SnapshotStore::new(&data_dir);
        let catalog = Catalog::load(&data_dir)?;
        let ledger = DeletionLedger::load(&data_dir)?;

        let series = if let Some(series) = TimeSeriesStore::load(&data_dir, config.workers())? {
            series
        } else {
            tracing::warn!("no time series index, importing from raw data");
            let (series, _) = rebuild_from_snapshots(&snapshots)?;
            series.save(&data_dir, config.workers())?;
            series
        };

        let first_data_available = snapshots.first_day()?.map(day_start);

        tracing::info!(
            data_dir = %data_dir.display(),
            videos = catalog.len(),
            deleted = ledger.len(),
            series = series.len(),
            "stats store opened"
        );

        Ok(Self {
            config,
            snapshots,
            catalog,
            ledger,
            series,
            first_data_available: RwLock::new(first_data_available),
            import_gate: Mutex::new(()),
        })
    }

    /// Persist the time series and release the store.
    pub fn close(self) -> Result<SaveReport, StatsError> {
        let report = self.series.save(self.data_dir(), self.config.workers())?;
        tracing::debug!(data_dir = %self.data_dir().display(), "stats store closed");
        Ok(report)
    }

    /// Persist catalog, ledger and time series without closing.
    pub fn save_state(&self) -> Result<SaveReport, StatsError> {
        let _gate = self.import_gate.lock();
        self.catalog.save(self.data_dir())?;
        self.ledger.save(self.data_dir())?;
        self.series.save(self.data_dir(), self.config.workers())
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    #[must_use]
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    #[must_use]
    pub fn time_series(&self) -> &TimeSeriesStore {
        &self.series
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every video ever collected, ordered by id.
    #[must_use]
    pub fn all_videos(&self) -> Vec<VideoRecord> {
        self.catalog.snapshot().values().cloned().collect()
    }

    /// Last known metadata of `id`.
    pub fn video(&self, id: i64) -> Result<VideoRecord, StatsError> {
        self.catalog.get(id).ok_or(StatsError::VideoNotFound(id))
    }

    /// Point-in-time view of the catalog.
    #[must_use]
    pub fn catalog_snapshot(&self) -> Arc<std::collections::BTreeMap<i64, VideoRecord>> {
        self.catalog.snapshot()
    }

    /// Start of the earliest collected day.
    #[must_use]
    pub fn first_data_available(&self) -> Option<DateTime<Utc>> {
        *self.first_data_available.read()
    }

    /// When `id` was first seen missing, if it is currently considered deleted.
    #[must_use]
    pub fn deletion_of(&self, id: i64) -> Option<DateTime<Utc>> {
        self.ledger.get(id)
    }

    /// Upstream version recorded in the raw file of `day`.
    pub fn server_version_of(&self, day: NaiveDate) -> Result<Option<String>, StatsError> {
        Ok(self.snapshots.read_header(day)?)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    fn query(&self) -> StatsQuery<'_> {
        StatsQuery {
            catalog: &self.catalog,
            ledger: &self.ledger,
            series: &self.series,
            snapshots: &self.snapshots,
            first_data_available: self.first_data_available(),
            miss_tolerance_days: self.config.miss_tolerance_days,
        }
    }

    /// Counters of `id` at `ts`; see [`StatsQuery::request_stat`].
    pub fn request_stat(&self, id: i64, ts: DateTime<Utc>) -> Result<VideoStat, StatsError> {
        self.query().request_stat(id, ts)
    }

    /// Counters of `id` at each of `timestamps`.
    pub fn stats_at(&self, id: i64, timestamps: &[DateTime<Utc>]) -> Result<Vec<VideoStat>, StatsError> {
        self.query().stats_at(id, timestamps)
    }

    /// Normalized buckets of `id` over `range`, open ends relative to now.
    pub fn export_stats(
        &self,
        id: i64,
        range: DateRange,
        granularity: Granularity,
    ) -> Result<Vec<VideoStat>, StatsError> {
        self.export_stats_at(id, range, granularity, Utc::now())
    }

    /// [`Self::export_stats`] with an explicit "now".
    pub fn export_stats_at(
        &self,
        id: i64,
        range: DateRange,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Vec<VideoStat>, StatsError> {
        export::export_stats(&self.query(), id, range, granularity, now)
    }

    /// Views table of every video, with links on the configured host.
    #[must_use]
    pub fn views_report(&self, range: DateRange, granularity: Granularity, now: DateTime<Utc>) -> Vec<Vec<String>> {
        report::views_table(
            &self.query(),
            &self.all_videos(),
            range,
            granularity,
            &self.config.api_host,
            now,
        )
    }

    // -----------------------------------------------------------------------
    // Imports
    // -----------------------------------------------------------------------

    /// Store the raw pages of one collection run and reconcile them.
    ///
    /// # Errors
    ///
    /// Fails on lock timeout, when the day file cannot be written or
    /// decoded, or when the new state cannot be persisted. In every case
    /// the in-memory state is unchanged.
    pub fn import_from_raw(
        &self,
        pages: &[Vec<u8>],
        server_version: &str,
        collected_at: DateTime<Utc>,
    ) -> Result<ImportReport, StatsError> {
        let _gate = self.import_gate.lock();
        let _lock = self.acquire_import_lock()?;

        let day = collected_at.date_naive();
        let path = self.snapshots.write_snapshot(day, pages, server_version)?;
        self.reconcile_locked(day, collected_at, path)
    }

    /// Reconcile a day file that is already on disk.
    ///
    /// `collected_at` defaults to midnight UTC of `day`.
    pub fn import_day(
        &self,
        day: NaiveDate,
        collected_at: Option<DateTime<Utc>>,
    ) -> Result<ImportReport, StatsError> {
        let _gate = self.import_gate.lock();
        let _lock = self.acquire_import_lock()?;

        let path = self.snapshots.snapshot_path(day);
        self.reconcile_locked(day, collected_at.unwrap_or_else(|| day_start(day)), path)
    }

    /// Collect a listing from `source`, import it at `now`, then fetch
    /// missing thumbnails through `thumbnails` if given.
    pub fn collect_and_import(
        &self,
        source: &dyn SnapshotSource,
        thumbnails: Option<&dyn ThumbnailFetcher>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ImportReport> {
        let collection = source.collect().context("Failed to collect video listing")?;
        let mut report = self
            .import_from_raw(&collection.pages, &collection.server_version, now)
            .with_context(|| format!("Failed to import collection of {}", now.date_naive()))?;

        if let Some(fetcher) = thumbnails {
            let videos = self.snapshots.read_snapshot(report.day)?;
            let (fetched, failed) = self.backfill_thumbnails(&videos, fetcher)?;
            report.thumbnails_fetched = fetched;
            report.thumbnails_failed = failed;
        }
        Ok(report)
    }

    /// Rebuild the time series from every raw day file and save it.
    pub fn rebuild_time_series(&self) -> Result<BootstrapReport, StatsError> {
        let _gate = self.import_gate.lock();
        let (rebuilt, report) = rebuild_from_snapshots(&self.snapshots)?;
        rebuilt.save(self.data_dir(), self.config.workers())?;
        self.series.replace_with(rebuilt);
        Ok(report)
    }

    fn acquire_import_lock(&self) -> Result<ImportLock, StatsError> {
        Ok(ImportLock::acquire(
            &self.data_dir().join(IMPORT_LOCK_FILE),
            self.config.lock_timeout(),
        )?)
    }

    /// Reconcile `day`; the caller holds both import locks.
    fn reconcile_locked(
        &self,
        day: NaiveDate,
        collected_at: DateTime<Utc>,
        snapshot_path: PathBuf,
    ) -> Result<ImportReport, StatsError> {
        let videos = self.snapshots.read_snapshot(day)?;
        let count = videos.len();
        let samples: Vec<(i64, LikeView)> = videos.iter().map(|v| (v.id, v.metrics())).collect();

        let mut catalog: CatalogState = self.catalog.state();
        let mut ledger = self.ledger.state();
        let outcome = reconcile(&mut catalog, &mut ledger, index_snapshot(videos), collected_at);

        Catalog::save_state(self.data_dir(), &catalog)?;
        DeletionLedger::save_state(self.data_dir(), &ledger)?;
        self.catalog.commit(catalog);
        self.ledger.commit(ledger);

        let at = day_start(day);
        for (id, value) in samples {
            self.series.record(id, at, value);
        }
        {
            let mut first = self.first_data_available.write();
            *first = Some(first.map_or(at, |known| known.min(at)));
        }

        tracing::info!(
            day = %day,
            collection_time = %collected_at.to_rfc3339(),
            videos = count,
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            reactivated = outcome.reactivated.len(),
            "import reconciled"
        );

        Ok(ImportReport {
            day,
            collected_at,
            snapshot_path,
            videos: count,
            reconcile: outcome,
            thumbnails_fetched: 0,
            thumbnails_failed: 0,
        })
    }

    /// Download thumbnails missing under the data folder.
    ///
    /// Failures are logged and counted, never returned.
    pub fn backfill_thumbnails(
        &self,
        videos: &[VideoRecord],
        fetcher: &dyn ThumbnailFetcher,
    ) -> Result<(usize, usize), StatsError> {
        let missing: Vec<(String, PathBuf)> = videos
            .iter()
            .filter_map(|video| {
                let target = thumbnail_target(self.data_dir(), &video.thumbnail_path)?;
                (!target.exists()).then(|| (video.thumbnail_path.clone(), target))
            })
            .collect();
        if missing.is_empty() {
            return Ok((0, 0));
        }

        let results = run_bounded(self.config.workers(), missing, |(remote, target)| {
            let outcome = fetcher.fetch(&remote).and_then(|bytes| {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                fs::write(&target, bytes).with_context(|| format!("Failed to write {}", target.display()))
            });
            if let Err(err) = &outcome {
                let reason = format!("{err:#}");
                tracing::warn!(thumbnail = %remote, error = %reason, "cannot fetch thumbnail");
            }
            outcome.is_ok()
        })
        .map_err(|_| StatsError::WorkerPanicked("thumbnail backfill"))?;

        let fetched = results.iter().filter(|ok| **ok).count();
        Ok((fetched, results.len() - fetched))
    }
}

/// Local file of a server-relative thumbnail path; `None` for empty paths
/// and paths that would leave the data folder.
fn thumbnail_target(data_dir: &Path, thumbnail_path: &str) -> Option<PathBuf> {
    let relative = Path::new(thumbnail_path.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || !relative.components().all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(data_dir.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, d, 9, 30, 0).single().expect("valid ts")
    }

    fn page(videos: &[(i64, i64, i64)]) -> Vec<u8> {
        let data: Vec<_> = videos
            .iter()
            .map(|(id, likes, views)| {
                serde_json::json!({
                    "id": id,
                    "name": format!("video {id}"),
                    "publishedAt": "2024-07-01T00:00:00Z",
                    "thumbnailPath": format!("/lazy-static/thumbnails/{id}.jpg"),
                    "likes": likes,
                    "views": views,
                })
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({"total": data.len(), "data": data})).expect("page")
    }

    fn open(dir: &TempDir) -> StatsStore {
        StatsStore::open(StoreConfig::for_data_dir(dir.path())).expect("open")
    }

    struct FixedSource(Vec<u8>);

    impl SnapshotSource for FixedSource {
        fn collect(&self) -> anyhow::Result<RawCollection> {
            Ok(RawCollection {
                pages: vec![self.0.clone()],
                server_version: "6.1.0".to_string(),
            })
        }
    }

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl ThumbnailFetcher for CountingFetcher {
        fn fetch(&self, thumbnail_path: &str) -> anyhow::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if thumbnail_path.ends_with("2.jpg") {
                anyhow::bail!("server said 404");
            }
            Ok(b"jpeg".to_vec())
        }
    }

    #[test]
    fn open_on_empty_folder_writes_index() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        assert!(store.all_videos().is_empty());
        assert_eq!(store.first_data_available(), None);
        assert!(dir.path().join(crate::timeseries::store::INDEX_FILE).exists());
    }

    #[test]
    fn import_updates_catalog_ledger_and_series() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);

        let first = store
            .import_from_raw(&[page(&[(1, 1, 1), (2, 0, 4)])], "6.1.0", at(1))
            .expect("import day 1");
        assert_eq!(first.reconcile.created, vec![1, 2]);
        assert_eq!(store.server_version_of(first.day).expect("header").as_deref(), Some("6.1.0"));

        let second = store
            .import_from_raw(&[page(&[(1, 2, 5)])], "6.1.0", at(2))
            .expect("import day 2");
        assert_eq!(second.reconcile.deleted, vec![2]);
        assert_eq!(second.reconcile.updated, vec![1]);
        assert_eq!(store.deletion_of(2), Some(at(2)));
        assert_eq!(store.first_data_available(), Some(day_start(first.day)));

        let stat = store.request_stat(1, at(3)).expect("stat");
        assert_eq!(stat.metrics(), LikeView::new(2, 5));
    }

    #[test]
    fn state_survives_close_and_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        store
            .import_from_raw(&[page(&[(1, 1, 10)])], "6.1.0", at(1))
            .expect("import");
        store
            .import_from_raw(&[page(&[(1, 1, 20)])], "6.1.0", at(2))
            .expect("import");
        store.close().expect("close");

        let reopened = open(&dir);
        assert_eq!(reopened.all_videos().len(), 1);
        assert_eq!(
            reopened.request_stat(1, day_start(at(1).date_naive())).expect("stat").metrics(),
            LikeView::new(1, 10)
        );
        assert_eq!(
            reopened.time_series().series(1).expect("series").len(),
            2
        );
    }

    #[test]
    fn import_day_retries_reconciliation_of_written_file() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        store
            .snapshots()
            .write_snapshot(at(4).date_naive(), &[page(&[(9, 0, 1)])], "6.1.0")
            .expect("write");

        let report = store.import_day(at(4).date_naive(), None).expect("import day");
        assert_eq!(report.reconcile.created, vec![9]);
        assert_eq!(report.collected_at, day_start(at(4).date_naive()));
        assert!(store.video(9).is_ok());
    }

    #[test]
    fn collect_and_import_backfills_thumbnails_without_failing() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };

        let report = store
            .collect_and_import(&FixedSource(page(&[(1, 0, 1), (2, 0, 1)])), Some(&fetcher), at(5))
            .expect("collect");
        assert_eq!(report.thumbnails_fetched, 1);
        assert_eq!(report.thumbnails_failed, 1);
        assert!(dir.path().join("lazy-static/thumbnails/1.jpg").exists());

        let again = store.backfill_thumbnails(&store.all_videos(), &fetcher).expect("backfill");
        assert_eq!(again, (0, 1));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rebuild_replaces_series() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        store
            .import_from_raw(&[page(&[(1, 1, 10)])], "6.1.0", at(1))
            .expect("import");

        let report = store.rebuild_time_series().expect("rebuild");
        assert_eq!(report.days_replayed, 1);
        assert_eq!(store.time_series().len(), 1);
    }

    #[test]
    fn thumbnail_paths_cannot_escape_data_folder() {
        let root = Path::new("/data");
        assert_eq!(
            thumbnail_target(root, "/static/t/1.jpg"),
            Some(PathBuf::from("/data/static/t/1.jpg"))
        );
        assert_eq!(thumbnail_target(root, ""), None);
        assert_eq!(thumbnail_target(root, "/../etc/passwd"), None);
    }
}
