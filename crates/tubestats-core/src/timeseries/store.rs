//! In-memory map of per-video series plus its on-disk form.
//!
//! # Directory Layout
//!
//! ```text
//! <data>/
//!   TimeSeriesDB.json     # {"VideosSaved": [ids], "FirstItem": ts, "LastItem": ts}
//!   TimeSeries/
//!     42.json             # {"items": {"1": {"date", "data"}, ...}, "earliest", "last"}
//! ```
//!
//! # Invariants
//!
//! - Every entity file is replaced atomically.
//! - The index is written after the entity files. It lists every id whose
//!   file was written in this save, plus failed ids whose previous file is
//!   still on disk.
//! - `FirstItem`/`LastItem` hold every timestamp ever offered, including
//!   samples the series discarded; zero times mean "unknown".

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StatsError};
use crate::model::LikeView;
use crate::persist::{read_json_opt, write_json_atomic};
use crate::pool::run_bounded;
use crate::timeseries::list::{InsertOutcome, Sample, TimeSeries};

/// Index file name inside the data folder.
pub const INDEX_FILE: &str = "TimeSeriesDB.json";
/// Directory holding one file per video.
pub const SERIES_DIR: &str = "TimeSeries";

/// How a `(video, timestamp)` lookup against the series went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Value in effect at the timestamp.
    Value(LikeView),
    /// The video has a series but the timestamp precedes its first sample.
    BeforeHistory,
    /// No series exists for the video.
    NoSeries,
}

/// Outcome of [`TimeSeriesStore::save`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: usize,
    pub failed: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    #[serde(rename = "VideosSaved", default)]
    videos_saved: Vec<i64>,
    #[serde(rename = "FirstItem", default)]
    first_item: Option<DateTime<Utc>>,
    #[serde(rename = "LastItem", default)]
    last_item: Option<DateTime<Utc>>,
}

impl IndexFile {
    /// Saved bounds, unless missing or zero.
    fn stored_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.first_item, self.last_item) {
            (Some(first), Some(last)) if first.year() > 1 && first <= last => Some((first, last)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SeriesItem {
    date: DateTime<Utc>,
    data: LikeView,
}

#[derive(Debug, Serialize, Deserialize)]
struct SeriesFile {
    #[serde(default)]
    items: BTreeMap<u64, SeriesItem>,
    #[serde(default)]
    earliest: Option<DateTime<Utc>>,
    #[serde(default)]
    last: Option<DateTime<Utc>>,
}

impl SeriesFile {
    fn from_series(series: &TimeSeries) -> Self {
        Self {
            items: (1_u64..)
                .zip(series.iter())
                .map(|(n, sample)| {
                    (
                        n,
                        SeriesItem {
                            date: sample.at,
                            data: sample.value,
                        },
                    )
                })
                .collect(),
            earliest: series.earliest(),
            last: series.latest(),
        }
    }

    fn into_series(self) -> TimeSeries {
        TimeSeries::from_samples(self.items.into_values().map(|item| Sample {
            at: item.date,
            value: item.data,
        }))
    }
}

#[derive(Debug, Default)]
pub struct TimeSeriesStore {
    series: RwLock<HashMap<i64, TimeSeries>>,
    bounds: RwLock<Option<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl TimeSeriesStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_map(
        series: HashMap<i64, TimeSeries>,
        stored: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Self {
        let bounds = series
            .values()
            .filter_map(|s| Some((s.earliest()?, s.latest()?)))
            .chain(stored)
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)));
        Self {
            series: RwLock::new(series),
            bounds: RwLock::new(bounds),
        }
    }

    /// Insert one sample for `id`, creating its series on first use.
    pub fn record(&self, id: i64, at: DateTime<Utc>, value: LikeView) -> InsertOutcome {
        let outcome = self.series.write().entry(id).or_default().insert(at, value);
        let mut bounds = self.bounds.write();
        *bounds = Some(match *bounds {
            Some((first, last)) => (first.min(at), last.max(at)),
            None => (at, at),
        });
        outcome
    }

    #[must_use]
    pub fn resolve(&self, id: i64, ts: DateTime<Utc>) -> Resolution {
        match self.series.read().get(&id) {
            None => Resolution::NoSeries,
            Some(series) => series
                .resolve_at(ts)
                .map_or(Resolution::BeforeHistory, Resolution::Value),
        }
    }

    /// Copy of the series of `id`.
    #[must_use]
    pub fn series(&self, id: i64) -> Option<TimeSeries> {
        self.series.read().get(&id).cloned()
    }

    /// Number of videos with a series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    /// Swap in the contents of `other`, e.g. after a rebuild.
    pub fn replace_with(&self, other: Self) {
        let Self { series, bounds } = other;
        *self.series.write() = series.into_inner();
        *self.bounds.write() = bounds.into_inner();
    }

    /// Earliest and latest timestamp ever recorded.
    #[must_use]
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        *self.bounds.read()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write every series and then the index, using at most `threads` workers.
    ///
    /// A video whose file cannot be written is logged and reported in
    /// [`SaveReport::failed`]; it stays in the index only if its previous
    /// file is still there to be loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the series directory or the index cannot be
    /// written, or if a worker panics.
    pub fn save(&self, data_dir: &Path, threads: usize) -> Result<SaveReport, StatsError> {
        let dir = data_dir.join(SERIES_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;

        let files: Vec<(i64, SeriesFile)> = self
            .series
            .read()
            .iter()
            .map(|(&id, series)| (id, SeriesFile::from_series(series)))
            .collect();

        let results = run_bounded(threads, files, |(id, file)| {
            let outcome = write_json_atomic(&series_path(data_dir, id), &file);
            (id, outcome)
        })
        .map_err(|_| StatsError::WorkerPanicked("time series save"))?;

        let mut report = SaveReport::default();
        let mut indexed = Vec::with_capacity(results.len());
        for (id, outcome) in results {
            match outcome {
                Ok(()) => {
                    report.saved += 1;
                    indexed.push(id);
                }
                Err(err) => {
                    let previous = series_path(data_dir, id).is_file();
                    tracing::error!(
                        video_id = id,
                        error = %err,
                        kept_previous = previous,
                        "cannot write time series"
                    );
                    report.failed.push(id);
                    if previous {
                        indexed.push(id);
                    }
                }
            }
        }
        indexed.sort_unstable();
        report.failed.sort_unstable();

        let bounds = self.bounds();
        let index = IndexFile {
            videos_saved: indexed,
            first_item: bounds.map(|(first, _)| first),
            last_item: bounds.map(|(_, last)| last),
        };
        write_json_atomic(&data_dir.join(INDEX_FILE), &index)?;

        tracing::info!(
            saved = report.saved,
            failed = report.failed.len(),
            "time series saved"
        );
        Ok(report)
    }

    /// Load the store written by [`Self::save`].
    ///
    /// Returns `Ok(None)` when there is no index yet. Listed entity files
    /// that are missing or corrupt are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error when the index exists but cannot be read or decoded,
    /// or if a worker panics.
    pub fn load(data_dir: &Path, threads: usize) -> Result<Option<Self>, StatsError> {
        let Some(index) = read_json_opt::<IndexFile>(&data_dir.join(INDEX_FILE))? else {
            return Ok(None);
        };
        let stored = index.stored_bounds();

        let loaded = run_bounded(threads, index.videos_saved, |id| {
            (id, read_json_opt::<SeriesFile>(&series_path(data_dir, id)))
        })
        .map_err(|_| StatsError::WorkerPanicked("time series load"))?;

        let mut series = HashMap::with_capacity(loaded.len());
        let mut skipped = 0_usize;
        for (id, result) in loaded {
            match result {
                Ok(Some(file)) => {
                    let list = file.into_series();
                    if !list.is_empty() {
                        series.insert(id, list);
                    }
                }
                Ok(None) => {
                    tracing::warn!(video_id = id, "time series listed in index but missing");
                    skipped += 1;
                }
                Err(err) => {
                    tracing::warn!(video_id = id, error = %err, "skipping unreadable time series");
                    skipped += 1;
                }
            }
        }

        tracing::info!(series = series.len(), skipped, "time series loaded");
        Ok(Some(Self::from_map(series, stored)))
    }
}

/// Path of the entity file of `id`.
#[must_use]
pub fn series_path(data_dir: &Path, id: i64) -> PathBuf {
    data_dir.join(SERIES_DIR).join(format!("{id}.json"))
}
