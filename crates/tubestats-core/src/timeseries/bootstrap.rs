//! Cold-start rebuild of the time-series store from stored day files.

use chrono::NaiveDate;

use crate::snapshot::{SnapshotError, SnapshotStore, day_start};
use crate::timeseries::store::TimeSeriesStore;

/// Summary of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Days whose records were replayed.
    pub days_replayed: usize,
    /// Days skipped because a page could not be decoded.
    pub days_malformed: Vec<NaiveDate>,
    /// Samples offered to the store.
    pub samples: usize,
}

/// Replay every stored day, oldest first, into a fresh store.
///
/// Each record of a day becomes one sample at midnight UTC of that day.
/// Malformed days are logged, counted and skipped.
///
/// # Errors
///
/// Returns [`SnapshotError::Io`] if the data folder or a day file cannot be
/// read.
pub fn rebuild_from_snapshots(
    snapshots: &SnapshotStore,
) -> Result<(TimeSeriesStore, BootstrapReport), SnapshotError> {
    let store = TimeSeriesStore::new();
    let mut report = BootstrapReport::default();

    let days = snapshots.list_days()?;
    tracing::info!(days = days.len(), "rebuilding time series from raw snapshots");

    for day in days {
        let videos = match snapshots.read_snapshot(day) {
            Ok(videos) => videos,
            Err(err @ SnapshotError::Malformed { .. }) => {
                tracing::warn!(day = %day, error = %err, "skipping malformed snapshot");
                report.days_malformed.push(day);
                continue;
            }
            Err(SnapshotError::NotFound(path)) => {
                tracing::debug!(path = %path.display(), "snapshot vanished during rebuild");
                continue;
            }
            Err(err) => return Err(err),
        };

        let at = day_start(day);
        for video in &videos {
            store.record(video.id, at, video.metrics());
        }
        report.samples += videos.len();
        report.days_replayed += 1;
    }

    tracing::info!(
        days = report.days_replayed,
        malformed = report.days_malformed.len(),
        series = store.len(),
        "time series rebuild complete"
    );
    Ok((store, report))
}
