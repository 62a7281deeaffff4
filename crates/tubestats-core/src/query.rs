//! Point-in-time stats resolution.
//!
//! [`StatsQuery::request_stat`] answers "what were the counters of video
//! `id` at `ts`" by consulting, in order:
//!
//! 1. the first collected day (nothing is known before it: zero);
//! 2. the catalog (unknown video: error; not yet published: zero);
//! 3. the deletion ledger (deleted before `ts`: last known counters);
//! 4. the time series, falling back to raw day files when the series has
//!    no answer.
//!
//! The time series only ever says "don't know", never something wrong, so
//! each fallback narrows the gap without contradicting it.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use crate::catalog::Catalog;
use crate::error::StatsError;
use crate::ledger::DeletionLedger;
use crate::model::{LikeView, VideoStat};
use crate::snapshot::{SnapshotError, SnapshotStore};
use crate::timeseries::{Resolution, TimeSeriesStore};

/// Borrowed view over every store needed to answer a stats request.
#[derive(Debug, Clone, Copy)]
pub struct StatsQuery<'a> {
    pub catalog: &'a Catalog,
    pub ledger: &'a DeletionLedger,
    pub series: &'a TimeSeriesStore,
    pub snapshots: &'a SnapshotStore,
    /// Start of the earliest collected day; `None` when nothing was collected.
    pub first_data_available: Option<DateTime<Utc>>,
    /// Days searched on either side of a missing raw day.
    pub miss_tolerance_days: u32,
}

impl StatsQuery<'_> {
    /// Resolve the counters of `id` at `ts`.
    ///
    /// # Errors
    ///
    /// - [`StatsError::VideoNotFound`] if the video was never collected.
    /// - [`StatsError::PeriodUnavailable`] if there is no series and no data
    ///   was collected in the year of `ts`.
    /// - [`StatsError::Snapshot`] if a day file cannot be read.
    pub fn request_stat(&self, id: i64, ts: DateTime<Utc>) -> Result<VideoStat, StatsError> {
        match self.first_data_available {
            Some(first) if ts >= first => {}
            _ => return Ok(VideoStat::zero(ts)),
        }

        let Some(video) = self.catalog.get(id) else {
            return Err(StatsError::VideoNotFound(id));
        };

        match video.published_at() {
            Some(published) if ts < published => return Ok(VideoStat::zero(ts)),
            Some(_) => {}
            None => tracing::warn!(
                video_id = id,
                published_at = %video.published_at,
                "cannot parse publish date, assuming published"
            ),
        }

        if self.ledger.is_deleted_at(id, ts) {
            return Ok(VideoStat::at(ts, video.metrics()));
        }

        match self.series.resolve(id, ts) {
            Resolution::Value(value) => Ok(VideoStat::at(ts, value)),
            Resolution::BeforeHistory => Ok(VideoStat::at(
                ts,
                self.raw_stat(id, ts.date_naive())?.unwrap_or_default(),
            )),
            Resolution::NoSeries => {
                if let Some(value) = self.raw_stat_near(id, ts.date_naive())? {
                    return Ok(VideoStat::at(ts, value));
                }
                if !self.snapshots.year_available(ts.year()) {
                    return Err(StatsError::PeriodUnavailable(ts));
                }
                Ok(VideoStat::zero(ts))
            }
        }
    }

    /// Resolve `id` at every timestamp in `timestamps`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::NoTimestamps`] for an empty list and the first
    /// error of [`Self::request_stat`] otherwise.
    pub fn stats_at(&self, id: i64, timestamps: &[DateTime<Utc>]) -> Result<Vec<VideoStat>, StatsError> {
        if timestamps.is_empty() {
            return Err(StatsError::NoTimestamps);
        }
        timestamps.iter().map(|&ts| self.request_stat(id, ts)).collect()
    }

    /// Counters of `id` in the raw file of `day`, trying neighbouring days
    /// within the miss tolerance, earlier side first.
    fn raw_stat_near(&self, id: i64, day: NaiveDate) -> Result<Option<LikeView>, StatsError> {
        if let Some(value) = self.raw_stat(id, day)? {
            return Ok(Some(value));
        }
        for distance in 1..=u64::from(self.miss_tolerance_days) {
            let candidates = [
                day.checked_sub_days(Days::new(distance)),
                day.checked_add_days(Days::new(distance)),
            ];
            for candidate in candidates.into_iter().flatten() {
                if let Some(value) = self.raw_stat(id, candidate)? {
                    tracing::debug!(
                        video_id = id,
                        requested = %day,
                        used = %candidate,
                        "using neighbouring day for missing stat"
                    );
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    /// Counters of `id` in the raw file of exactly `day`.
    fn raw_stat(&self, id: i64, day: NaiveDate) -> Result<Option<LikeView>, StatsError> {
        match self.snapshots.read_snapshot(day) {
            Ok(videos) => Ok(videos.iter().find(|v| v.id == id).map(crate::model::VideoRecord::metrics)),
            Err(SnapshotError::NotFound(_)) => Ok(None),
            Err(err @ SnapshotError::Malformed { .. }) => {
                tracing::error!(video_id = id, day = %day, error = %err, "stat data is malformed");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VideoRecord;
    use crate::snapshot::day_start;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        catalog: Catalog,
        ledger: DeletionLedger,
        series: TimeSeriesStore,
        snapshots: SnapshotStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("tempdir");
            let snapshots = SnapshotStore::new(dir.path());
            Self {
                _dir: dir,
                catalog: Catalog::new(),
                ledger: DeletionLedger::new(),
                series: TimeSeriesStore::new(),
                snapshots,
            }
        }

        fn query(&self, tolerance: u32) -> StatsQuery<'_> {
            StatsQuery {
                catalog: &self.catalog,
                ledger: &self.ledger,
                series: &self.series,
                snapshots: &self.snapshots,
                first_data_available: Some(ts(1)),
                miss_tolerance_days: tolerance,
            }
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).expect("valid date")
    }

    fn ts(d: u32) -> DateTime<Utc> {
        day_start(day(d))
    }

    fn video(id: i64, likes: i64, views: i64) -> VideoRecord {
        VideoRecord {
            id,
            name: format!("video {id}"),
            published_at: "2024-05-01T08:00:00.000Z".to_string(),
            likes,
            views,
            ..VideoRecord::default()
        }
    }

    fn page(videos: &[VideoRecord]) -> Vec<u8> {
        serde_json::to_vec(&crate::model::VideoPage {
            total: i64::try_from(videos.len()).expect("fits"),
            data: videos.to_vec(),
        })
        .expect("page")
    }

    #[test]
    fn before_first_data_is_zero_even_for_unknown_video() {
        let fx = Fixture::new();
        let stat = fx
            .query(0)
            .request_stat(99, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).single().expect("ts"))
            .expect("stat");
        assert_eq!(stat.metrics(), LikeView::default());
    }

    #[test]
    fn unknown_video_is_an_error() {
        let fx = Fixture::new();
        let err = fx.query(0).request_stat(99, ts(2)).expect_err("not found");
        assert!(matches!(err, StatsError::VideoNotFound(99)));
    }

    #[test]
    fn before_publish_is_zero() {
        let fx = Fixture::new();
        let mut record = video(1, 5, 50);
        record.published_at = "2024-06-10T00:00:00Z".to_string();
        fx.catalog.replace(1, record, ts(10));
        fx.series.record(1, ts(10), LikeView::new(5, 50));

        let stat = fx.query(0).request_stat(1, ts(5)).expect("stat");
        assert_eq!(stat.metrics(), LikeView::default());
    }

    #[test]
    fn deleted_video_returns_frozen_counters() {
        let fx = Fixture::new();
        fx.catalog.replace(1, video(1, 3, 30), ts(1));
        fx.series.record(1, ts(1), LikeView::new(1, 1));
        fx.ledger.mark(1, ts(2));

        let query = fx.query(0);
        assert_eq!(query.request_stat(1, ts(2)).expect("stat").metrics(), LikeView::new(1, 1));
        assert_eq!(query.request_stat(1, ts(3)).expect("stat").metrics(), LikeView::new(3, 30));
        assert_eq!(query.request_stat(1, ts(30)).expect("stat").metrics(), LikeView::new(3, 30));
    }

    #[test]
    fn series_value_is_used_when_present() {
        let fx = Fixture::new();
        fx.catalog.replace(1, video(1, 9, 90), ts(4));
        fx.series.record(1, ts(1), LikeView::new(1, 10));
        fx.series.record(1, ts(4), LikeView::new(9, 90));

        let stat = fx.query(0).request_stat(1, ts(3)).expect("stat");
        assert_eq!(stat.metrics(), LikeView::new(1, 10));
        assert_eq!(stat.time, ts(3));
    }

    #[test]
    fn missing_series_falls_back_to_raw_day() {
        let fx = Fixture::new();
        fx.catalog.replace(1, video(1, 2, 20), ts(3));
        fx.snapshots
            .write_snapshot(day(3), &[page(&[video(1, 2, 20)])], "6.0")
            .expect("write");

        let stat = fx.query(0).request_stat(1, ts(3)).expect("stat");
        assert_eq!(stat.metrics(), LikeView::new(2, 20));
    }

    #[test]
    fn miss_tolerance_reaches_neighbouring_days() {
        let fx = Fixture::new();
        fx.catalog.replace(1, video(1, 2, 20), ts(3));
        fx.snapshots
            .write_snapshot(day(5), &[page(&[video(1, 2, 20)])], "6.0")
            .expect("write");

        assert_eq!(fx.query(1).request_stat(1, ts(3)).expect("stat").metrics(), LikeView::default());
        assert_eq!(fx.query(2).request_stat(1, ts(3)).expect("stat").metrics(), LikeView::new(2, 20));
    }

    #[test]
    fn missing_year_is_period_unavailable() {
        let fx = Fixture::new();
        fx.catalog.replace(1, video(1, 2, 20), ts(3));
        let later = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("ts");

        let err = fx.query(0).request_stat(1, later).expect_err("unavailable");
        assert!(matches!(err, StatsError::PeriodUnavailable(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn stats_at_rejects_empty_list() {
        let fx = Fixture::new();
        assert!(matches!(fx.query(0).stats_at(1, &[]), Err(StatsError::NoTimestamps)));
    }
}
