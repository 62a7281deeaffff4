//! Spreadsheet-style views report: one row per video, one column per bucket.

use std::io::{self, Write};

use chrono::{DateTime, Utc};

use crate::export::{DateRange, Granularity, normalize_buckets, timestamps_for};
use crate::model::VideoRecord;
use crate::query::StatsQuery;

/// Build the views table for `videos`.
///
/// The header is `Video Name, Video URL, <bucket dates...>, Video Name`.
/// Each row carries the video name, its watch URL on `host`, the view count
/// per bucket and the name again. A video whose stats cannot be resolved is
/// logged and gets a row without data cells.
#[must_use]
pub fn views_table(
    query: &StatsQuery<'_>,
    videos: &[VideoRecord],
    range: DateRange,
    granularity: Granularity,
    host: &str,
    now: DateTime<Utc>,
) -> Vec<Vec<String>> {
    let timestamps = timestamps_for(range, granularity, now);

    let mut header = vec!["Video Name".to_string(), "Video URL".to_string()];
    header.extend(timestamps.iter().map(|ts| ts.format("%Y-%m-%d").to_string()));
    header.push("Video Name".to_string());

    let mut rows = Vec::with_capacity(videos.len() + 1);
    rows.push(header);

    for video in videos {
        let mut row = vec![video.name.clone(), watch_url(host, &video.short_uuid)];
        match query.stats_at(video.id, &timestamps) {
            Ok(mut stats) => {
                normalize_buckets(&mut stats);
                row.extend(stats.iter().map(|stat| stat.views.data.to_string()));
            }
            Err(err) => {
                tracing::error!(video_id = video.id, error = %err, code = %err.code(), "cannot read stats for video");
            }
        }
        row.push(video.name.clone());
        rows.push(row);
    }
    rows
}

/// Public watch page of a video.
#[must_use]
pub fn watch_url(host: &str, short_uuid: &str) -> String {
    format!("https://{host}/w/{short_uuid}")
}

/// Write `rows` as CSV with RFC 4180 quoting and CRLF line endings.
pub fn write_csv<W: Write>(mut out: W, rows: &[Vec<String>]) -> io::Result<()> {
    for row in rows {
        for (idx, field) in row.iter().enumerate() {
            if idx > 0 {
                out.write_all(b",")?;
            }
            write_field(&mut out, field)?;
        }
        out.write_all(b"\r\n")?;
    }
    out.flush()
}

fn write_field<W: Write>(out: &mut W, field: &str) -> io::Result<()> {
    if field.contains([',', '"', '\r', '\n']) {
        write!(out, "\"{}\"", field.replace('"', "\"\""))
    } else {
        out.write_all(field.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::ledger::DeletionLedger;
    use crate::model::LikeView;
    use crate::snapshot::{SnapshotStore, day_start};
    use crate::timeseries::TimeSeriesStore;
    use chrono::NaiveDate;

    fn ts(d: u32) -> DateTime<Utc> {
        day_start(NaiveDate::from_ymd_opt(2024, 7, d).expect("valid date"))
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let rows = vec![
            vec!["plain".to_string(), "a,b".to_string()],
            vec!["say \"hi\"".to_string(), "line\nbreak".to_string()],
        ];
        let mut out = Vec::new();
        write_csv(&mut out, &rows).expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "plain,\"a,b\"\r\n\"say \"\"hi\"\"\",\"line\nbreak\"\r\n"
        );
    }

    #[test]
    fn table_has_header_dates_and_view_counts() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let catalog = Catalog::new();
        let ledger = DeletionLedger::new();
        let series = TimeSeriesStore::new();
        let snapshots = SnapshotStore::new(dir.path());

        let video = VideoRecord {
            id: 1,
            name: "Launch, part 1".to_string(),
            short_uuid: "abc123".to_string(),
            published_at: "2024-06-01T00:00:00Z".to_string(),
            views: 40,
            ..VideoRecord::default()
        };
        catalog.replace(1, video.clone(), ts(2));
        series.record(1, ts(1), LikeView::new(0, 10));
        series.record(1, ts(2), LikeView::new(0, 40));
        let unknown = VideoRecord {
            id: 2,
            name: "gone".to_string(),
            ..VideoRecord::default()
        };

        let query = StatsQuery {
            catalog: &catalog,
            ledger: &ledger,
            series: &series,
            snapshots: &snapshots,
            first_data_available: Some(ts(1)),
            miss_tolerance_days: 0,
        };
        let rows = views_table(
            &query,
            &[video, unknown],
            DateRange::new(ts(1), ts(2)),
            Granularity::Daily,
            "videos.example.org",
            ts(30),
        );

        assert_eq!(
            rows[0],
            vec!["Video Name", "Video URL", "2024-07-01", "2024-07-02", "Video Name"]
        );
        assert_eq!(
            rows[1],
            vec![
                "Launch, part 1",
                "https://videos.example.org/w/abc123",
                "10",
                "40",
                "Launch, part 1"
            ]
        );
        assert_eq!(rows[2], vec!["gone", "https://videos.example.org/w/", "gone"]);
    }
}
