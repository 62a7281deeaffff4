pub mod export;
pub mod import;
pub mod list;
pub mod rebuild;
pub mod reconcile;
pub mod report;
pub mod show;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use tubestats_core::snapshot::day_start;
use tubestats_core::{DateRange, Granularity, StatsStore, StoreConfig};

/// Date range flags shared by `export` and `report`.
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// First bucket (RFC 3339 or YYYY-MM-DD). Defaults to a short span before the end.
    #[arg(long, value_parser = parse_when)]
    pub start: Option<DateTime<Utc>>,

    /// Last bucket (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = parse_when)]
    pub end: Option<DateTime<Utc>>,

    /// Step between buckets: daily, monthly or yearly.
    #[arg(short, long, default_value_t = Granularity::Daily)]
    pub granularity: Granularity,
}

impl RangeArgs {
    pub const fn range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.end,
        }
    }
}

/// Parse an RFC 3339 timestamp or a bare date (midnight UTC).
pub fn parse_when(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    parse_day(value)
        .map(day_start)
        .map_err(|_| format!("expected RFC 3339 or YYYY-MM-DD, got '{value}'"))
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_day(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
}

/// Open the data folder of `config`.
pub fn open_store(config: StoreConfig) -> anyhow::Result<StatsStore> {
    let data_dir = config.data_dir.clone();
    StatsStore::open(config).with_context(|| format!("Failed to open data folder {}", data_dir.display()))
}

/// Persist the time series after a mutating command.
pub fn close_store(store: StatsStore) -> anyhow::Result<()> {
    let report = store.close().context("Failed to save time series")?;
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), saved = report.saved, "some time series were not saved");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bare_date_is_midnight_utc() {
        let ts = parse_when("2024-03-05").expect("date");
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).single().expect("ts"));
    }

    #[test]
    fn rfc3339_offset_is_normalized() {
        let ts = parse_when("2024-03-05T10:00:00+02:00").expect("timestamp");
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).single().expect("ts"));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = parse_when("yesterday").expect_err("must fail");
        assert!(err.contains("yesterday"));
    }
}
