//! Bucketed stats over a date range, ready for charting.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StatsError;
use crate::model::{Stat, VideoStat};
use crate::query::StatsQuery;

/// Step between two buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Granularity {
    #[default]
    Daily,
    Monthly,
    Yearly,
}

impl Granularity {
    /// Parse `value`, falling back to [`Granularity::Daily`] for anything unknown.
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::debug!(value, "unknown granularity, using Daily");
            Self::Daily
        })
    }

    /// Buckets produced when no start date is given.
    const fn default_span(self) -> u32 {
        match self {
            Self::Daily => 6,
            Self::Monthly => 5,
            Self::Yearly => 4,
        }
    }

    /// `ts` moved `steps` buckets back; `None` when out of range.
    fn back(self, ts: DateTime<Utc>, steps: u32) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => ts.checked_sub_days(Days::new(u64::from(steps))),
            Self::Monthly => ts.checked_sub_months(Months::new(steps)),
            Self::Yearly => ts.checked_sub_months(Months::new(steps.checked_mul(12)?)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "Daily",
            Self::Monthly => "Monthly",
            Self::Yearly => "Yearly",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown granularity '{0}' (expected Daily, Monthly or Yearly)")]
pub struct ParseGranularityError(String);

impl FromStr for Granularity {
    type Err = ParseGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(ParseGranularityError(s.to_string())),
        }
    }
}

/// Inclusive date range; open ends are filled in by [`timestamps_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// Bucket timestamps for `range`, ascending, both ends inclusive.
///
/// A missing end means `now`. A missing start, or one after the end, means
/// the default span before the end (6 days, 5 months or 4 years). Buckets
/// are laid out backwards from the end.
#[must_use]
pub fn timestamps_for(range: DateRange, granularity: Granularity, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let end = range.end.unwrap_or(now);
    let start = match range.start {
        Some(start) if start <= end => start,
        _ => granularity
            .back(end, granularity.default_span())
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    };

    let mut out = Vec::new();
    for step in 0_u32.. {
        match granularity.back(end, step) {
            Some(ts) if ts >= start => out.push(ts),
            _ => break,
        }
    }
    out.reverse();
    out
}

/// Stats of `id` for every bucket of `range`, normalized for display.
///
/// # Errors
///
/// Returns [`StatsError::NoTimestamps`] when the range yields no bucket and
/// the first resolution error otherwise.
pub fn export_stats(
    query: &StatsQuery<'_>,
    id: i64,
    range: DateRange,
    granularity: Granularity,
    now: DateTime<Utc>,
) -> Result<Vec<VideoStat>, StatsError> {
    let timestamps = timestamps_for(range, granularity, now);
    let mut buckets = query.stats_at(id, &timestamps)?;
    normalize_buckets(&mut buckets);
    Ok(buckets)
}

/// Fill in the sparkline percentages of each bucket.
///
/// Per metric, `pct = data / max(1, largest)`. A bucket ends at its own
/// percentage and starts at the previous bucket's; the first bucket starts
/// at its own, unless it is the only one, which starts at zero.
pub fn normalize_buckets(buckets: &mut [VideoStat]) {
    let max_likes = buckets.iter().map(|b| b.likes.data).max().unwrap_or(0);
    let max_views = buckets.iter().map(|b| b.views.data).max().unwrap_or(0);

    let mut prev: Option<(f64, f64)> = (buckets.len() == 1).then_some((0.0, 0.0));
    for bucket in buckets.iter_mut() {
        let likes = percentage(bucket.likes.data, max_likes);
        let views = percentage(bucket.views.data, max_views);
        let (likes_start, views_start) = prev.unwrap_or((likes, views));
        bucket.likes = Stat {
            start_percentage: likes_start,
            end_percentage: likes,
            data: bucket.likes.data,
        };
        bucket.views = Stat {
            start_percentage: views_start,
            end_percentage: views,
            data: bucket.views.data,
        };
        prev = Some((likes, views));
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(value: u64, max: u64) -> f64 {
    value as f64 / max.max(1) as f64
}
