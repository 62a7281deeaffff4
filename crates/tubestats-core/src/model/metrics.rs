use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative (likes, views) counters of a video at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LikeView {
    pub likes: u64,
    pub views: u64,
}

impl LikeView {
    #[must_use]
    pub const fn new(likes: u64, views: u64) -> Self {
        Self { likes, views }
    }

    /// Build from signed upstream counters, clamping negatives to zero.
    #[must_use]
    pub fn from_counters(likes: i64, views: i64) -> Self {
        Self {
            likes: u64::try_from(likes).unwrap_or(0),
            views: u64::try_from(views).unwrap_or(0),
        }
    }

    /// True when neither counter is smaller than in `earlier`.
    #[must_use]
    pub const fn dominates(self, earlier: Self) -> bool {
        self.likes >= earlier.likes && self.views >= earlier.views
    }
}

/// One metric of a report row, with sparkline percentages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub start_percentage: f64,
    pub end_percentage: f64,
    pub data: u64,
}

impl Stat {
    #[must_use]
    pub const fn raw(data: u64) -> Self {
        Self {
            start_percentage: 0.0,
            end_percentage: 0.0,
            data,
        }
    }
}

/// A report row (bucket) for one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoStat {
    pub time: DateTime<Utc>,
    pub likes: Stat,
    pub views: Stat,
}

impl VideoStat {
    /// Row carrying raw values only; percentages are filled in later.
    #[must_use]
    pub const fn at(time: DateTime<Utc>, value: LikeView) -> Self {
        Self {
            time,
            likes: Stat::raw(value.likes),
            views: Stat::raw(value.views),
        }
    }

    #[must_use]
    pub const fn zero(time: DateTime<Utc>) -> Self {
        Self::at(time, LikeView::new(0, 0))
    }

    #[must_use]
    pub const fn metrics(&self) -> LikeView {
        LikeView::new(self.likes.data, self.views.data)
    }
}
