//! Proptest strategies shared by the property suites.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use tubestats_core::LikeView;

/// Base instant all generated timestamps are offsets from.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid ts")
}

/// Timestamp within the first 60 days after [`epoch`], hour resolution.
pub fn arb_ts() -> impl Strategy<Value = DateTime<Utc>> {
    (0_i64..60 * 24).prop_map(|hours| epoch() + chrono::Duration::hours(hours))
}

/// Counters from a small domain so equal values show up often.
pub fn arb_value() -> impl Strategy<Value = LikeView> {
    (0_u64..4, 0_u64..6).prop_map(|(likes, views)| LikeView::new(likes, views))
}

pub fn arb_samples(max: usize) -> impl Strategy<Value = Vec<(DateTime<Utc>, LikeView)>> {
    prop::collection::vec((arb_ts(), arb_value()), 0..max)
}
