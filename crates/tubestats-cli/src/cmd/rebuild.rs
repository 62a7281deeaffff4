use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tubestats_core::StoreConfig;

use crate::output::{OutputMode, render};

use super::{close_store, open_store};

#[derive(Debug, Serialize)]
struct RebuildSummary {
    days_replayed: usize,
    days_malformed: Vec<NaiveDate>,
    samples: usize,
    series: usize,
}

/// Run `tstats rebuild`: replay every raw day file into fresh time series.
///
/// # Errors
///
/// Returns an error if a day file cannot be read or the series cannot be saved.
pub fn run_rebuild(output: OutputMode, config: StoreConfig) -> Result<()> {
    let store = open_store(config)?;
    let report = store.rebuild_time_series().context("Failed to rebuild time series")?;
    let summary = RebuildSummary {
        days_replayed: report.days_replayed,
        days_malformed: report.days_malformed,
        samples: report.samples,
        series: store.time_series().len(),
    };
    close_store(store)?;

    render(output, &summary, |s, w| {
        writeln!(
            w,
            "rebuild: days={} malformed={} samples={} series={}",
            s.days_replayed,
            s.days_malformed.len(),
            s.samples,
            s.series
        )
    })
}
