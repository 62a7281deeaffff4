//! `tstats export`: bucketed likes and views of one video.

use crate::output::{OutputMode, render};
use anyhow::Context;
use clap::Args;
use std::io::Write;
use tubestats_core::{StoreConfig, VideoStat};

use super::{RangeArgs, open_store};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Numeric video id.
    pub id: i64,

    #[command(flatten)]
    pub range: RangeArgs,
}

fn write_buckets(buckets: &[VideoStat], w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "{:<10}  {:>10}  {:>6}  {:>8}  {:>6}", "DATE", "VIEWS", "VIEW%", "LIKES", "LIKE%")?;
    for bucket in buckets {
        writeln!(
            w,
            "{:<10}  {:>10}  {:>6.1}  {:>8}  {:>6.1}",
            bucket.time.format("%Y-%m-%d"),
            bucket.views.data,
            bucket.views.end_percentage * 100.0,
            bucket.likes.data,
            bucket.likes.end_percentage * 100.0,
        )?;
    }
    Ok(())
}

pub fn run_export(args: &ExportArgs, output: OutputMode, config: StoreConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let buckets = store
        .export_stats(args.id, args.range.range(), args.range.granularity)
        .with_context(|| format!("Failed to export stats of video {}", args.id))?;

    render(output, &buckets, |buckets, w| write_buckets(buckets, w))
}
