//! `tstats report`: views of every video as CSV.

use crate::output::{OutputMode, render};
use anyhow::Context;
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tubestats_core::StoreConfig;
use tubestats_core::report::write_csv;

use super::{RangeArgs, open_store};

/// Report file written inside `--output`.
pub const REPORT_FILE: &str = "views.csv";

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Folder receiving views.csv. Without it the CSV goes to stdout.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ReportWritten {
    path: PathBuf,
    videos: usize,
    buckets: usize,
}

pub fn run_report(args: &ReportArgs, output: OutputMode, config: StoreConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let rows = store.views_report(args.range.range(), args.range.granularity, Utc::now());

    let Some(ref dir) = args.output else {
        let stdout = io::stdout();
        write_csv(stdout.lock(), &rows).context("Failed to write report")?;
        return Ok(());
    };

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(REPORT_FILE);
    let file = fs::File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_csv(&mut writer, &rows).with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush().with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "views report written");

    let written = ReportWritten {
        path,
        videos: rows.len().saturating_sub(1),
        buckets: rows.first().map_or(0, |header| header.len().saturating_sub(3)),
    };
    render(output, &written, |r, w| {
        writeln!(w, "✓ wrote {} videos x {} buckets to {}", r.videos, r.buckets, r.path.display())
    })
}
