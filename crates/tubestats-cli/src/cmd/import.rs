//! `tstats import`: store and reconcile one collected listing.

use crate::output::{OutputMode, kv, render};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tubestats_core::{ImportReport, StoreConfig};

use super::{close_store, open_store, parse_when};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Raw listing page as returned by the platform API. Repeat in page order.
    #[arg(long = "page", value_name = "FILE", required = true)]
    pub pages: Vec<PathBuf>,

    /// Server version written into the day file header.
    #[arg(long)]
    pub server_version: String,

    /// Collection time (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = parse_when)]
    pub at: Option<DateTime<Utc>>,
}

/// Serializable digest of an [`ImportReport`].
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub day: NaiveDate,
    pub collected_at: DateTime<Utc>,
    pub snapshot_path: PathBuf,
    pub videos: usize,
    pub created: Vec<i64>,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: Vec<i64>,
    pub deletion_backdated: Vec<i64>,
    pub reactivated: Vec<i64>,
    pub stale_skipped: Vec<i64>,
}

impl From<ImportReport> for ImportSummary {
    fn from(report: ImportReport) -> Self {
        let reconcile = report.reconcile;
        Self {
            day: report.day,
            collected_at: report.collected_at,
            snapshot_path: report.snapshot_path,
            videos: report.videos,
            created: reconcile.created,
            updated: reconcile.updated.len(),
            unchanged: reconcile.unchanged.len(),
            deleted: reconcile.deleted,
            deletion_backdated: reconcile.deletion_backdated,
            reactivated: reconcile.reactivated,
            stale_skipped: reconcile.stale_skipped,
        }
    }
}

impl ImportSummary {
    pub fn write_human(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(w, "✓ imported {} videos for {}", self.videos, self.day)?;
        kv(w, "snapshot", self.snapshot_path.display().to_string())?;
        kv(w, "created", self.created.len().to_string())?;
        kv(w, "updated", self.updated.to_string())?;
        kv(w, "unchanged", self.unchanged.to_string())?;
        kv(w, "deleted", self.deleted.len().to_string())?;
        if !self.deletion_backdated.is_empty() {
            kv(w, "backdated", self.deletion_backdated.len().to_string())?;
        }
        if !self.reactivated.is_empty() {
            kv(w, "reactivated", self.reactivated.len().to_string())?;
        }
        if !self.stale_skipped.is_empty() {
            kv(w, "stale", self.stale_skipped.len().to_string())?;
        }
        Ok(())
    }
}

pub fn run_import(args: &ImportArgs, output: OutputMode, config: StoreConfig) -> anyhow::Result<()> {
    let pages = args
        .pages
        .iter()
        .map(|path| fs::read(path).with_context(|| format!("Failed to read page {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let collected_at = args.at.unwrap_or_else(Utc::now);
    let store = open_store(config)?;
    let report = store
        .import_from_raw(&pages, &args.server_version, collected_at)
        .with_context(|| format!("Failed to import listing collected at {}", collected_at.to_rfc3339()))?;
    close_store(store)?;

    let summary = ImportSummary::from(report);
    render(output, &summary, |s, w| s.write_human(w))
}
