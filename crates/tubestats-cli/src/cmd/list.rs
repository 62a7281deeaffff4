//! `tstats list`: every video ever collected.

use crate::output::{OutputMode, render};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use tubestats_core::{StoreConfig, VideoRecord};

use super::open_store;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only videos currently considered deleted.
    #[arg(long, conflicts_with = "active")]
    pub deleted: bool,

    /// Only videos still listed upstream.
    #[arg(long)]
    pub active: bool,

    /// Maximum videos to show.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct VideoRow {
    pub id: i64,
    pub name: String,
    pub short_uuid: String,
    pub views: i64,
    pub likes: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VideoRow {
    fn new(video: &VideoRecord, deleted_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: video.id,
            name: video.name.clone(),
            short_uuid: video.short_uuid.clone(),
            views: video.views,
            likes: video.likes,
            deleted_at,
        }
    }
}

fn keep(args: &ListArgs, row: &VideoRow) -> bool {
    match (args.deleted, args.active) {
        (true, _) => row.deleted_at.is_some(),
        (_, true) => row.deleted_at.is_none(),
        _ => true,
    }
}

fn write_rows(rows: &[VideoRow], w: &mut dyn Write) -> std::io::Result<()> {
    if rows.is_empty() {
        return writeln!(w, "No videos found");
    }
    writeln!(w, "{:>8}  {:>10}  {:>8}  {:<10}  NAME", "ID", "VIEWS", "LIKES", "DELETED")?;
    for row in rows {
        let deleted = row
            .deleted_at
            .map_or_else(|| "-".to_string(), |ts| ts.format("%Y-%m-%d").to_string());
        writeln!(
            w,
            "{:>8}  {:>10}  {:>8}  {:<10}  {}",
            row.id, row.views, row.likes, deleted, row.name
        )?;
    }
    Ok(())
}

pub fn run_list(args: &ListArgs, output: OutputMode, config: StoreConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let rows: Vec<VideoRow> = store
        .all_videos()
        .iter()
        .map(|video| VideoRow::new(video, store.deletion_of(video.id)))
        .filter(|row| keep(args, row))
        .take(args.limit.unwrap_or(usize::MAX))
        .collect();

    render(output, &rows, |rows, w| write_rows(rows, w))
}
