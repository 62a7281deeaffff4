//! `tstats show`: last known metadata of one video.

use crate::output::{OutputMode, kv, render, rule};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use tubestats_core::report::watch_url;
use tubestats_core::{StoreConfig, VideoRecord};

use super::open_store;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Numeric video id.
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct VideoDetail {
    pub id: i64,
    pub uuid: String,
    pub short_uuid: String,
    pub name: String,
    pub url: String,
    pub channel: String,
    pub published_at: Option<DateTime<Utc>>,
    pub duration: i64,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VideoDetail {
    fn new(video: &VideoRecord, host: &str, deleted_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: video.id,
            uuid: video.uuid.clone(),
            short_uuid: video.short_uuid.clone(),
            name: video.name.clone(),
            url: watch_url(host, &video.short_uuid),
            channel: video.channel.display_name.clone(),
            published_at: video.published_at(),
            duration: video.duration,
            views: video.views,
            likes: video.likes,
            comments: video.comments,
            deleted_at,
        }
    }

    fn write_human(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "{} ({})", self.name, self.id)?;
        rule(w)?;
        kv(w, "url", &self.url)?;
        kv(w, "uuid", &self.uuid)?;
        if !self.channel.is_empty() {
            kv(w, "channel", &self.channel)?;
        }
        if let Some(published) = self.published_at {
            kv(w, "published", published.to_rfc3339())?;
        }
        kv(w, "duration", format!("{}s", self.duration))?;
        kv(w, "views", self.views.to_string())?;
        kv(w, "likes", self.likes.to_string())?;
        kv(w, "comments", self.comments.to_string())?;
        if let Some(deleted) = self.deleted_at {
            kv(w, "deleted", deleted.to_rfc3339())?;
        }
        Ok(())
    }
}

pub fn run_show(args: &ShowArgs, output: OutputMode, config: StoreConfig) -> anyhow::Result<()> {
    let host = config.api_host.clone();
    let store = open_store(config)?;
    let video = store
        .video(args.id)
        .with_context(|| format!("Failed to show video {}", args.id))?;
    let detail = VideoDetail::new(&video, &host, store.deletion_of(args.id));

    render(output, &detail, |d, w| d.write_human(w))
}
