//! Video metadata as delivered by the upstream video service.
//!
//! Field names follow the upstream JSON (`camelCase`) so that raw snapshot
//! pages and `videoDB.json` decode without translation. Fields the engine
//! does not care about are dropped on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::metrics::LikeView;

/// One page of a raw `videos` listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoPage {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub data: Vec<VideoRecord>,
}

/// Full metadata record of one video at the time it was collected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoRecord {
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "shortUUID")]
    pub short_uuid: String,
    pub is_live: bool,
    pub created_at: String,
    pub published_at: String,
    pub updated_at: String,
    pub originally_published_at: Option<String>,
    pub category: Label,
    pub licence: Label,
    pub language: Label,
    pub privacy: Label,
    pub state: Label,
    pub truncated_description: Option<String>,
    pub duration: i64,
    pub is_local: bool,
    pub name: String,
    pub thumbnail_path: String,
    pub preview_path: String,
    pub embed_path: String,
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub comments: i64,
    pub nsfw: bool,
    pub blacklisted: bool,
    pub blacklisted_reason: Option<String>,
    pub account: Owner,
    pub channel: Owner,
}

impl VideoRecord {
    /// Publish timestamp, if the upstream value is valid RFC3339.
    #[must_use]
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.published_at)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Cumulative counters carried by this record.
    #[must_use]
    pub fn metrics(&self) -> LikeView {
        LikeView::from_counters(self.likes, self.views)
    }
}

/// Id/label pair used for category, licence, language, privacy and state.
///
/// Upstream ids are numbers for most labels and strings for languages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub id: serde_json::Value,
    pub label: String,
}

/// Account or channel owning a video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Owner {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub url: String,
    pub host: String,
    pub avatars: Vec<Avatar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Avatar {
    pub path: String,
    pub width: i64,
    pub height: i64,
    pub created_at: String,
    pub updated_at: String,
}
