//! tubestats-core library.
//!
//! Durable like/view history of a video platform: raw day snapshots,
//! reconciliation into a catalog and deletion ledger, per-video time
//! series and point-in-time or bucketed stats on top.
//!
//! Start with [`StatsStore::open`].
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per subsystem, aggregated in [`error::StatsError`];
//!   `anyhow::Result` for config loading and collaborator traits.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`)
//!   with structured fields such as `video_id`.

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
pub mod lock;
pub mod model;
mod persist;
pub mod pool;
pub mod query;
pub mod reconcile;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod timeseries;

pub use config::{ConfigError, StoreConfig};
pub use error::{ErrorCode, StatsError};
pub use export::{DateRange, Granularity};
pub use model::{LikeView, Stat, VideoRecord, VideoStat};
pub use store::{ImportReport, RawCollection, SnapshotSource, StatsStore, ThumbnailFetcher};
