//! Per-video history of (likes, views) counters.
//!
//! - [`list`]: the ordered series of one video and its lookup rules.
//! - [`store`]: all series, keyed by video id, and their files.
//! - [`bootstrap`]: rebuild of the store from raw day files.

pub mod bootstrap;
pub mod list;
pub mod store;

pub use bootstrap::{BootstrapReport, rebuild_from_snapshots};
pub use list::{InsertOutcome, Sample, TimeSeries};
pub use store::{Resolution, SaveReport, TimeSeriesStore};
