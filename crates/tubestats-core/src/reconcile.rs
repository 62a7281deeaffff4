//! Diff a freshly collected snapshot against the catalog and deletion ledger.
//!
//! [`reconcile`] is a pure function over owned state: it mutates the working
//! copies it is given and reports what changed. Persisting and publishing
//! the result is the caller's job (see `store.rs`), which is what makes a
//! failed pass leave no trace.
//!
//! # Rules for collection time `T`
//!
//! Videos held in the catalog but missing from the snapshot:
//!
//! | ledger entry `D` | action |
//! |---|---|
//! | none | record deletion at `T` |
//! | `D <= T` | nothing, the absence is already known |
//! | `D > T` | move `D` back to `T` (backfill of older data) |
//!
//! Videos present in the snapshot replace the catalog record unless the
//! held record was collected after `T`. A ledger entry `D <= T` for a
//! present video is removed (reactivation); `D > T` stays, since presence at
//! an earlier time does not contradict a later absence.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::catalog::CatalogState;
use crate::ledger::LedgerState;
use crate::model::VideoRecord;

/// What one reconciliation pass changed, as id lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<i64>,
    pub updated: Vec<i64>,
    pub unchanged: Vec<i64>,
    pub deleted: Vec<i64>,
    pub deletion_backdated: Vec<i64>,
    pub reactivated: Vec<i64>,
    pub stale_skipped: Vec<i64>,
}

impl ReconcileReport {
    /// True when the pass changed neither catalog nor ledger.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.deletion_backdated.is_empty()
            && self.reactivated.is_empty()
    }
}

/// Index a decoded snapshot by id; later duplicates of an id win.
#[must_use]
pub fn index_snapshot(videos: Vec<VideoRecord>) -> BTreeMap<i64, VideoRecord> {
    let mut out = BTreeMap::new();
    for video in videos {
        if let Some(previous) = out.insert(video.id, video) {
            tracing::debug!(video_id = previous.id, "duplicate video in snapshot, keeping last");
        }
    }
    out
}

/// Apply snapshot `incoming`, collected at `collected_at`, to the working state.
pub fn reconcile(
    catalog: &mut CatalogState,
    ledger: &mut LedgerState,
    incoming: BTreeMap<i64, VideoRecord>,
    collected_at: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for &id in catalog.videos.keys() {
        if incoming.contains_key(&id) {
            continue;
        }
        match ledger.get(&id).copied() {
            None => {
                ledger.insert(id, collected_at);
                report.deleted.push(id);
            }
            Some(deleted) if deleted <= collected_at => {}
            Some(deleted) => {
                tracing::warn!(
                    video_id = id,
                    data_recorded = %collected_at.to_rfc3339(),
                    video_deleted = %deleted.to_rfc3339(),
                    "writing video data in the past, moving deletion back"
                );
                ledger.insert(id, collected_at);
                report.deletion_backdated.push(id);
            }
        }
    }

    for (id, record) in incoming {
        if let Some(deleted) = ledger.get(&id).copied() {
            if deleted <= collected_at {
                ledger.remove(&id);
                tracing::info!(
                    video_id = id,
                    deleted = %deleted.to_rfc3339(),
                    "video reappeared, clearing deletion"
                );
                report.reactivated.push(id);
            }
        }

        let held_newer = catalog
            .observed
            .get(&id)
            .is_some_and(|observed| *observed > collected_at);

        match catalog.videos.get(&id) {
            None => {
                catalog.replace(id, record, collected_at);
                report.created.push(id);
            }
            Some(_) if held_newer => {
                tracing::debug!(video_id = id, "catalog holds newer record, keeping it");
                report.stale_skipped.push(id);
            }
            Some(current) if *current == record => {
                catalog.observed.insert(id, collected_at);
                report.unchanged.push(id);
            }
            Some(current) => {
                if !record.metrics().dominates(current.metrics()) {
                    tracing::warn!(
                        video_id = id,
                        likes = record.likes,
                        views = record.views,
                        previous_likes = current.likes,
                        previous_views = current.views,
                        "counters decreased between collections"
                    );
                }
                catalog.replace(id, record, collected_at);
                report.updated.push(id);
            }
        }
    }

    report
}
