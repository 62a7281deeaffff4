//! Per-video time series: a timestamp-ordered doubly linked list of samples.
//!
//! Nodes live in an arena (`Vec<Node>`) and link to each other by index.
//! Removed nodes go to a free list and are reused by later inserts.
//!
//! # Invariants
//!
//! - Timestamps strictly increase from head to tail.
//! - No two consecutive samples carry the same value; a sample marks the
//!   moment the counters changed.
//! - `head`/`tail` are `None` exactly when the series is empty.

use chrono::{DateTime, Utc};

use crate::model::LikeView;

/// One `(timestamp, value)` point of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub value: LikeView,
}

/// What [`TimeSeries::insert`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The series was empty.
    First,
    /// New head before the previous one.
    Prepended,
    /// Same value as the head, earlier timestamp: the head moved back.
    HeadReplaced,
    /// New tail after the previous one.
    Appended,
    /// The value is already implied by the series.
    DuplicateDiscarded,
    /// A sample with the same timestamp had a different value and was overwritten.
    Corrected,
    /// Same value as the following sample: that sample moved back to the new timestamp.
    TransitionMoved,
    /// New interior sample.
    Inserted,
}

#[derive(Debug, Clone)]
struct Node {
    sample: Sample,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl TimeSeries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from samples in any order.
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut series = Self::new();
        for sample in samples {
            series.insert(sample.at, sample.value);
        }
        series
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Timestamp of the head sample.
    #[must_use]
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.head.map(|idx| self.nodes[idx].sample.at)
    }

    /// Timestamp of the tail sample.
    #[must_use]
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.tail.map(|idx| self.nodes[idx].sample.at)
    }

    /// Samples from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        std::iter::successors(self.head, |&idx| self.nodes[idx].next)
            .map(|idx| self.nodes[idx].sample)
    }

    // -----------------------------------------------------------------------
    // Insert
    // -----------------------------------------------------------------------

    /// Record that the counters were `value` at `at`.
    pub fn insert(&mut self, at: DateTime<Utc>, value: LikeView) -> InsertOutcome {
        let (Some(head), Some(tail)) = (self.head, self.tail) else {
            let idx = self.alloc(Sample { at, value }, None, None);
            self.head = Some(idx);
            self.tail = Some(idx);
            return InsertOutcome::First;
        };

        let head_sample = self.nodes[head].sample;
        if at < head_sample.at {
            if head_sample.value == value {
                self.nodes[head].sample.at = at;
                return InsertOutcome::HeadReplaced;
            }
            if !head_sample.value.dominates(value) {
                tracing::warn!(at = %at.to_rfc3339(), "prepended sample exceeds the following one");
            }
            let idx = self.alloc(Sample { at, value }, None, Some(head));
            self.nodes[head].prev = Some(idx);
            self.head = Some(idx);
            return InsertOutcome::Prepended;
        }

        let tail_sample = self.nodes[tail].sample;
        if at > tail_sample.at {
            if tail_sample.value == value {
                return InsertOutcome::DuplicateDiscarded;
            }
            if !value.dominates(tail_sample.value) {
                tracing::warn!(at = %at.to_rfc3339(), "counters decreased after last sample");
            }
            let idx = self.alloc(Sample { at, value }, Some(tail), None);
            self.nodes[tail].next = Some(idx);
            self.tail = Some(idx);
            return InsertOutcome::Appended;
        }

        // head.at <= at <= tail.at: find the last node at or before `at`.
        let mut cursor = head;
        while let Some(next) = self.nodes[cursor].next {
            if self.nodes[next].sample.at > at {
                break;
            }
            cursor = next;
        }

        let current = self.nodes[cursor].sample;
        if current.at == at {
            if current.value == value {
                return InsertOutcome::DuplicateDiscarded;
            }
            tracing::warn!(
                at = %at.to_rfc3339(),
                old_likes = current.value.likes,
                old_views = current.value.views,
                likes = value.likes,
                views = value.views,
                "correcting existing sample"
            );
            self.nodes[cursor].sample.value = value;
            self.renormalize(cursor);
            return InsertOutcome::Corrected;
        }

        if current.value == value {
            return InsertOutcome::DuplicateDiscarded;
        }

        // `at` lies strictly between `cursor` and its successor.
        let Some(next) = self.nodes[cursor].next else {
            return InsertOutcome::DuplicateDiscarded;
        };
        let following = self.nodes[next].sample;
        if following.value == value {
            self.nodes[next].sample.at = at;
            return InsertOutcome::TransitionMoved;
        }
        if !value.dominates(current.value) || !following.value.dominates(value) {
            tracing::warn!(at = %at.to_rfc3339(), "inserted sample is not monotonic with its neighbours");
        }
        let idx = self.alloc(Sample { at, value }, Some(cursor), Some(next));
        self.nodes[cursor].next = Some(idx);
        self.nodes[next].prev = Some(idx);
        InsertOutcome::Inserted
    }

    /// Drop neighbours made redundant by a value change at `idx`.
    fn renormalize(&mut self, idx: usize) {
        let value = self.nodes[idx].sample.value;
        let mut anchor = idx;
        if let Some(prev) = self.nodes[idx].prev {
            if self.nodes[prev].sample.value == value {
                self.unlink(idx);
                anchor = prev;
            }
        }
        if let Some(next) = self.nodes[anchor].next {
            if self.nodes[next].sample.value == value {
                self.unlink(next);
            }
        }
    }

    fn alloc(&mut self, sample: Sample, prev: Option<usize>, next: Option<usize>) -> usize {
        let node = Node { sample, prev, next };
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = node;
            idx
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn unlink(&mut self, idx: usize) {
        let Node { prev, next, .. } = self.nodes[idx];
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
        self.free.push(idx);
        self.len -= 1;
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Value in effect at `ts`: the last sample at or before it.
    ///
    /// `None` when the series is empty or `ts` precedes the first sample.
    /// Scans from whichever end is closer to `ts`.
    #[must_use]
    pub fn resolve_at(&self, ts: DateTime<Utc>) -> Option<LikeView> {
        let (head, tail) = (self.head?, self.tail?);
        let (first, last) = (self.nodes[head].sample, self.nodes[tail].sample);
        if ts < first.at {
            return None;
        }
        if ts >= last.at {
            return Some(last.value);
        }
        if ts - first.at <= last.at - ts {
            self.resolve_from_head(ts)
        } else {
            self.resolve_from_tail(ts)
        }
    }

    /// Forward scan variant of [`Self::resolve_at`].
    #[must_use]
    pub fn resolve_from_head(&self, ts: DateTime<Utc>) -> Option<LikeView> {
        let mut found = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            if node.sample.at > ts {
                break;
            }
            found = Some(node.sample.value);
            cursor = node.next;
        }
        found
    }

    /// Backward scan variant of [`Self::resolve_at`].
    #[must_use]
    pub fn resolve_from_tail(&self, ts: DateTime<Utc>) -> Option<LikeView> {
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            if node.sample.at <= ts {
                return Some(node.sample.value);
            }
            cursor = node.prev;
        }
        None
    }
}
