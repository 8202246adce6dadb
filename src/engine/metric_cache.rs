//! Per-turn size estimates.
//!
//! A turn's size is estimated from its text as the number of whitespace
//! characters (space, tab, CR, LF, NBSP) times a fixed ratio, rounded to
//! the nearest integer. Estimates are cached by turn id and recomputed when
//! missing or marked dirty.
//!
//! Bulk sums run through [`SumCursor`], a resumable cursor that computes at
//! most a fixed number of cache misses per step so the caller can yield to
//! the event loop between steps.

use crate::host::TurnFeed;
use crate::model::TurnId;
use std::collections::HashMap;
use tracing::trace;

/// Which slice of the conversation an estimate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeSubset {
    /// Turns inside the visible window.
    Visible,
    /// Every turn, live or detached.
    Total,
}

/// Last completed estimates. `None` until the first sum finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeEstimates {
    /// Sum over the visible window.
    pub visible: Option<u64>,
    /// Sum over every turn.
    pub total: Option<u64>,
}

impl SizeEstimates {
    /// Estimate for `subset`.
    pub fn get(&self, subset: SizeSubset) -> Option<u64> {
        match subset {
            SizeSubset::Visible => self.visible,
            SizeSubset::Total => self.total,
        }
    }

    /// Record a finished sum.
    pub fn set(&mut self, subset: SizeSubset, value: u64) {
        match subset {
            SizeSubset::Visible => self.visible = Some(value),
            SizeSubset::Total => self.total = Some(value),
        }
    }
}

/// Count whitespace-class characters: space, tab, CR, LF and NBSP.
pub fn count_whitespace(text: &str) -> usize {
    text.chars()
        .filter(|c| matches!(c, ' ' | '\t' | '\r' | '\n' | '\u{a0}'))
        .count()
}

/// Size estimate of a piece of text.
pub fn estimate_text(text: &str, ratio: f64) -> u64 {
    (count_whitespace(text) as f64 * ratio).round() as u64
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    estimate: u64,
    dirty: bool,
}

/// Memoized per-turn estimates keyed by host-assigned turn id.
///
/// Entries are never tied to the turn's lifetime; they go away on
/// [`MetricCache::evict`] or [`MetricCache::clear`].
#[derive(Debug, Clone)]
pub struct MetricCache {
    entries: HashMap<TurnId, CacheEntry>,
    ratio: f64,
}

impl MetricCache {
    /// Empty cache using `ratio` size units per whitespace character.
    pub fn new(ratio: f64) -> Self {
        Self {
            entries: HashMap::new(),
            ratio,
        }
    }

    /// Cached, clean estimate for `turn`, if any.
    pub fn cached(&self, turn: TurnId) -> Option<u64> {
        self.entries
            .get(&turn)
            .filter(|e| !e.dirty)
            .map(|e| e.estimate)
    }

    /// Estimate for `turn`, computing and storing it on a miss.
    pub fn estimate<F: TurnFeed + ?Sized>(&mut self, feed: &F, turn: TurnId) -> u64 {
        self.lookup_or_compute(feed, turn).0
    }

    /// Returns the estimate and whether it had to be computed.
    fn lookup_or_compute<F: TurnFeed + ?Sized>(&mut self, feed: &F, turn: TurnId) -> (u64, bool) {
        if let Some(hit) = self.cached(turn) {
            return (hit, false);
        }
        let estimate = feed
            .text_content(turn)
            .map_or(0, |text| estimate_text(&text, self.ratio));
        self.entries.insert(
            turn,
            CacheEntry {
                estimate,
                dirty: false,
            },
        );
        (estimate, true)
    }

    /// Mark an entry stale so the next lookup recomputes it.
    pub fn invalidate(&mut self, turn: TurnId) {
        if let Some(entry) = self.entries.get_mut(&turn) {
            entry.dirty = true;
        }
    }

    /// Forget one entry.
    pub fn evict(&mut self, turn: TurnId) {
        self.entries.remove(&turn);
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, clean or dirty.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of one [`SumCursor::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumProgress {
    /// More turns remain; step again after yielding.
    Pending,
    /// Every turn was summed.
    Done(u64),
}

/// Resumable bulk sum over a snapshot of turn ids.
#[derive(Debug, Clone)]
pub struct SumCursor {
    subset: SizeSubset,
    turns: Vec<TurnId>,
    index: usize,
    sum: u64,
}

impl SumCursor {
    /// Cursor over `turns`, reporting into `subset`.
    pub fn new(subset: SizeSubset, turns: Vec<TurnId>) -> Self {
        Self {
            subset,
            turns,
            index: 0,
            sum: 0,
        }
    }

    /// Subset this cursor computes.
    pub fn subset(&self) -> SizeSubset {
        self.subset
    }

    /// Turns not yet summed.
    pub fn remaining(&self) -> usize {
        self.turns.len() - self.index
    }

    /// Sum turns until `miss_budget` cache misses were computed or the end
    /// is reached. Hits are free.
    pub fn step<F: TurnFeed + ?Sized>(
        &mut self,
        cache: &mut MetricCache,
        feed: &F,
        miss_budget: usize,
    ) -> SumProgress {
        let mut misses = 0;
        while self.index < self.turns.len() {
            let (estimate, computed) = cache.lookup_or_compute(feed, self.turns[self.index]);
            self.sum = self.sum.saturating_add(estimate);
            self.index += 1;
            if computed {
                misses += 1;
                if misses >= miss_budget && self.index < self.turns.len() {
                    trace!(
                        subset = ?self.subset,
                        remaining = self.remaining(),
                        "size sum yielding"
                    );
                    return SumProgress::Pending;
                }
            }
        }
        SumProgress::Done(self.sum)
    }
}
