//! Detached turns and their reinsertion points.
//!
//! Detaching takes turns off the front (oldest end) of the live list and
//! replaces each one in place with a placeholder. Records are kept oldest
//! first; restoring pops from the newest end, which is the one adjacent to
//! the visible window.
//!
//! # Invariants
//! - a record exists for a turn iff that turn is detached by this store
//! - each record's placeholder sits exactly where its turn goes back
//! - records are never reordered
//! - between planner passes: total turns == live turns + records

use crate::host::TurnFeed;
use crate::model::{PlaceholderId, TurnId};
use tracing::{debug, warn};

/// One detached turn and the marker holding its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachedRecord {
    /// Marker occupying the turn's position.
    pub placeholder: PlaceholderId,
    /// The detached turn.
    pub node: TurnId,
}

/// Stack of detached records, oldest first.
#[derive(Debug, Clone)]
pub struct NodeStore {
    records: Vec<DetachedRecord>,
    per_tick_limit: usize,
}

impl NodeStore {
    /// Empty store detaching at most `per_tick_limit` turns per call.
    pub fn new(per_tick_limit: usize) -> Self {
        Self {
            records: Vec::new(),
            per_tick_limit: per_tick_limit.max(1),
        }
    }

    /// Per-call detach cap.
    pub fn per_tick_limit(&self) -> usize {
        self.per_tick_limit
    }

    /// Number of detached turns.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is detached.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records, oldest first.
    pub fn records(&self) -> &[DetachedRecord] {
        &self.records
    }

    /// Detached turns, oldest first.
    pub fn detached_turns(&self) -> impl Iterator<Item = TurnId> + '_ {
        self.records.iter().map(|r| r.node)
    }

    /// Whether `turn` is detached by this store.
    pub fn contains(&self, turn: TurnId) -> bool {
        self.records.iter().any(|r| r.node == turn)
    }

    /// Detach up to `min(n, per_tick_limit)` turns from the front of
    /// `candidates`, in order.
    ///
    /// Returns how many were actually detached. A turn the host refuses to
    /// detach is skipped and not counted.
    pub fn detach_front<F: TurnFeed + ?Sized>(
        &mut self,
        feed: &mut F,
        candidates: &[TurnId],
        n: usize,
    ) -> usize {
        let limit = n.min(self.per_tick_limit);
        let mut detached = 0;
        for &turn in candidates.iter().take(limit) {
            match feed.detach(turn) {
                Ok(placeholder) => {
                    self.records.push(DetachedRecord {
                        placeholder,
                        node: turn,
                    });
                    detached += 1;
                }
                Err(err) => warn!(%turn, error = %err, "detach skipped"),
            }
        }
        debug!(requested = n, limit, detached, stored = self.records.len(), "detach_front");
        detached
    }

    /// Reinsert the newest `count` detached turns at their placeholders.
    ///
    /// A record whose placeholder was evicted from the document is dropped.
    /// Returns how many turns went back into the document.
    pub fn restore_back<F: TurnFeed + ?Sized>(&mut self, feed: &mut F, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let start = self.records.len().saturating_sub(count);
        let batch: Vec<DetachedRecord> = self.records.drain(start..).collect();

        let mut restored = 0;
        for record in batch {
            if feed.restore(record.placeholder, record.node) {
                restored += 1;
            } else {
                debug!(
                    turn = %record.node,
                    placeholder = %record.placeholder,
                    "placeholder gone, dropping detached record"
                );
            }
        }
        debug!(requested = count, restored, stored = self.records.len(), "restore_back");
        restored
    }

    /// Reinsert every detached turn.
    pub fn restore_all<F: TurnFeed + ?Sized>(&mut self, feed: &mut F) -> usize {
        let count = self.records.len();
        self.restore_back(feed, count)
    }

    /// Forget every record without touching the document.
    ///
    /// Used when the conversation changes and old turns are discarded.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::sim::SimPage;

    #[test]
    fn detach_front_takes_oldest_in_order() {
        let mut page = SimPage::new();
        let ids = page.push_turns(5, 1, 10.0);
        let mut store = NodeStore::new(50);

        let live = page.turns();
        assert_eq!(store.detach_front(&mut page, &live, 2), 2);

        assert_eq!(store.detached_turns().collect::<Vec<_>>(), ids[..2].to_vec());
        assert_eq!(page.turns(), ids[2..].to_vec());
        assert_eq!(page.turns().len() + store.len(), ids.len());
    }

    #[test]
    fn detach_front_respects_per_tick_limit() {
        let mut page = SimPage::new();
        page.push_turns(10, 1, 10.0);
        let mut store = NodeStore::new(3);

        let live = page.turns();
        assert_eq!(store.detach_front(&mut page, &live, 8), 3);
        assert_eq!(store.len(), 3);
        assert_eq!(page.turns().len(), 7);
    }

    #[test]
    fn detach_front_stops_at_candidate_end() {
        let mut page = SimPage::new();
        page.push_turns(2, 1, 10.0);
        let mut store = NodeStore::new(50);

        let live = page.turns();
        assert_eq!(store.detach_front(&mut page, &live, 10), 2);
    }

    #[test]
    fn detach_front_skips_turns_host_refuses() {
        let mut page = SimPage::new();
        let ids = page.push_turns(3, 1, 10.0);
        let mut store = NodeStore::new(50);
        page.detach(ids[0]).expect("pre-detach");

        let stale = ids.clone();
        assert_eq!(store.detach_front(&mut page, &stale, 2), 1);
        assert!(store.contains(ids[1]));
        assert!(!store.contains(ids[0]));
    }

    #[test]
    fn restore_back_reinserts_newest_first_batch() {
        let mut page = SimPage::new();
        let ids = page.push_turns(6, 1, 10.0);
        let mut store = NodeStore::new(50);
        let live = page.turns();
        store.detach_front(&mut page, &live, 4);

        assert_eq!(store.restore_back(&mut page, 2), 2);

        assert_eq!(store.detached_turns().collect::<Vec<_>>(), ids[..2].to_vec());
        assert_eq!(page.turns(), ids[2..].to_vec(), "restored in original positions");
    }

    #[test]
    fn restore_back_drops_records_with_evicted_placeholders() {
        let mut page = SimPage::new();
        let ids = page.push_turns(4, 1, 10.0);
        let mut store = NodeStore::new(50);
        let live = page.turns();
        store.detach_front(&mut page, &live, 3);

        let evicted = store.records()[2].placeholder;
        assert!(page.evict_placeholder(evicted));

        assert_eq!(store.restore_back(&mut page, 2), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(page.turns(), vec![ids[1], ids[3]]);
    }

    #[test]
    fn restore_back_more_than_stored_restores_all() {
        let mut page = SimPage::new();
        let ids = page.push_turns(3, 1, 10.0);
        let mut store = NodeStore::new(50);
        let live = page.turns();
        store.detach_front(&mut page, &live, 3);

        assert_eq!(store.restore_back(&mut page, 10), 3);
        assert!(store.is_empty());
        assert_eq!(page.turns(), ids);
    }

    #[test]
    fn restore_all_and_clear() {
        let mut page = SimPage::new();
        page.push_turns(3, 1, 10.0);
        let mut store = NodeStore::new(50);
        let live = page.turns();
        store.detach_front(&mut page, &live, 2);
        assert_eq!(store.restore_all(&mut page), 2);

        let live = page.turns();
        store.detach_front(&mut page, &live, 1);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(page.turns().len(), 2, "clear leaves the document alone");
    }

    #[test]
    fn zero_limit_is_clamped_to_one() {
        assert_eq!(NodeStore::new(0).per_tick_limit(), 1);
    }
}
