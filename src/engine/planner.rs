//! Visible-window planning and the DOM passes that realise it.
//!
//! The planner owns the windowing state (budget, expanded flag, last
//! applied configuration) and exposes one function per pass kind. The
//! engine decides which pass runs and wraps it in scroll anchoring.
//!
//! All marker passes touch a turn only when its marking actually has to
//! change, so re-running a pass over an already-correct page performs no
//! DOM mutations.

use super::node_store::NodeStore;
use crate::host::TurnFeed;
use crate::model::{Marker, TurnId, VisibilityMode};
use serde::Serialize;
use tracing::{debug, trace};

/// Number of turns to keep visible.
///
/// Everything when expanded, otherwise the budget clamped to `total`.
pub fn desired_visible(total: usize, budget: usize, expanded: bool) -> usize {
    if expanded {
        total
    } else {
        budget.min(total)
    }
}

/// A window configuration, as last applied or as about to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppliedWindow {
    /// Live plus detached turns.
    pub total: usize,
    /// Turns meant to be visible.
    pub desired: usize,
    /// Visibility mode in effect.
    pub mode: VisibilityMode,
    /// Whether everything is shown.
    pub expanded: bool,
}

impl AppliedWindow {
    /// Turns outside the window.
    pub fn hidden(&self) -> usize {
        self.total.saturating_sub(self.desired)
    }
}

/// Windowing state.
#[derive(Debug, Clone)]
pub struct Planner {
    mode: VisibilityMode,
    batch: usize,
    budget: usize,
    expanded: bool,
    applied: Option<AppliedWindow>,
}

impl Planner {
    /// Collapsed planner with a budget of one batch.
    pub fn new(mode: VisibilityMode, batch: usize) -> Self {
        let batch = batch.max(1);
        Self {
            mode,
            batch,
            budget: batch,
            expanded: false,
            applied: None,
        }
    }

    /// Base batch size.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Current visible budget.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Whether everything is shown.
    pub fn expanded(&self) -> bool {
        self.expanded
    }

    /// Last applied configuration.
    pub fn applied(&self) -> Option<AppliedWindow> {
        self.applied
    }

    /// Configuration matching the current state and turn counts.
    pub fn target(&self, live: usize, detached: usize) -> AppliedWindow {
        let total = live + detached;
        AppliedWindow {
            total,
            desired: desired_visible(total, self.budget, self.expanded),
            mode: self.mode,
            expanded: self.expanded,
        }
    }

    /// Whether `target` was already applied.
    pub fn is_applied(&self, target: &AppliedWindow) -> bool {
        self.applied.as_ref() == Some(target)
    }

    /// Remember `window` as applied.
    pub fn record(&mut self, window: AppliedWindow) {
        self.applied = Some(window);
    }

    /// Forget the last applied configuration so the next pass always runs.
    pub fn forget_applied(&mut self) {
        self.applied = None;
    }

    /// Grow the budget by one batch, up to `total`.
    ///
    /// Returns the new budget, or `None` when it would not grow.
    pub fn grow_budget(&mut self, total: usize) -> Option<usize> {
        let next = (self.budget + self.batch).min(total);
        if next <= self.budget {
            return None;
        }
        self.budget = next;
        Some(next)
    }

    /// Flip the expanded flag. Collapsing resets the budget to one batch.
    /// Returns the new flag.
    pub fn toggle_expanded(&mut self) -> bool {
        self.expanded = !self.expanded;
        if !self.expanded {
            self.budget = self.batch;
        }
        self.expanded
    }

    /// Back to the initial collapsed state.
    pub fn reset(&mut self) {
        self.expanded = false;
        self.budget = self.batch;
        self.applied = None;
    }
}

/// Remove `marker` from `turn` if it carries it.
fn unmark<F: TurnFeed + ?Sized>(feed: &mut F, turn: TurnId, marker: Marker) -> bool {
    if feed.has_marker(turn, marker) {
        feed.remove_marker(turn, marker);
        true
    } else {
        false
    }
}

/// Put `marker` on `turn` if it lacks it.
fn mark<F: TurnFeed + ?Sized>(feed: &mut F, turn: TurnId, marker: Marker) -> bool {
    if feed.has_marker(turn, marker) {
        false
    } else {
        feed.add_marker(turn, marker);
        true
    }
}

/// Strip every marker from `turns`. Returns how many markers were removed.
pub fn clear_markers<F: TurnFeed + ?Sized>(feed: &mut F, turns: &[TurnId]) -> usize {
    let mut removed = 0;
    for &turn in turns {
        for marker in Marker::ALL {
            removed += usize::from(unmark(feed, turn, marker));
        }
    }
    removed
}

/// Strip every marker from every live turn.
pub fn clear_all_markers<F: TurnFeed + ?Sized>(feed: &mut F) -> usize {
    let turns = feed.turns();
    clear_markers(feed, &turns)
}

/// Show everything: restore every detached turn and strip all markers.
pub fn expand_all<F: TurnFeed + ?Sized>(feed: &mut F, store: &mut NodeStore) {
    let restored = store.restore_all(feed);
    let cleared = clear_all_markers(feed);
    debug!(restored, cleared, "expanded pass");
}

/// Result of a detach pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachPass {
    /// The live count now matches the target.
    Complete,
    /// The per-tick cap stopped the pass after some progress; run again.
    FollowUp,
    /// The host refused every detach; running again would not help.
    Stalled,
}

/// Bring the live turn count to `window.desired` by restoring from the
/// back and detaching from the front.
///
/// Turns left live lose any markers an earlier soft fold put on them.
pub fn apply_detach<F: TurnFeed + ?Sized>(
    feed: &mut F,
    store: &mut NodeStore,
    window: &AppliedWindow,
) -> DetachPass {
    let target_hidden = window.hidden();
    if store.len() > target_hidden {
        store.restore_back(feed, store.len() - target_hidden);
    }

    let live = feed.turns();
    let need = live.len().saturating_sub(window.desired);
    let outcome = if need == 0 {
        DetachPass::Complete
    } else {
        let did = store.detach_front(feed, &live, need);
        if did >= need {
            DetachPass::Complete
        } else if did > 0 {
            DetachPass::FollowUp
        } else {
            DetachPass::Stalled
        }
    };

    let cleared = clear_all_markers(feed);
    debug!(
        total = window.total,
        desired = window.desired,
        need,
        detached = store.len(),
        cleared,
        ?outcome,
        "detach pass"
    );
    outcome
}

/// Mark the front of the live list with `marker` and clean the back
/// `window.desired` turns. Head turns keep only `marker`.
pub fn apply_markers<F: TurnFeed + ?Sized>(feed: &mut F, window: &AppliedWindow, marker: Marker) {
    let live = feed.turns();
    let cutoff = live.len().saturating_sub(window.desired);
    let (head, tail) = live.split_at(cutoff);

    let mut cleaned = clear_markers(feed, tail);
    let mut marked = 0;
    for &turn in head {
        marked += usize::from(mark(feed, turn, marker));
        for other in Marker::ALL.into_iter().filter(|m| *m != marker) {
            cleaned += usize::from(unmark(feed, turn, other));
        }
    }
    debug!(
        total = window.total,
        desired = window.desired,
        marker = marker.class_name(),
        marked,
        cleaned,
        "marker pass"
    );
}

/// Chunked soft fold of the live head while streaming.
///
/// Starting the job cleans the visible tail at once. The head is folded
/// with the cost-deferred marker in chunks via [`SoftFold::step`], each
/// chunk also lifting any hard-hidden marker so folded turns stay in
/// layout flow.
#[derive(Debug, Clone)]
pub struct SoftFold {
    head: Vec<TurnId>,
    index: usize,
}

impl SoftFold {
    /// Snapshot the live list and clean the turns inside the window.
    pub fn start<F: TurnFeed + ?Sized>(feed: &mut F, desired: usize) -> Self {
        let mut live = feed.turns();
        let cutoff = live.len().saturating_sub(desired);
        let cleaned = clear_markers(feed, &live[cutoff..]);
        live.truncate(cutoff);
        debug!(fold = live.len(), cleaned, "soft fold started");
        Self {
            head: live,
            index: 0,
        }
    }

    /// Turns still to fold.
    pub fn remaining(&self) -> usize {
        self.head.len() - self.index
    }

    /// Fold up to `chunk` turns. Returns `true` when the head is done.
    pub fn step<F: TurnFeed + ?Sized>(&mut self, feed: &mut F, chunk: usize) -> bool {
        let end = (self.index + chunk.max(1)).min(self.head.len());
        for &turn in &self.head[self.index..end] {
            unmark(feed, turn, Marker::HardHidden);
            mark(feed, turn, Marker::CostDeferred);
        }
        self.index = end;
        trace!(remaining = self.remaining(), "soft fold chunk");
        self.index >= self.head.len()
    }
}
