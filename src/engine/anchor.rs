//! Scroll anchoring around layout-changing mutations.
//!
//! Before a mutation the controller picks the first live turn whose bottom
//! edge is below the top of the scroll viewport and records its offset from
//! that edge. Afterwards it scrolls by however far the turn moved, so the
//! turn stays put on screen.
//!
//! The anchor may itself be detached by the mutation it is anchored around.
//! To still hold the view in that case, the next few live turns after it
//! are measured too, and the first of them still attached after the
//! mutation is used for the correction. If none survive, nothing is
//! corrected.

use crate::host::{TurnFeed, Viewport};
use crate::model::{ContainerId, ScrollTarget, TurnId};
use tracing::{debug, trace};

/// Turns measured after the anchor, in case the anchor itself goes away.
pub const FALLBACK_ANCHORS: usize = 3;

/// Bottom edges within this distance of the viewport top do not count as
/// visible.
const EDGE_SLACK_PX: f64 = 1.0;

/// One measured turn: its offset from the viewport top.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Measured {
    turn: TurnId,
    offset: f64,
}

/// Positions recorded before a mutation, anchor first.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorMark {
    target: ScrollTarget,
    chain: Vec<Measured>,
}

impl AnchorMark {
    /// The primary anchor turn.
    pub fn anchor(&self) -> Option<TurnId> {
        self.chain.first().map(|m| m.turn)
    }
}

/// Resolves the scroll container and keeps the view steady across
/// mutations.
#[derive(Debug, Clone, Default)]
pub struct ScrollAnchor {
    container: Option<ContainerId>,
    listening: Option<ScrollTarget>,
}

impl ScrollAnchor {
    /// Controller with no container resolved yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current scroll target. The window when no container was found.
    pub fn target(&self) -> ScrollTarget {
        ScrollTarget::from_container(self.container)
    }

    /// Re-resolve the scroll container from the newest live turn.
    ///
    /// When the container changed, the scroll listener moves from the old
    /// target to the new one. Returns the target in use.
    pub fn resolve<H: TurnFeed + Viewport + ?Sized>(&mut self, host: &mut H) -> ScrollTarget {
        let probe = host.turns().last().copied();
        let container = host.scrollable_ancestor(probe);
        let target = ScrollTarget::from_container(container);

        if self.listening != Some(target) {
            if let Some(previous) = self.listening.take() {
                host.unlisten_scroll(previous);
            }
            host.listen_scroll(target);
            self.listening = Some(target);
            debug!(?target, "scroll target resolved");
        }
        self.container = container;
        target
    }

    /// Drop the resolved container so the next resolve starts over.
    ///
    /// The listener stays attached until a resolve picks a different
    /// target.
    pub fn forget_container(&mut self) {
        self.container = None;
    }

    /// Measure the anchor and its fallbacks.
    ///
    /// Returns `None` when there are no live turns to anchor on.
    pub fn capture<H: TurnFeed + Viewport + ?Sized>(&mut self, host: &mut H) -> Option<AnchorMark> {
        let target = self.resolve(host);
        let top = host.viewport_top(target);
        let turns = host.turns();

        let start = turns
            .iter()
            .position(|t| {
                host.turn_rect(*t)
                    .is_some_and(|r| r.bottom > top + EDGE_SLACK_PX)
            })
            .unwrap_or(0);

        let chain: Vec<Measured> = turns
            .iter()
            .skip(start)
            .take(1 + FALLBACK_ANCHORS)
            .filter_map(|&turn| {
                host.turn_rect(turn).map(|r| Measured {
                    turn,
                    offset: r.top - top,
                })
            })
            .collect();

        if chain.is_empty() {
            return None;
        }
        trace!(anchor = %chain[0].turn, offset = chain[0].offset, "anchor captured");
        Some(AnchorMark { target, chain })
    }

    /// Scroll so the first surviving turn of `mark` is back at its recorded
    /// offset. Returns the applied scroll delta, 0 when nothing survived.
    pub fn correct<H: TurnFeed + Viewport + ?Sized>(&self, host: &mut H, mark: &AnchorMark) -> f64 {
        let top = host.viewport_top(mark.target);
        let survivor = mark.chain.iter().find_map(|m| {
            if !host.is_connected(m.turn) {
                return None;
            }
            host.turn_rect(m.turn).map(|r| (m, r.top - top))
        });

        let Some((measured, now)) = survivor else {
            debug!("anchor chain detached, skipping scroll correction");
            return 0.0;
        };

        let delta = now - measured.offset;
        if delta != 0.0 {
            host.scroll_by(mark.target, delta);
            trace!(anchor = %measured.turn, delta, "scroll corrected");
        }
        delta
    }

    /// Jump to the bottom of the current target.
    pub fn scroll_to_bottom<H: Viewport + ?Sized>(&self, host: &mut H) {
        let target = self.target();
        let height = host.scroll_height(target);
        host.scroll_to(target, height);
    }

    /// Scroll offset of the current target.
    pub fn scroll_top<H: Viewport + ?Sized>(&self, host: &H) -> f64 {
        host.scroll_top(self.target())
    }
}
