//! In-memory page used by tests, benches and the CLI.
//!
//! `SimPage` models a feed of turns stacked vertically inside one scroll
//! box. Layout is plain block flow: a turn's top is the sum of the heights of
//! the attached, non-hidden turns before it. Cost-deferred turns keep their
//! height. Placeholders take no space.
//!
//! The scroll box behaves like an element with `overflow-y: auto` when the
//! page was built with [`SimPage::with_scroll_container`]; it only counts as
//! scrollable while its content is taller than its viewport. Otherwise the
//! window scrolls. Both share the same offset, which is clamped to the
//! scrollable range after every layout change, like a browser does.

use super::{ControlSurface, PageSignals, Rect, TurnFeed, Viewport};
use crate::model::{
    ContainerId, HostError, Marker, PlaceholderId, RootId, ScrollTarget, TurnId, VisibilityState,
};
use std::borrow::Cow;
use std::collections::HashMap;

/// Default viewport height for a new page.
pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Turn(TurnId),
    Placeholder(PlaceholderId),
}

#[derive(Debug, Clone)]
struct SimTurn {
    text: String,
    height: f64,
    hard_hidden: bool,
    cost_deferred: bool,
    attached: bool,
}

/// In-memory page implementing every host trait.
#[derive(Debug, Clone)]
pub struct SimPage {
    next_id: u64,
    slots: Vec<Slot>,
    turns: HashMap<TurnId, SimTurn>,
    viewport_height: f64,
    scroll_top: f64,
    container: Option<ContainerId>,
    stop_control: bool,
    feed_root: Option<RootId>,
    refuse_observe: bool,
    observed: Option<RootId>,
    scroll_listeners: Vec<ScrollTarget>,
    label: Option<String>,
    mutations: u64,
}

impl Default for SimPage {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPage {
    /// Page whose window scrolls, with a feed root and no turns.
    pub fn new() -> Self {
        Self {
            // 0 is reserved for the document root
            next_id: 1,
            slots: Vec::new(),
            turns: HashMap::new(),
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            scroll_top: 0.0,
            container: None,
            stop_control: false,
            feed_root: Some(RootId::new(u64::MAX)),
            refuse_observe: false,
            observed: None,
            scroll_listeners: Vec::new(),
            label: None,
            mutations: 0,
        }
    }

    /// Page whose turns live inside a scrollable element of the given
    /// viewport height.
    pub fn with_scroll_container(viewport_height: f64) -> Self {
        let mut page = Self::new();
        let id = page.alloc();
        page.container = Some(ContainerId::new(id));
        page.viewport_height = viewport_height;
        page
    }

    fn alloc(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Append a turn at the end of the feed.
    pub fn push_turn(&mut self, text: impl Into<String>, height: f64) -> TurnId {
        let id = TurnId::new(self.alloc());
        self.turns.insert(
            id,
            SimTurn {
                text: text.into(),
                height,
                hard_hidden: false,
                cost_deferred: false,
                attached: true,
            },
        );
        self.slots.push(Slot::Turn(id));
        id
    }

    /// Append `count` turns of `height` pixels, each with `words` words.
    pub fn push_turns(&mut self, count: usize, words: usize, height: f64) -> Vec<TurnId> {
        (0..count)
            .map(|i| {
                let text = (0..words)
                    .map(|w| format!("w{i}-{w}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.push_turn(text, height)
            })
            .collect()
    }

    /// Grow a turn's text in place, like a streaming reply does.
    pub fn append_text(&mut self, turn: TurnId, more: &str) {
        if let Some(t) = self.turns.get_mut(&turn) {
            t.text.push_str(more);
        }
    }

    /// Change a turn's rendered height.
    pub fn set_turn_height(&mut self, turn: TurnId, height: f64) {
        if let Some(t) = self.turns.get_mut(&turn) {
            t.height = height;
        }
        self.clamp_scroll();
    }

    /// Drop every slot and turn, like a navigation to another conversation.
    pub fn clear_feed(&mut self) {
        self.slots.clear();
        self.turns.clear();
        self.scroll_top = 0.0;
    }

    /// Show or hide the stop-generation control.
    pub fn set_stop_control(&mut self, visible: bool) {
        self.stop_control = visible;
    }

    /// Replace the preferred feed root.
    pub fn set_feed_root(&mut self, root: Option<RootId>) {
        self.feed_root = root;
    }

    /// Make every observe request for a non-document root fail.
    pub fn refuse_observe(&mut self, refuse: bool) {
        self.refuse_observe = refuse;
    }

    /// Remove a placeholder from the document, as unrelated page code might.
    pub fn evict_placeholder(&mut self, placeholder: PlaceholderId) -> bool {
        let before = self.slots.len();
        self.slots
            .retain(|slot| *slot != Slot::Placeholder(placeholder));
        before != self.slots.len()
    }

    /// Placeholders currently in the document, in order.
    pub fn placeholders(&self) -> Vec<PlaceholderId> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Placeholder(p) => Some(*p),
                Slot::Turn(_) => None,
            })
            .collect()
    }

    /// Turns known to the page, live or detached.
    pub fn known_turns(&self) -> usize {
        self.turns.len()
    }

    /// Visibility of a turn as the page sees it.
    pub fn visibility(&self, turn: TurnId) -> Option<VisibilityState> {
        self.turns
            .get(&turn)
            .map(|t| VisibilityState::classify(!t.attached, t.hard_hidden, t.cost_deferred))
    }

    /// Live turns carrying `marker`.
    pub fn marked(&self, marker: Marker) -> Vec<TurnId> {
        self.turns()
            .into_iter()
            .filter(|t| self.has_marker(*t, marker))
            .collect()
    }

    /// Current control label, if the control was ever rendered.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Number of marker, detach and restore operations performed so far.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    /// Root currently observed.
    pub fn observed_root(&self) -> Option<RootId> {
        self.observed
    }

    /// Targets that currently deliver scroll events.
    pub fn scroll_listeners(&self) -> &[ScrollTarget] {
        &self.scroll_listeners
    }

    /// Viewport height of the scroll box.
    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    /// Current scroll offset.
    pub fn offset(&self) -> f64 {
        self.scroll_top
    }

    /// Set the scroll offset directly (as a user scrolling would).
    pub fn set_offset(&mut self, top: f64) {
        self.scroll_top = top;
        self.clamp_scroll();
    }

    /// Height of all laid-out content.
    pub fn content_height(&self) -> f64 {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Turn(id) => self.turns.get(id).map(Self::layout_height),
                Slot::Placeholder(_) => None,
            })
            .sum()
    }

    fn max_scroll(&self) -> f64 {
        (self.content_height() - self.viewport_height).max(0.0)
    }

    fn clamp_scroll(&mut self) {
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll());
    }

    fn layout_height(turn: &SimTurn) -> f64 {
        if turn.hard_hidden {
            0.0
        } else {
            turn.height
        }
    }

    fn turn_mut(&mut self, turn: TurnId) -> Option<&mut SimTurn> {
        self.turns.get_mut(&turn)
    }
}

impl TurnFeed for SimPage {
    fn turns(&self) -> Vec<TurnId> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Turn(id) => Some(*id),
                Slot::Placeholder(_) => None,
            })
            .collect()
    }

    fn text_content(&self, turn: TurnId) -> Option<Cow<'_, str>> {
        self.turns
            .get(&turn)
            .filter(|t| !t.text.is_empty())
            .map(|t| Cow::Borrowed(t.text.as_str()))
    }

    fn has_marker(&self, turn: TurnId, marker: Marker) -> bool {
        self.turns.get(&turn).is_some_and(|t| match marker {
            Marker::HardHidden => t.hard_hidden,
            Marker::CostDeferred => t.cost_deferred,
        })
    }

    fn add_marker(&mut self, turn: TurnId, marker: Marker) {
        self.mutations += 1;
        if let Some(t) = self.turn_mut(turn) {
            match marker {
                Marker::HardHidden => t.hard_hidden = true,
                Marker::CostDeferred => t.cost_deferred = true,
            }
        }
        self.clamp_scroll();
    }

    fn remove_marker(&mut self, turn: TurnId, marker: Marker) {
        self.mutations += 1;
        if let Some(t) = self.turn_mut(turn) {
            match marker {
                Marker::HardHidden => t.hard_hidden = false,
                Marker::CostDeferred => t.cost_deferred = false,
            }
        }
    }

    fn detach(&mut self, turn: TurnId) -> Result<PlaceholderId, HostError> {
        if !self.turns.contains_key(&turn) {
            return Err(HostError::UnknownTurn(turn));
        }
        let index = self
            .slots
            .iter()
            .position(|slot| *slot == Slot::Turn(turn))
            .ok_or(HostError::NotAttached(turn))?;

        self.mutations += 1;
        let placeholder = PlaceholderId::new(self.alloc());
        self.slots[index] = Slot::Placeholder(placeholder);
        if let Some(t) = self.turn_mut(turn) {
            t.attached = false;
        }
        self.clamp_scroll();
        Ok(placeholder)
    }

    fn restore(&mut self, placeholder: PlaceholderId, turn: TurnId) -> bool {
        let Some(index) = self
            .slots
            .iter()
            .position(|slot| *slot == Slot::Placeholder(placeholder))
        else {
            return false;
        };

        self.mutations += 1;
        self.slots[index] = Slot::Turn(turn);
        if let Some(t) = self.turn_mut(turn) {
            t.attached = true;
        }
        true
    }

    fn is_connected(&self, turn: TurnId) -> bool {
        self.turns.get(&turn).is_some_and(|t| t.attached)
    }
}

impl Viewport for SimPage {
    fn scrollable_ancestor(&self, _probe: Option<TurnId>) -> Option<ContainerId> {
        self.container
            .filter(|_| self.content_height() > self.viewport_height + 1.0)
    }

    fn listen_scroll(&mut self, target: ScrollTarget) {
        if !self.scroll_listeners.contains(&target) {
            self.scroll_listeners.push(target);
        }
    }

    fn unlisten_scroll(&mut self, target: ScrollTarget) {
        self.scroll_listeners.retain(|t| *t != target);
    }

    fn viewport_top(&self, _target: ScrollTarget) -> f64 {
        0.0
    }

    fn turn_rect(&self, turn: TurnId) -> Option<Rect> {
        let mut y = 0.0;
        for slot in &self.slots {
            let Slot::Turn(id) = slot else { continue };
            let t = self.turns.get(id)?;
            let height = Self::layout_height(t);
            if *id == turn {
                return Some(Rect::from_top_height(y - self.scroll_top, height));
            }
            y += height;
        }
        None
    }

    fn scroll_top(&self, _target: ScrollTarget) -> f64 {
        self.scroll_top
    }

    fn scroll_height(&self, _target: ScrollTarget) -> f64 {
        self.content_height().max(self.viewport_height)
    }

    fn scroll_by(&mut self, _target: ScrollTarget, dy: f64) {
        self.scroll_top += dy;
        self.clamp_scroll();
    }

    fn scroll_to(&mut self, _target: ScrollTarget, top: f64) {
        self.scroll_top = top;
        self.clamp_scroll();
    }
}

impl PageSignals for SimPage {
    fn stop_control_visible(&self) -> bool {
        self.stop_control
    }

    fn feed_root(&self) -> Option<RootId> {
        self.feed_root
    }

    fn observe(&mut self, root: RootId) -> Result<(), HostError> {
        if self.refuse_observe && !root.is_document() {
            return Err(HostError::ObserveRefused { root });
        }
        self.observed = Some(root);
        Ok(())
    }
}

impl ControlSurface for SimPage {
    fn set_control_label(&mut self, label: &str) {
        self.label = Some(label.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_stack_in_block_flow() {
        let mut page = SimPage::new();
        let a = page.push_turn("a", 100.0);
        let b = page.push_turn("b", 50.0);

        assert_eq!(page.turn_rect(a), Some(Rect::from_top_height(0.0, 100.0)));
        assert_eq!(page.turn_rect(b), Some(Rect::from_top_height(100.0, 50.0)));
        assert_eq!(page.content_height(), 150.0);
    }

    #[test]
    fn hidden_turns_take_no_space_but_cost_deferred_do() {
        let mut page = SimPage::new();
        let a = page.push_turn("a", 100.0);
        let b = page.push_turn("b", 100.0);

        page.add_marker(a, Marker::CostDeferred);
        assert_eq!(page.turn_rect(b).map(|r| r.top), Some(100.0));

        page.add_marker(a, Marker::HardHidden);
        assert_eq!(page.turn_rect(b).map(|r| r.top), Some(0.0));
        assert_eq!(page.visibility(a), Some(VisibilityState::Hidden));
    }

    #[test]
    fn detach_leaves_placeholder_and_restore_reinserts() {
        let mut page = SimPage::new();
        let ids = page.push_turns(3, 2, 10.0);

        let ph = page.detach(ids[1]).expect("attached turn detaches");
        assert_eq!(page.turns(), vec![ids[0], ids[2]]);
        assert_eq!(page.placeholders(), vec![ph]);
        assert!(!page.is_connected(ids[1]));
        assert_eq!(page.turn_rect(ids[1]), None);

        assert!(page.restore(ph, ids[1]));
        assert_eq!(page.turns(), ids);
        assert!(page.placeholders().is_empty());
    }

    #[test]
    fn restore_fails_when_placeholder_was_evicted() {
        let mut page = SimPage::new();
        let ids = page.push_turns(2, 1, 10.0);
        let ph = page.detach(ids[0]).expect("detach");

        assert!(page.evict_placeholder(ph));
        assert!(!page.restore(ph, ids[0]));
        assert!(!page.is_connected(ids[0]));
    }

    #[test]
    fn detaching_twice_reports_not_attached() {
        let mut page = SimPage::new();
        let t = page.push_turn("x", 10.0);
        page.detach(t).expect("first detach");
        assert_eq!(page.detach(t), Err(HostError::NotAttached(t)));
        assert_eq!(
            page.detach(TurnId::new(999)),
            Err(HostError::UnknownTurn(TurnId::new(999)))
        );
    }

    #[test]
    fn container_only_scrollable_when_content_overflows() {
        let mut page = SimPage::with_scroll_container(300.0);
        page.push_turns(2, 1, 100.0);
        assert_eq!(page.scrollable_ancestor(None), None);

        page.push_turns(2, 1, 100.0);
        assert!(page.scrollable_ancestor(None).is_some());
    }

    #[test]
    fn scroll_offset_is_clamped_to_content() {
        let mut page = SimPage::with_scroll_container(300.0);
        let ids = page.push_turns(5, 1, 100.0);
        page.set_offset(10_000.0);
        assert_eq!(page.offset(), 200.0);

        page.detach(ids[0]).expect("detach");
        assert_eq!(page.offset(), 100.0);
    }

    #[test]
    fn empty_text_reads_as_none() {
        let mut page = SimPage::new();
        let t = page.push_turn("", 10.0);
        assert!(page.text_content(t).is_none());
        page.append_text(t, "hello world");
        assert_eq!(page.text_content(t).as_deref(), Some("hello world"));
    }

    #[test]
    fn observe_refusal_spares_document_root() {
        let mut page = SimPage::new();
        page.refuse_observe(true);
        assert!(page.observe(RootId::new(4)).is_err());
        assert!(page.observe(RootId::DOCUMENT).is_ok());
        assert_eq!(page.observed_root(), Some(RootId::DOCUMENT));
    }
}
