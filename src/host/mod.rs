//! Host page boundary.
//!
//! The engine only ever talks to the page through these traits. A browser
//! binding implements them over real DOM nodes; [`sim::SimPage`] implements
//! them over an in-memory page with simple block layout, which is what the
//! tests, benches and the CLI drive.
//!
//! # Trait Structure
//!
//! - [`TurnFeed`]: enumerate turns, read their text, mark and detach them
//! - [`Viewport`]: geometry, scroll containers and scroll position
//! - [`PageSignals`]: stop-generation control, feed root, mutation observer
//! - [`ControlSurface`]: the on-screen toggle label
//! - [`Host`]: all of the above

pub mod sim;

use crate::model::{
    ContainerId, HostError, Marker, PlaceholderId, RootId, ScrollTarget, TurnId,
};
use std::borrow::Cow;

/// Vertical extent of an element in viewport coordinates (CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Top edge.
    pub top: f64,
    /// Bottom edge.
    pub bottom: f64,
}

impl Rect {
    /// Build a rect from its top edge and height.
    pub fn from_top_height(top: f64, height: f64) -> Self {
        Self {
            top,
            bottom: top + height,
        }
    }

    /// Height of the rect.
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Ordered turn elements and the DOM operations the engine performs on them.
pub trait TurnFeed {
    /// Turns currently attached to the document, in document order.
    fn turns(&self) -> Vec<TurnId>;

    /// Text content of a turn, live or detached. `None` if it has none.
    fn text_content(&self, turn: TurnId) -> Option<Cow<'_, str>>;

    /// Whether the turn carries `marker`.
    fn has_marker(&self, turn: TurnId, marker: Marker) -> bool;

    /// Put `marker` on the turn.
    fn add_marker(&mut self, turn: TurnId, marker: Marker);

    /// Take `marker` off the turn.
    fn remove_marker(&mut self, turn: TurnId, marker: Marker);

    /// Replace the turn by a placeholder in place and remove it from the
    /// document.
    fn detach(&mut self, turn: TurnId) -> Result<PlaceholderId, HostError>;

    /// Put `turn` back where `placeholder` is and drop the placeholder.
    ///
    /// Returns `false` (and does nothing) when the placeholder is no longer
    /// in the document.
    fn restore(&mut self, placeholder: PlaceholderId, turn: TurnId) -> bool;

    /// Whether the turn is attached to the document.
    fn is_connected(&self, turn: TurnId) -> bool;
}

/// Geometry and scrolling.
pub trait Viewport {
    /// Nearest ancestor of `probe` (or of the body when `None`) with
    /// vertical overflow `auto`/`scroll` whose content is taller than its
    /// viewport.
    fn scrollable_ancestor(&self, probe: Option<TurnId>) -> Option<ContainerId>;

    /// Start delivering scroll events for `target` to the engine.
    fn listen_scroll(&mut self, target: ScrollTarget);

    /// Stop delivering scroll events for `target`.
    fn unlisten_scroll(&mut self, target: ScrollTarget);

    /// Top edge of the visible area of `target` in viewport coordinates.
    fn viewport_top(&self, target: ScrollTarget) -> f64;

    /// Bounding rect of a turn. `None` if it is not in the document.
    fn turn_rect(&self, turn: TurnId) -> Option<Rect>;

    /// Current scroll offset of `target`.
    fn scroll_top(&self, target: ScrollTarget) -> f64;

    /// Total scrollable height of `target`.
    fn scroll_height(&self, target: ScrollTarget) -> f64;

    /// Scroll `target` by `dy` pixels (positive scrolls down).
    fn scroll_by(&mut self, target: ScrollTarget, dy: f64);

    /// Scroll `target` to an absolute offset.
    fn scroll_to(&mut self, target: ScrollTarget, top: f64);
}

/// Page-level signals the engine reacts to.
pub trait PageSignals {
    /// Whether a visible "stop generation" control is on the page.
    fn stop_control_visible(&self) -> bool;

    /// Preferred root to observe mutations under, best candidate first
    /// resolved by the host. `None` if the page has no usable root yet.
    fn feed_root(&self) -> Option<RootId>;

    /// Observe structural mutations (subtree-wide) under `root`, replacing
    /// any previous observation.
    fn observe(&mut self, root: RootId) -> Result<(), HostError>;
}

/// The on-screen toggle control.
pub trait ControlSurface {
    /// Replace the control's label, creating the control if needed.
    fn set_control_label(&mut self, label: &str);
}

/// Everything the engine needs from the page.
pub trait Host: TurnFeed + Viewport + PageSignals + ControlSurface {}

impl<T> Host for T where T: TurnFeed + Viewport + PageSignals + ControlSurface {}
