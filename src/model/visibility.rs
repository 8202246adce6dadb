//! Visibility classification of turns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy for how turns outside the visible window stop costing render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisibilityMode {
    /// Keep turns in the document but suppress their display.
    Hide,
    /// Keep turns in layout flow but exempt them from paint/layout cost.
    #[serde(alias = "cv")]
    CostDeferredRender,
    /// Physically remove turns, leaving a placeholder behind.
    #[default]
    Detach,
}

impl VisibilityMode {
    /// Stable lowercase name, as accepted by the config file and CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hide => "hide",
            Self::CostDeferredRender => "cost-deferred-render",
            Self::Detach => "detach",
        }
    }

    /// Marker applied to out-of-window turns in this mode, if any.
    ///
    /// Detach mode removes turns instead of marking them.
    pub fn out_of_window_marker(self) -> Option<Marker> {
        match self {
            Self::Hide => Some(Marker::HardHidden),
            Self::CostDeferredRender => Some(Marker::CostDeferred),
            Self::Detach => None,
        }
    }
}

impl fmt::Display for VisibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a visibility mode name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown visibility mode {0:?} (expected hide, cost-deferred-render, cv or detach)")]
pub struct UnknownVisibilityMode(pub String);

impl FromStr for VisibilityMode {
    type Err = UnknownVisibilityMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hide" => Ok(Self::Hide),
            "cost-deferred-render" | "cv" => Ok(Self::CostDeferredRender),
            "detach" => Ok(Self::Detach),
            _ => Err(UnknownVisibilityMode(s.to_string())),
        }
    }
}

/// Class-style marker the engine puts on live turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Display suppressed; the turn leaves layout.
    HardHidden,
    /// Paint/layout cost deferred; the turn stays in layout flow.
    ///
    /// Also used as the soft-fold marker while streaming.
    CostDeferred,
}

impl Marker {
    /// Both markers, in the order they are stripped.
    pub const ALL: [Marker; 2] = [Marker::HardHidden, Marker::CostDeferred];

    /// Class name the host styles this marker with.
    pub fn class_name(self) -> &'static str {
        match self {
            Self::HardHidden => "lazy-turn-hidden",
            Self::CostDeferred => "lazy-turn-cv",
        }
    }
}

/// Derived per-turn visibility. Never stored; computed from markers and the
/// detached-record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityState {
    /// Fully in the document at normal cost.
    Rendered,
    /// In the document with rendering cost deferred.
    SoftFolded,
    /// In the document with display suppressed.
    Hidden,
    /// Removed from the document; a placeholder marks its position.
    Detached,
}

impl VisibilityState {
    /// Classify a turn from its observable properties.
    ///
    /// A hard-hidden marker wins over a cost-deferred one.
    pub fn classify(detached: bool, hard_hidden: bool, cost_deferred: bool) -> Self {
        if detached {
            Self::Detached
        } else if hard_hidden {
            Self::Hidden
        } else if cost_deferred {
            Self::SoftFolded
        } else {
            Self::Rendered
        }
    }
}
