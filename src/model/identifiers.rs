//! Host-assigned node identifier newtypes.
//!
//! The engine never holds references into the host page. Every node it
//! tracks (turns, placeholders, scroll containers, observer roots) is named
//! by a stable surrogate id handed out by the host collaborator. Ids are
//! compared by value, so two ids are the same node iff they are equal.

use std::fmt;

/// Identity of one turn element.
///
/// Turns keep their id for their whole lifetime, including while detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(u64);

impl TurnId {
    /// Wrap a raw host id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw host id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn#{}", self.0)
    }
}

/// Identity of a placeholder marker left where a detached turn used to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderId(u64);

impl PlaceholderId {
    /// Wrap a raw host id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw host id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "placeholder#{}", self.0)
    }
}

/// Identity of a scrollable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(u64);

impl ContainerId {
    /// Wrap a raw host id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw host id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Identity of an element structural mutations can be observed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(u64);

impl RootId {
    /// The document root. Always observable.
    pub const DOCUMENT: Self = Self(0);

    /// Wrap a raw host id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw host id.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the document root.
    pub const fn is_document(self) -> bool {
        self.0 == 0
    }
}

/// Where scroll position lives: a scrollable element or the window viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScrollTarget {
    /// No scrollable ancestor was found; the window scrolls.
    #[default]
    Window,
    /// A scrollable ancestor element.
    Element(ContainerId),
}

impl ScrollTarget {
    /// Build from an optional resolved container.
    pub fn from_container(container: Option<ContainerId>) -> Self {
        match container {
            Some(id) => Self::Element(id),
            None => Self::Window,
        }
    }

    /// The container, if this target is an element.
    pub fn container(self) -> Option<ContainerId> {
        match self {
            Self::Window => None,
            Self::Element(id) => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_ids_compare_by_value() {
        assert_eq!(TurnId::new(7), TurnId::new(7));
        assert_ne!(TurnId::new(7), TurnId::new(8));
        assert!(TurnId::new(1) < TurnId::new(2));
    }

    #[test]
    fn turn_id_display_includes_raw_value() {
        assert_eq!(TurnId::new(42).to_string(), "turn#42");
        assert_eq!(PlaceholderId::new(3).to_string(), "placeholder#3");
    }

    #[test]
    fn document_root_is_zero() {
        assert!(RootId::DOCUMENT.is_document());
        assert!(!RootId::new(5).is_document());
    }

    #[test]
    fn scroll_target_round_trips_container() {
        let id = ContainerId::new(9);
        assert_eq!(ScrollTarget::from_container(Some(id)).container(), Some(id));
        assert_eq!(ScrollTarget::from_container(None), ScrollTarget::Window);
        assert_eq!(ScrollTarget::default().container(), None);
    }
}
