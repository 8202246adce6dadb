//! Domain model types (pure).
//!
//! Identifiers, visibility classification and the error taxonomy. Nothing
//! here talks to the host page.

pub mod error;
pub mod identifiers;
pub mod visibility;

// Re-export for convenience
pub use error::{AppError, HostError};
pub use identifiers::{ContainerId, PlaceholderId, RootId, ScrollTarget, TurnId};
pub use visibility::{Marker, UnknownVisibilityMode, VisibilityMode, VisibilityState};
