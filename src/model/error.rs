//! Error types for lazy-turns.
//!
//! This module defines the error taxonomy using `thiserror`. Errors compose via
//! `?` and `From` conversions.
//!
//! # Error Hierarchy
//!
//! - [`AppError`] - Top-level error returned by the binary
//!   - [`ConfigError`] - Config file could not be read or parsed
//!   - [`LoggingError`] - Tracing subscriber could not be installed
//!   - [`HostError`] - The host page refused a request
//!
//! # Error Recovery Strategy
//!
//! The engine never surfaces a [`HostError`] to its caller. Every host failure
//! is logged and downgraded:
//!
//! - observer attach refused: observe the document root instead
//! - no scroll container: scroll the window
//! - placeholder evicted: drop the detached record
//! - anchor gone after a mutation: skip the scroll correction
//!
//! Config and logging errors only occur while the binary starts up and are
//! fatal there.

use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::model::identifiers::{RootId, TurnId};
use thiserror::Error;

/// Top-level application error for the `lazy-turns` binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration file could not be loaded.
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialised.
    #[error("Failed to initialise logging: {0}")]
    Logging(#[from] LoggingError),

    /// Writing the simulation report failed.
    #[error("Failed to write report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Failures reported by the host page collaborator.
///
/// These never escape the engine; see the module docs for how each one
/// degrades.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host could not start observing mutations under `root`.
    ///
    /// **Recovery**: the engine observes [`RootId::DOCUMENT`] instead.
    #[error("cannot observe mutations under root {}", root.get())]
    ObserveRefused {
        /// Root the engine asked to observe.
        root: RootId,
    },

    /// The turn is not known to the host (never existed or was discarded).
    ///
    /// **Recovery**: the operation on that turn is skipped.
    #[error("unknown {0}")]
    UnknownTurn(TurnId),

    /// The turn has no parent, so it cannot be replaced by a placeholder.
    ///
    /// **Recovery**: the turn stays live; the detach pass counts it as not
    /// detached.
    #[error("{0} is not attached to the document")]
    NotAttached(TurnId),
}
