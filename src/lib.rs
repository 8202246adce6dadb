//! lazy-turns
//!
//! Windowed virtualization for long, continuously growing conversation
//! feeds. Only a recent window of turns stays fully rendered; older turns
//! are hidden, render-deferred or detached from the document, and are
//! revealed a batch at a time as the reader scrolls up. Scroll position is
//! held steady across every mutation, and heavy work backs off while a
//! reply is streaming in.
//!
//! The engine talks to the page only through the traits in [`host`], so it
//! runs the same against a browser binding or the in-memory
//! [`host::sim::SimPage`].

pub mod config;
pub mod engine;
pub mod host;
pub mod logging;
pub mod model;
pub mod scheduler;

pub use engine::{Engine, EngineSnapshot};
