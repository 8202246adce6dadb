//! Configuration module.
//!
//! [`EngineConfig`] carries every tunable the engine reads. The values are
//! fixed for the lifetime of an engine; the loader only decides them at
//! startup.

pub mod loader;

pub use loader::{
    apply_cli_overrides, apply_env_overrides, default_config_path, default_log_path,
    load_config_file, load_config_with_precedence, merge_config, ConfigError, ConfigFile,
    ResolvedConfig,
};

use crate::model::VisibilityMode;
use serde::Serialize;

/// Built-in defaults for every engine option.
pub mod defaults {
    /// Turns revealed per upward-reveal step, and the windowed budget.
    pub const BATCH_SIZE: usize = 8;
    /// Distance from the top (px) that triggers an upward reveal.
    pub const REVEAL_THRESHOLD_PX: f64 = 120.0;
    /// Quiet window collapsing a burst of mutations into one pass.
    pub const DEBOUNCE_MS: u64 = 250;
    /// Delay after the stop control disappears before streaming ends.
    pub const STREAM_COOLDOWN_MS: u64 = 500;
    /// Interval of the stop-control poll.
    pub const STREAM_POLL_MS: u64 = 300;
    /// Delay before a soft-fold job runs.
    pub const SOFT_FOLD_DELAY_MS: u64 = 100;
    /// Turns detached per pass at most.
    pub const MAX_DETACH_PER_TICK: usize = 50;
    /// Turns soft-folded per chunk.
    pub const SOFT_FOLD_CHUNK: usize = 40;
    /// Size units per whitespace character.
    pub const TOKEN_RATIO: f64 = 1.3;
    /// Largest accepted ratio.
    pub const MAX_TOKEN_RATIO: f64 = 1_000.0;
    /// Cache misses computed per size-estimation chunk.
    pub const TOKENS_PER_TICK: usize = 20;
    /// Interval of the post-boot settle poll.
    pub const SETTLE_POLL_MS: u64 = 250;
    /// Attempts of the post-boot settle poll.
    pub const SETTLE_POLL_TRIES: u32 = 80;
    /// Delay standing in for "next animation frame".
    pub const FRAME_MS: u64 = 16;
}

/// Engine options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// How out-of-window turns are taken out of rendering.
    pub mode: VisibilityMode,
    /// Base visible budget and reveal step.
    pub batch_size: usize,
    /// Scroll offset (px) at or below which an upward reveal triggers.
    pub reveal_threshold_px: f64,
    /// Mutation debounce window.
    pub debounce_ms: u64,
    /// Streaming cooldown.
    pub stream_cooldown_ms: u64,
    /// Stop-control poll interval.
    pub stream_poll_ms: u64,
    /// Delay before a soft-fold job runs.
    pub soft_fold_delay_ms: u64,
    /// Per-pass detach cap.
    pub max_detach_per_tick: usize,
    /// Per-chunk soft-fold count.
    pub soft_fold_chunk: usize,
    /// Size units per whitespace character.
    pub token_ratio: f64,
    /// Cache misses per size-estimation chunk.
    pub tokens_per_tick: usize,
    /// Restrict the planner to the soft path while streaming.
    pub stream_safe: bool,
    /// Settle poll interval.
    pub settle_poll_ms: u64,
    /// Settle poll attempts.
    pub settle_poll_tries: u32,
    /// "Next frame" delay.
    pub frame_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: VisibilityMode::default(),
            batch_size: defaults::BATCH_SIZE,
            reveal_threshold_px: defaults::REVEAL_THRESHOLD_PX,
            debounce_ms: defaults::DEBOUNCE_MS,
            stream_cooldown_ms: defaults::STREAM_COOLDOWN_MS,
            stream_poll_ms: defaults::STREAM_POLL_MS,
            soft_fold_delay_ms: defaults::SOFT_FOLD_DELAY_MS,
            max_detach_per_tick: defaults::MAX_DETACH_PER_TICK,
            soft_fold_chunk: defaults::SOFT_FOLD_CHUNK,
            token_ratio: defaults::TOKEN_RATIO,
            tokens_per_tick: defaults::TOKENS_PER_TICK,
            stream_safe: true,
            settle_poll_ms: defaults::SETTLE_POLL_MS,
            settle_poll_tries: defaults::SETTLE_POLL_TRIES,
            frame_ms: defaults::FRAME_MS,
        }
    }
}

impl EngineConfig {
    /// Config with the given mode and defaults elsewhere.
    pub fn with_mode(mode: VisibilityMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Clamp values the engine cannot work with.
    ///
    /// Zero batch/chunk/cap sizes become 1 (a zero cap would never finish a
    /// pass). A negative or non-finite ratio falls back to the default, a
    /// huge one is capped at [`defaults::MAX_TOKEN_RATIO`], and the poll
    /// interval is at least 1ms so the poll cannot spin.
    pub fn sanitized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.max_detach_per_tick = self.max_detach_per_tick.max(1);
        self.soft_fold_chunk = self.soft_fold_chunk.max(1);
        self.tokens_per_tick = self.tokens_per_tick.max(1);
        self.stream_poll_ms = self.stream_poll_ms.max(1);
        self.settle_poll_ms = self.settle_poll_ms.max(1);
        if !self.token_ratio.is_finite() || self.token_ratio < 0.0 {
            self.token_ratio = defaults::TOKEN_RATIO;
        }
        self.token_ratio = self.token_ratio.min(defaults::MAX_TOKEN_RATIO);
        if !self.reveal_threshold_px.is_finite() {
            self.reveal_threshold_px = defaults::REVEAL_THRESHOLD_PX;
        }
        self
    }
}
