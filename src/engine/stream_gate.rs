//! Streaming detection state machine.
//!
//! The hard signal is a visible "stop generation" control. Its presence
//! forces `Streaming`; its disappearance starts a cooldown, and only when
//! the cooldown elapses uninterrupted does the gate go back to `Idle`.
//!
//! | state       | signal | next        | action            |
//! |-------------|--------|-------------|-------------------|
//! | Idle        | on     | Streaming   | `Entered`         |
//! | Idle        | off    | Idle        | `None`            |
//! | Streaming   | on     | Streaming   | `None`            |
//! | Streaming   | off    | CoolingDown | `StartCooldown`   |
//! | CoolingDown | on     | Streaming   | `Resumed`         |
//! | CoolingDown | off    | CoolingDown | `None`            |
//!
//! A cooldown timer firing in `CoolingDown` moves to `Idle`; firing in any
//! other state is stale and ignored.

use crate::scheduler::Millis;
use serde::Serialize;
use tracing::info;

/// Gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum GateState {
    /// No generation in progress.
    #[default]
    Idle,
    /// The stop control is visible.
    Streaming,
    /// The stop control went away; waiting out the cooldown.
    CoolingDown {
        /// When the cooldown elapses.
        deadline: Millis,
    },
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Nothing changed.
    None,
    /// Idle → Streaming: start soft folding.
    Entered,
    /// CoolingDown → Streaming: cancel the pending cooldown timer.
    Resumed,
    /// Streaming → CoolingDown: arm a timer for `deadline`.
    StartCooldown {
        /// When the timer must fire.
        deadline: Millis,
    },
}

/// Three-state streaming gate.
#[derive(Debug, Clone)]
pub struct StreamGate {
    state: GateState,
    cooldown_ms: u64,
}

impl StreamGate {
    /// Idle gate with the given cooldown.
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            state: GateState::Idle,
            cooldown_ms,
        }
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Streaming or cooling down. Work stays restricted until the cooldown
    /// has fully elapsed.
    pub fn is_streaming(&self) -> bool {
        !matches!(self.state, GateState::Idle)
    }

    /// Feed the current hard-signal reading.
    pub fn observe(&mut self, hard_signal: bool, now: Millis) -> GateAction {
        let (next, action) = match (self.state, hard_signal) {
            (GateState::Idle, true) => (GateState::Streaming, GateAction::Entered),
            (GateState::CoolingDown { .. }, true) => (GateState::Streaming, GateAction::Resumed),
            (GateState::Streaming, true) => (GateState::Streaming, GateAction::None),
            (GateState::Streaming, false) => {
                let deadline = now + self.cooldown_ms;
                (
                    GateState::CoolingDown { deadline },
                    GateAction::StartCooldown { deadline },
                )
            }
            (state @ (GateState::Idle | GateState::CoolingDown { .. }), false) => {
                (state, GateAction::None)
            }
        };
        if next != self.state {
            info!(from = ?self.state, to = ?next, %now, "stream gate transition");
        }
        self.state = next;
        action
    }

    /// The cooldown timer fired. Returns `true` if the gate went idle.
    pub fn cooldown_elapsed(&mut self, now: Millis) -> bool {
        match self.state {
            GateState::CoolingDown { .. } => {
                info!(%now, "streaming ended");
                self.state = GateState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Back to `Idle` without running any exit work.
    pub fn reset(&mut self) {
        self.state = GateState::Idle;
    }
}
