//! Virtual-clock work queue.
//!
//! Every deferred piece of engine work (debounce timers, polls, the streaming
//! cooldown, chunk continuations) is a task value queued at a deadline on this
//! clock. The host advances the clock; nothing runs on its own. Tasks due at
//! the same instant run in scheduling order, so a zero-delay continuation
//! always runs after work that was already queued for "now".
//!
//! # Invariants
//! - `now` never moves backwards
//! - a cancelled handle never yields its task
//! - handles are unique for the lifetime of a scheduler, across `clear()`

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;

/// Point on the engine clock, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Millis(u64);

impl Millis {
    /// Clock origin.
    pub const ZERO: Self = Self(0);

    /// Create from a raw millisecond count.
    pub const fn new(ms: u64) -> Self {
        Self(ms)
    }

    /// Raw millisecond count.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, saturating at 0.
    pub fn since(self, earlier: Millis) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<u64> for Millis {
    type Output = Millis;

    fn add(self, ms: u64) -> Millis {
        Millis(self.0.saturating_add(ms))
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Cancellable handle to a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    at: Millis,
    seq: u64,
}

impl TaskHandle {
    /// When the task is due.
    pub fn deadline(&self) -> Millis {
        self.at
    }
}

/// Deadline-ordered queue of tasks of type `T`.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now: Millis,
    next_seq: u64,
    queue: BTreeMap<(Millis, u64), T>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    /// Empty queue at time zero.
    pub fn new() -> Self {
        Self {
            now: Millis::ZERO,
            next_seq: 0,
            queue: BTreeMap::new(),
        }
    }

    /// Current clock value.
    pub fn now(&self) -> Millis {
        self.now
    }

    /// Queue `task` to run `delay_ms` after now.
    pub fn schedule_in(&mut self, delay_ms: u64, task: T) -> TaskHandle {
        self.schedule_at(self.now + delay_ms, task)
    }

    /// Queue `task` at an absolute deadline. Deadlines in the past run at
    /// the next opportunity.
    pub fn schedule_at(&mut self, at: Millis, task: T) -> TaskHandle {
        let at = at.max(self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((at, seq), task);
        TaskHandle { at, seq }
    }

    /// Remove a queued task. Returns it if it had not run yet.
    pub fn cancel(&mut self, handle: TaskHandle) -> Option<T> {
        self.queue.remove(&(handle.at, handle.seq))
    }

    /// Whether the task behind `handle` is still queued.
    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.queue.contains_key(&(handle.at, handle.seq))
    }

    /// Deadline of the earliest queued task.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Pop the earliest task due at or before `until`, moving the clock to
    /// its deadline.
    pub fn pop_due(&mut self, until: Millis) -> Option<T> {
        let key = *self.queue.keys().next()?;
        if key.0 > until {
            return None;
        }
        self.now = self.now.max(key.0);
        self.queue.remove(&key)
    }

    /// Move the clock forward without running anything.
    pub fn advance_clock(&mut self, to: Millis) {
        self.now = self.now.max(to);
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterate queued tasks in deadline order.
    pub fn pending(&self) -> impl Iterator<Item = (Millis, &T)> {
        self.queue.iter().map(|((at, _), task)| (*at, task))
    }

    /// Drop every queued task. The clock keeps its value.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
