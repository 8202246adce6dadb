//! The virtualization engine.
//!
//! [`Engine`] owns the host page and every piece of windowing state. Host
//! events come in through `on_*` methods; deferred work is queued on a
//! virtual clock and runs when the embedder advances it with
//! [`Engine::advance_by`] or [`Engine::advance_to`].
//!
//! # Data flow
//!
//! mutation → debounce → streaming gate → planner pass (or soft fold while
//! streaming) → size estimates → control label.
//!
//! The streaming gate is also polled on a fixed interval, since the stop
//! control can flip without any mutation under the observed root.

pub mod anchor;
pub mod badge;
pub mod metric_cache;
pub mod node_store;
pub mod planner;
pub mod stream_gate;

pub use anchor::{AnchorMark, ScrollAnchor};
pub use badge::{control_label, format_tokens};
pub use metric_cache::{MetricCache, SizeEstimates, SizeSubset, SumCursor, SumProgress};
pub use node_store::{DetachedRecord, NodeStore};
pub use planner::{AppliedWindow, DetachPass, Planner, SoftFold};
pub use stream_gate::{GateAction, GateState, StreamGate};

use crate::config::EngineConfig;
use crate::host::Host;
use crate::model::{RootId, ScrollTarget, TurnId, VisibilityMode};
use crate::scheduler::{Millis, Scheduler, TaskHandle};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Deferred engine work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    /// The mutation debounce window closed.
    MutationSettled,
    /// Periodic stop-control check.
    StreamPoll,
    /// The streaming cooldown ran out.
    CooldownElapsed,
    /// Delayed start of a soft fold.
    SoftFoldStart,
    /// Next chunk of a running soft fold.
    SoftFoldStep,
    /// A capped detach pass needs another round.
    FollowUpApply,
    /// Start the queued size-estimate job.
    EstimateJob,
    /// Next chunk of the running size-estimate job.
    EstimateStep,
    /// Post-boot settle poll.
    SettlePoll,
    /// Next frame after a reveal.
    ReleaseRevealGuard,
    /// Next frame after a collapse or reset.
    ScrollToBottom,
}

/// Size-estimate job bookkeeping.
#[derive(Debug, Default)]
struct EstimateJob {
    want_visible: bool,
    want_total: bool,
    queued: bool,
    running: VecDeque<SumCursor>,
}

impl EstimateJob {
    fn wants_any(&self) -> bool {
        self.want_visible || self.want_total
    }
}

/// Handles and flags of in-flight jobs.
#[derive(Debug, Default)]
struct Jobs {
    debounce: Option<TaskHandle>,
    cooldown: Option<TaskHandle>,
    settle_tries_left: u32,
    soft_fold_queued: bool,
    soft_fold: Option<SoftFold>,
    soft_fold_rerun: bool,
    estimates: EstimateJob,
    revealing: bool,
}

/// What the control surface is told after each pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    /// Engine clock.
    pub now_ms: u64,
    /// Turns meant to be visible.
    pub visible: usize,
    /// Live plus detached turns.
    pub total: usize,
    /// Turns attached to the document.
    pub live: usize,
    /// Turns held by the node store.
    pub detached: usize,
    /// Current visible budget.
    pub budget: usize,
    /// Whether everything is shown.
    pub expanded: bool,
    /// Visibility mode.
    pub mode: VisibilityMode,
    /// Streaming gate state.
    pub stream: GateState,
    /// Size estimate shown in the badge.
    pub estimate: Option<u64>,
    /// Control label text.
    pub label: String,
}

/// One virtualization engine bound to one host page.
#[derive(Debug)]
pub struct Engine<H: Host> {
    host: H,
    config: EngineConfig,
    scheduler: Scheduler<Task>,
    cache: MetricCache,
    store: NodeStore,
    anchor: ScrollAnchor,
    planner: Planner,
    gate: StreamGate,
    estimates: SizeEstimates,
    observed_root: Option<RootId>,
    jobs: Jobs,
}

impl<H: Host> Engine<H> {
    /// Engine over `host`. Nothing happens until [`Engine::boot`].
    pub fn new(host: H, config: EngineConfig) -> Self {
        let config = config.sanitized();
        Self {
            host,
            scheduler: Scheduler::new(),
            cache: MetricCache::new(config.token_ratio),
            store: NodeStore::new(config.max_detach_per_tick),
            anchor: ScrollAnchor::new(),
            planner: Planner::new(config.mode, config.batch_size),
            gate: StreamGate::new(config.stream_cooldown_ms),
            estimates: SizeEstimates::default(),
            observed_root: None,
            jobs: Jobs::default(),
            config,
        }
    }

    // ===== Accessors =====

    /// The host page.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host page, for driving it from outside (new turns, scrolling).
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Give the host page back.
    pub fn into_host(self) -> H {
        self.host
    }

    /// Effective configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Engine clock.
    pub fn now(&self) -> Millis {
        self.scheduler.now()
    }

    /// Current visible budget.
    pub fn visible_budget(&self) -> usize {
        self.planner.budget()
    }

    /// Whether everything is shown.
    pub fn expanded(&self) -> bool {
        self.planner.expanded()
    }

    /// Turns attached to the document.
    pub fn live_count(&self) -> usize {
        self.host.turns().len()
    }

    /// Turns held by the node store.
    pub fn detached_count(&self) -> usize {
        self.store.len()
    }

    /// Live plus detached turns.
    pub fn total_count(&self) -> usize {
        self.live_count() + self.detached_count()
    }

    /// Detached turns, oldest first.
    pub fn detached_turns(&self) -> Vec<TurnId> {
        self.store.detached_turns().collect()
    }

    /// Streaming gate state.
    pub fn stream_state(&self) -> GateState {
        self.gate.state()
    }

    /// Whether the gate reports streaming (including cooldown).
    pub fn is_streaming(&self) -> bool {
        self.gate.is_streaming()
    }

    /// Last completed size estimates.
    pub fn estimates(&self) -> SizeEstimates {
        self.estimates
    }

    /// Last applied window configuration.
    pub fn applied_window(&self) -> Option<AppliedWindow> {
        self.planner.applied()
    }

    /// Root the mutation observer is attached to.
    pub fn observed_root(&self) -> Option<RootId> {
        self.observed_root
    }

    /// Scroll target in use.
    pub fn scroll_target(&self) -> ScrollTarget {
        self.anchor.target()
    }

    /// Number of queued tasks.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// Current counts, estimate and label.
    pub fn snapshot(&self) -> EngineSnapshot {
        let live = self.live_count();
        let window = self.planner.target(live, self.store.len());
        let estimate = self.badge_estimate();
        EngineSnapshot {
            now_ms: self.now().get(),
            visible: window.desired,
            total: window.total,
            live,
            detached: self.store.len(),
            budget: self.planner.budget(),
            expanded: window.expanded,
            mode: window.mode,
            stream: self.gate.state(),
            estimate,
            label: control_label(window.expanded, self.planner.batch(), window.hidden(), estimate),
        }
    }

    /// Streaming restricts the planner to the soft path.
    fn restricted(&self) -> bool {
        self.config.stream_safe && self.gate.is_streaming()
    }

    fn badge_estimate(&self) -> Option<u64> {
        self.estimates
            .get(badge::badge_subset(self.planner.expanded()))
    }

    // ===== Lifecycle =====

    /// Attach the observer, fold the initial page and start the polls.
    pub fn boot(&mut self) {
        info!(mode = %self.config.mode, batch = self.config.batch_size, "engine boot");
        let root = self.host.feed_root();
        self.attach_observer(root);

        self.apply(false, true);
        self.request_estimate(SizeSubset::Visible);

        self.schedule_stream_poll();
        self.jobs.settle_tries_left = self.config.settle_poll_tries;
        if self.jobs.settle_tries_left > 0 {
            self.scheduler
                .schedule_in(self.config.settle_poll_ms, Task::SettlePoll);
        }
    }

    /// Start over for a different conversation.
    ///
    /// Detached turns belong to the old conversation and are forgotten,
    /// not restored.
    pub fn reset_for_new_conversation(&mut self) {
        info!(
            abandoned = self.store.len(),
            cached = self.cache.len(),
            "resetting for new conversation"
        );
        planner::clear_all_markers(&mut self.host);

        self.planner.reset();
        self.store.clear();
        self.anchor.forget_container();
        self.gate.reset();
        self.cache.clear();
        self.estimates = SizeEstimates::default();
        self.scheduler.clear();
        self.jobs = Jobs::default();

        let root = self.host.feed_root();
        self.attach_observer(root);

        self.apply(false, true);
        self.request_estimate(SizeSubset::Visible);
        self.scheduler
            .schedule_in(self.config.frame_ms, Task::ScrollToBottom);
        self.schedule_stream_poll();
    }

    fn attach_observer(&mut self, root: Option<RootId>) {
        let preferred = root.unwrap_or(RootId::DOCUMENT);
        match self.host.observe(preferred) {
            Ok(()) => self.observed_root = Some(preferred),
            Err(err) => {
                warn!(error = %err, "observer attach failed, observing document");
                match self.host.observe(RootId::DOCUMENT) {
                    Ok(()) => self.observed_root = Some(RootId::DOCUMENT),
                    Err(err) => {
                        warn!(error = %err, "document observer attach failed");
                        self.observed_root = None;
                    }
                }
            }
        }
        debug!(root = ?self.observed_root, "observer attached");
    }

    // ===== Host events =====

    /// A structural mutation happened under the observed root.
    ///
    /// Bursts collapse into one pass after the debounce window.
    pub fn on_mutation(&mut self) {
        if let Some(handle) = self.jobs.debounce.take() {
            self.scheduler.cancel(handle);
        }
        self.jobs.debounce = Some(
            self.scheduler
                .schedule_in(self.config.debounce_ms, Task::MutationSettled),
        );
    }

    /// The scroll target scrolled.
    pub fn on_scroll(&mut self) {
        if self.planner.expanded() {
            return;
        }
        if self.anchor.scroll_top(&self.host) <= self.config.reveal_threshold_px {
            self.reveal_more_up();
        }
    }

    /// The control was clicked.
    pub fn toggle(&mut self) {
        let expanded = self.planner.toggle_expanded();
        info!(expanded, streaming = self.gate.is_streaming(), "toggle");

        if expanded && self.restricted() {
            planner::clear_all_markers(&mut self.host);
            self.refresh_label();
            self.request_estimate(SizeSubset::Total);
            return;
        }
        if !expanded {
            self.scheduler
                .schedule_in(self.config.frame_ms, Task::ScrollToBottom);
        }
        self.apply(false, true);
    }

    /// Show one more batch of older turns above the window.
    pub fn reveal_more_up(&mut self) {
        if self.planner.expanded() || self.jobs.revealing {
            return;
        }
        let total = self.total_count();
        let Some(budget) = self.planner.grow_budget(total) else {
            return;
        };
        debug!(budget, total, "reveal");

        self.jobs.revealing = true;
        if self.restricted() {
            self.request_soft_fold();
            self.request_estimate(SizeSubset::Visible);
        } else {
            self.apply(true, true);
        }
        self.scheduler
            .schedule_in(self.config.frame_ms, Task::ReleaseRevealGuard);
    }

    // ===== Planner pass =====

    /// Bring the page in line with the current window.
    ///
    /// While streaming this only requests a soft fold. Otherwise it short-
    /// circuits when the configuration is unchanged and `force` is false.
    pub fn apply(&mut self, preserve_anchor: bool, force: bool) {
        if self.restricted() {
            self.request_soft_fold();
            self.refresh_label();
            return;
        }
        self.anchor.resolve(&mut self.host);

        let live = self.host.turns().len();
        let target = self.planner.target(live, self.store.len());
        if !force && self.planner.is_applied(&target) {
            self.refresh_label();
            return;
        }

        if target.expanded {
            planner::expand_all(&mut self.host, &mut self.store);
            self.planner.record(target);
            self.refresh_label();
            self.request_estimate(SizeSubset::Total);
            return;
        }

        let mark = if preserve_anchor {
            self.anchor.capture(&mut self.host)
        } else {
            None
        };

        match target.mode.out_of_window_marker() {
            None => {
                let pass = planner::apply_detach(&mut self.host, &mut self.store, &target);
                match pass {
                    DetachPass::Complete => {}
                    DetachPass::FollowUp => {
                        self.scheduler.schedule_in(0, Task::FollowUpApply);
                    }
                    DetachPass::Stalled => {
                        warn!(desired = target.desired, "host refused to detach any turn");
                    }
                }
            }
            Some(marker) => planner::apply_markers(&mut self.host, &target, marker),
        }

        if let Some(mark) = mark {
            self.anchor.correct(&mut self.host, &mark);
        }

        self.planner.record(target);
        self.refresh_label();
        self.request_estimate(SizeSubset::Visible);
    }

    fn refresh_label(&mut self) {
        let live = self.host.turns().len();
        let window = self.planner.target(live, self.store.len());
        let label = control_label(
            window.expanded,
            self.planner.batch(),
            window.hidden(),
            self.badge_estimate(),
        );
        self.host.set_control_label(&label);
    }

    // ===== Streaming =====

    fn recompute_gate(&mut self) {
        let hard = self.host.stop_control_visible();
        match self.gate.observe(hard, self.now()) {
            GateAction::Entered => self.request_soft_fold(),
            GateAction::Resumed => {
                if let Some(handle) = self.jobs.cooldown.take() {
                    self.scheduler.cancel(handle);
                }
            }
            GateAction::StartCooldown { deadline } => {
                self.jobs.cooldown =
                    Some(self.scheduler.schedule_at(deadline, Task::CooldownElapsed));
            }
            GateAction::None => {}
        }
    }

    fn schedule_stream_poll(&mut self) {
        self.scheduler
            .schedule_in(self.config.stream_poll_ms, Task::StreamPoll);
    }

    fn request_soft_fold(&mut self) {
        if !self.restricted() || self.jobs.soft_fold_queued {
            return;
        }
        if self.jobs.soft_fold.is_some() {
            self.jobs.soft_fold_rerun = true;
            return;
        }
        self.jobs.soft_fold_queued = true;
        self.scheduler
            .schedule_in(self.config.soft_fold_delay_ms, Task::SoftFoldStart);
    }

    fn start_soft_fold(&mut self) {
        self.jobs.soft_fold_queued = false;
        if !self.restricted() {
            return;
        }
        let live = self.host.turns().len();
        let window = self.planner.target(live, self.store.len());
        self.jobs.soft_fold = Some(SoftFold::start(&mut self.host, window.desired));
        self.step_soft_fold();
    }

    fn step_soft_fold(&mut self) {
        if !self.restricted() {
            debug!("streaming ended mid soft fold, dropping job");
            self.jobs.soft_fold = None;
            self.jobs.soft_fold_rerun = false;
            return;
        }
        let Some(job) = self.jobs.soft_fold.as_mut() else {
            return;
        };
        if !job.step(&mut self.host, self.config.soft_fold_chunk) {
            self.scheduler.schedule_in(0, Task::SoftFoldStep);
            return;
        }
        self.jobs.soft_fold = None;
        if std::mem::take(&mut self.jobs.soft_fold_rerun) {
            self.request_soft_fold();
        }
    }

    // ===== Size estimates =====

    /// Ask for `subset` to be recomputed.
    ///
    /// Requests made while a job is queued or running are merged into the
    /// next run.
    pub fn request_estimate(&mut self, subset: SizeSubset) {
        match subset {
            SizeSubset::Visible => self.jobs.estimates.want_visible = true,
            SizeSubset::Total => self.jobs.estimates.want_total = true,
        }
        let job = &self.jobs.estimates;
        if job.queued || !job.running.is_empty() {
            return;
        }
        self.jobs.estimates.queued = true;
        self.scheduler.schedule_in(0, Task::EstimateJob);
    }

    fn start_estimate_job(&mut self) {
        self.jobs.estimates.queued = false;
        if self.restricted() {
            debug!("streaming, size estimates deferred");
            return;
        }

        let mut all: Vec<TurnId> = self.store.detached_turns().collect();
        all.extend(self.host.turns());
        let desired =
            planner::desired_visible(all.len(), self.planner.budget(), self.planner.expanded());

        let job = &mut self.jobs.estimates;
        if std::mem::take(&mut job.want_visible) {
            let visible = all[all.len() - desired..].to_vec();
            job.running
                .push_back(SumCursor::new(SizeSubset::Visible, visible));
        }
        if std::mem::take(&mut job.want_total) {
            job.running.push_back(SumCursor::new(SizeSubset::Total, all));
        }
        self.step_estimate_job();
    }

    fn step_estimate_job(&mut self) {
        if self.restricted() {
            let job = &mut self.jobs.estimates;
            for cursor in job.running.drain(..) {
                match cursor.subset() {
                    SizeSubset::Visible => job.want_visible = true,
                    SizeSubset::Total => job.want_total = true,
                }
            }
            debug!("streaming started mid sum, size estimates deferred");
            return;
        }
        let Some(cursor) = self.jobs.estimates.running.front_mut() else {
            self.finish_estimate_job();
            return;
        };
        match cursor.step(&mut self.cache, &self.host, self.config.tokens_per_tick) {
            SumProgress::Pending => {
                self.scheduler.schedule_in(0, Task::EstimateStep);
            }
            SumProgress::Done(sum) => {
                let subset = cursor.subset();
                self.estimates.set(subset, sum);
                debug!(?subset, sum, "size estimate done");
                self.jobs.estimates.running.pop_front();
                if self.jobs.estimates.running.is_empty() {
                    self.finish_estimate_job();
                } else {
                    self.scheduler.schedule_in(0, Task::EstimateStep);
                }
            }
        }
    }

    fn finish_estimate_job(&mut self) {
        self.refresh_label();
        if self.jobs.estimates.wants_any() && !self.jobs.estimates.queued {
            self.jobs.estimates.queued = true;
            self.scheduler.schedule_in(0, Task::EstimateJob);
        }
    }

    // ===== Scheduled work =====

    /// Run every task due within the next `ms` milliseconds.
    pub fn advance_by(&mut self, ms: u64) {
        let until = self.now() + ms;
        self.advance_to(until);
    }

    /// Run every task due at or before `until`, then set the clock to it.
    pub fn advance_to(&mut self, until: Millis) {
        while let Some(task) = self.scheduler.pop_due(until) {
            self.run(task);
        }
        self.scheduler.advance_clock(until);
    }

    fn run(&mut self, task: Task) {
        match task {
            Task::MutationSettled => self.mutation_settled(),
            Task::StreamPoll => {
                self.recompute_gate();
                self.schedule_stream_poll();
            }
            Task::CooldownElapsed => {
                self.jobs.cooldown = None;
                if self.gate.cooldown_elapsed(self.now()) {
                    self.apply(true, true);
                    self.request_estimate(SizeSubset::Visible);
                    self.request_estimate(SizeSubset::Total);
                }
            }
            Task::SoftFoldStart => self.start_soft_fold(),
            Task::SoftFoldStep => self.step_soft_fold(),
            Task::FollowUpApply => self.apply(true, true),
            Task::EstimateJob => self.start_estimate_job(),
            Task::EstimateStep => self.step_estimate_job(),
            Task::SettlePoll => self.settle_poll(),
            Task::ReleaseRevealGuard => self.jobs.revealing = false,
            Task::ScrollToBottom => self.anchor.scroll_to_bottom(&mut self.host),
        }
    }

    fn mutation_settled(&mut self) {
        self.jobs.debounce = None;
        if let Some(&newest) = self.host.turns().last() {
            self.cache.invalidate(newest);
        }
        self.recompute_gate();

        if self.restricted() {
            self.request_soft_fold();
            self.refresh_label();
            return;
        }
        self.apply(false, false);
    }

    fn settle_poll(&mut self) {
        let root = self.host.feed_root();
        if root.is_some() && root != self.observed_root {
            self.attach_observer(root);
        }
        self.recompute_gate();
        if !self.gate.is_streaming() {
            self.apply(false, false);
        }

        self.jobs.settle_tries_left = self.jobs.settle_tries_left.saturating_sub(1);
        if !self.host.turns().is_empty() || self.jobs.settle_tries_left == 0 {
            debug!(tries_left = self.jobs.settle_tries_left, "settle poll done");
            return;
        }
        self.scheduler
            .schedule_in(self.config.settle_poll_ms, Task::SettlePoll);
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
