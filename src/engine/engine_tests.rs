//! Engine scenario tests against the in-memory page.

use super::*;
use crate::host::sim::SimPage;
use crate::host::{TurnFeed, Viewport};
use crate::model::{Marker, VisibilityState};

/// Five words per turn: four spaces, estimate 5 at the default ratio.
const WORDS: usize = 5;

fn config(mode: VisibilityMode) -> EngineConfig {
    EngineConfig::with_mode(mode)
}

fn booted_with(page: SimPage, config: EngineConfig) -> Engine<SimPage> {
    let mut engine = Engine::new(page, config);
    engine.boot();
    engine.advance_by(0);
    engine
}

fn booted(turns: usize, mode: VisibilityMode) -> (Engine<SimPage>, Vec<TurnId>) {
    let mut page = SimPage::new();
    let ids = page.push_turns(turns, WORDS, 100.0);
    (booted_with(page, config(mode)), ids)
}

fn label(engine: &Engine<SimPage>) -> &str {
    engine.host().label().unwrap_or_default()
}

fn start_streaming(engine: &mut Engine<SimPage>) {
    engine.host_mut().set_stop_control(true);
    engine.advance_by(engine.config().stream_poll_ms);
    assert!(engine.is_streaming());
}

// ===== Initial fold =====

#[test]
fn boot_detaches_oldest_beyond_batch() {
    let (engine, ids) = booted(20, VisibilityMode::Detach);

    assert_eq!(engine.detached_turns(), ids[..12].to_vec());
    assert_eq!(engine.host().turns(), ids[12..].to_vec());
    assert!(engine.host().marked(Marker::HardHidden).is_empty());
    assert!(engine.host().marked(Marker::CostDeferred).is_empty());
    assert_eq!(engine.total_count(), 20);
    assert_eq!(label(&engine), "Show 12 older [T:// 40]");
}

#[test]
fn label_shows_ellipsis_until_estimate_completes() {
    let mut page = SimPage::new();
    page.push_turns(20, WORDS, 100.0);
    let mut engine = Engine::new(page, config(VisibilityMode::Detach));

    engine.boot();
    assert_eq!(label(&engine), "Show 12 older [T:// …]");

    engine.advance_by(0);
    assert_eq!(engine.estimates().visible, Some(40));
}

#[test]
fn fewer_turns_than_batch_hides_nothing() {
    let (engine, _) = booted(5, VisibilityMode::Detach);
    assert_eq!(engine.detached_count(), 0);
    assert_eq!(label(&engine), "Hide older (none) [T:// 25]");
}

#[test]
fn hide_mode_marks_head_without_detaching() {
    let (engine, ids) = booted(20, VisibilityMode::Hide);

    assert_eq!(engine.detached_count(), 0);
    assert!(engine.host().placeholders().is_empty());
    assert_eq!(engine.host().marked(Marker::HardHidden), ids[..12].to_vec());
    assert_eq!(
        engine.host().visibility(ids[12]),
        Some(VisibilityState::Rendered)
    );
    assert_eq!(label(&engine), "Show 12 older [T:// 40]");
}

#[test]
fn cost_deferred_mode_keeps_head_in_layout() {
    let (engine, ids) = booted(20, VisibilityMode::CostDeferredRender);

    assert_eq!(engine.host().marked(Marker::CostDeferred), ids[..12].to_vec());
    assert!(engine.host().marked(Marker::HardHidden).is_empty());
    assert_eq!(engine.host().content_height(), 2000.0);
}

#[test]
fn capped_detach_finishes_through_follow_up_passes() {
    let mut page = SimPage::new();
    let ids = page.push_turns(20, WORDS, 100.0);
    let cfg = EngineConfig {
        max_detach_per_tick: 5,
        ..config(VisibilityMode::Detach)
    };
    let mut engine = Engine::new(page, cfg);

    engine.boot();
    assert_eq!(engine.detached_count(), 5, "first pass is capped");

    engine.advance_by(0);
    assert_eq!(engine.detached_turns(), ids[..12].to_vec());
}

// ===== Idempotence =====

#[test]
fn unchanged_configuration_performs_no_mutations() {
    let (mut engine, _) = booted(20, VisibilityMode::Detach);
    let before = engine.host().mutation_count();

    engine.apply(false, false);
    engine.apply(true, false);
    assert_eq!(engine.host().mutation_count(), before);
}

#[test]
fn debounced_mutation_burst_runs_one_pass() {
    let (mut engine, _) = booted(20, VisibilityMode::Detach);
    // let the settle poll finish so only the debounce can trigger a pass
    engine.advance_by(engine.config().settle_poll_ms);

    for _ in 0..5 {
        engine.host_mut().push_turn("a b c", 100.0);
        engine.on_mutation();
        engine.advance_by(100);
    }
    assert_eq!(engine.detached_count(), 12, "no pass inside the window");

    engine.advance_by(250);
    assert_eq!(engine.detached_count(), 17);
    assert_eq!(engine.live_count(), 8);
}

// ===== Reveal =====

#[test]
fn reveal_grows_budget_by_one_batch() {
    let (mut engine, ids) = booted(20, VisibilityMode::Detach);

    engine.on_scroll();

    assert_eq!(engine.visible_budget(), 16);
    assert_eq!(engine.detached_count(), 4);
    assert_eq!(engine.host().turns(), ids[4..].to_vec());
}

#[test]
fn reveal_guard_blocks_until_next_frame() {
    let (mut engine, _) = booted(40, VisibilityMode::Detach);

    engine.reveal_more_up();
    engine.reveal_more_up();
    assert_eq!(engine.visible_budget(), 16);

    engine.advance_by(engine.config().frame_ms);
    engine.reveal_more_up();
    assert_eq!(engine.visible_budget(), 24);
}

#[test]
fn reveal_stops_at_total() {
    let (mut engine, _) = booted(20, VisibilityMode::Detach);
    let frame = engine.config().frame_ms;

    let mut budgets = Vec::new();
    for _ in 0..4 {
        engine.reveal_more_up();
        engine.advance_by(frame);
        budgets.push(engine.visible_budget());
    }
    assert_eq!(budgets, vec![16, 20, 20, 20]);
    assert_eq!(engine.detached_count(), 0);
}

#[test]
fn scroll_far_from_top_does_not_reveal() {
    let mut page = SimPage::with_scroll_container(600.0);
    page.push_turns(30, WORDS, 100.0);
    let mut engine = booted_with(page, config(VisibilityMode::Detach));
    engine.host_mut().set_offset(200.0);

    engine.on_scroll();
    assert_eq!(engine.visible_budget(), 8);
}

#[test]
fn reveal_keeps_anchor_in_place() {
    let mut page = SimPage::with_scroll_container(600.0);
    let ids = page.push_turns(20, WORDS, 100.0);
    let mut engine = booted_with(page, config(VisibilityMode::Detach));
    assert!(engine.scroll_target().container().is_some());

    engine.host_mut().set_offset(50.0);
    let before = engine.host().turn_rect(ids[12]).map(|r| r.top);
    assert_eq!(before, Some(-50.0));

    engine.on_scroll();

    assert_eq!(engine.detached_count(), 4);
    assert_eq!(engine.host().turn_rect(ids[12]).map(|r| r.top), before);
}

#[test]
fn evicted_placeholder_is_dropped_on_reveal() {
    let (mut engine, ids) = booted(20, VisibilityMode::Detach);
    let newest = engine.store.records()[11].placeholder;
    assert!(engine.host_mut().evict_placeholder(newest));

    engine.reveal_more_up();

    assert_eq!(engine.detached_count(), 4);
    assert_eq!(engine.live_count(), 15);
    assert!(!engine.host().is_connected(ids[11]));
}

// ===== Toggle =====

#[test]
fn toggle_expands_everything_and_collapses_to_batch() {
    let (mut engine, ids) = booted(20, VisibilityMode::Detach);
    engine.reveal_more_up();
    engine.advance_by(16);

    engine.toggle();
    assert!(engine.expanded());
    assert_eq!(engine.host().turns(), ids);
    engine.advance_by(0);
    assert_eq!(label(&engine), "Show only last 8 [T:// 100]");

    engine.toggle();
    assert_eq!(engine.visible_budget(), 8);
    assert_eq!(engine.detached_count(), 12);
    engine.advance_by(engine.config().frame_ms);
    let bottom = engine.host().scroll_height(ScrollTarget::Window) - engine.host().viewport_height();
    assert_eq!(engine.host().offset(), bottom);
}

#[test]
fn scroll_while_expanded_is_ignored() {
    let (mut engine, _) = booted(20, VisibilityMode::Hide);
    engine.toggle();
    engine.on_scroll();
    assert_eq!(engine.visible_budget(), 8);
}

// ===== Streaming =====

#[test]
fn streaming_soft_folds_instead_of_detaching() {
    let (mut engine, ids) = booted(20, VisibilityMode::Detach);
    engine.reveal_more_up();
    engine.advance_by(16);
    assert_eq!(engine.detached_count(), 4);

    start_streaming(&mut engine);
    let fresh = engine.host_mut().push_turn("streamed reply text", 100.0);
    engine.on_mutation();
    engine.advance_by(1_000);

    assert_eq!(engine.detached_turns(), ids[..4].to_vec(), "nothing restored");
    assert_eq!(engine.host().placeholders().len(), 4, "nothing detached");
    assert!(engine.host().marked(Marker::HardHidden).is_empty());
    assert_eq!(engine.host().marked(Marker::CostDeferred), vec![ids[4]]);
    assert_eq!(
        engine.host().visibility(fresh),
        Some(VisibilityState::Rendered)
    );
}

#[test]
fn streaming_end_runs_full_pass_after_cooldown() {
    let (mut engine, ids) = booted(20, VisibilityMode::Detach);
    engine.reveal_more_up();
    engine.advance_by(16);
    start_streaming(&mut engine);
    engine.host_mut().push_turn("streamed reply", 100.0);
    engine.on_mutation();
    engine.advance_by(1_000);

    engine.host_mut().set_stop_control(false);
    engine.advance_by(engine.config().stream_poll_ms);
    assert!(matches!(engine.stream_state(), GateState::CoolingDown { .. }));
    assert_eq!(engine.detached_count(), 4);

    engine.advance_by(engine.config().stream_cooldown_ms);
    assert_eq!(engine.stream_state(), GateState::Idle);
    assert_eq!(engine.detached_turns(), ids[..5].to_vec());
    assert!(engine.host().marked(Marker::CostDeferred).is_empty());
    assert_eq!(engine.estimates().total, Some(5 * 20 + 1));
}

#[test]
fn stop_control_returning_cancels_cooldown() {
    let (mut engine, _) = booted(20, VisibilityMode::Detach);
    start_streaming(&mut engine);

    engine.host_mut().set_stop_control(false);
    engine.advance_by(300);
    engine.host_mut().set_stop_control(true);
    engine.advance_by(300);
    assert_eq!(engine.stream_state(), GateState::Streaming);

    engine.advance_by(2_000);
    assert_eq!(engine.stream_state(), GateState::Streaming);
}

#[test]
fn reveal_while_streaming_only_soft_folds() {
    let (mut engine, _) = booted(20, VisibilityMode::Detach);
    start_streaming(&mut engine);
    let before = engine.host().placeholders().len();

    engine.reveal_more_up();
    engine.advance_by(500);

    assert_eq!(engine.visible_budget(), 16);
    assert_eq!(engine.detached_count(), 12);
    assert_eq!(engine.host().placeholders().len(), before);
}

#[test]
fn expand_while_streaming_only_strips_markers() {
    let (mut engine, _) = booted(20, VisibilityMode::Hide);
    start_streaming(&mut engine);

    engine.toggle();
    assert!(engine.host().marked(Marker::HardHidden).is_empty());
    assert!(label(&engine).starts_with("Show only last 8"));
}

#[test]
fn collapse_while_streaming_never_hard_hides() {
    let (mut engine, _) = booted(20, VisibilityMode::Hide);
    engine.toggle();
    start_streaming(&mut engine);

    engine.toggle();
    engine.advance_by(500);

    assert!(engine.host().marked(Marker::HardHidden).is_empty());
    assert_eq!(engine.host().marked(Marker::CostDeferred).len(), 12);
}

#[test]
fn estimates_wait_for_streaming_to_end() {
    let (mut engine, _) = booted(20, VisibilityMode::Detach);
    start_streaming(&mut engine);

    engine.request_estimate(SizeSubset::Total);
    engine.advance_by(100);
    assert_eq!(engine.estimates().total, None);

    engine.host_mut().set_stop_control(false);
    engine.advance_by(1_000);
    assert_eq!(engine.estimates().total, Some(100));
}

#[test]
fn hide_mode_drops_soft_fold_markers_after_cooldown() {
    let (mut engine, ids) = booted(20, VisibilityMode::Hide);
    start_streaming(&mut engine);
    engine.advance_by(500);
    assert_eq!(engine.host().marked(Marker::CostDeferred), ids[..12].to_vec());
    assert!(engine.host().marked(Marker::HardHidden).is_empty());

    engine.host_mut().set_stop_control(false);
    engine.advance_by(2_000);

    assert_eq!(engine.stream_state(), GateState::Idle);
    assert_eq!(engine.host().marked(Marker::HardHidden), ids[..12].to_vec());
    assert!(engine.host().marked(Marker::CostDeferred).is_empty());
}

#[test]
fn stream_unsafe_config_never_restricts() {
    let mut page = SimPage::new();
    page.push_turns(20, WORDS, 100.0);
    let cfg = EngineConfig {
        stream_safe: false,
        ..config(VisibilityMode::Detach)
    };
    let mut engine = booted_with(page, cfg);
    start_streaming(&mut engine);

    engine.reveal_more_up();
    assert_eq!(engine.detached_count(), 4);
}

// ===== Estimates =====

#[test]
fn newest_turn_is_recomputed_after_it_grows() {
    let (mut engine, ids) = booted(10, VisibilityMode::Detach);
    assert_eq!(engine.estimates().visible, Some(40));

    engine.host_mut().append_text(ids[9], " three more words");
    engine.on_mutation();
    engine.advance_by(250);
    engine.request_estimate(SizeSubset::Visible);
    engine.advance_by(0);

    // 7 spaces * 1.3 = 9.1
    assert_eq!(engine.estimates().visible, Some(7 * 5 + 9));
}

#[test]
fn large_sums_finish_across_steps() {
    let (mut engine, _) = booted(120, VisibilityMode::Detach);
    engine.request_estimate(SizeSubset::Total);
    engine.advance_by(0);
    assert_eq!(engine.estimates().total, Some(600));
}

/// Run the next task due at the current instant.
fn step_due(engine: &mut Engine<SimPage>) -> Option<Task> {
    let task = engine.scheduler.pop_due(engine.now())?;
    engine.run(task);
    Some(task)
}

/// Queued size-estimate tasks, in run order.
fn queued_estimate_tasks(engine: &Engine<SimPage>) -> Vec<Task> {
    engine
        .scheduler
        .pending()
        .filter(|(_, task)| matches!(task, Task::EstimateJob | Task::EstimateStep))
        .map(|(_, task)| *task)
        .collect()
}

fn estimate_engine(turns: usize, tokens_per_tick: usize) -> Engine<SimPage> {
    let mut page = SimPage::new();
    page.push_turns(turns, WORDS, 100.0);
    let cfg = EngineConfig {
        tokens_per_tick,
        ..config(VisibilityMode::Detach)
    };
    Engine::new(page, cfg)
}

#[test]
fn estimate_job_runs_visible_then_total_one_chunk_per_task() {
    let mut engine = estimate_engine(60, 3);
    engine.request_estimate(SizeSubset::Visible);
    engine.request_estimate(SizeSubset::Total);
    assert_eq!(queued_estimate_tasks(&engine), vec![Task::EstimateJob]);

    // first chunk: 3 of the 8 visible turns
    assert_eq!(step_due(&mut engine), Some(Task::EstimateJob));
    assert_eq!(engine.estimates(), SizeEstimates::default());
    assert_eq!(queued_estimate_tasks(&engine), vec![Task::EstimateStep]);
    assert_eq!(engine.jobs.estimates.running.len(), 2);

    assert_eq!(step_due(&mut engine), Some(Task::EstimateStep));
    assert_eq!(engine.estimates().visible, None);
    assert_eq!(step_due(&mut engine), Some(Task::EstimateStep));
    assert_eq!(engine.estimates().visible, Some(40));
    assert_eq!(engine.estimates().total, None);

    let total = engine.jobs.estimates.running.front().map(|c| (c.subset(), c.remaining()));
    assert_eq!(total, Some((SizeSubset::Total, 60)), "total not started yet");

    // a request arriving mid-run is merged, not queued as a second job
    engine.request_estimate(SizeSubset::Visible);
    assert_eq!(queued_estimate_tasks(&engine), vec![Task::EstimateStep]);

    // 52 misses at 3 per chunk; the 8 visible turns are cache hits
    let mut chunks = 0;
    while engine.estimates().total.is_none() {
        assert_eq!(step_due(&mut engine), Some(Task::EstimateStep));
        chunks += 1;
    }
    assert_eq!(chunks, 18);
    assert_eq!(engine.estimates().total, Some(300));

    // exactly one rerun for the merged request
    assert_eq!(queued_estimate_tasks(&engine), vec![Task::EstimateJob]);
    assert_eq!(step_due(&mut engine), Some(Task::EstimateJob));
    assert_eq!(engine.estimates().visible, Some(40));
    assert!(queued_estimate_tasks(&engine).is_empty());
}

#[test]
fn estimate_job_stops_when_streaming_starts_mid_sum() {
    let mut engine = estimate_engine(60, 3);
    engine.request_estimate(SizeSubset::Visible);
    engine.request_estimate(SizeSubset::Total);
    assert_eq!(step_due(&mut engine), Some(Task::EstimateJob));

    engine.host_mut().set_stop_control(true);
    engine.recompute_gate();
    assert_eq!(engine.stream_state(), GateState::Streaming);

    assert_eq!(step_due(&mut engine), Some(Task::EstimateStep));
    assert!(engine.jobs.estimates.running.is_empty());
    assert!(engine.jobs.estimates.want_visible && engine.jobs.estimates.want_total);
    assert!(queued_estimate_tasks(&engine).is_empty());
    assert_eq!(engine.estimates(), SizeEstimates::default());

    engine.host_mut().set_stop_control(false);
    engine.recompute_gate();
    engine.advance_by(engine.config().stream_cooldown_ms);

    assert_eq!(engine.stream_state(), GateState::Idle);
    assert_eq!(engine.estimates().visible, Some(40));
    assert_eq!(engine.estimates().total, Some(300));
}

#[test]
fn oversized_ratio_is_capped_instead_of_overflowing() {
    let mut page = SimPage::new();
    page.push_turns(3, WORDS, 100.0);
    let cfg = EngineConfig {
        token_ratio: 1e30,
        ..config(VisibilityMode::Detach)
    };
    let mut engine = booted_with(page, cfg);
    engine.request_estimate(SizeSubset::Total);
    engine.advance_by(0);

    // 4 spaces per turn at the capped ratio of 1000
    assert_eq!(engine.estimates().total, Some(3 * 4_000));
}

// ===== Boot and reset =====

#[test]
fn observer_falls_back_to_document_root() {
    let mut page = SimPage::new();
    page.refuse_observe(true);
    let engine = booted_with(page, config(VisibilityMode::Detach));
    assert_eq!(engine.observed_root(), Some(RootId::DOCUMENT));
}

#[test]
fn missing_feed_root_observes_document() {
    let mut page = SimPage::new();
    page.set_feed_root(None);
    let engine = booted_with(page, config(VisibilityMode::Detach));
    assert_eq!(engine.observed_root(), Some(RootId::DOCUMENT));
}

#[test]
fn settle_poll_folds_late_turns_and_follows_root() {
    let mut engine = booted_with(SimPage::new(), config(VisibilityMode::Detach));
    assert_eq!(label(&engine), "Hide older (none) [T:// 0]");

    engine.host_mut().push_turns(12, WORDS, 100.0);
    engine.host_mut().set_feed_root(Some(RootId::new(7)));
    engine.advance_by(engine.config().settle_poll_ms);

    assert_eq!(engine.detached_count(), 4);
    assert_eq!(engine.observed_root(), Some(RootId::new(7)));
}

#[test]
fn reset_forgets_old_conversation() {
    let (mut engine, _) = booted(20, VisibilityMode::Detach);
    engine.reveal_more_up();
    engine.advance_by(16);

    engine.host_mut().clear_feed();
    let fresh = engine.host_mut().push_turns(10, WORDS, 100.0);
    engine.reset_for_new_conversation();

    assert_eq!(engine.visible_budget(), 8);
    assert!(!engine.expanded());
    assert_eq!(engine.detached_turns(), fresh[..2].to_vec());
    assert_eq!(engine.estimates(), SizeEstimates::default());
    assert_eq!(label(&engine), "Show 2 older [T:// …]");

    engine.advance_by(engine.config().frame_ms);
    assert_eq!(engine.estimates().visible, Some(40));
    assert_eq!(engine.host().offset(), 200.0);
}

#[test]
fn reset_clears_streaming_state() {
    let (mut engine, _) = booted(20, VisibilityMode::Detach);
    start_streaming(&mut engine);
    engine.host_mut().set_stop_control(false);

    engine.reset_for_new_conversation();
    assert_eq!(engine.stream_state(), GateState::Idle);
}

#[test]
fn snapshot_reports_counts_and_label() {
    let (engine, _) = booted(20, VisibilityMode::Detach);
    let snapshot = engine.snapshot();

    assert_eq!(snapshot.visible, 8);
    assert_eq!(snapshot.total, 20);
    assert_eq!(snapshot.detached, 12);
    assert_eq!(snapshot.estimate, Some(40));
    assert_eq!(snapshot.label, label(&engine));

    let json = serde_json::to_value(&snapshot).expect("serializes");
    assert_eq!(json["mode"], "detach");
    assert_eq!(json["stream"]["state"], "idle");
}
