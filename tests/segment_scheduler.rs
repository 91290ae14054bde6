use std::sync::Arc;

use serde_json::json;
use session_pacer::{ManualClock, SegmentInput, SegmentScheduler, TickOutcome};

fn scheduler(value: serde_json::Value) -> (SegmentScheduler, ManualClock) {
    let clock = ManualClock::default();
    let inputs: Vec<SegmentInput> = serde_json::from_value(value).unwrap();
    (
        SegmentScheduler::with_clock(&inputs, Arc::new(clock.clone())),
        clock,
    )
}

fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn one_second_ticks_run_the_plan_to_completion() {
    let (mut scheduler, clock) = scheduler(json!([2, { "name": "Design", "duration": 3 }]));
    assert!(scheduler.start());

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        clock.advance_secs(1);
        outcomes.push(scheduler.tick());
    }

    assert_eq!(outcomes[0], TickOutcome::Counted { remaining_secs: 1.0 });
    assert_eq!(
        outcomes[1],
        TickOutcome::Advanced {
            completed: 0,
            current: 1
        }
    );
    assert_eq!(outcomes[4], TickOutcome::Finished { completed: 1 });
    assert!(scheduler.is_complete());
    assert!(!scheduler.is_active());
    approx(scheduler.remaining_secs(), 0.0);
    approx(scheduler.total_elapsed_secs(), 5.0);
    approx(scheduler.overall_progress(), 1.0);

    clock.advance_secs(1);
    assert_eq!(scheduler.tick(), TickOutcome::Ignored);
}

#[test]
fn irregular_ticks_are_measured_from_the_clock() {
    let (mut scheduler, clock) = scheduler(json!([10]));
    scheduler.start();

    clock.advance_ms(250);
    scheduler.tick();
    clock.advance_ms(3_750);
    scheduler.tick();
    approx(scheduler.remaining_secs(), 6.0);
    approx(scheduler.total_elapsed_secs(), 4.0);
    approx(scheduler.segment_progress(), 0.4);

    // A tick with no time passed changes nothing.
    assert_eq!(scheduler.tick(), TickOutcome::Ignored);
}

#[test]
fn paused_interval_contributes_nothing() {
    let (mut scheduler, clock) = scheduler(json!([30]));
    scheduler.start();
    clock.advance_secs(5);
    scheduler.tick();

    assert!(scheduler.pause());
    clock.advance_secs(600);
    assert_eq!(scheduler.tick(), TickOutcome::Ignored);
    assert!(scheduler.resume());

    clock.advance_secs(1);
    scheduler.tick();
    approx(scheduler.remaining_secs(), 24.0);
    approx(scheduler.total_elapsed_secs(), 6.0);
}

#[test]
fn total_elapsed_is_capped_at_plan_length() {
    let (mut scheduler, clock) = scheduler(json!([1, 1]));
    scheduler.start();
    clock.advance_secs(50);
    scheduler.tick();
    approx(scheduler.total_elapsed_secs(), 2.0);
    assert_eq!(scheduler.current_segment_index(), 1);
    approx(scheduler.remaining_secs(), 1.0);
}

#[test]
fn skip_moves_on_and_finishes() {
    let (mut scheduler, clock) = scheduler(json!([60, 60]));
    assert_eq!(scheduler.skip(), TickOutcome::Ignored);

    scheduler.start();
    clock.advance_secs(10);
    scheduler.tick();
    assert_eq!(
        scheduler.skip(),
        TickOutcome::Advanced {
            completed: 0,
            current: 1
        }
    );
    approx(scheduler.remaining_secs(), 60.0);
    assert_eq!(scheduler.skip(), TickOutcome::Finished { completed: 1 });
    assert!(scheduler.is_complete());
    approx(scheduler.total_elapsed_secs(), 120.0);
}

#[test]
fn reset_and_replan_discard_progress() {
    let (mut scheduler, clock) = scheduler(json!([5, 5]));
    scheduler.start();
    clock.advance_secs(7);
    scheduler.tick();

    scheduler.reset();
    let snapshot = scheduler.snapshot();
    assert!(!snapshot.is_active);
    assert!(snapshot.is_paused);
    assert!(!snapshot.is_complete);
    assert_eq!(snapshot.current_segment_index, 0);
    approx(snapshot.remaining_seconds, 5.0);
    approx(snapshot.total_elapsed_seconds, 0.0);

    scheduler.start();
    scheduler.set_segments(&[SegmentInput::named("Only", 8.0)]);
    let snapshot = scheduler.snapshot();
    assert!(!snapshot.is_active);
    assert_eq!(snapshot.segments.len(), 1);
    assert_eq!(snapshot.current_segment.unwrap().name, "Only");
    approx(snapshot.total_duration_seconds, 8.0);
}

#[test]
fn empty_plan_cannot_start() {
    let (mut scheduler, _clock) = scheduler(json!([0, -1, { "name": "manual" }]));
    assert!(scheduler.segments().is_empty());
    assert!(!scheduler.start());
    assert!(scheduler.is_complete());
    assert_eq!(scheduler.snapshot().current_segment, None);
}

#[test]
fn snapshot_serializes_camel_case() {
    let (scheduler, _clock) = scheduler(json!([{ "id": "warmup", "duration": 90 }]));
    let value = serde_json::to_value(scheduler.snapshot()).unwrap();
    assert_eq!(value["currentSegmentIndex"], 0);
    assert_eq!(value["remainingSeconds"], 90.0);
    assert_eq!(value["segments"][0]["id"], "warmup");
    assert_eq!(value["segments"][0]["durationSecs"], 90.0);
    assert_eq!(value["isPaused"], true);
}
