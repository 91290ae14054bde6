use std::sync::{Arc, Mutex};

use serde_json::json;
use session_pacer::{
    CompleteOptions, EventKind, ManualClock, NewMessage, SegmentInput, SegmentStatus,
    SessionConfig, SessionController, SessionError, SessionEvent, SessionState,
};

fn segments(value: serde_json::Value) -> Vec<SegmentInput> {
    serde_json::from_value(value).unwrap()
}

fn controller_with(value: serde_json::Value) -> (SessionController, ManualClock) {
    let clock = ManualClock::default();
    let config = SessionConfig {
        session_id: Some("sess-test".into()),
        scenario_id: Some("scenario-a".into()),
        ..SessionConfig::with_segments(segments(value))
    };
    (
        SessionController::with_clock(config, Arc::new(clock.clone())),
        clock,
    )
}

fn record_events(controller: &SessionController) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let log = log.clone();
        controller.on(kind, move |event: &SessionEvent| {
            let label = match event.segment() {
                Some(changed) => format!("{}:{}", event.kind(), changed.segment.name),
                None => event.kind().to_string(),
            };
            log.lock().unwrap().push(label);
            Ok(())
        });
    }
    log
}

fn in_progress_count(controller: &SessionController) -> usize {
    controller
        .segments()
        .iter()
        .filter(|segment| segment.status == SegmentStatus::InProgress)
        .count()
}

#[test]
fn two_segment_walkthrough() {
    let (mut controller, clock) = controller_with(json!([
        { "name": "A", "duration": 2 },
        { "name": "B", "duration": 3 }
    ]));
    let events = record_events(&controller);

    assert!(controller.begin());
    let first = controller.advance().unwrap();
    assert_eq!(first.name, "A");
    assert_eq!(first.status, SegmentStatus::InProgress);

    clock.advance_secs(2);
    let closed = controller
        .complete_current_segment(CompleteOptions::default())
        .unwrap();
    assert_eq!(closed.name, "A");
    assert_eq!(closed.status, SegmentStatus::Completed);
    assert_eq!(closed.elapsed_ms, 2_000);
    assert_eq!(controller.current_segment().unwrap().name, "B");

    clock.advance_secs(3);
    assert!(controller.advance().is_none());
    assert_eq!(controller.state(), SessionState::Completed);

    let summary = controller.summary().unwrap();
    assert_eq!(summary.timing.segments.len(), 2);
    assert!(summary
        .timing
        .segments
        .iter()
        .all(|segment| segment.status == SegmentStatus::Completed));
    assert_eq!(summary.timing.total_planned_ms, 5_000);
    assert_eq!(summary.timing.total_elapsed_ms, 5_000);
    assert_eq!(summary.total_duration_ms, 5_000);

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "session:start",
            "segment:start:A",
            "segment:end:A",
            "segment:start:B",
            "segment:end:B",
            "summary",
            "session:finished",
        ]
    );
}

#[test]
fn at_most_one_segment_in_progress() {
    let (mut controller, _clock) = controller_with(json!([1, 2, 3, 4]));
    controller.begin();
    assert_eq!(in_progress_count(&controller), 0);

    controller.advance();
    assert_eq!(in_progress_count(&controller), 1);
    controller.complete_current_segment(CompleteOptions::stay());
    assert_eq!(in_progress_count(&controller), 0);
    controller.advance();
    assert_eq!(in_progress_count(&controller), 1);
    controller.complete_current_segment(CompleteOptions::interrupted());
    assert_eq!(in_progress_count(&controller), 1);
    controller.advance();
    assert_eq!(in_progress_count(&controller), 1);
    controller.advance();
    assert_eq!(in_progress_count(&controller), 0);
    assert_eq!(controller.state(), SessionState::Completed);
}

#[test]
fn elapsed_time_never_decreases() {
    let (mut controller, clock) = controller_with(json!([60, 60]));
    controller.begin();
    controller.advance();

    let mut last = 0;
    for step in 0..6 {
        clock.advance_ms(700);
        if step % 2 == 0 {
            controller.pause();
        } else {
            controller.resume();
        }
        let elapsed = controller.segments()[0].elapsed_ms;
        assert!(elapsed >= last);
        last = elapsed;
    }
    controller.complete_current_segment(CompleteOptions::default());
    assert!(controller.segments()[0].elapsed_ms >= last);
}

#[test]
fn finalize_is_idempotent() {
    let (mut controller, clock) = controller_with(json!([5]));
    controller.begin();
    controller.advance();
    let finished = controller.finish();
    clock.advance_secs(30);

    let again = controller.finish();
    let aborted = controller.exit_early("too late");
    assert!(Arc::ptr_eq(&finished, &again));
    assert!(Arc::ptr_eq(&finished, &aborted));
    assert_eq!(controller.state(), SessionState::Completed);
    assert_eq!(controller.exit_reason(), None);
}

#[test]
fn advance_chain_completes_every_segment() {
    let (mut controller, _clock) = controller_with(json!([1, { "name": "manual" }, 3]));
    controller.begin();
    for _ in 0..4 {
        controller.advance();
    }
    assert_eq!(controller.state(), SessionState::Completed);
    let summary = controller.summary().unwrap();
    assert_eq!(summary.timing.segments.len(), 3);
    assert!(summary
        .timing
        .segments
        .iter()
        .all(|segment| segment.status == SegmentStatus::Completed));
    assert_eq!(summary.timing.total_planned_ms, 4_000);
}

#[test]
fn reset_restores_pristine_segments() {
    let (mut controller, clock) = controller_with(json!([
        { "id": "intro", "name": "Intro", "duration": 10, "meta": { "prompt": "hi" } },
        20
    ]));
    let pristine = serde_json::to_value(controller.segments()).unwrap();

    controller.begin();
    controller.advance();
    clock.advance_secs(4);
    controller.record_message(NewMessage::user("hello")).unwrap();
    controller.pause();
    controller.advance();
    controller.exit_early("candidate-ended");

    controller.reset();
    assert_eq!(serde_json::to_value(controller.segments()).unwrap(), pristine);
    assert!(controller.chat_log().is_empty());
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(controller.summary().is_none());
    assert!(!controller.is_paused());
    assert_eq!(controller.current_segment_index(), None);

    assert!(controller.begin());
}

#[test]
fn exit_early_interrupts_active_segment() {
    let (mut controller, clock) = controller_with(json!([30, 30]));
    controller.begin();
    controller.advance();
    clock.advance_secs(12);

    let summary = controller.exit_early("network-lost");
    assert_eq!(summary.status, SessionState::Aborted);
    assert_eq!(summary.exit_reason.as_deref(), Some("network-lost"));
    assert_eq!(summary.timing.segments[0].status, SegmentStatus::Interrupted);
    assert_eq!(summary.timing.segments[0].elapsed_ms, 12_000);
    assert_eq!(summary.timing.segments[1].status, SegmentStatus::Pending);
    assert_eq!(summary.total_duration_ms, 12_000);
}

#[test]
fn paused_time_is_not_accrued() {
    let (mut controller, clock) = controller_with(json!([60]));
    let events = record_events(&controller);
    controller.begin();
    controller.advance();

    clock.advance_secs(5);
    assert!(controller.pause());
    assert!(!controller.pause());
    clock.advance_secs(100);
    assert!(controller.resume());
    clock.advance_secs(2);

    let closed = controller
        .complete_current_segment(CompleteOptions::stay())
        .unwrap();
    assert_eq!(closed.elapsed_ms, 7_000);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|label| label == "session:pause"));
}

#[test]
fn record_message_validates_and_assigns_ids() {
    let (mut controller, clock) = controller_with(json!([60]));
    assert_eq!(
        controller.record_message(NewMessage::new("", "hi")),
        Err(SessionError::MissingRole)
    );
    assert_eq!(
        controller.record_message(NewMessage::user("   ")),
        Err(SessionError::MissingContent)
    );

    let first = controller.record_message(NewMessage::user("hello")).unwrap();
    assert_eq!(first.id, "msg-1");
    clock.advance_secs(1);
    let second = controller
        .record_message(NewMessage::assistant("welcome").with_metadata("id", "custom-7"))
        .unwrap();
    assert_eq!(second.id, "custom-7");
    assert!(second.timestamp > first.timestamp);
    assert_eq!(controller.chat_log().len(), 2);
}

#[test]
fn failing_listener_does_not_break_the_session() {
    let (mut controller, _clock) = controller_with(json!([1]));
    let seen = Arc::new(Mutex::new(0));
    controller.on(EventKind::SessionStart, |_| anyhow::bail!("listener down"));
    let counter = seen.clone();
    controller.on(EventKind::SessionStart, move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    assert!(controller.begin());
    assert_eq!(controller.state(), SessionState::Running);
    assert_eq!(*seen.lock().unwrap(), 1);
}

#[test]
fn unsubscribed_listener_stops_receiving() {
    let (mut controller, _clock) = controller_with(json!([1, 1]));
    let count = Arc::new(Mutex::new(0));
    let counter = count.clone();
    let subscription = controller.on(EventKind::SegmentStart, move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    controller.begin();
    controller.advance();
    assert!(subscription.unsubscribe());
    controller.advance();
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn calls_out_of_order_are_ignored() {
    let (mut controller, _clock) = controller_with(json!([1]));
    assert!(controller.advance().is_none());
    assert!(controller
        .complete_current_segment(CompleteOptions::default())
        .is_none());
    assert!(!controller.pause());
    assert_eq!(controller.state(), SessionState::Idle);

    assert!(controller.begin());
    assert!(!controller.begin());
}

#[test]
fn generated_session_ids_are_unique() {
    let first = SessionController::new(SessionConfig::default());
    let second = SessionController::new(SessionConfig::default());
    assert!(first.session_id().starts_with("sess-"));
    assert_ne!(first.session_id(), second.session_id());
}

#[test]
fn bus_handle_subscribes_to_controller_events() {
    let (mut controller, _clock) = controller_with(json!([1]));
    let starts = Arc::new(Mutex::new(0));
    let counter = starts.clone();
    let subscription = controller.events().on(EventKind::SegmentStart, move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    assert_eq!(controller.events().listener_count(EventKind::SegmentStart), 1);

    controller.begin();
    controller.advance();
    assert_eq!(*starts.lock().unwrap(), 1);

    assert!(controller.off(EventKind::SegmentStart, subscription.id()));
    assert_eq!(controller.events().listener_count(EventKind::SegmentStart), 0);
}
