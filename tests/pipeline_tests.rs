//! Model -> presentation/outline pipeline behavior.

mod helpers;

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use helpers::{PATIENCE, Published, ScriptedModel, open_session, test_config, wait_until};
use reparse_scheduler::scheduler::Interrupt;
use reparse_scheduler::{PipelineState, PipelineTask, SchedulerError};

/// Long enough that the debounced update never fires during a test.
const NEVER_MS: u64 = 60_000;

#[test]
fn test_successful_update_publishes_both_views() {
    let fixture = open_session("a {}", test_config(20));
    fixture.session.on_edit(4, 0, "\nb {}").unwrap();

    assert!(wait_until(PATIENCE, || {
        let stats = fixture.session.stats();
        stats.presentations_published == 1 && stats.outlines_published == 1
    }));

    let published = fixture.recorder.published();
    assert!(published.contains(&Published::Styling {
        range: 0..9,
        text: "a {}\nb {}".to_string(),
    }));
    assert!(published.contains(&Published::Outline {
        version: 1,
        cursor: None,
    }));
    assert!(wait_until(PATIENCE, || {
        fixture.session.pipeline_state() == PipelineState::Clean
    }));
}

#[test]
fn test_failed_update_keeps_edits_and_skips_views() {
    let fixture = open_session("", test_config(50));
    fixture.control.fail_next.store(1, Ordering::SeqCst);

    for (i, text) in ["a", "b", "c"].into_iter().enumerate() {
        fixture.session.on_edit(i, 0, text).unwrap();
    }
    assert!(wait_until(PATIENCE, || fixture.session.stats().failed_updates == 1));

    // Nothing consumed, nothing installed, nothing published.
    assert_eq!(fixture.session.pending_edit_count(), 3);
    assert_eq!(fixture.session.current_model().unwrap().version, 0);
    assert_eq!(fixture.session.pipeline_state(), PipelineState::Dirty);
    thread::sleep(Duration::from_millis(50));
    assert!(fixture.recorder.published().is_empty());

    // The next attempt sees the failed batch again, plus the new edit.
    fixture.session.on_edit(3, 0, "d").unwrap();
    assert!(wait_until(PATIENCE, || {
        fixture.session.stats().successful_updates == 1
    }));
    assert_eq!(
        fixture.control.batches(),
        vec![vec![1, 2, 3], vec![1, 2, 3, 4]]
    );
    assert_eq!(fixture.session.current_model().unwrap().text, "abcd");
    assert_eq!(fixture.session.pending_edit_count(), 0);
}

#[test]
fn test_force_update_brings_the_model_up_to_date() {
    let fixture = open_session("x", test_config(NEVER_MS));
    fixture.session.on_edit(1, 0, "yz").unwrap();
    fixture.session.on_edit(0, 1, "").unwrap();

    let started = Instant::now();
    let model = fixture.session.force_update_and_get().unwrap();
    assert!(started.elapsed() < PATIENCE);

    assert_eq!(model.text, "yz");
    assert_eq!(model.version, 1);
    assert_eq!(fixture.session.pending_edit_count(), 0);
    assert!(!fixture.session.is_pending(PipelineTask::ModelUpdate));
    assert_eq!(fixture.control.batches(), vec![vec![1, 2]]);
}

#[test]
fn test_force_update_without_pending_edits_returns_current_model() {
    let fixture = open_session("abc", test_config(NEVER_MS));
    let model = fixture.session.force_update_and_get().unwrap();

    assert_eq!(model.version, 0);
    assert_eq!(fixture.session.stats().successful_updates, 0);
    assert!(fixture.control.batches().is_empty());
}

#[test]
fn test_force_update_after_failed_update_returns_previous_model() {
    let fixture = open_session("", test_config(NEVER_MS));
    fixture.control.fail_next.store(1, Ordering::SeqCst);
    fixture.session.on_edit(0, 0, "a").unwrap();

    let model = fixture.session.force_update_and_get().unwrap();
    assert_eq!(model.version, 0);
    assert_eq!(fixture.session.pending_edit_count(), 1);
    assert_eq!(fixture.session.stats().failed_updates, 1);
}

#[test]
fn test_interrupted_force_update_returns_stale_model() {
    let fixture = open_session("", test_config(NEVER_MS));
    fixture.control.set_latency(Duration::from_millis(300));
    fixture.session.on_edit(0, 0, "a").unwrap();

    let interrupt = Interrupt::new();
    let trigger = {
        let interrupt = interrupt.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            interrupt.interrupt();
        })
    };

    let started = Instant::now();
    let model = fixture
        .session
        .force_update_and_get_interruptibly(&interrupt)
        .unwrap();
    trigger.join().unwrap();

    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(model.version, 0);
    assert!(interrupt.is_interrupted(), "interrupt status is preserved");

    // The update keeps running in the background.
    assert!(wait_until(PATIENCE, || {
        fixture.session.stats().successful_updates == 1
    }));
    assert_eq!(fixture.session.current_model().unwrap().version, 1);
}

#[test]
fn test_pre_interrupted_force_update_does_not_block() {
    let fixture = open_session("", test_config(NEVER_MS));
    fixture.control.set_latency(Duration::from_millis(300));
    fixture.session.on_edit(0, 0, "a").unwrap();

    let interrupt = Interrupt::new();
    interrupt.interrupt();
    let started = Instant::now();
    let model = fixture
        .session
        .force_update_and_get_interruptibly(&interrupt)
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(model.version, 0);
    assert!(interrupt.is_interrupted());
}

#[test]
fn test_force_update_timeout() {
    let fixture = open_session("", test_config(NEVER_MS));
    fixture.control.set_latency(Duration::from_millis(400));
    fixture.session.on_edit(0, 0, "a").unwrap();

    let model = fixture
        .session
        .force_update_and_get_timeout(Duration::from_millis(50))
        .unwrap();
    assert_eq!(model.version, 0);

    let model = fixture
        .session
        .force_update_and_get_timeout(PATIENCE)
        .unwrap();
    assert_eq!(model.version, 1);
}

#[test]
fn test_theme_change_republishes_styling_only() {
    let fixture = open_session("a {}", test_config(NEVER_MS));
    assert!(fixture.session.on_theme_changed());

    assert!(wait_until(PATIENCE, || {
        fixture.session.stats().presentations_published == 1
    }));
    thread::sleep(Duration::from_millis(50));

    let stats = fixture.session.stats();
    assert_eq!(stats.outlines_published, 0);
    assert_eq!(stats.successful_updates, 0);
    assert_eq!(fixture.recorder.stylings(), vec!["a {}".to_string()]);
}

#[test]
fn test_cursor_move_resyncs_outline_only() {
    let fixture = open_session("a {}", test_config(NEVER_MS));
    fixture.session.on_cursor_moved(2);
    fixture.session.on_cursor_moved(3);

    assert!(wait_until(PATIENCE, || {
        fixture.session.stats().outlines_published == 1
    }));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(fixture.recorder.outlines(), vec![(0, Some(3))]);
    assert_eq!(fixture.session.stats().presentations_published, 0);
}

#[test]
fn test_renderer_failure_does_not_stop_the_pipeline() {
    let fixture = open_session("", test_config(10));
    fixture.recorder.fail_styling.store(true, Ordering::SeqCst);
    fixture.session.on_edit(0, 0, "a").unwrap();

    assert!(wait_until(PATIENCE, || {
        fixture.session.stats().outlines_published == 1
    }));
    assert_eq!(fixture.session.stats().presentations_published, 0);
    assert_eq!(
        fixture.session.pipeline_state(),
        PipelineState::DownstreamStale
    );

    fixture.recorder.fail_styling.store(false, Ordering::SeqCst);
    fixture.session.on_theme_changed();
    assert!(wait_until(PATIENCE, || {
        fixture.session.pipeline_state() == PipelineState::Clean
    }));
    assert_eq!(fixture.recorder.stylings(), vec!["a".to_string()]);
}

#[test]
fn test_replace_input_discards_pending_edits() {
    let fixture = open_session("old", test_config(NEVER_MS));
    fixture.session.on_edit(3, 0, "er").unwrap();
    assert_eq!(fixture.session.pending_edit_count(), 1);

    fixture
        .session
        .replace_input("new", ScriptedModel::new("new", &fixture.control))
        .unwrap();

    assert_eq!(fixture.session.pending_edit_count(), 0);
    assert_eq!(&*fixture.session.text(), "new");
    assert_eq!(fixture.session.current_model().unwrap().text, "new");
    assert!(!fixture.session.is_pending(PipelineTask::ModelUpdate));

    assert!(wait_until(PATIENCE, || {
        fixture.session.pipeline_state() == PipelineState::Clean
    }));
    assert_eq!(fixture.recorder.stylings(), vec!["new".to_string()]);

    // Edits continue against the new text.
    fixture.session.on_edit(0, 1, "N").unwrap();
    let model = fixture.session.force_update_and_get().unwrap();
    assert_eq!(model.text, "New");
}

#[test]
fn test_replace_input_supersedes_update_in_flight() {
    let fixture = open_session("", test_config(1));
    fixture.control.set_latency(Duration::from_millis(200));
    fixture.session.on_edit(0, 0, "stale").unwrap();

    assert!(wait_until(PATIENCE, || {
        fixture.control.active.load(Ordering::SeqCst) == 1
    }));
    fixture
        .session
        .replace_input("fresh", ScriptedModel::new("fresh", &fixture.control))
        .unwrap();

    assert!(wait_until(PATIENCE, || {
        fixture.control.active.load(Ordering::SeqCst) == 0
            && fixture.session.pipeline_state() == PipelineState::Clean
    }));
    assert_eq!(fixture.session.current_model().unwrap().text, "fresh");
    assert_eq!(fixture.session.stats().successful_updates, 0);
}

#[test]
fn test_invalid_edit_is_rejected() {
    let fixture = open_session("abc", test_config(NEVER_MS));

    let err = fixture.session.on_edit(2, 5, "x").unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidEdit { .. }));
    assert_eq!(fixture.session.pending_edit_count(), 0);
    assert_eq!(&*fixture.session.text(), "abc");
    assert!(!fixture.session.is_pending(PipelineTask::ModelUpdate));
}

#[test]
fn test_pipeline_state_reports_dirty_then_clean() {
    let fixture = open_session("", test_config(NEVER_MS));
    assert_eq!(fixture.session.pipeline_state(), PipelineState::Clean);

    fixture.session.on_edit(0, 0, "a").unwrap();
    assert_eq!(fixture.session.pipeline_state(), PipelineState::Dirty);

    fixture.session.force_update_and_get();
    assert!(wait_until(PATIENCE, || {
        fixture.session.pipeline_state() == PipelineState::Clean
    }));
}
