use std::sync::{Arc, Mutex};

use super::*;

fn states(tracker: &ProgressTracker) -> Vec<(StepState, u8)> {
    tracker
        .view()
        .expect("view")
        .steps
        .iter()
        .map(|step| (step.state, step.bar))
        .collect()
}

#[test]
fn first_update_builds_one_indicator_per_step() {
    let mut tracker = ProgressTracker::new();
    let outcome = tracker.update(&ProgressDescriptor::new(["prepare", "train", "export"]));

    assert!(outcome.rebuilt);
    let view = tracker.view().expect("view");
    let labels: Vec<&str> = view.steps.iter().map(|step| step.label.as_str()).collect();
    assert_eq!(labels, vec!["prepare", "train", "export"]);
    assert_eq!(view.terminal, StepState::Disabled);
}

#[test]
fn no_current_step_renders_all_disabled() {
    let mut tracker = ProgressTracker::new();
    tracker.update(&ProgressDescriptor::new(["a", "b"]));

    assert_eq!(
        states(&tracker),
        vec![(StepState::Disabled, 0), (StepState::Disabled, 0)]
    );
}

#[test]
fn steps_before_current_are_done_and_after_are_disabled() {
    let mut tracker = ProgressTracker::new();
    tracker.update(&ProgressDescriptor::new(["a", "b", "c"]).at("b", 40));

    assert_eq!(
        states(&tracker),
        vec![
            (StepState::Done, 100),
            (StepState::Enabled, 40),
            (StepState::Disabled, 0)
        ]
    );
    assert_eq!(tracker.view().expect("view").terminal, StepState::Disabled);
}

#[test]
fn matching_steps_are_patched_in_place() {
    let mut tracker = ProgressTracker::new();
    tracker.update(&ProgressDescriptor::new(["a", "b"]).at("a", 10));
    let outcome = tracker.update(&ProgressDescriptor::new(["a", "b"]).at("b", 20));

    assert!(!outcome.rebuilt);
    assert_eq!(
        states(&tracker),
        vec![(StepState::Done, 100), (StepState::Enabled, 20)]
    );
}

#[test]
fn moving_backwards_disables_later_steps() {
    let mut tracker = ProgressTracker::new();
    tracker.update(&ProgressDescriptor::new(["a", "b", "c"]).at("c", 50));
    tracker.update(&ProgressDescriptor::new(["a", "b", "c"]).at("a", 5));

    assert_eq!(
        states(&tracker),
        vec![
            (StepState::Enabled, 5),
            (StepState::Disabled, 0),
            (StepState::Disabled, 0)
        ]
    );
}

#[test]
fn completing_last_step_marks_everything_done_and_schedules_reset() {
    let mut tracker = ProgressTracker::new();
    let outcome = tracker.update(&ProgressDescriptor::new(["a", "b"]).at("b", 100));

    assert!(outcome.completed);
    assert_eq!(
        states(&tracker),
        vec![(StepState::Done, 100), (StepState::Done, 100)]
    );
    let view = tracker.view().expect("view");
    assert_eq!(view.terminal, StepState::Done);
    assert!(view.is_complete());
    assert!(tracker.reset_scheduled());

    let outcome = tracker.update(&ProgressDescriptor::new(["a", "b"]).at("a", 1));
    assert!(outcome.rebuilt);
    assert!(!tracker.reset_scheduled());
    assert_eq!(
        states(&tracker),
        vec![(StepState::Enabled, 1), (StepState::Disabled, 0)]
    );
}

#[test]
fn full_progress_on_intermediate_step_is_not_completion() {
    let mut tracker = ProgressTracker::new();
    let outcome = tracker.update(&ProgressDescriptor::new(["a", "b"]).at("a", 100));

    assert!(!outcome.completed);
    assert!(!tracker.reset_scheduled());
    assert_eq!(tracker.view().expect("view").steps[0].state, StepState::Enabled);
}

#[test]
fn error_invokes_callback_and_forces_rebuild() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut tracker = ProgressTracker::with_error_callback(move |error| {
        sink.lock().expect("lock").push(error.to_string());
    });

    tracker.update(&ProgressDescriptor::new(["a", "b"]).at("a", 30));
    let outcome = tracker.update(&ProgressDescriptor::new(["a", "b"]).failed("boom"));

    assert_eq!(outcome.error.as_deref(), Some("boom"));
    assert!(tracker.view().expect("view").errored);
    assert_eq!(*seen.lock().expect("lock"), vec!["boom".to_string()]);

    let outcome = tracker.update(&ProgressDescriptor::new(["a", "b"]).at("a", 0));
    assert!(outcome.rebuilt);
    assert!(!tracker.view().expect("view").errored);
}

#[test]
fn different_step_list_is_a_new_job() {
    let mut tracker = ProgressTracker::new();
    tracker.update(&ProgressDescriptor::new(["a", "b"]).at("b", 50));
    let outcome = tracker.update(&ProgressDescriptor::new(["x", "y", "z"]).at("x", 10));

    assert!(outcome.rebuilt);
    assert_eq!(tracker.view().expect("view").steps.len(), 3);
}

#[test]
fn unknown_current_step_renders_all_disabled() {
    let mut tracker = ProgressTracker::new();
    tracker.update(&ProgressDescriptor::new(["a", "b"]).at("zzz", 50));

    assert_eq!(
        states(&tracker),
        vec![(StepState::Disabled, 0), (StepState::Disabled, 0)]
    );
}

#[test]
fn class_names_match_indicator_states() {
    assert_eq!(StepState::Disabled.class_name(), "disabled");
    assert_eq!(StepState::Enabled.class_name(), "enabled");
    assert_eq!(StepState::Done.class_name(), "done");
}
