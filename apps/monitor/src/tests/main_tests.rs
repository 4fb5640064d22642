use client_core::{ProgressTracker, StepState};
use shared::domain::ProgressDescriptor;

use super::*;

#[test]
fn parses_toggle_target() {
    assert_eq!(
        parse_target("w1/hearing").expect("target"),
        Target {
            worker: "w1".into(),
            runnable: "hearing".into(),
        }
    );
    assert!(parse_target("w1").is_err());
    assert!(parse_target("/hearing").is_err());
}

#[test]
fn args_accept_repeated_progress_names() {
    let args = Args::try_parse_from([
        "monitor",
        "--server-url",
        "http://10.0.0.2:4000",
        "--progress",
        "speech_to_text.build",
        "--progress",
        "speech_to_text.train",
        "--toggle",
        "w1/hearing",
    ])
    .expect("args");

    assert_eq!(args.server_url.as_deref(), Some("http://10.0.0.2:4000"));
    assert_eq!(args.progress.len(), 2);
    assert_eq!(args.toggle.map(|target| target.runnable).as_deref(), Some("hearing"));
}

#[test]
fn renders_progress_steps_and_terminal() {
    let mut tracker = ProgressTracker::new();
    tracker.update(&ProgressDescriptor::new(["build", "train"]).at("train", 25));
    let view = tracker.view().expect("view");

    assert_eq!(view.terminal, StepState::Disabled);
    assert_eq!(
        render_progress(view),
        "build[done 100%] train[enabled 25%] end[disabled]"
    );
}
