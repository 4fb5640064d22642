use shared::protocol::{names, WelcomeUi};

use super::*;

fn runnable(name: &str, status: RunnableStatus) -> RunnableInfo {
    RunnableInfo {
        name: name.to_string(),
        description: format!("{name} description"),
        status,
        web_homepage: None,
    }
}

fn worker(name: &str, runnables: &[&str]) -> WorkerInfo {
    WorkerInfo {
        name: name.to_string(),
        abilities: runnables
            .iter()
            .map(|name| runnable(name, RunnableStatus::Stopped))
            .collect(),
    }
}

fn names_of(registry: &Registry) -> Vec<&str> {
    registry.worker_names().collect()
}

#[test]
fn workers_are_kept_in_alphabetical_order() {
    let mut registry = Registry::new();
    for name in ["b", "a", "c"] {
        registry.add_worker(worker(name, &[]));
    }

    assert_eq!(names_of(&registry), vec!["a", "b", "c"]);
}

#[test]
fn insertion_reports_position_before_next_greater_name() {
    let mut registry = Registry::new();
    registry.add_worker(worker("alpha", &[]));
    registry.add_worker(worker("gamma", &[]));

    let changes = registry.add_worker(worker("beta", &[]));
    assert_eq!(
        changes,
        vec![
            RegistryChange::WorkerInserted {
                index: 1,
                name: "beta".into()
            },
            RegistryChange::WorkerCountChanged {
                count: 3,
                show_worker_names: true
            },
        ]
    );

    let changes = registry.add_worker(worker("zeta", &[]));
    assert_eq!(
        changes[0],
        RegistryChange::WorkerInserted {
            index: 3,
            name: "zeta".into()
        }
    );
}

#[test]
fn order_survives_interleaved_adds_and_removes() {
    let mut registry = Registry::new();
    for name in ["m", "c", "x", "a", "q"] {
        registry.add_worker(worker(name, &[]));
    }
    registry.remove_worker("c");
    registry.remove_worker("x");
    for name in ["b", "z", "n"] {
        registry.add_worker(worker(name, &[]));
    }

    let names = names_of(&registry);
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    assert_eq!(names, vec!["a", "b", "m", "n", "q", "z"]);
}

#[test]
fn adding_an_existing_worker_is_a_noop() {
    let mut registry = Registry::new();
    registry.add_worker(worker("w1", &["hearing"]));
    let before = registry.clone();

    assert!(registry.add_worker(worker("w1", &["speaking"])).is_empty());
    assert_eq!(registry, before);
}

#[test]
fn removing_an_unknown_worker_is_a_noop() {
    let mut registry = Registry::new();
    registry.add_worker(worker("w1", &[]));
    let before = registry.clone();

    assert!(registry.remove_worker("nope").is_empty());
    assert_eq!(registry, before);
}

#[test]
fn worker_is_seeded_with_sorted_runnables() {
    let mut registry = Registry::new();
    let changes = registry.add_worker(worker("w1", &["speaking", "hearing", "keyboarding"]));

    let runnables: Vec<&str> = registry
        .worker("w1")
        .expect("worker")
        .runnables()
        .iter()
        .map(Runnable::name)
        .collect();
    assert_eq!(runnables, vec!["hearing", "keyboarding", "speaking"]);

    let inserted: Vec<(usize, &str)> = changes
        .iter()
        .filter_map(|change| match change {
            RegistryChange::RunnableInserted {
                index, runnable, ..
            } => Some((*index, runnable.name())),
            _ => None,
        })
        .collect();
    assert_eq!(
        inserted,
        vec![(0, "speaking"), (0, "hearing"), (1, "keyboarding")]
    );
}

#[test]
fn status_update_mutates_in_place() {
    let mut registry = Registry::new();
    registry.add_worker(worker("w1", &["a", "b", "c"]));

    let changes = registry.update_runnable_status("w1", "b", RunnableStatus::Running);
    assert_eq!(
        changes,
        vec![RegistryChange::RunnableStatusChanged {
            worker: "w1".into(),
            name: "b".into(),
            status: RunnableStatus::Running,
        }]
    );

    let worker = registry.worker("w1").expect("worker");
    let b = &worker.runnables()[1];
    assert_eq!(b.name(), "b");
    assert_eq!(b.description(), "b description");
    assert_eq!(b.status(), RunnableStatus::Running);
    assert_eq!(b.toggle_class(), "on");
}

#[test]
fn status_update_on_missing_runnable_is_a_noop() {
    let mut registry = Registry::new();
    registry.add_worker(worker("w1", &["a"]));
    let before = registry.clone();

    assert!(registry
        .update_runnable_status("w1", "missing", RunnableStatus::Running)
        .is_empty());
    assert!(registry
        .update_runnable_status("missing", "a", RunnableStatus::Running)
        .is_empty());
    assert_eq!(registry, before);
}

#[test]
fn runnable_add_and_remove_are_idempotent() {
    let mut registry = Registry::new();
    registry.add_worker(worker("w1", &["b"]));

    let changes = registry.add_runnable("w1", runnable("a", RunnableStatus::Running));
    assert_eq!(changes.len(), 1);
    assert!(registry
        .add_runnable("w1", runnable("a", RunnableStatus::Stopped))
        .is_empty());
    assert!(registry
        .add_runnable("ghost", runnable("a", RunnableStatus::Stopped))
        .is_empty());

    assert_eq!(
        registry.remove_runnable("w1", "a"),
        vec![RegistryChange::RunnableRemoved {
            worker: "w1".into(),
            index: 0,
            name: "a".into(),
        }]
    );
    assert!(registry.remove_runnable("w1", "a").is_empty());
    assert_eq!(registry.worker("w1").expect("worker").runnable_count(), 1);
}

#[test]
fn worker_count_drives_name_visibility() {
    let mut registry = Registry::new();
    let count_changes = |changes: Vec<RegistryChange>| {
        changes
            .into_iter()
            .filter(|change| matches!(change, RegistryChange::WorkerCountChanged { .. }))
            .collect::<Vec<_>>()
    };

    assert_eq!(
        count_changes(registry.add_worker(worker("a", &[]))),
        vec![RegistryChange::WorkerCountChanged {
            count: 1,
            show_worker_names: false
        }]
    );
    assert_eq!(
        count_changes(registry.add_worker(worker("b", &[]))),
        vec![RegistryChange::WorkerCountChanged {
            count: 2,
            show_worker_names: true
        }]
    );
    assert_eq!(
        count_changes(registry.remove_worker("a")),
        vec![RegistryChange::WorkerCountChanged {
            count: 1,
            show_worker_names: false
        }]
    );
}

#[test]
fn reset_reports_removals_with_valid_indices() {
    let mut registry = Registry::new();
    for name in ["a", "b", "c"] {
        registry.add_worker(worker(name, &[]));
    }

    let changes = registry.reset();
    assert_eq!(
        changes,
        vec![
            RegistryChange::WorkerRemoved {
                index: 2,
                name: "c".into()
            },
            RegistryChange::WorkerRemoved {
                index: 1,
                name: "b".into()
            },
            RegistryChange::WorkerRemoved {
                index: 0,
                name: "a".into()
            },
            RegistryChange::WorkerCountChanged {
                count: 0,
                show_worker_names: false
            },
        ]
    );
    assert!(registry.reset().is_empty());
}

#[test]
fn apply_maps_server_messages() {
    let mut registry = Registry::new();
    registry.apply(&InboundMessage::UiWelcome(WelcomeUi {
        name: "ui-1".into(),
        workers: vec![worker("w2", &["x"]), worker("w1", &["y"])],
    }));
    assert_eq!(names_of(&registry), vec!["w1", "w2"]);

    registry.apply(&InboundMessage::RunnableStarted(RunnableRef {
        worker: "w2".into(),
        name: "x".into(),
    }));
    let status = |registry: &Registry| {
        registry
            .worker("w2")
            .and_then(|worker| worker.runnable("x"))
            .map(Runnable::status)
    };
    assert_eq!(status(&registry), Some(RunnableStatus::Running));

    registry.apply(&InboundMessage::RunnableCrashed(RunnableRef {
        worker: "w2".into(),
        name: "x".into(),
    }));
    assert_eq!(status(&registry), Some(RunnableStatus::Stopped));

    registry.apply(&InboundMessage::WorkerDisconnected {
        worker: "w1".into(),
    });
    assert_eq!(names_of(&registry), vec!["w2"]);
    assert!(registry.apply(&InboundMessage::Other).is_empty());
}

#[test]
fn toggle_message_targets_runnable_identity() {
    let mut registry = Registry::new();
    registry.add_worker(worker("w1", &["hearing"]));

    let message = registry
        .worker("w1")
        .and_then(|worker| worker.toggle_message("hearing"))
        .expect("toggle");
    assert_eq!(message.name, names::CMD_ABILITY_START);
    assert!(registry
        .worker("w1")
        .and_then(|worker| worker.toggle_message("missing"))
        .is_none());
}
