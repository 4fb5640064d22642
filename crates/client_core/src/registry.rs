//! Ordered mirror of the server's worker → runnable hierarchy.
//!
//! Every mutation returns the [`RegistryChange`]s a renderer must apply to keep
//! its visual order identical to the registry's. Operations on absent targets
//! are silent no-ops: events may race local state.

use shared::{
    domain::{RunnableInfo, RunnableStatus, WorkerInfo},
    protocol::{InboundMessage, OutboundMessage, RunnableRef},
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runnable {
    name: String,
    description: String,
    status: RunnableStatus,
    web_homepage: Option<String>,
}

impl Runnable {
    fn from_info(info: RunnableInfo) -> Self {
        Self {
            name: info.name,
            description: info.description,
            status: info.status,
            web_homepage: info.web_homepage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> RunnableStatus {
        self.status
    }

    pub fn web_homepage(&self) -> Option<&str> {
        self.web_homepage.as_deref()
    }

    pub fn toggle_class(&self) -> &'static str {
        self.status.toggle_class()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    name: String,
    runnables: Vec<Runnable>,
}

impl Worker {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runnables(&self) -> &[Runnable] {
        &self.runnables
    }

    pub fn runnable(&self, name: &str) -> Option<&Runnable> {
        self.runnables.iter().find(|runnable| runnable.name == name)
    }

    pub fn runnable_count(&self) -> usize {
        self.runnables.len()
    }

    /// Command asking the server to flip `name`'s status.
    pub fn toggle_message(&self, name: &str) -> Option<OutboundMessage> {
        self.runnable(name)
            .map(|runnable| OutboundMessage::toggle_runnable(&self.name, name, runnable.status))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    WorkerInserted {
        index: usize,
        name: String,
    },
    WorkerRemoved {
        index: usize,
        name: String,
    },
    RunnableInserted {
        worker: String,
        index: usize,
        runnable: Runnable,
    },
    RunnableRemoved {
        worker: String,
        index: usize,
        name: String,
    },
    RunnableStatusChanged {
        worker: String,
        name: String,
        status: RunnableStatus,
    },
    /// Worker name labels are only worth showing when several workers exist.
    WorkerCountChanged {
        count: usize,
        show_worker_names: bool,
    },
}

trait Named {
    fn key(&self) -> &str;
}

impl Named for Worker {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Named for Runnable {
    fn key(&self) -> &str {
        &self.name
    }
}

/// Position before the entity with the smallest name greater than `name`,
/// or the end when there is none.
fn insertion_index<T: Named>(items: &[T], name: &str) -> usize {
    items
        .iter()
        .position(|item| item.key() > name)
        .unwrap_or(items.len())
}

fn find<T: Named>(items: &[T], name: &str) -> Option<usize> {
    items.iter().position(|item| item.key() == name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    workers: Vec<Worker>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn worker(&self, name: &str) -> Option<&Worker> {
        find(&self.workers, name).map(|index| &self.workers[index])
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn worker_names(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(|worker| worker.name.as_str())
    }

    pub fn add_worker(&mut self, info: WorkerInfo) -> Vec<RegistryChange> {
        if find(&self.workers, &info.name).is_some() {
            debug!(worker = %info.name, "worker already registered");
            return Vec::new();
        }

        let index = insertion_index(&self.workers, &info.name);
        self.workers.insert(
            index,
            Worker {
                name: info.name.clone(),
                runnables: Vec::with_capacity(info.abilities.len()),
            },
        );

        let mut changes = vec![RegistryChange::WorkerInserted {
            index,
            name: info.name,
        }];
        for runnable in info.abilities {
            changes.extend(self.insert_runnable(index, runnable));
        }
        changes.push(self.count_changed());
        changes
    }

    pub fn remove_worker(&mut self, name: &str) -> Vec<RegistryChange> {
        let Some(index) = find(&self.workers, name) else {
            debug!(worker = %name, "ignoring removal of unknown worker");
            return Vec::new();
        };

        let worker = self.workers.remove(index);
        vec![
            RegistryChange::WorkerRemoved {
                index,
                name: worker.name,
            },
            self.count_changed(),
        ]
    }

    pub fn add_runnable(&mut self, worker: &str, info: RunnableInfo) -> Vec<RegistryChange> {
        let Some(worker_index) = find(&self.workers, worker) else {
            debug!(worker, runnable = %info.name, "ignoring runnable for unknown worker");
            return Vec::new();
        };
        self.insert_runnable(worker_index, info).into_iter().collect()
    }

    pub fn remove_runnable(&mut self, worker: &str, name: &str) -> Vec<RegistryChange> {
        let Some(worker_index) = find(&self.workers, worker) else {
            return Vec::new();
        };
        let runnables = &mut self.workers[worker_index].runnables;
        let Some(index) = find(runnables.as_slice(), name) else {
            debug!(worker, runnable = name, "ignoring removal of unknown runnable");
            return Vec::new();
        };

        let runnable = runnables.remove(index);
        vec![RegistryChange::RunnableRemoved {
            worker: worker.to_string(),
            index,
            name: runnable.name,
        }]
    }

    pub fn update_runnable_status(
        &mut self,
        worker: &str,
        name: &str,
        status: RunnableStatus,
    ) -> Vec<RegistryChange> {
        let Some(runnable) = find(&self.workers, worker).and_then(|worker_index| {
            self.workers[worker_index]
                .runnables
                .iter_mut()
                .find(|runnable| runnable.name == name)
        }) else {
            debug!(worker, runnable = name, "ignoring status of unknown runnable");
            return Vec::new();
        };

        if runnable.status == status {
            return Vec::new();
        }
        runnable.status = status;
        vec![RegistryChange::RunnableStatusChanged {
            worker: worker.to_string(),
            name: name.to_string(),
            status,
        }]
    }

    /// Drops every worker, last first, so reported indices stay valid.
    pub fn reset(&mut self) -> Vec<RegistryChange> {
        if self.workers.is_empty() {
            return Vec::new();
        }

        let mut changes = Vec::with_capacity(self.workers.len() + 1);
        while let Some(worker) = self.workers.pop() {
            changes.push(RegistryChange::WorkerRemoved {
                index: self.workers.len(),
                name: worker.name,
            });
        }
        changes.push(self.count_changed());
        changes
    }

    /// Applies a typed server message; names the registry does not own are ignored.
    pub fn apply(&mut self, message: &InboundMessage) -> Vec<RegistryChange> {
        match message {
            InboundMessage::UiWelcome(welcome) => welcome
                .workers
                .iter()
                .cloned()
                .flat_map(|worker| self.add_worker(worker))
                .collect(),
            InboundMessage::WorkerRegistered(worker) => self.add_worker(worker.clone()),
            InboundMessage::WorkerDisconnected { worker } => self.remove_worker(worker),
            InboundMessage::RunnableStarted(RunnableRef { worker, name }) => {
                self.update_runnable_status(worker, name, RunnableStatus::Running)
            }
            InboundMessage::RunnableStopped(RunnableRef { worker, name })
            | InboundMessage::RunnableCrashed(RunnableRef { worker, name }) => {
                self.update_runnable_status(worker, name, RunnableStatus::Stopped)
            }
            InboundMessage::Other => Vec::new(),
        }
    }

    fn insert_runnable(
        &mut self,
        worker_index: usize,
        info: RunnableInfo,
    ) -> Option<RegistryChange> {
        let worker = &mut self.workers[worker_index];
        if find(&worker.runnables, &info.name).is_some() {
            debug!(worker = %worker.name, runnable = %info.name, "runnable already registered");
            return None;
        }

        let runnable = Runnable::from_info(info);
        let index = insertion_index(&worker.runnables, &runnable.name);
        worker.runnables.insert(index, runnable.clone());
        Some(RegistryChange::RunnableInserted {
            worker: worker.name.clone(),
            index,
            runnable,
        })
    }

    fn count_changed(&self) -> RegistryChange {
        let count = self.workers.len();
        RegistryChange::WorkerCountChanged {
            count,
            show_worker_names: count > 1,
        }
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
