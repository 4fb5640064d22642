//! Step-sequence progress indicator driven by server progress descriptors.

use std::fmt;

use shared::domain::{ProgressDescriptor, MAX_PROGRESS};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Disabled,
    Enabled,
    Done,
}

impl StepState {
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepIndicator {
    pub label: String,
    pub state: StepState,
    /// Width of the step's bar, in percent.
    pub bar: u8,
}

/// Renderable snapshot of the indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub steps: Vec<StepIndicator>,
    pub terminal: StepState,
    pub errored: bool,
}

impl ProgressView {
    fn build(labels: &[String]) -> Self {
        Self {
            steps: labels
                .iter()
                .map(|label| StepIndicator {
                    label: label.clone(),
                    state: StepState::Disabled,
                    bar: 0,
                })
                .collect(),
            terminal: StepState::Disabled,
            errored: false,
        }
    }

    fn matches(&self, labels: &[String]) -> bool {
        self.steps.len() == labels.len()
            && self
                .steps
                .iter()
                .zip(labels)
                .all(|(step, label)| &step.label == label)
    }

    pub fn is_complete(&self) -> bool {
        self.terminal == StepState::Done
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub rebuilt: bool,
    pub completed: bool,
    pub error: Option<String>,
}

pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

#[derive(Default)]
pub struct ProgressTracker {
    view: Option<ProgressView>,
    reset_scheduled: bool,
    on_error: Option<ErrorCallback>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("view", &self.view)
            .field("reset_scheduled", &self.reset_scheduled)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_callback(on_error: impl FnMut(&str) + Send + 'static) -> Self {
        Self {
            on_error: Some(Box::new(on_error)),
            ..Self::default()
        }
    }

    pub fn view(&self) -> Option<&ProgressView> {
        self.view.as_ref()
    }

    /// Whether the next update starts from a fresh indicator.
    pub fn reset_scheduled(&self) -> bool {
        self.reset_scheduled
    }

    pub fn update(&mut self, descriptor: &ProgressDescriptor) -> ProgressUpdate {
        if std::mem::take(&mut self.reset_scheduled) {
            self.view = None;
        }

        let mut outcome = ProgressUpdate::default();
        if !self
            .view
            .as_ref()
            .is_some_and(|view| view.matches(&descriptor.steps))
        {
            debug!(steps = descriptor.steps.len(), "building progress indicator");
            outcome.rebuilt = true;
            self.view = None;
        }
        let view = self
            .view
            .get_or_insert_with(|| ProgressView::build(&descriptor.steps));

        if let Some(error) = descriptor.error_message() {
            view.errored = true;
            self.reset_scheduled = true;
            if let Some(on_error) = self.on_error.as_mut() {
                on_error(error);
            }
            outcome.error = Some(error.to_string());
            return outcome;
        }
        view.errored = false;

        let current = descriptor.current_index();
        if current.is_none() && descriptor.current_step.is_some() {
            warn!(
                current_step = ?descriptor.current_step,
                "progress current step is not one of its steps"
            );
        }

        let last = view.steps.len().checked_sub(1);
        view.terminal = StepState::Disabled;
        for (index, step) in view.steps.iter_mut().enumerate() {
            let (state, bar) = match current {
                Some(current) if index < current => (StepState::Done, MAX_PROGRESS),
                Some(current) if index == current => {
                    if Some(index) == last && descriptor.progress == MAX_PROGRESS {
                        (StepState::Done, descriptor.progress)
                    } else {
                        (StepState::Enabled, descriptor.progress)
                    }
                }
                _ => (StepState::Disabled, 0),
            };
            step.state = state;
            step.bar = bar;
        }

        if current.is_some() && current == last && descriptor.progress == MAX_PROGRESS {
            view.terminal = StepState::Done;
            self.reset_scheduled = true;
            outcome.completed = true;
        }
        outcome
    }
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
