//! Structured progress events emitted by the executor.
//!
//! The engine never prints; it hands every observable step to an injected
//! `Reporter`. The CLI renders these as colored terminal lines, tests collect
//! them for assertions.

use std::cell::RefCell;
use std::path::PathBuf;

/// One observable step of a build, dry-run, or clean pass.
#[derive(Debug, Clone)]
pub enum BuildEvent {
  /// A pass over a build file's DAG is starting.
  RunStarted { dir: PathBuf, steps: usize },
  /// An action is about to execute.
  ActionStarted {
    step: usize,
    total: usize,
    description: String,
  },
  /// A message printed by a callable action through its console handle.
  ActionOutput { text: String },
  /// All targets of a rule are up to date; its action is skipped.
  UpToDate {
    step: usize,
    total: usize,
    label: String,
  },
  /// A leaf source was visited.
  SourceChecked {
    step: usize,
    total: usize,
    label: String,
  },
  /// Dry-run: the action that would have executed.
  WouldRun {
    step: usize,
    total: usize,
    description: String,
  },
  /// Clean: a file target was deleted.
  Cleaned {
    step: usize,
    total: usize,
    path: PathBuf,
  },
  /// Clean: a file target could not be deleted; the pass continues.
  CleanFailed {
    step: usize,
    total: usize,
    path: PathBuf,
    error: String,
  },
}

/// Sink for build events. Injected into the executor.
pub trait Reporter {
  fn event(&self, event: BuildEvent);
}

/// Discards every event.
pub struct NullReporter;

impl Reporter for NullReporter {
  fn event(&self, _event: BuildEvent) {}
}

/// Collects events for inspection; used by tests.
#[derive(Default)]
pub struct RecordingReporter {
  events: RefCell<Vec<BuildEvent>>,
}

impl RecordingReporter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<BuildEvent> {
    self.events.borrow().clone()
  }

  /// The descriptions of actions that ran (or would run, in dry-run).
  pub fn actions(&self) -> Vec<String> {
    self
      .events
      .borrow()
      .iter()
      .filter_map(|e| match e {
        BuildEvent::ActionStarted { description, .. } | BuildEvent::WouldRun { description, .. } => {
          Some(description.clone())
        }
        _ => None,
      })
      .collect()
  }
}

impl Reporter for RecordingReporter {
  fn event(&self, event: BuildEvent) {
    self.events.borrow_mut().push(event);
  }
}
