//! Execution: walking the DAG and running stale actions.
//!
//! The executor is single-threaded and synchronous. It walks the DAG in
//! post-order (deps strictly before dependents, roots in request order) and
//! decides per node whether the action must run. Builds abort at the first
//! failure; clean passes log deletion failures and keep going.

pub mod runner;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use mlua::Lua;
use petgraph::graph::NodeIndex;
use tracing::{debug, warn};

use crate::artifact::Artifact;
use crate::builder::{expand_template, Action};
use crate::error::EngineError;
use crate::lua::console;
use crate::registry::Project;
use crate::report::{BuildEvent, Reporter};
use crate::resolve::BuildGraph;
use crate::rule::Rule;

pub use runner::{CommandRunner, FakeRunner, ShellRunner};

/// What a pass over the DAG does at each stale node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// Execute actions for real.
  Build,
  /// Announce what would run; execute nothing, touch nothing.
  DryRun,
  /// Delete existing file targets; never invoke actions.
  Clean,
}

/// Counters for the caller's summary line.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
  /// Actions executed (or announced, in dry-run).
  pub executed: usize,
  /// Nodes visited.
  pub checked: usize,
  /// File targets deleted by a clean pass.
  pub cleaned: usize,
}

impl RunSummary {
  pub fn merge(self, other: RunSummary) -> RunSummary {
    RunSummary {
      executed: self.executed + other.executed,
      checked: self.checked + other.checked,
      cleaned: self.cleaned + other.cleaned,
    }
  }
}

/// Drives one pass over a resolved DAG.
pub struct Executor<'a> {
  runner: &'a dyn CommandRunner,
  reporter: &'a dyn Reporter,
  lua: Option<&'a Lua>,
}

impl<'a> Executor<'a> {
  pub fn new(runner: &'a dyn CommandRunner, reporter: &'a dyn Reporter) -> Self {
    Executor {
      runner,
      reporter,
      lua: None,
    }
  }

  /// Attach the Lua runtime so callable actions can be invoked.
  pub fn with_lua(mut self, lua: &'a Lua) -> Self {
    self.lua = Some(lua);
    self
  }

  /// Run one pass in the given mode.
  ///
  /// # Errors
  ///
  /// `BuilderFailure` (possibly wrapped in `SubBuildFailure`) aborts a build
  /// pass at the failing node; clean passes only report per-file failures
  /// through the reporter.
  pub fn run(&self, project: &Project, graph: &BuildGraph, mode: Mode) -> Result<RunSummary, EngineError> {
    let order = graph.post_order();
    self.reporter.event(BuildEvent::RunStarted {
      dir: project.root_dir().to_path_buf(),
      steps: order.len(),
    });

    match mode {
      Mode::Build | Mode::DryRun => self.build_pass(project, graph, &order, mode == Mode::DryRun),
      Mode::Clean => Ok(self.clean_pass(project, graph, &order)),
    }
  }

  fn build_pass(
    &self,
    project: &Project,
    graph: &BuildGraph,
    order: &[NodeIndex],
    dry_run: bool,
  ) -> Result<RunSummary, EngineError> {
    let total = order.len();
    let mut summary = RunSummary::default();
    // Whether each node's action ran (or would run) this invocation. A dep
    // that ran forces its dependents stale regardless of mtimes.
    let mut ran: HashMap<NodeIndex, bool> = HashMap::new();

    for (i, &idx) in order.iter().enumerate() {
      let step = i + 1;
      summary.checked += 1;
      let node = graph.node(idx);
      let dir = project.registry(node.registry).dir();

      let Some(rule) = &node.rule else {
        ran.insert(idx, false);
        self.reporter.event(BuildEvent::SourceChecked {
          step,
          total,
          label: node.artifact.display_from(dir),
        });
        continue;
      };

      let dep_ran = node.deps.iter().any(|d| ran.get(d).copied().unwrap_or(false));
      if !dep_ran && !rule_is_stale(rule) {
        ran.insert(idx, false);
        self.reporter.event(BuildEvent::UpToDate {
          step,
          total,
          label: rule.label(dir),
        });
        continue;
      }

      let description = rule.builder.describe(&rule.deps, &rule.targets, dir);
      if dry_run {
        self.reporter.event(BuildEvent::WouldRun {
          step,
          total,
          description,
        });
      } else {
        self.reporter.event(BuildEvent::ActionStarted {
          step,
          total,
          description,
        });
        self
          .apply(rule, dir)
          .map_err(|err| wrap_child_failure(project, node.registry, err))?;
      }
      ran.insert(idx, true);
      summary.executed += 1;
    }

    Ok(summary)
  }

  /// Run a rule's action, checking its inputs and outputs on disk.
  fn apply(&self, rule: &Rule, dir: &Path) -> Result<(), EngineError> {
    let label = rule.label(dir);

    // Deps must have been produced by now; a hole here means an earlier
    // action lied about its outputs.
    for dep in &rule.deps {
      if let Some(path) = dep.path() {
        if !path.exists() {
          return Err(EngineError::BuilderFailure {
            label,
            detail: format!("dependency {} does not exist", path.display()),
          });
        }
      }
    }

    match &rule.builder.action {
      Action::Template(template) => {
        let command = expand_template(template, &rule.deps, &rule.targets, dir);
        self.runner.run(&command, dir)?;
      }
      Action::Callable(function) => {
        let lua = self.lua.ok_or_else(|| EngineError::BuilderFailure {
          label: label.clone(),
          detail: "callable action invoked without a Lua runtime".to_string(),
        })?;
        console::invoke_callable(lua, function, rule, dir, self.reporter)?;
      }
    }

    // The action must leave its file targets behind.
    for target in &rule.targets {
      if let Some(path) = target.path() {
        if !path.exists() {
          return Err(EngineError::BuilderFailure {
            label,
            detail: format!("target {} was not created by the action", path.display()),
          });
        }
      }
    }
    Ok(())
  }

  /// Delete every existing file target reachable from the roots. Leaves and
  /// virtual targets are never touched; deletion failures are logged and the
  /// pass continues.
  fn clean_pass(&self, project: &Project, graph: &BuildGraph, order: &[NodeIndex]) -> RunSummary {
    let total = order.len();
    let mut summary = RunSummary::default();

    for (i, &idx) in order.iter().enumerate() {
      let step = i + 1;
      summary.checked += 1;
      let node = graph.node(idx);

      let Some(rule) = &node.rule else {
        continue;
      };

      for target in &rule.targets {
        let Some(path) = target.path() else {
          continue;
        };
        if !path.exists() {
          continue;
        }

        let removed = if path.is_dir() {
          fs::remove_dir_all(path)
        } else {
          fs::remove_file(path)
        };
        match removed {
          Ok(()) => {
            debug!(path = %path.display(), "cleaned target");
            summary.cleaned += 1;
            self.reporter.event(BuildEvent::Cleaned {
              step,
              total,
              path: path.to_path_buf(),
            });
          }
          Err(err) => {
            warn!(path = %path.display(), %err, "unable to clean target");
            self.reporter.event(BuildEvent::CleanFailed {
              step,
              total,
              path: path.to_path_buf(),
              error: err.to_string(),
            });
          }
        }
      }
    }

    summary
  }
}

/// The staleness predicate for a rule-bearing node.
///
/// Virtual targets have no mtime and are always stale. A file-targeted rule
/// is stale when a target is missing, or when any dep's effective mtime is
/// newer than the oldest existing target. A virtual dep's effective mtime is
/// newer than any file.
fn rule_is_stale(rule: &Rule) -> bool {
  if rule.targets.iter().any(Artifact::is_virtual) {
    return true;
  }

  let mut oldest: Option<SystemTime> = None;
  for target in &rule.targets {
    let path = target.path().expect("only file targets remain");
    match mtime(path) {
      None => return true,
      Some(m) => {
        oldest = Some(match oldest {
          Some(o) if o < m => o,
          _ => m,
        });
      }
    }
  }
  let oldest = oldest.expect("a rule has at least one target");

  for dep in &rule.deps {
    match dep.path() {
      None => return true,
      Some(path) => match mtime(path) {
        // A missing dep either gets rebuilt first or fails loudly later;
        // either way this node must run.
        None => return true,
        Some(m) if m > oldest => return true,
        Some(_) => {}
      },
    }
  }
  false
}

fn mtime(path: &Path) -> Option<SystemTime> {
  fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn wrap_child_failure(project: &Project, registry: usize, err: EngineError) -> EngineError {
  match project.registry(registry).parent() {
    Some(_) => EngineError::SubBuildFailure {
      dir: project.registry(registry).dir().to_path_buf(),
      source: Box::new(err),
    },
    None => err,
  }
}
