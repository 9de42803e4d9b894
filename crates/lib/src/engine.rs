//! Top-level orchestration: evaluate, resolve, execute.

use std::path::Path;

use tracing::debug;

use crate::artifact::{Artifact, ArtifactKey};
use crate::error::EngineError;
use crate::eval;
use crate::execute::{CommandRunner, Executor, Mode, RunSummary};
use crate::registry::{Project, RegistryId};
use crate::report::Reporter;
use crate::resolve;

/// The build file name used when none is configured.
pub const DEFAULT_BUILD_FILE: &str = "ReMakeFile.lua";

/// What an invocation does with the resolved DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
  Build,
  DryRun,
  Clean,
  /// Clean, then build, over the same DAG.
  Rebuild,
}

/// Options for one engine invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
  pub config_file: String,
  pub mode: RunMode,
  /// Requested targets overriding the build file's own `AddTarget` set.
  /// Absolute paths are file targets; other strings match a virtual producer
  /// first and fall back to a file path relative to the invocation directory.
  pub targets: Vec<String>,
}

impl Default for RunOptions {
  fn default() -> Self {
    RunOptions {
      config_file: DEFAULT_BUILD_FILE.to_string(),
      mode: RunMode::Build,
      targets: Vec::new(),
    }
  }
}

/// Evaluate the build file in `dir` and run the requested pass.
///
/// # Errors
///
/// Any `EngineError`; the caller maps it to a non-zero exit code.
pub fn run_dir(
  dir: &Path,
  options: &RunOptions,
  runner: &dyn CommandRunner,
  reporter: &dyn Reporter,
) -> Result<RunSummary, EngineError> {
  let evaluated = eval::evaluate_dir(dir, &options.config_file)?;
  let mut project = evaluated.project;

  if !options.targets.is_empty() {
    project.roots = requested_roots(&project, &options.targets);
  }

  let lenient = options.mode == RunMode::DryRun;
  let graph = resolve::resolve(&project, lenient)?;
  debug!(nodes = graph.node_count(), roots = graph.roots().len(), "resolved dependency graph");

  let executor = Executor::new(runner, reporter).with_lua(&evaluated.lua);
  match options.mode {
    RunMode::Build => executor.run(&project, &graph, Mode::Build),
    RunMode::DryRun => executor.run(&project, &graph, Mode::DryRun),
    RunMode::Clean => executor.run(&project, &graph, Mode::Clean),
    RunMode::Rebuild => {
      let cleaned = executor.run(&project, &graph, Mode::Clean)?;
      let built = executor.run(&project, &graph, Mode::Build)?;
      Ok(cleaned.merge(built))
    }
  }
}

/// Coerce command-line target strings into requested roots.
fn requested_roots(project: &Project, targets: &[String]) -> Vec<(RegistryId, Artifact)> {
  targets
    .iter()
    .map(|raw| {
      let path = Path::new(raw);
      if path.is_absolute() {
        return (0, Artifact::file_target(path, project.root_dir()));
      }
      // A name some registry can produce virtually wins over a file guess.
      for registry in &project.registries {
        let key = ArtifactKey::Virtual(raw.clone());
        if registry.find_producer(&key).is_some() {
          return (registry.id(), Artifact::virtual_target(raw.clone()));
        }
      }
      (0, Artifact::file_target(raw, project.root_dir()))
    })
    .collect()
}
