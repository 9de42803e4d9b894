//! Build-file evaluation.
//!
//! Evaluating a build file runs it as a Lua script against a fresh registry;
//! `SubReMakeFile` calls push child registries for the duration of the nested
//! file. The result is a `Project`: the registry arena plus every requested
//! target in the order the requests were made. Evaluation is not a pure
//! operation — pattern enumeration reads the filesystem while the script
//! runs.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::Lua;
use tracing::debug;

use crate::artifact::{normalize_path, Artifact};
use crate::error::EngineError;
use crate::lua::runtime;
use crate::registry::{Project, Registry, RegistryId};

/// Mutable state shared with the Lua globals during evaluation.
#[derive(Debug)]
pub struct EvalState {
  registries: Vec<Registry>,
  stack: Vec<RegistryId>,
  roots: Vec<(RegistryId, Artifact)>,
  config_file: String,
  finished: bool,
  sub_failure: Option<EngineError>,
}

impl EvalState {
  pub fn new(config_file: &str) -> Self {
    EvalState {
      registries: Vec::new(),
      stack: Vec::new(),
      roots: Vec::new(),
      config_file: config_file.to_string(),
      finished: false,
      sub_failure: None,
    }
  }

  /// Open a new registry scope at `dir` and make it current.
  pub fn push_registry(&mut self, dir: PathBuf) -> RegistryId {
    let parent = self.stack.last().copied();
    let id = self.registries.len();
    self.registries.push(Registry::new(id, dir, parent));
    self.stack.push(id);
    id
  }

  pub fn pop_registry(&mut self) {
    self.stack.pop();
  }

  pub fn current(&self) -> &Registry {
    let id = *self.stack.last().expect("a registry scope is active");
    &self.registries[id]
  }

  pub fn current_mut(&mut self) -> &mut Registry {
    let id = *self.stack.last().expect("a registry scope is active");
    &mut self.registries[id]
  }

  pub fn registries(&self) -> &[Registry] {
    &self.registries
  }

  /// Request an artifact in the current registry. Duplicate requests within
  /// one registry are dropped.
  pub fn request(&mut self, artifact: Artifact) {
    let id = self.current().id();
    if self.registries[id].add_target(artifact.clone()) {
      self.roots.push((id, artifact));
    }
  }

  pub fn config_file(&self) -> &str {
    &self.config_file
  }

  pub fn finished(&self) -> bool {
    self.finished
  }

  pub fn store_sub_failure(&mut self, err: EngineError) {
    self.sub_failure = Some(err);
  }

  pub fn take_sub_failure(&mut self) -> Option<EngineError> {
    self.sub_failure.take()
  }

  fn finish(&mut self) {
    self.finished = true;
  }

  fn to_project(&self) -> Project {
    Project {
      registries: self.registries.clone(),
      roots: self.roots.clone(),
    }
  }
}

/// A fully evaluated build-file tree.
///
/// The Lua runtime rides along: builders may hold function handles into it,
/// so it has to outlive execution.
#[derive(Debug)]
pub struct Evaluated {
  pub lua: Lua,
  pub project: Project,
}

/// Evaluate the build file in `dir` (and, recursively, any sub-builds).
///
/// # Errors
///
/// `Io` when the build file cannot be read, `Eval` on Lua errors, and
/// `SubBuildFailure` when a nested build file fails.
pub fn evaluate_dir(dir: &Path, config_file: &str) -> Result<Evaluated, EngineError> {
  let root = absolute_dir(dir)?;
  let file = root.join(config_file);
  debug!(file = %file.display(), "evaluating build file");

  let state = Rc::new(RefCell::new(EvalState::new(config_file)));
  let lua = runtime::create_runtime(Rc::clone(&state)).map_err(EngineError::Eval)?;

  state.borrow_mut().push_registry(root);
  if let Err(err) = evaluate_chunk(&lua, &file) {
    let sub_failure = state.borrow_mut().take_sub_failure();
    return Err(sub_failure.unwrap_or(err));
  }

  let project = {
    let mut st = state.borrow_mut();
    st.pop_registry();
    st.finish();
    st.to_project()
  };
  Ok(Evaluated { lua, project })
}

/// Load and execute one build-file chunk in the shared runtime.
pub(crate) fn evaluate_chunk(lua: &Lua, file: &Path) -> Result<(), EngineError> {
  let chunk = fs::read_to_string(file)?;
  lua
    .load(&chunk)
    .set_name(format!("@{}", file.display()))
    .exec()?;
  Ok(())
}

fn absolute_dir(dir: &Path) -> Result<PathBuf, EngineError> {
  let cwd = std::env::current_dir()?;
  Ok(normalize_path(&cwd, dir))
}
