//! Builders: reusable action specifications attached to rules.
//!
//! An action is either a command template with automatic variables (`$@`,
//! `$^`, `$<`) handed to the command runner, or a Lua function invoked with
//! the concrete dependency and target lists. Builders carry default keyword
//! arguments that callable actions receive merged with rule-level overrides.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use mlua::Function;

use crate::artifact::Artifact;

/// The two shapes an action can take.
#[derive(Clone)]
pub enum Action {
  /// A command template; automatic variables are substituted before the
  /// string is handed to the command runner.
  Template(String),
  /// A build-file function called as `action(deps, targets, console, kwargs)`.
  Callable(Function),
}

impl fmt::Debug for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Action::Template(t) => f.debug_tuple("Template").field(t).finish(),
      Action::Callable(_) => f.write_str("Callable(<function>)"),
    }
  }
}

/// A keyword-argument value forwarded to callable actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Kwarg {
  String(String),
  Number(f64),
  Boolean(bool),
  Array(Vec<Kwarg>),
  Table(BTreeMap<String, Kwarg>),
}

/// A reusable action specification with optional default parameters.
///
/// Non-ephemeral builders are recorded once in the registry they were
/// declared in; ephemeral builders leave no registry trace.
#[derive(Debug, Clone)]
pub struct Builder {
  pub action: Action,
  pub ephemeral: bool,
  pub kwargs: BTreeMap<String, Kwarg>,
}

impl Builder {
  /// Shorthand for a non-ephemeral template builder.
  pub fn template(action: impl Into<String>) -> Rc<Self> {
    Rc::new(Builder {
      action: Action::Template(action.into()),
      ephemeral: false,
      kwargs: BTreeMap::new(),
    })
  }

  /// Human-readable description of the action bound to concrete artifacts.
  ///
  /// For templates this is the fully expanded command line; for callables a
  /// `fn(deps, targets)` label.
  pub fn describe(&self, deps: &[Artifact], targets: &[Artifact], dir: &Path) -> String {
    match &self.action {
      Action::Template(template) => expand_template(template, deps, targets, dir),
      Action::Callable(_) => {
        let deps = join_artifacts(deps, dir);
        let targets = join_artifacts(targets, dir);
        format!("fn([{deps}], [{targets}])")
      }
    }
  }
}

/// Substitute the automatic variables into a command template.
///
/// `$@` expands to all targets, `$^` to all deps, `$<` to the first dep,
/// space-joined. Substitution is literal; a missing first dep expands to the
/// empty string.
pub fn expand_template(template: &str, deps: &[Artifact], targets: &[Artifact], dir: &Path) -> String {
  let all_targets = join_artifacts(targets, dir);
  let all_deps = join_artifacts(deps, dir);
  let first_dep = deps.first().map(|d| d.display_from(dir)).unwrap_or_default();

  template
    .replace("$@", &all_targets)
    .replace("$^", &all_deps)
    .replace("$<", &first_dep)
}

fn join_artifacts(artifacts: &[Artifact], dir: &Path) -> String {
  artifacts
    .iter()
    .map(|a| a.display_from(dir))
    .collect::<Vec<_>>()
    .join(" ")
}
