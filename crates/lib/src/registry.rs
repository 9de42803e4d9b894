//! Registries: the per-build-file scope for declarations and requests.
//!
//! Every build file evaluates into its own registry. A child registry created
//! by a sub-build inherits nothing from its parent; the parent link exists
//! only for diagnostics and error wrapping, never for rule lookup.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::artifact::{Artifact, ArtifactKey};
use crate::builder::Builder;
use crate::pattern::PatternRule;
use crate::rule::Rule;

/// Index of a registry inside the project arena.
pub type RegistryId = usize;

/// Per-build-file scope holding registered rules, builders, and requested
/// targets.
#[derive(Debug, Clone)]
pub struct Registry {
  id: RegistryId,
  dir: PathBuf,
  parent: Option<RegistryId>,
  named_rules: Vec<Rc<Rule>>,
  pattern_rules: Vec<Rc<PatternRule>>,
  builders: Vec<Rc<Builder>>,
  targets: Vec<Artifact>,
}

impl Registry {
  pub fn new(id: RegistryId, dir: PathBuf, parent: Option<RegistryId>) -> Self {
    Registry {
      id,
      dir,
      parent,
      named_rules: Vec::new(),
      pattern_rules: Vec::new(),
      builders: Vec::new(),
      targets: Vec::new(),
    }
  }

  pub fn id(&self) -> RegistryId {
    self.id
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn parent(&self) -> Option<RegistryId> {
    self.parent
  }

  /// Register a named rule.
  ///
  /// A file target already produced by an earlier rule is allowed; the later
  /// registration shadows the earlier one and a warning is logged.
  pub fn register_rule(&mut self, rule: Rule) -> Rc<Rule> {
    for target in &rule.targets {
      let key = target.key();
      if self.named_rules.iter().any(|r| r.produces(&key)) {
        tracing::warn!(target = %target, "target redefined; the last registration wins");
      }
    }
    let rule = Rc::new(rule);
    self.named_rules.push(Rc::clone(&rule));
    rule
  }

  pub fn register_pattern(&mut self, rule: PatternRule) -> Rc<PatternRule> {
    let rule = Rc::new(rule);
    self.pattern_rules.push(Rc::clone(&rule));
    rule
  }

  /// Record a non-ephemeral builder declared in this scope.
  pub fn register_builder(&mut self, builder: Rc<Builder>) {
    self.builders.push(builder);
  }

  /// Mark an artifact as explicitly requested. Duplicates are dropped;
  /// returns whether the request was new.
  pub fn add_target(&mut self, artifact: Artifact) -> bool {
    if self.targets.contains(&artifact) {
      return false;
    }
    self.targets.push(artifact);
    true
  }

  pub fn named_rules(&self) -> &[Rc<Rule>] {
    &self.named_rules
  }

  pub fn pattern_rules(&self) -> &[Rc<PatternRule>] {
    &self.pattern_rules
  }

  pub fn builders(&self) -> &[Rc<Builder>] {
    &self.builders
  }

  pub fn targets(&self) -> &[Artifact] {
    &self.targets
  }

  /// The rule producing `key`, if any. Searches newest-first so that a later
  /// registration shadows an earlier one producing the same target.
  pub fn find_producer(&self, key: &ArtifactKey) -> Option<Rc<Rule>> {
    self
      .named_rules
      .iter()
      .rev()
      .find(|rule| rule.produces(key))
      .map(Rc::clone)
  }
}

/// The output of evaluating a build file tree: the registry arena plus the
/// requested roots in the order they were added across the whole evaluation.
#[derive(Debug, Clone)]
pub struct Project {
  pub registries: Vec<Registry>,
  pub roots: Vec<(RegistryId, Artifact)>,
}

impl Project {
  pub fn registry(&self, id: RegistryId) -> &Registry {
    &self.registries[id]
  }

  /// The directory of the top-level build file.
  pub fn root_dir(&self) -> &Path {
    self.registries[0].dir()
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::path::PathBuf;

  use super::*;

  fn dir() -> PathBuf {
    PathBuf::from("/work/project")
  }

  fn rule(target: &str, deps: &[&str]) -> Rule {
    Rule::new(
      vec![Artifact::file_target(target, &dir())],
      deps.iter().map(|d| Artifact::file_dep(*d, &dir())).collect(),
      Builder::template("touch $@"),
      BTreeMap::new(),
      None,
    )
  }

  #[test]
  fn find_producer_matches_by_key() {
    let mut registry = Registry::new(0, dir(), None);
    registry.register_rule(rule("a", &["b"]));

    let found = registry.find_producer(&Artifact::file_dep("a", &dir()).key());
    assert!(found.is_some());
    assert!(registry
      .find_producer(&Artifact::file_dep("missing", &dir()).key())
      .is_none());
  }

  #[test]
  fn later_registration_shadows_earlier() {
    let mut registry = Registry::new(0, dir(), None);
    registry.register_rule(rule("a", &["b"]));
    registry.register_rule(rule("a", &["c"]));

    let found = registry.find_producer(&Artifact::file_dep("a", &dir()).key()).unwrap();
    assert_eq!(found.deps, vec![Artifact::file_dep("c", &dir())]);
  }

  #[test]
  fn requested_targets_deduplicate() {
    let mut registry = Registry::new(0, dir(), None);
    assert!(registry.add_target(Artifact::file_target("a", &dir())));
    assert!(!registry.add_target(Artifact::file_target("a", &dir())));
    assert_eq!(registry.targets().len(), 1);
  }

  #[test]
  fn virtual_and_file_producers_are_separate() {
    let mut registry = Registry::new(0, dir(), None);
    registry.register_rule(Rule::new(
      vec![Artifact::virtual_target("a")],
      vec![],
      Builder::template("echo $@"),
      BTreeMap::new(),
      None,
    ));

    assert!(registry
      .find_producer(&Artifact::virtual_dep("a").key())
      .is_some());
    assert!(registry
      .find_producer(&Artifact::file_dep("a", &dir()).key())
      .is_none());
  }
}
