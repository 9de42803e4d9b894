//! Rules: bound (targets, deps, builder) units producing concrete artifacts.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use crate::artifact::{Artifact, ArtifactKey};
use crate::builder::{Builder, Kwarg};

/// A build rule: how one or more targets are created from dependencies by a
/// builder.
///
/// Targets are non-empty and unique within a rule; deps may be empty. Extra
/// keyword arguments are forwarded to callable actions, with rule-level
/// values overriding the builder's defaults.
#[derive(Debug, Clone)]
pub struct Rule {
  pub targets: Vec<Artifact>,
  pub deps: Vec<Artifact>,
  pub builder: Rc<Builder>,
  pub kwargs: BTreeMap<String, Kwarg>,
  pub name: Option<String>,
}

impl Rule {
  pub fn new(
    targets: Vec<Artifact>,
    deps: Vec<Artifact>,
    builder: Rc<Builder>,
    kwargs: BTreeMap<String, Kwarg>,
    name: Option<String>,
  ) -> Self {
    debug_assert!(!targets.is_empty(), "a rule must have at least one target");
    Rule {
      targets,
      deps,
      builder,
      kwargs,
      name,
    }
  }

  /// Whether this rule produces the given artifact.
  pub fn produces(&self, key: &ArtifactKey) -> bool {
    self.targets.iter().any(|t| t.key() == *key)
  }

  /// Builder defaults overlaid with this rule's own keyword arguments.
  pub fn merged_kwargs(&self) -> BTreeMap<String, Kwarg> {
    let mut merged = self.builder.kwargs.clone();
    for (k, v) in &self.kwargs {
      merged.insert(k.clone(), v.clone());
    }
    merged
  }

  /// Label for progress reporting: the rule name, or its first target.
  pub fn label(&self, dir: &Path) -> String {
    match &self.name {
      Some(name) => name.clone(),
      None => self.targets[0].display_from(dir),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  fn dir() -> PathBuf {
    PathBuf::from("/work/project")
  }

  fn rule(targets: Vec<Artifact>, deps: Vec<Artifact>) -> Rule {
    Rule::new(targets, deps, Builder::template("touch $@"), BTreeMap::new(), None)
  }

  #[test]
  fn produces_matches_any_target_by_key() {
    let r = rule(
      vec![
        Artifact::file_target("a", &dir()),
        Artifact::virtual_target("done"),
      ],
      vec![],
    );
    assert!(r.produces(&Artifact::file_dep("a", &dir()).key()));
    assert!(r.produces(&Artifact::virtual_dep("done").key()));
    assert!(!r.produces(&Artifact::file_dep("b", &dir()).key()));
  }

  #[test]
  fn rule_kwargs_override_builder_defaults() {
    let mut builder_kwargs = BTreeMap::new();
    builder_kwargs.insert("jobs".to_string(), Kwarg::Number(1.0));
    builder_kwargs.insert("quiet".to_string(), Kwarg::Boolean(true));
    let builder = Rc::new(Builder {
      action: crate::builder::Action::Template("touch $@".to_string()),
      ephemeral: false,
      kwargs: builder_kwargs,
    });

    let mut rule_kwargs = BTreeMap::new();
    rule_kwargs.insert("jobs".to_string(), Kwarg::Number(4.0));
    let r = Rule::new(
      vec![Artifact::file_target("a", &dir())],
      vec![],
      builder,
      rule_kwargs,
      None,
    );

    let merged = r.merged_kwargs();
    assert_eq!(merged.get("jobs"), Some(&Kwarg::Number(4.0)));
    assert_eq!(merged.get("quiet"), Some(&Kwarg::Boolean(true)));
  }

  #[test]
  fn label_prefers_name() {
    let mut r = rule(vec![Artifact::file_target("a", &dir())], vec![]);
    assert_eq!(r.label(&dir()), "a");
    r.name = Some("link".to_string());
    assert_eq!(r.label(&dir()), "link");
  }
}
