//! Pattern rules: wildcard templates that synthesize rules on demand.
//!
//! A pattern carries exactly one wildcard (`*` and `%` are equivalent). The
//! target side has one pattern; every dependency is a pattern too. Matching a
//! concrete target captures the wildcard stem, which is substituted into each
//! dependency pattern to synthesize an ephemeral rule. Enumeration of the
//! possible targets globs the first dependency pattern against the
//! filesystem, so build-file evaluation is not a pure operation.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use crate::artifact::{Artifact, ArtifactKey};
use crate::builder::Builder;
use crate::error::EngineError;
use crate::rule::Rule;

/// A string containing exactly one wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
  text: String,
  star: usize,
}

impl Pattern {
  /// Parse a pattern, normalizing `%` to `*`.
  ///
  /// # Errors
  ///
  /// Returns `PatternMalformed` when the string holds zero or more than one
  /// wildcard.
  pub fn parse(raw: &str) -> Result<Self, EngineError> {
    let text = raw.replace('%', "*");
    if text.matches('*').count() != 1 {
      return Err(EngineError::PatternMalformed(raw.to_string()));
    }
    let star = text.find('*').expect("pattern has a wildcard");
    Ok(Pattern { text, star })
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }

  fn prefix(&self) -> &str {
    &self.text[..self.star]
  }

  fn suffix(&self) -> &str {
    &self.text[self.star + 1..]
  }

  /// The non-empty wildcard capture, if `candidate` matches.
  pub fn stem_of<'a>(&self, candidate: &'a str) -> Option<&'a str> {
    let stem = candidate
      .strip_prefix(self.prefix())?
      .strip_suffix(self.suffix())?;
    if stem.is_empty() { None } else { Some(stem) }
  }

  /// Plug a captured stem back into the pattern.
  pub fn substitute(&self, stem: &str) -> String {
    format!("{}{}{}", self.prefix(), stem, self.suffix())
  }

  /// Like `stem_of`, but with the pattern anchored at `dir` for matching an
  /// absolute file path.
  fn file_stem_of(&self, path: &Path, dir: &Path) -> Option<String> {
    let anchored = dir.join(&self.text);
    let anchored = anchored.to_string_lossy();
    let star = anchored.rfind('*')?;
    let prefix = &anchored[..star];
    let suffix = &anchored[star + 1..];

    let candidate = path.to_string_lossy();
    let stem = candidate.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if stem.is_empty() {
      None
    } else {
      Some(stem.to_string())
    }
  }
}

/// A templated rule whose targets are enumerated from the filesystem and
/// whose concrete rules are synthesized during resolution.
#[derive(Debug, Clone)]
pub struct PatternRule {
  pub target: Pattern,
  pub deps: Vec<Pattern>,
  pub builder: Rc<Builder>,
  pub name: Option<String>,
  /// Concrete artifacts removed from both matching and enumeration.
  pub exclude: Vec<ArtifactKey>,
}

impl PatternRule {
  pub fn new(
    target: Pattern,
    deps: Vec<Pattern>,
    builder: Rc<Builder>,
    name: Option<String>,
    exclude: Vec<ArtifactKey>,
  ) -> Self {
    debug_assert!(!deps.is_empty(), "a pattern rule needs at least one dep pattern");
    PatternRule {
      target,
      deps,
      builder,
      name,
      exclude,
    }
  }

  fn is_excluded(&self, key: &ArtifactKey) -> bool {
    self.exclude.contains(key)
  }

  /// The captured stem when this pattern rule produces `key`, or `None` if
  /// there is no match or the artifact is excluded.
  pub fn match_target(&self, key: &ArtifactKey, dir: &Path) -> Option<String> {
    if self.is_excluded(key) {
      return None;
    }
    match key {
      ArtifactKey::File(path) => self.target.file_stem_of(path, dir),
      ArtifactKey::Virtual(name) => self.target.stem_of(name).map(str::to_string),
    }
  }

  /// Synthesize the concrete rule for a matching target.
  ///
  /// The result is ephemeral: it is a product of resolution and never enters
  /// the registry.
  pub fn instantiate(&self, key: &ArtifactKey, dir: &Path) -> Option<Rule> {
    let stem = self.match_target(key, dir)?;

    let (target, deps) = match key {
      ArtifactKey::File(path) => {
        let target = Artifact::File {
          path: path.clone(),
          role: crate::artifact::Role::Target,
        };
        let deps = self
          .deps
          .iter()
          .map(|dep| Artifact::file_dep(dep.substitute(&stem), dir))
          .collect();
        (target, deps)
      }
      ArtifactKey::Virtual(name) => {
        let target = Artifact::virtual_target(name.clone());
        let deps = self
          .deps
          .iter()
          .map(|dep| Artifact::virtual_dep(dep.substitute(&stem)))
          .collect();
        (target, deps)
      }
    };

    Some(Rule::new(
      vec![target],
      deps,
      Rc::clone(&self.builder),
      BTreeMap::new(),
      self.name.clone(),
    ))
  }

  /// Enumerate the concrete targets this pattern rule could produce right
  /// now: glob the first dependency pattern under `dir`, substitute each
  /// captured stem into the target pattern, drop exclusions, and sort.
  pub fn all_targets(&self, dir: &Path) -> Vec<Artifact> {
    let dep = &self.deps[0];
    let anchored = dir.join(dep.as_str());
    let paths = match glob::glob(&anchored.to_string_lossy()) {
      Ok(paths) => paths,
      Err(err) => {
        tracing::warn!(pattern = %dep.as_str(), %err, "dep pattern does not glob");
        return Vec::new();
      }
    };

    let mut targets = Vec::new();
    for path in paths.flatten() {
      let Some(stem) = dep.file_stem_of(&path, dir) else {
        continue;
      };
      let target = Artifact::file_target(self.target.substitute(&stem), dir);
      if !self.is_excluded(&target.key()) {
        targets.push(target);
      }
    }

    targets.sort_by(|a, b| a.path().cmp(&b.path()));
    targets.dedup();
    targets
  }
}
