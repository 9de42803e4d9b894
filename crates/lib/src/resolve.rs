//! Resolution: turning requested targets into a dependency DAG.
//!
//! Each requested root is resolved within its owning registry: named rules
//! first (newest wins for a shared target), then pattern rules in
//! registration order, then cross-registry file products from earlier roots,
//! then leaf sources. Nodes are memoized by `(registry, artifact key)` so
//! shared subgraphs resolve once; revisits on the active resolution stack are
//! dependency cycles.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::artifact::{Artifact, ArtifactKey};
use crate::error::EngineError;
use crate::registry::{Project, RegistryId};
use crate::rule::Rule;

/// A resolved DAG node.
///
/// `rule` is `None` for leaf sources (existing files with no producer and
/// free-floating virtual deps). `deps` preserves declaration order; edges in
/// the graph run dep → dependent.
#[derive(Debug)]
pub struct Node {
  pub artifact: Artifact,
  pub registry: RegistryId,
  pub rule: Option<Rc<Rule>>,
  pub deps: Vec<NodeIndex>,
}

/// The dependency DAG for one invocation, plus its requested roots in order.
#[derive(Debug)]
pub struct BuildGraph {
  graph: DiGraph<Node, ()>,
  roots: Vec<NodeIndex>,
}

impl BuildGraph {
  pub fn node(&self, idx: NodeIndex) -> &Node {
    &self.graph[idx]
  }

  pub fn roots(&self) -> &[NodeIndex] {
    &self.roots
  }

  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  /// Deterministic execution schedule: post-order from each root in request
  /// order, deps in declaration order, every node exactly once.
  pub fn post_order(&self) -> Vec<NodeIndex> {
    let mut order = Vec::with_capacity(self.graph.node_count());
    let mut seen = HashSet::new();
    for &root in &self.roots {
      self.visit(root, &mut seen, &mut order);
    }
    order
  }

  fn visit(&self, idx: NodeIndex, seen: &mut HashSet<NodeIndex>, order: &mut Vec<NodeIndex>) {
    if !seen.insert(idx) {
      return;
    }
    for dep in self.graph[idx].deps.clone() {
      self.visit(dep, seen, order);
    }
    order.push(idx);
  }
}

/// Resolve every requested root of `project` into one union DAG.
///
/// `lenient_sources` relaxes the leaf rule for dry-runs: a file with no
/// producer that is missing from disk is assumed present.
///
/// # Errors
///
/// `UnresolvedTarget`, `DependencyCycle`, or either wrapped in
/// `SubBuildFailure` when the failing root belongs to a child registry.
pub fn resolve(project: &Project, lenient_sources: bool) -> Result<BuildGraph, EngineError> {
  let mut resolver = Resolver {
    project,
    lenient_sources,
    graph: DiGraph::new(),
    memo: HashMap::new(),
    produced: HashMap::new(),
    stack: Vec::new(),
    binding: HashSet::new(),
  };

  let mut roots = Vec::with_capacity(project.roots.len());
  for (registry, artifact) in &project.roots {
    let idx = resolver
      .resolve_artifact(*registry, artifact)
      .map_err(|err| wrap_child_failure(project, *registry, err))?;
    roots.push(idx);
  }

  // The stack check above already rejects cycles; keep the graph-level
  // verification as well, mirroring the executor's trust in a sound DAG.
  if toposort(&resolver.graph, None).is_err() {
    return Err(EngineError::DependencyCycle("<dependency graph>".to_string()));
  }

  Ok(BuildGraph {
    graph: resolver.graph,
    roots,
  })
}

/// Annotate failures for roots owned by a child registry with its directory.
fn wrap_child_failure(project: &Project, registry: RegistryId, err: EngineError) -> EngineError {
  match project.registry(registry).parent() {
    Some(_) => EngineError::SubBuildFailure {
      dir: project.registry(registry).dir().to_path_buf(),
      source: Box::new(err),
    },
    None => err,
  }
}

struct Resolver<'p> {
  project: &'p Project,
  lenient_sources: bool,
  graph: DiGraph<Node, ()>,
  memo: HashMap<(RegistryId, ArtifactKey), NodeIndex>,
  /// File artifacts produced by already-resolved nodes, across registries.
  /// This is the only channel through which a parent sees child products.
  produced: HashMap<PathBuf, NodeIndex>,
  stack: Vec<(RegistryId, ArtifactKey)>,
  /// Named rules currently having their deps resolved.
  binding: HashSet<(RegistryId, usize)>,
}

impl Resolver<'_> {
  fn resolve_artifact(&mut self, registry: RegistryId, artifact: &Artifact) -> Result<NodeIndex, EngineError> {
    let key = artifact.key();
    if let Some(&idx) = self.memo.get(&(registry, key.clone())) {
      return Ok(idx);
    }
    if self.stack.contains(&(registry, key.clone())) {
      return Err(EngineError::DependencyCycle(artifact.to_string()));
    }

    self.stack.push((registry, key.clone()));
    let resolved = self.resolve_uncached(registry, artifact, &key);
    self.stack.pop();
    resolved
  }

  fn resolve_uncached(
    &mut self,
    registry: RegistryId,
    artifact: &Artifact,
    key: &ArtifactKey,
  ) -> Result<NodeIndex, EngineError> {
    let scope = self.project.registry(registry);

    if let Some(rule) = scope.find_producer(key) {
      return self.bind_rule(registry, rule, false);
    }

    for pattern in scope.pattern_rules() {
      if let Some(rule) = pattern.instantiate(key, scope.dir()) {
        tracing::debug!(target = %artifact, pattern = %pattern.target.as_str(), "pattern rule matched");
        return self.bind_rule(registry, Rc::new(rule), true);
      }
    }

    // A file target unknown here may be the product of an earlier-resolved
    // root from another registry (a sub-build). Reference is by path only.
    if let ArtifactKey::File(path) = key {
      if let Some(&idx) = self.produced.get(path) {
        self.memo.insert((registry, key.clone()), idx);
        return Ok(idx);
      }
    }

    self.leaf(registry, artifact, key)
  }

  /// Resolve the deps of a matched rule and add its node. One node per rule:
  /// all of its targets memoize to it, so a rule with several requested
  /// targets executes once.
  fn bind_rule(&mut self, registry: RegistryId, rule: Rc<Rule>, ephemeral: bool) -> Result<NodeIndex, EngineError> {
    let rule_id = (registry, Rc::as_ptr(&rule) as usize);
    if !ephemeral && !self.binding.insert(rule_id) {
      // A rule reached again while its own deps are being resolved depends
      // on itself through a sibling target.
      return Err(EngineError::DependencyCycle(rule.targets[0].to_string()));
    }

    let resolved = self.bind_rule_inner(registry, &rule);
    if !ephemeral {
      self.binding.remove(&rule_id);
    }
    resolved
  }

  fn bind_rule_inner(&mut self, registry: RegistryId, rule: &Rc<Rule>) -> Result<NodeIndex, EngineError> {
    let mut deps = Vec::with_capacity(rule.deps.len());
    for dep in &rule.deps {
      deps.push(self.resolve_artifact(registry, dep)?);
    }

    let idx = self.graph.add_node(Node {
      artifact: rule.targets[0].clone(),
      registry,
      rule: Some(Rc::clone(rule)),
      deps: deps.clone(),
    });
    for dep in deps {
      self.graph.add_edge(dep, idx, ());
    }

    for target in &rule.targets {
      let key = target.key();
      if let ArtifactKey::File(path) = &key {
        self.produced.entry(path.clone()).or_insert(idx);
      }
      self.memo.insert((registry, key), idx);
    }
    Ok(idx)
  }

  /// No rule produces the artifact: accept it as a leaf source or fail.
  fn leaf(
    &mut self,
    registry: RegistryId,
    artifact: &Artifact,
    key: &ArtifactKey,
  ) -> Result<NodeIndex, EngineError> {
    let acceptable = match key {
      // Virtual deps float free; a *requested* virtual with no producer is
      // an error.
      ArtifactKey::Virtual(_) => artifact.is_dep() || self.lenient_sources,
      ArtifactKey::File(path) => path.exists() || self.lenient_sources,
    };
    if !acceptable {
      return Err(EngineError::UnresolvedTarget(artifact.to_string()));
    }

    let idx = self.graph.add_node(Node {
      artifact: artifact.clone(),
      registry,
      rule: None,
      deps: Vec::new(),
    });
    self.memo.insert((registry, key.clone()), idx);
    Ok(idx)
  }
}
