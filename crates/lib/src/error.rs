//! Error types for the build engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can abort a build invocation.
///
/// Every variant is fatal to the current invocation: the engine stops at the
/// failing node and surfaces the error to the caller, which maps it to a
/// non-zero exit code. Clean-mode deletion failures are the one exception and
/// are logged without aborting (see the executor).
#[derive(Debug, Error)]
pub enum EngineError {
  /// The requested artifact cannot be produced by any rule and is not an
  /// existing source file.
  #[error("no rule to make target `{0}`")]
  UnresolvedTarget(String),

  /// A target was revisited while its own resolution was still in progress.
  #[error("dependency cycle detected at `{0}`")]
  DependencyCycle(String),

  /// An action exited non-zero, raised, or signaled failure.
  #[error("action failed for `{label}`: {detail}")]
  BuilderFailure { label: String, detail: String },

  /// A pattern string contained zero or more than one wildcard.
  #[error("pattern `{0}` must contain exactly one wildcard")]
  PatternMalformed(String),

  /// A failure originating in a nested build, annotated with its directory.
  #[error("sub-build `{}` failed: {source}", .dir.display())]
  SubBuildFailure {
    dir: PathBuf,
    #[source]
    source: Box<EngineError>,
  },

  /// Build-file evaluation failed.
  #[error("evaluation error: {0}")]
  Eval(#[from] mlua::Error),

  /// I/O error while reading a build file or touching the filesystem.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
