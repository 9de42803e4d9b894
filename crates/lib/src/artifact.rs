//! Artifact values: the targets and dependencies rules are made of.
//!
//! An artifact is either a file on disk or a virtual name with no filesystem
//! representation. File paths are normalized to absolute form against the
//! owning registry's directory at construction time; virtual names are kept
//! verbatim. Symlinks are not resolved.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Whether an artifact sits in a target slot or a dependency slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
  Target,
  Dep,
}

/// A target or dependency value, either a file path or a virtual name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
  /// A path on disk, normalized to absolute form.
  File { path: PathBuf, role: Role },
  /// An opaque identifier, never touched on disk.
  Virtual { name: String, role: Role },
}

/// Role-free identity of an artifact, used for rule lookup and memoization.
///
/// A `FileDep` finds the rule whose `FileTarget` has the same path, so
/// resolution compares artifacts without their role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
  File(PathBuf),
  Virtual(String),
}

impl Artifact {
  pub fn file_target(path: impl AsRef<Path>, dir: &Path) -> Self {
    Artifact::File {
      path: normalize_path(dir, path.as_ref()),
      role: Role::Target,
    }
  }

  pub fn file_dep(path: impl AsRef<Path>, dir: &Path) -> Self {
    Artifact::File {
      path: normalize_path(dir, path.as_ref()),
      role: Role::Dep,
    }
  }

  pub fn virtual_target(name: impl Into<String>) -> Self {
    Artifact::Virtual {
      name: name.into(),
      role: Role::Target,
    }
  }

  pub fn virtual_dep(name: impl Into<String>) -> Self {
    Artifact::Virtual {
      name: name.into(),
      role: Role::Dep,
    }
  }

  pub fn key(&self) -> ArtifactKey {
    match self {
      Artifact::File { path, .. } => ArtifactKey::File(path.clone()),
      Artifact::Virtual { name, .. } => ArtifactKey::Virtual(name.clone()),
    }
  }

  pub fn role(&self) -> Role {
    match self {
      Artifact::File { role, .. } | Artifact::Virtual { role, .. } => *role,
    }
  }

  pub fn is_dep(&self) -> bool {
    self.role() == Role::Dep
  }

  pub fn is_virtual(&self) -> bool {
    matches!(self, Artifact::Virtual { .. })
  }

  /// The on-disk path, if this is a file artifact.
  pub fn path(&self) -> Option<&Path> {
    match self {
      Artifact::File { path, .. } => Some(path),
      Artifact::Virtual { .. } => None,
    }
  }

  /// The virtual name, if this is a virtual artifact.
  pub fn name(&self) -> Option<&str> {
    match self {
      Artifact::Virtual { name, .. } => Some(name),
      Artifact::File { .. } => None,
    }
  }

  /// Render for command lines and reports: file paths relative to `dir` when
  /// they live under it (commands run with `dir` as working directory, so the
  /// two agree), virtual artifacts as their bare name.
  pub fn display_from(&self, dir: &Path) -> String {
    match self {
      Artifact::Virtual { name, .. } => name.clone(),
      Artifact::File { path, .. } => match path.strip_prefix(dir) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.display().to_string(),
        _ => path.display().to_string(),
      },
    }
  }
}

impl fmt::Display for Artifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Artifact::File { path, .. } => write!(f, "{}", path.display()),
      Artifact::Virtual { name, .. } => write!(f, "{name}"),
    }
  }
}

/// Resolve `path` against `dir` and fold `.`/`..` components lexically.
///
/// Trailing separators disappear with the component walk. Symlinks are left
/// alone.
pub(crate) fn normalize_path(dir: &Path, path: &Path) -> PathBuf {
  let joined = if path.is_absolute() {
    path.to_path_buf()
  } else {
    dir.join(path)
  };

  let mut out = PathBuf::new();
  for component in joined.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        // Popping past the root of an absolute path is a no-op.
        if !out.pop() && !joined.has_root() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dir() -> PathBuf {
    PathBuf::from("/work/project")
  }

  mod normalization {
    use super::*;

    #[test]
    fn relative_paths_anchor_at_dir() {
      let a = Artifact::file_target("a", &dir());
      assert_eq!(a.path().unwrap(), Path::new("/work/project/a"));
    }

    #[test]
    fn absolute_paths_pass_through() {
      let a = Artifact::file_dep("/tmp/b", &dir());
      assert_eq!(a.path().unwrap(), Path::new("/tmp/b"));
    }

    #[test]
    fn dots_fold() {
      let a = Artifact::file_target("./sub/../a", &dir());
      assert_eq!(a.path().unwrap(), Path::new("/work/project/a"));
    }

    #[test]
    fn parent_escapes_dir() {
      let a = Artifact::file_target("../other/a", &dir());
      assert_eq!(a.path().unwrap(), Path::new("/work/other/a"));
    }

    #[test]
    fn trailing_separator_stripped() {
      let a = Artifact::file_target("sub/", &dir());
      assert_eq!(a.path().unwrap(), Path::new("/work/project/sub"));
    }
  }

  mod identity {
    use super::*;

    #[test]
    fn key_ignores_role() {
      let t = Artifact::file_target("a", &dir());
      let d = Artifact::file_dep("a", &dir());
      assert_ne!(t, d);
      assert_eq!(t.key(), d.key());
    }

    #[test]
    fn virtual_and_file_never_collide() {
      let v = Artifact::virtual_target("a");
      let f = Artifact::file_target("a", &dir());
      assert_ne!(v.key(), f.key());
    }
  }

  mod display {
    use super::*;

    #[test]
    fn files_under_dir_render_relative() {
      let a = Artifact::file_target("sub/a", &dir());
      assert_eq!(a.display_from(&dir()), "sub/a");
    }

    #[test]
    fn files_outside_dir_render_absolute() {
      let a = Artifact::file_dep("/tmp/b", &dir());
      assert_eq!(a.display_from(&dir()), "/tmp/b");
    }

    #[test]
    fn virtuals_render_as_name() {
      let a = Artifact::virtual_dep("zsh");
      assert_eq!(a.display_from(&dir()), "zsh");
    }
  }
}
