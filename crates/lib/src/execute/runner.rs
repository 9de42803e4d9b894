//! Command running.
//!
//! The engine never spawns processes directly; template actions go through an
//! injected `CommandRunner`. The default implementation hands the command
//! line to the system shell with the owning registry's directory as working
//! directory and blocks until it exits.

use std::cell::RefCell;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::EngineError;

/// Executes expanded command lines on behalf of template actions.
pub trait CommandRunner {
  /// Run a command in `dir`; a non-zero exit status is a failure.
  ///
  /// # Errors
  ///
  /// `BuilderFailure` when the command exits non-zero, `Io` when it cannot be
  /// spawned.
  fn run(&self, command: &str, dir: &Path) -> Result<(), EngineError>;
}

/// Runs commands through the system shell, synchronously.
#[derive(Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
  fn run(&self, command: &str, dir: &Path) -> Result<(), EngineError> {
    debug!(cmd = %command, dir = %dir.display(), "executing command");

    let (shell, flag) = shell_invocation();
    let output = Command::new(shell)
      .arg(flag)
      .arg(command)
      .current_dir(dir)
      .output()?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }
      let detail = match output.status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
      };
      return Err(EngineError::BuilderFailure {
        label: command.to_string(),
        detail,
      });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
      debug!(stdout = %stdout.trim(), "command output");
    }
    Ok(())
  }
}

/// Shell and argument flag for the current platform.
///
/// Always the plain system shell: interactive shells may source profile
/// files that change the environment between runs.
fn shell_invocation() -> (&'static str, &'static str) {
  #[cfg(unix)]
  {
    ("/bin/sh", "-c")
  }
  #[cfg(windows)]
  {
    ("cmd.exe", "/C")
  }
}

/// Records commands instead of executing them; used by tests.
#[derive(Debug, Default)]
pub struct FakeRunner {
  commands: RefCell<Vec<String>>,
  fail_on: Option<String>,
}

impl FakeRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// A runner that fails any command containing `needle`.
  pub fn failing_on(needle: impl Into<String>) -> Self {
    FakeRunner {
      commands: RefCell::new(Vec::new()),
      fail_on: Some(needle.into()),
    }
  }

  /// Every command received so far, in order.
  pub fn commands(&self) -> Vec<String> {
    self.commands.borrow().clone()
  }
}

impl CommandRunner for FakeRunner {
  fn run(&self, command: &str, _dir: &Path) -> Result<(), EngineError> {
    self.commands.borrow_mut().push(command.to_string());
    if let Some(needle) = &self.fail_on {
      if command.contains(needle.as_str()) {
        return Err(EngineError::BuilderFailure {
          label: command.to_string(),
          detail: "exit code 1".to_string(),
        });
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn shell_runner_reports_exit_codes() {
    let tmp = TempDir::new().unwrap();
    let runner = ShellRunner;

    assert!(runner.run("true", tmp.path()).is_ok());

    let err = runner.run("exit 3", tmp.path()).unwrap_err();
    match err {
      EngineError::BuilderFailure { detail, .. } => assert_eq!(detail, "exit code 3"),
      other => panic!("expected BuilderFailure, got {other:?}"),
    }
  }

  #[test]
  fn shell_runner_uses_the_working_directory() {
    let tmp = TempDir::new().unwrap();
    ShellRunner.run("touch marker", tmp.path()).unwrap();
    assert!(tmp.path().join("marker").exists());
  }

  #[test]
  fn fake_runner_records_in_order() {
    let runner = FakeRunner::new();
    runner.run("first", Path::new("/")).unwrap();
    runner.run("second", Path::new("/")).unwrap();
    assert_eq!(runner.commands(), vec!["first", "second"]);
  }

  #[test]
  fn fake_runner_fails_on_needle() {
    let runner = FakeRunner::failing_on("boom");
    assert!(runner.run("ok", Path::new("/")).is_ok());
    assert!(runner.run("go boom now", Path::new("/")).is_err());
  }
}
