//! End-to-end engine tests: build files evaluated from disk, actions run
//! through the real shell.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use remake_lib::{
  run_dir, RecordingReporter, RunMode, RunOptions, RunSummary, ShellRunner, DEFAULT_BUILD_FILE,
};

fn write_build_file(dir: &Path, content: &str) {
  fs::write(dir.join(DEFAULT_BUILD_FILE), content).unwrap();
}

fn options(mode: RunMode) -> RunOptions {
  RunOptions {
    mode,
    ..RunOptions::default()
  }
}

fn build(dir: &Path, mode: RunMode) -> (RunSummary, RecordingReporter) {
  let reporter = RecordingReporter::new();
  let summary = run_dir(dir, &options(mode), &ShellRunner, &reporter).unwrap();
  (summary, reporter)
}

fn set_mtime(path: &Path, when: SystemTime) {
  let file = fs::File::options().write(true).open(path).unwrap();
  file.set_modified(when).unwrap();
}

#[test]
fn simple_rebuild_runs_once_then_never() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("b"), "content").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      Rule({ targets = "a", deps = "b", builder = Builder({ action = "cp $< $@" }) })
      AddTarget("a")
    "#,
  );

  let (summary, reporter) = build(tmp.path(), RunMode::Build);
  assert_eq!(summary.executed, 1);
  assert_eq!(reporter.actions(), vec!["cp b a"]);
  assert!(tmp.path().join("a").exists());

  let (summary, reporter) = build(tmp.path(), RunMode::Build);
  assert_eq!(summary.executed, 0);
  assert!(reporter.actions().is_empty());
}

#[test]
fn pattern_expansion_builds_in_sorted_order() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("y.foo"), "").unwrap();
  fs::write(tmp.path().join("x.foo"), "").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local r = PatternRule({ target = "*.bar", deps = "*.foo", builder = Builder({ action = "touch $@" }) })
      AddTarget(r.allTargets)
    "#,
  );

  let (summary, reporter) = build(tmp.path(), RunMode::Build);
  assert_eq!(summary.executed, 2);
  assert_eq!(reporter.actions(), vec!["touch x.bar", "touch y.bar"]);
  assert!(tmp.path().join("x.bar").exists());
  assert!(tmp.path().join("y.bar").exists());
}

#[test]
fn exclude_removes_an_enumerated_target() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("x.foo"), "").unwrap();
  fs::write(tmp.path().join("y.foo"), "").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local r = PatternRule({
        target = "*.bar",
        deps = "*.foo",
        builder = Builder({ action = "touch $@" }),
        exclude = { "x.bar" },
      })
      AddTarget(r.allTargets)
    "#,
  );

  let (summary, reporter) = build(tmp.path(), RunMode::Build);
  assert_eq!(summary.executed, 1);
  assert_eq!(reporter.actions(), vec!["touch y.bar"]);
  assert!(!tmp.path().join("x.bar").exists());
}

#[test]
fn virtual_targets_run_on_every_invocation() {
  let tmp = TempDir::new().unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local b = Builder({ action = "echo $<" })
      Rule({
        deps = { VirtualDep("zsh"), VirtualDep("nvim") },
        targets = VirtualTarget("init"),
        builder = b,
      })
      AddVirtualTarget("init")
    "#,
  );

  for _ in 0..2 {
    let (summary, reporter) = build(tmp.path(), RunMode::Build);
    assert_eq!(summary.executed, 1);
    assert_eq!(reporter.actions(), vec!["echo zsh"]);
  }
  // Nothing left a filesystem trace.
  assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
}

#[test]
fn dry_run_announces_and_touches_nothing() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("b"), "content").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      Rule({ targets = "a", deps = "b", builder = Builder({ action = "cp $< $@" }) })
      AddTarget("a")
    "#,
  );

  let (summary, reporter) = build(tmp.path(), RunMode::DryRun);
  assert_eq!(summary.executed, 1);
  assert_eq!(reporter.actions(), vec!["cp b a"]);
  assert!(!tmp.path().join("a").exists());
}

#[test]
fn clean_deletes_built_targets_and_spares_sources() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("x.foo"), "").unwrap();
  fs::write(tmp.path().join("y.foo"), "").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local r = PatternRule({ target = "*.bar", deps = "*.foo", builder = Builder({ action = "touch $@" }) })
      AddTarget(r.allTargets)
    "#,
  );

  build(tmp.path(), RunMode::Build);
  assert!(tmp.path().join("x.bar").exists());

  let (summary, _) = build(tmp.path(), RunMode::Clean);
  assert_eq!(summary.cleaned, 2);
  assert!(!tmp.path().join("x.bar").exists());
  assert!(!tmp.path().join("y.bar").exists());
  assert!(tmp.path().join("x.foo").exists());
  assert!(tmp.path().join("y.foo").exists());
}

#[test]
fn minimal_rebuild_touches_only_transitive_dependents() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("src1"), "one").unwrap();
  fs::write(tmp.path().join("src2"), "two").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local cp = Builder({ action = "cp $< $@" })
      Rule({ targets = "mid", deps = "src1", builder = cp })
      Rule({ targets = "top", deps = "mid", builder = cp })
      Rule({ targets = "other", deps = "src2", builder = cp })
      AddTarget({ "top", "other" })
    "#,
  );

  let (summary, _) = build(tmp.path(), RunMode::Build);
  assert_eq!(summary.executed, 3);

  // Bump one source into the future: only its dependents rebuild.
  set_mtime(
    &tmp.path().join("src1"),
    SystemTime::now() + Duration::from_secs(30),
  );
  let (summary, reporter) = build(tmp.path(), RunMode::Build);
  assert_eq!(summary.executed, 2);
  assert_eq!(reporter.actions(), vec!["cp src1 mid", "cp mid top"]);
}

#[test]
fn actions_execute_in_dependency_order() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("src"), "x").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local log = Builder({ action = "echo $@ >> order.log; touch $@" })
      Rule({ targets = "c", deps = "b", builder = log })
      Rule({ targets = "b", deps = "a", builder = log })
      Rule({ targets = "a", deps = "src", builder = log })
      AddTarget("c")
    "#,
  );

  build(tmp.path(), RunMode::Build);
  let log = fs::read_to_string(tmp.path().join("order.log")).unwrap();
  let lines: Vec<&str> = log.lines().collect();
  assert_eq!(lines, vec!["a", "b", "c"]);
}

#[test]
fn duplicate_file_target_last_registration_wins() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("old"), "").unwrap();
  fs::write(tmp.path().join("new"), "").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local b = Builder({ action = "cp $< $@" })
      Rule({ targets = "out", deps = "old", builder = b })
      Rule({ targets = "out", deps = "new", builder = b })
      AddTarget("out")
    "#,
  );

  let (_, reporter) = build(tmp.path(), RunMode::Build);
  assert_eq!(reporter.actions(), vec!["cp new out"]);
}

#[test]
fn failing_action_aborts_the_build() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("src"), "").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local b = Builder({ action = "cp $< $@" })
      Rule({ targets = "mid", deps = "src", builder = Builder({ action = "exit 7" }) })
      Rule({ targets = "top", deps = "mid", builder = b })
      AddTarget("top")
    "#,
  );

  let reporter = RecordingReporter::new();
  let err = run_dir(tmp.path(), &options(RunMode::Build), &ShellRunner, &reporter).unwrap_err();
  assert!(err.to_string().contains("exit code 7"), "got: {err}");
  assert!(!tmp.path().join("top").exists());
}

#[test]
fn unresolved_target_is_reported() {
  let tmp = TempDir::new().unwrap();
  write_build_file(tmp.path(), r#"AddTarget("ghost")"#);

  let err = run_dir(
    tmp.path(),
    &options(RunMode::Build),
    &ShellRunner,
    &RecordingReporter::new(),
  )
  .unwrap_err();
  assert!(err.to_string().contains("no rule to make target"), "got: {err}");
}

#[test]
fn dependency_cycle_is_reported() {
  let tmp = TempDir::new().unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local b = Builder({ action = "touch $@" })
      Rule({ targets = "a", deps = "b", builder = b })
      Rule({ targets = "b", deps = "a", builder = b })
      AddTarget("a")
    "#,
  );

  let err = run_dir(
    tmp.path(),
    &options(RunMode::Build),
    &ShellRunner,
    &RecordingReporter::new(),
  )
  .unwrap_err();
  assert!(err.to_string().contains("dependency cycle"), "got: {err}");
}

#[test]
fn rebuild_cleans_then_builds() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("src"), "v1").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      Rule({ targets = "out", deps = "src", builder = Builder({ action = "cp $< $@" }) })
      AddTarget("out")
    "#,
  );

  build(tmp.path(), RunMode::Build);
  let (summary, _) = build(tmp.path(), RunMode::Rebuild);
  assert_eq!(summary.cleaned, 1);
  assert_eq!(summary.executed, 1);
  assert!(tmp.path().join("out").exists());
}

#[test]
fn callable_actions_receive_deps_targets_and_kwargs() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("input.txt"), "payload").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local copy = Builder({
        action = function(deps, targets, console, kwargs)
          console:print("copying " .. deps[1])
          local src = io.open(deps[1], "r")
          local data = src:read("*a")
          src:close()
          local dst = io.open(targets[1], "w")
          dst:write(data .. kwargs.suffix)
          dst:close()
        end,
        suffix = "",
      })
      Rule({ targets = "output.txt", deps = "input.txt", builder = copy, suffix = "!" })
      AddTarget("output.txt")
    "#,
  );

  let (summary, _) = build(tmp.path(), RunMode::Build);
  assert_eq!(summary.executed, 1);
  let out = fs::read_to_string(tmp.path().join("output.txt")).unwrap();
  assert_eq!(out, "payload!");
}

#[test]
fn callable_failure_aborts_the_build() {
  let tmp = TempDir::new().unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local bad = Builder({ action = function() error("nope") end })
      Rule({ targets = VirtualTarget("job"), builder = bad })
      AddVirtualTarget("job")
    "#,
  );

  let err = run_dir(
    tmp.path(),
    &options(RunMode::Build),
    &ShellRunner,
    &RecordingReporter::new(),
  )
  .unwrap_err();
  assert!(err.to_string().contains("nope"), "got: {err}");
}

#[test]
fn cli_targets_override_the_requested_set() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("src"), "").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      local b = Builder({ action = "touch $@" })
      Rule({ targets = "wanted", deps = "src", builder = b })
      Rule({ targets = "unwanted", deps = "src", builder = b })
      AddTarget({ "wanted", "unwanted" })
    "#,
  );

  let opts = RunOptions {
    mode: RunMode::Build,
    targets: vec![tmp.path().join("wanted").display().to_string()],
    ..RunOptions::default()
  };
  run_dir(tmp.path(), &opts, &ShellRunner, &RecordingReporter::new()).unwrap();

  assert!(tmp.path().join("wanted").exists());
  assert!(!tmp.path().join("unwanted").exists());
}

#[test]
fn cli_virtual_name_selects_the_virtual_producer() {
  let tmp = TempDir::new().unwrap();
  write_build_file(
    tmp.path(),
    r#"
      Rule({ targets = VirtualTarget("greet"), builder = Builder({ action = "echo hello" }) })
    "#,
  );

  let opts = RunOptions {
    mode: RunMode::Build,
    targets: vec!["greet".to_string()],
    ..RunOptions::default()
  };
  let reporter = RecordingReporter::new();
  let summary = run_dir(tmp.path(), &opts, &ShellRunner, &reporter).unwrap();
  assert_eq!(summary.executed, 1);
  assert_eq!(reporter.actions(), vec!["echo hello"]);
}

#[test]
fn multi_target_rule_applies_once_for_both_requests() {
  let tmp = TempDir::new().unwrap();
  fs::write(tmp.path().join("src"), "").unwrap();
  write_build_file(
    tmp.path(),
    r#"
      Rule({ targets = { "a", "b" }, deps = "src", builder = Builder({ action = "touch a b" }) })
      AddTarget({ "a", "b" })
    "#,
  );

  let (summary, reporter) = build(tmp.path(), RunMode::Build);
  assert_eq!(summary.executed, 1);
  assert_eq!(reporter.actions(), vec!["touch a b"]);
}
