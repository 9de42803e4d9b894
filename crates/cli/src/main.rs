//! remake: a make-like declarative build tool.
//!
//! Evaluates the `ReMakeFile.lua` in the current directory, resolves the
//! requested targets into a dependency graph, and brings them up to date.

mod output;

use std::env;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream, Style};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use remake_lib::{run_dir, RunMode, RunOptions, ShellRunner, DEFAULT_BUILD_FILE};

use crate::output::{symbols, TermReporter};

#[derive(Parser)]
#[command(name = "remake", version, about = "ReMake is a make-like tool")]
struct Cli {
  /// Targets to bring up to date (absolute paths or virtual names);
  /// defaults to the build file's requested targets
  targets: Vec<String>,

  /// Enable verbose output
  #[arg(short, long)]
  verbose: bool,

  /// Show what would be done without executing anything
  #[arg(short = 'n', long, conflicts_with_all = ["clean", "rebuild"])]
  dry_run: bool,

  /// Clean the requested targets
  #[arg(short, long, conflicts_with = "rebuild")]
  clean: bool,

  /// Perform a full rebuild (clean and build)
  #[arg(short, long)]
  rebuild: bool,

  /// Build file name, also used by sub-builds
  #[arg(short = 'f', long, default_value = DEFAULT_BUILD_FILE)]
  config_file: String,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
  FmtSubscriber::builder()
    .with_max_level(level)
    .with_target(false)
    .without_time()
    .with_writer(std::io::stderr)
    .init();

  let mode = if cli.clean {
    RunMode::Clean
  } else if cli.rebuild {
    RunMode::Rebuild
  } else if cli.dry_run {
    RunMode::DryRun
  } else {
    RunMode::Build
  };

  let options = RunOptions {
    config_file: cli.config_file,
    mode,
    targets: cli.targets,
  };

  let dir = env::current_dir().context("cannot determine the current directory")?;
  let reporter = TermReporter::new(cli.verbose);

  match run_dir(&dir, &options, &ShellRunner, &reporter) {
    Ok(summary) => {
      match mode {
        RunMode::Clean => {
          println!(
            "{} cleaned {} targets",
            symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
            summary.cleaned
          );
        }
        RunMode::DryRun => {
          println!(
            "{} {} of {} steps would run",
            symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
            summary.executed,
            summary.checked
          );
        }
        RunMode::Build | RunMode::Rebuild => {
          println!(
            "{} executed {} of {} steps",
            symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
            summary.executed,
            summary.checked
          );
        }
      }
      Ok(())
    }
    Err(err) => {
      eprintln!(
        "{} {err}",
        symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.style(Style::new().red().bold()))
      );
      std::process::exit(1);
    }
  }
}
