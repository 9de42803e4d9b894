//! Terminal rendering of build events.

use owo_colors::{OwoColorize, Stream};

use remake_lib::{BuildEvent, Reporter};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const ARROW: &str = "→";
  pub const PLUS: &str = "+";
}

/// Renders build events as colored terminal lines.
pub struct TermReporter {
  verbose: bool,
}

impl TermReporter {
  pub fn new(verbose: bool) -> Self {
    TermReporter { verbose }
  }
}

impl Reporter for TermReporter {
  fn event(&self, event: BuildEvent) {
    match event {
      BuildEvent::RunStarted { dir, steps } => {
        println!(
          "{} {} ({} steps)",
          symbols::PLUS.if_supports_color(Stream::Stdout, |s| s.green()),
          format!("Executing {}", dir.display()).if_supports_color(Stream::Stdout, |s| s.bold()),
          steps
        );
      }
      BuildEvent::ActionStarted {
        step,
        total,
        description,
      } => {
        println!("[{step}/{total}] {description}");
      }
      BuildEvent::ActionOutput { text } => {
        println!("  {} {text}", symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.cyan()));
      }
      BuildEvent::UpToDate { step, total, label } => {
        println!(
          "[{step}/{total}] [{}] {label} is up to date",
          "SKIP".if_supports_color(Stream::Stdout, |s| s.magenta())
        );
      }
      BuildEvent::SourceChecked { step, total, label } => {
        if self.verbose {
          println!(
            "[{step}/{total}] [{}] source {label}",
            "SKIP".if_supports_color(Stream::Stdout, |s| s.magenta())
          );
        }
      }
      BuildEvent::WouldRun {
        step,
        total,
        description,
      } => {
        println!(
          "[{step}/{total}] [{}] {description}",
          "DRY-RUN".if_supports_color(Stream::Stdout, |s| s.magenta())
        );
      }
      BuildEvent::Cleaned { step, total, path } => {
        println!(
          "[{step}/{total}] [{}] removed {}",
          "CLEAN".if_supports_color(Stream::Stdout, |s| s.magenta()),
          path.display()
        );
      }
      BuildEvent::CleanFailed {
        step,
        total,
        path,
        error,
      } => {
        println!(
          "[{step}/{total}] [{}] could not remove {}: {error}",
          "CLEAN".if_supports_color(Stream::Stdout, |s| s.red()),
          path.display()
        );
      }
    }
  }
}
