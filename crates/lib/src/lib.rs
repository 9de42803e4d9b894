//! remake-lib: the ReMake build engine.
//!
//! ReMake is a make-like declarative build tool. Build files are Lua scripts
//! that register rules (target/dependency tuples paired with an action) and
//! pattern rules (wildcard templates instantiated from files on disk). The
//! engine resolves the requested targets into a dependency DAG, decides per
//! node whether its action must run by comparing modification times, and
//! executes the stale actions sequentially in dependency order.
//!
//! The crate is organized around the build pipeline:
//! - [`artifact`], [`builder`], [`rule`], [`pattern`], [`registry`]: the
//!   declaration model populated by build files
//! - [`lua`], [`eval`]: the Lua host and build-file evaluation (including
//!   nested builds via `SubReMakeFile`)
//! - [`resolve`]: DAG construction from requested targets
//! - [`execute`]: staleness analysis and the build/dry-run/clean passes
//! - [`engine`]: the evaluate → resolve → execute entry point used by the CLI

pub mod artifact;
pub mod builder;
pub mod engine;
pub mod error;
pub mod eval;
pub mod execute;
pub mod lua;
pub mod pattern;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod rule;

pub use engine::{run_dir, RunMode, RunOptions, DEFAULT_BUILD_FILE};
pub use error::EngineError;
pub use execute::{CommandRunner, FakeRunner, RunSummary, ShellRunner};
pub use report::{BuildEvent, NullReporter, RecordingReporter, Reporter};
