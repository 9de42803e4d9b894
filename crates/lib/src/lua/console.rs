//! Callable action invocation and its console handle.
//!
//! A callable action is a Lua function called as
//! `action(deps, targets, console, kwargs)`. Deps and targets arrive as
//! arrays of strings (absolute paths for files, names for virtuals). The
//! console handle buffers `console:print(...)` output, which is forwarded to
//! the reporter once the action returns.

use std::cell::RefCell;
use std::path::Path;

use mlua::prelude::*;
use mlua::UserData;

use crate::artifact::Artifact;
use crate::error::EngineError;
use crate::lua::values;
use crate::report::{BuildEvent, Reporter};
use crate::rule::Rule;

/// The `console` argument handed to callable actions.
#[derive(Default)]
pub struct ConsoleHandle {
  messages: RefCell<Vec<String>>,
}

impl ConsoleHandle {
  fn take_messages(self) -> Vec<String> {
    self.messages.into_inner()
  }
}

impl UserData for ConsoleHandle {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("print", |_, this, text: String| {
      this.messages.borrow_mut().push(text);
      Ok(())
    });
  }
}

/// Invoke a callable action for `rule`.
///
/// The action fails its node when it raises a Lua error or returns `false`;
/// returning nothing is success.
///
/// # Errors
///
/// `BuilderFailure` on a raised error or a `false` return.
pub fn invoke_callable(
  lua: &Lua,
  function: &LuaFunction,
  rule: &Rule,
  dir: &Path,
  reporter: &dyn Reporter,
) -> Result<(), EngineError> {
  let deps = artifact_strings(lua, &rule.deps)?;
  let targets = artifact_strings(lua, &rule.targets)?;
  let console = lua.create_userdata(ConsoleHandle::default())?;

  let kwargs = lua.create_table()?;
  for (key, value) in rule.merged_kwargs() {
    kwargs.set(key.as_str(), values::kwarg_to_lua(lua, &value)?)?;
  }

  let result = function.call::<LuaValue>((deps, targets, &console, kwargs));

  // Forward console output even when the action failed.
  if let Ok(handle) = console.take::<ConsoleHandle>() {
    for text in handle.take_messages() {
      reporter.event(BuildEvent::ActionOutput { text });
    }
  }

  let label = rule.label(dir);
  match result {
    Err(err) => Err(EngineError::BuilderFailure {
      label,
      detail: err.to_string(),
    }),
    Ok(LuaValue::Boolean(false)) => Err(EngineError::BuilderFailure {
      label,
      detail: "action signaled failure".to_string(),
    }),
    Ok(_) => Ok(()),
  }
}

/// Deps/targets as Lua arrays of strings.
fn artifact_strings(lua: &Lua, artifacts: &[Artifact]) -> Result<LuaTable, EngineError> {
  let table = lua.create_table()?;
  for (i, artifact) in artifacts.iter().enumerate() {
    table.set(i + 1, artifact.to_string())?;
  }
  Ok(table)
}
