//! Lua runtime construction.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;

use crate::eval::EvalState;
use crate::lua::globals;

/// Create a Lua runtime with the build-file API registered.
///
/// The runtime must stay alive for as long as callable actions may run: the
/// functions captured in builders are handles into it.
pub fn create_runtime(state: Rc<RefCell<EvalState>>) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, state)?;
  Ok(lua)
}
