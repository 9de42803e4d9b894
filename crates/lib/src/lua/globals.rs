//! The build-file API, registered as Lua globals.
//!
//! Every symbol acts on the innermost registry of the evaluation state:
//! - `Builder{ action = ..., ephemeral = ..., ... }` — declare a builder;
//!   extra keys become default keyword arguments
//! - `Rule{ targets = ..., deps = ..., builder = ..., name = ..., ... }` —
//!   register a named rule; extra keys become keyword arguments
//! - `PatternRule{ target = ..., deps = ..., builder = ..., exclude = ... }`
//!   — register a pattern rule; the returned handle exposes `allTargets`
//! - `VirtualTarget(name)` / `VirtualDep(name)` — virtual artifact markers
//! - `AddTarget(target_or_list)` / `AddVirtualTarget(name)` — request work
//! - `SubReMakeFile(subdir)` — evaluate a nested build file in isolation

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use mlua::UserData;

use crate::artifact::{normalize_path, Artifact, ArtifactKey, Role};
use crate::builder::{Action, Builder};
use crate::error::EngineError;
use crate::eval::{self, EvalState};
use crate::lua::values::lua_value_to_kwarg;
use crate::pattern::{Pattern, PatternRule};
use crate::rule::Rule;

/// Metatable `__type` markers for the handle tables handed back to Lua.
pub const VIRTUAL_TARGET_TYPE: &str = "VirtualTarget";
pub const VIRTUAL_DEP_TYPE: &str = "VirtualDep";
pub const PATTERN_RULE_TYPE: &str = "PatternRule";

/// Handle wrapping a declared builder for later use in `Rule`/`PatternRule`.
pub struct BuilderHandle(pub Rc<Builder>);

impl UserData for BuilderHandle {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("action", |_, this| {
      Ok(match &this.0.action {
        Action::Template(template) => template.clone(),
        Action::Callable(_) => "<function>".to_string(),
      })
    });
  }
}

/// Register the whole build-file API on the Lua globals table.
pub fn register_globals(lua: &Lua, state: Rc<RefCell<EvalState>>) -> LuaResult<()> {
  register_builder(lua, state.clone())?;
  register_rule(lua, state.clone())?;
  register_pattern_rule(lua, state.clone())?;
  register_virtual_markers(lua)?;
  register_add_target(lua, state.clone())?;
  register_add_virtual_target(lua, state.clone())?;
  register_sub_remakefile(lua, state)?;
  Ok(())
}

fn register_builder(lua: &Lua, state: Rc<RefCell<EvalState>>) -> LuaResult<()> {
  let builder_fn = lua.create_function(move |_, spec: LuaTable| {
    active_dir(&state)?;

    let mut action = None;
    let mut ephemeral = false;
    let mut kwargs = BTreeMap::new();

    for pair in spec.pairs::<LuaValue, LuaValue>() {
      let (key, value) = pair?;
      let key = field_name(&key, "builder")?;
      match key.as_str() {
        "action" => action = Some(parse_action(value)?),
        "ephemeral" => {
          ephemeral = match value {
            LuaValue::Boolean(b) => b,
            _ => return Err(LuaError::external("builder 'ephemeral' must be a boolean")),
          }
        }
        _ => {
          kwargs.insert(key, lua_value_to_kwarg(value)?);
        }
      }
    }

    let action = action.ok_or_else(|| LuaError::external("builder requires an 'action' field"))?;
    let builder = Rc::new(Builder {
      action,
      ephemeral,
      kwargs,
    });

    if !ephemeral {
      state.borrow_mut().current_mut().register_builder(Rc::clone(&builder));
    }
    Ok(BuilderHandle(builder))
  })?;

  lua.globals().set("Builder", builder_fn)
}

fn register_rule(lua: &Lua, state: Rc<RefCell<EvalState>>) -> LuaResult<()> {
  let rule_fn = lua.create_function(move |_, spec: LuaTable| {
    let dir = active_dir(&state)?;

    let mut targets_value = None;
    let mut deps_value = LuaValue::Nil;
    let mut builder = None;
    let mut name = None;
    let mut kwargs = BTreeMap::new();

    for pair in spec.pairs::<LuaValue, LuaValue>() {
      let (key, value) = pair?;
      let key = field_name(&key, "rule")?;
      match key.as_str() {
        "targets" => targets_value = Some(value),
        "deps" => deps_value = value,
        "builder" => builder = Some(builder_from_value(value)?),
        "name" => name = Some(string_field(value, "rule 'name'")?),
        _ => {
          kwargs.insert(key, lua_value_to_kwarg(value)?);
        }
      }
    }

    let targets_value = targets_value.ok_or_else(|| LuaError::external("rule requires a 'targets' field"))?;
    let targets = parse_artifacts(targets_value, Role::Target, &dir)?;
    if targets.is_empty() {
      return Err(LuaError::external("rule requires at least one target"));
    }
    let mut seen = HashSet::new();
    for target in &targets {
      if !seen.insert(target.key()) {
        return Err(LuaError::external(format!("duplicate target `{target}` in rule")));
      }
    }

    let deps = match deps_value {
      LuaValue::Nil => Vec::new(),
      value => parse_artifacts(value, Role::Dep, &dir)?,
    };
    let builder = builder.ok_or_else(|| LuaError::external("rule requires a 'builder' field"))?;

    let rule = Rule::new(targets, deps, builder, kwargs, name);
    state.borrow_mut().current_mut().register_rule(rule);
    Ok(())
  })?;

  lua.globals().set("Rule", rule_fn)
}

fn register_pattern_rule(lua: &Lua, state: Rc<RefCell<EvalState>>) -> LuaResult<()> {
  let outer_state = state.clone();
  let pattern_fn = lua.create_function(move |lua, spec: LuaTable| {
    let dir = active_dir(&outer_state)?;

    let mut target = None;
    let mut deps = Vec::new();
    let mut builder = None;
    let mut name = None;
    let mut exclude = Vec::new();

    for pair in spec.pairs::<LuaValue, LuaValue>() {
      let (key, value) = pair?;
      let key = field_name(&key, "pattern rule")?;
      match key.as_str() {
        "target" => target = Some(parse_pattern(string_field(value, "pattern rule 'target'")?)?),
        "deps" => deps = parse_pattern_list(value)?,
        "builder" => builder = Some(builder_from_value(value)?),
        "name" => name = Some(string_field(value, "pattern rule 'name'")?),
        "exclude" => exclude = parse_exclude(value, &dir)?,
        other => {
          return Err(LuaError::external(format!("unknown pattern rule field `{other}`")));
        }
      }
    }

    let target = target.ok_or_else(|| LuaError::external("pattern rule requires a 'target' field"))?;
    if deps.is_empty() {
      return Err(LuaError::external("pattern rule requires at least one dep pattern"));
    }
    let builder = builder.ok_or_else(|| LuaError::external("pattern rule requires a 'builder' field"))?;

    let raw_target = target.as_str().to_string();
    let rule = PatternRule::new(target, deps, builder, name.clone(), exclude);
    let (registry_id, index) = {
      let mut st = outer_state.borrow_mut();
      let registry = st.current_mut();
      registry.register_pattern(rule);
      (registry.id(), registry.pattern_rules().len() - 1)
    };

    // The handle computes `allTargets` on access: enumeration reads the
    // filesystem at query time.
    let handle = lua.create_table()?;
    handle.set("target", raw_target.as_str())?;
    if let Some(name) = &name {
      handle.set("name", name.as_str())?;
    }

    let meta = lua.create_table()?;
    meta.set("__type", PATTERN_RULE_TYPE)?;
    let index_state = outer_state.clone();
    let index_fn = lua.create_function(move |lua, (_handle, key): (LuaTable, LuaValue)| {
      let LuaValue::String(key) = key else {
        return Ok(LuaValue::Nil);
      };
      if key.to_str()?.to_string() != "allTargets" {
        return Ok(LuaValue::Nil);
      }

      let st = index_state.borrow();
      let registry = &st.registries()[registry_id];
      let pattern = &registry.pattern_rules()[index];
      let targets = pattern.all_targets(registry.dir());

      let list = lua.create_table()?;
      for (i, target) in targets.iter().enumerate() {
        let path = target.path().expect("enumerated targets are files");
        list.set(i + 1, path.to_string_lossy().as_ref())?;
      }
      Ok(LuaValue::Table(list))
    })?;
    meta.set("__index", index_fn)?;
    handle.set_metatable(Some(meta));

    Ok(handle)
  })?;

  lua.globals().set("PatternRule", pattern_fn)
}

fn register_virtual_markers(lua: &Lua) -> LuaResult<()> {
  let target_fn =
    lua.create_function(|lua, name: String| make_virtual_marker(lua, VIRTUAL_TARGET_TYPE, &name))?;
  lua.globals().set("VirtualTarget", target_fn)?;

  let dep_fn = lua.create_function(|lua, name: String| make_virtual_marker(lua, VIRTUAL_DEP_TYPE, &name))?;
  lua.globals().set("VirtualDep", dep_fn)
}

fn register_add_target(lua: &Lua, state: Rc<RefCell<EvalState>>) -> LuaResult<()> {
  let add_fn = lua.create_function(move |_, value: LuaValue| {
    let dir = active_dir(&state)?;
    let artifacts = parse_artifacts(value, Role::Target, &dir)?;
    let mut st = state.borrow_mut();
    for artifact in artifacts {
      st.request(artifact);
    }
    Ok(())
  })?;

  lua.globals().set("AddTarget", add_fn)
}

fn register_add_virtual_target(lua: &Lua, state: Rc<RefCell<EvalState>>) -> LuaResult<()> {
  let add_fn = lua.create_function(move |lua, name: String| {
    active_dir(&state)?;
    state.borrow_mut().request(Artifact::virtual_target(name.clone()));
    make_virtual_marker(lua, VIRTUAL_TARGET_TYPE, &name)
  })?;

  lua.globals().set("AddVirtualTarget", add_fn)
}

fn register_sub_remakefile(lua: &Lua, state: Rc<RefCell<EvalState>>) -> LuaResult<()> {
  let sub_fn = lua.create_function(move |lua, subdir: String| {
    let (dir, file) = {
      let st = state.borrow();
      ensure_active(&st)?;
      let dir = normalize_path(st.current().dir(), Path::new(&subdir));
      let file = dir.join(st.config_file());
      (dir, file)
    };
    tracing::info!(dir = %dir.display(), "entering sub-build");

    // The parent's evaluation pauses here; the child gets a fresh registry
    // that inherits nothing.
    state.borrow_mut().push_registry(dir.clone());
    let evaluated = eval::evaluate_chunk(lua, &file);
    state.borrow_mut().pop_registry();

    if let Err(err) = evaluated {
      let mut st = state.borrow_mut();
      // A nested sub-build leaves its own wrapped failure behind; keep the
      // innermost chain intact.
      let inner = st.take_sub_failure().unwrap_or(err);
      st.store_sub_failure(EngineError::SubBuildFailure {
        dir,
        source: Box::new(inner),
      });
      return Err(LuaError::external("sub-build failed"));
    }
    Ok(())
  })?;

  lua.globals().set("SubReMakeFile", sub_fn)
}

// ---------------------------------------------------------------------------
// Parsing helpers

/// The current registry directory, or an error outside evaluation.
fn active_dir(state: &Rc<RefCell<EvalState>>) -> LuaResult<PathBuf> {
  let st = state.borrow();
  ensure_active(&st)?;
  Ok(st.current().dir().to_path_buf())
}

fn ensure_active(state: &EvalState) -> LuaResult<()> {
  if state.finished() {
    return Err(LuaError::external(
      "the build-file API is only available while the build file is being evaluated",
    ));
  }
  Ok(())
}

fn field_name(key: &LuaValue, what: &str) -> LuaResult<String> {
  match key {
    LuaValue::String(s) => Ok(s.to_str()?.to_string()),
    _ => Err(LuaError::external(format!("{what} fields must be named"))),
  }
}

fn string_field(value: LuaValue, what: &str) -> LuaResult<String> {
  match value {
    LuaValue::String(s) => Ok(s.to_str()?.to_string()),
    other => Err(LuaError::external(format!(
      "{what} must be a string, got {}",
      other.type_name()
    ))),
  }
}

fn parse_action(value: LuaValue) -> LuaResult<Action> {
  match value {
    LuaValue::String(s) => Ok(Action::Template(s.to_str()?.to_string())),
    LuaValue::Function(f) => Ok(Action::Callable(f)),
    other => Err(LuaError::external(format!(
      "builder 'action' must be a string or function, got {}",
      other.type_name()
    ))),
  }
}

fn builder_from_value(value: LuaValue) -> LuaResult<Rc<Builder>> {
  match value {
    LuaValue::UserData(ud) => {
      let handle = ud
        .borrow::<BuilderHandle>()
        .map_err(|_| LuaError::external("'builder' must be a Builder handle"))?;
      Ok(Rc::clone(&handle.0))
    }
    other => Err(LuaError::external(format!(
      "'builder' must be a Builder handle, got {}",
      other.type_name()
    ))),
  }
}

/// The `__type` marker of a virtual artifact table, if it carries one.
fn virtual_marker(table: &LuaTable) -> LuaResult<Option<(String, String)>> {
  let Some(meta) = table.metatable() else {
    return Ok(None);
  };
  let type_name: Option<String> = meta.get("__type").unwrap_or(None);
  let Some(type_name) = type_name else {
    return Ok(None);
  };
  if type_name == VIRTUAL_TARGET_TYPE || type_name == VIRTUAL_DEP_TYPE {
    let name: String = table.get("name")?;
    return Ok(Some((type_name, name)));
  }
  Ok(None)
}

fn make_virtual_marker(lua: &Lua, type_name: &str, name: &str) -> LuaResult<LuaTable> {
  let table = lua.create_table()?;
  table.set("name", name)?;
  let meta = lua.create_table()?;
  meta.set("__type", type_name)?;
  table.set_metatable(Some(meta));
  Ok(table)
}

/// Coerce a scalar-or-list of strings/markers into artifacts for `role`.
///
/// Strings become file artifacts normalized against `dir`; virtual markers
/// must agree with the slot they appear in.
fn parse_artifacts(value: LuaValue, role: Role, dir: &Path) -> LuaResult<Vec<Artifact>> {
  match value {
    LuaValue::Table(table) => {
      if virtual_marker(&table)?.is_some() {
        return Ok(vec![parse_one_artifact(LuaValue::Table(table), role, dir)?]);
      }
      let mut artifacts = Vec::new();
      for item in table.sequence_values::<LuaValue>() {
        artifacts.push(parse_one_artifact(item?, role, dir)?);
      }
      Ok(artifacts)
    }
    value => Ok(vec![parse_one_artifact(value, role, dir)?]),
  }
}

fn parse_one_artifact(value: LuaValue, role: Role, dir: &Path) -> LuaResult<Artifact> {
  match value {
    LuaValue::String(s) => {
      let path = s.to_str()?.to_string();
      Ok(match role {
        Role::Target => Artifact::file_target(&path, dir),
        Role::Dep => Artifact::file_dep(&path, dir),
      })
    }
    LuaValue::Table(table) => {
      let Some((type_name, name)) = virtual_marker(&table)? else {
        return Err(LuaError::external("nested lists are not valid targets or deps"));
      };
      match (type_name.as_str(), role) {
        (VIRTUAL_TARGET_TYPE, Role::Target) => Ok(Artifact::virtual_target(name)),
        (VIRTUAL_DEP_TYPE, Role::Dep) => Ok(Artifact::virtual_dep(name)),
        (VIRTUAL_TARGET_TYPE, Role::Dep) => {
          Err(LuaError::external("a VirtualTarget cannot appear among deps; use VirtualDep"))
        }
        (_, Role::Target) => {
          Err(LuaError::external("a VirtualDep cannot appear among targets; use VirtualTarget"))
        }
        _ => unreachable!("virtual_marker only yields virtual types"),
      }
    }
    other => Err(LuaError::external(format!(
      "targets and deps must be strings or virtual artifacts, got {}",
      other.type_name()
    ))),
  }
}

fn parse_pattern(raw: String) -> LuaResult<Pattern> {
  Pattern::parse(&raw).map_err(LuaError::external)
}

fn parse_pattern_list(value: LuaValue) -> LuaResult<Vec<Pattern>> {
  match value {
    LuaValue::String(s) => Ok(vec![parse_pattern(s.to_str()?.to_string())?]),
    LuaValue::Table(table) => {
      let mut patterns = Vec::new();
      for item in table.sequence_values::<String>() {
        patterns.push(parse_pattern(item?)?);
      }
      Ok(patterns)
    }
    other => Err(LuaError::external(format!(
      "pattern rule 'deps' must be a string or list of strings, got {}",
      other.type_name()
    ))),
  }
}

fn parse_exclude(value: LuaValue, dir: &Path) -> LuaResult<Vec<ArtifactKey>> {
  let LuaValue::Table(table) = value else {
    return Err(LuaError::external("pattern rule 'exclude' must be a list"));
  };
  let mut keys = Vec::new();
  for item in table.sequence_values::<LuaValue>() {
    match item? {
      LuaValue::String(s) => {
        let raw = s.to_str()?.to_string();
        keys.push(ArtifactKey::File(normalize_path(dir, Path::new(&raw))));
      }
      LuaValue::Table(t) => match virtual_marker(&t)? {
        Some((_, name)) => keys.push(ArtifactKey::Virtual(name)),
        None => return Err(LuaError::external("exclude entries must be strings or virtual artifacts")),
      },
      other => {
        return Err(LuaError::external(format!(
          "exclude entries must be strings or virtual artifacts, got {}",
          other.type_name()
        )));
      }
    }
  }
  Ok(keys)
}
