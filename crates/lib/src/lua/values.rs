//! Conversions between Lua values and keyword-argument values.

use std::collections::BTreeMap;

use mlua::prelude::*;

use crate::builder::Kwarg;

/// Convert a Lua value into a `Kwarg`.
///
/// Sequential tables become arrays, other tables become string-keyed maps.
/// Functions, userdata, and nil are rejected: kwargs must survive outside
/// the call that created them.
pub fn lua_value_to_kwarg(value: LuaValue) -> LuaResult<Kwarg> {
  match value {
    LuaValue::String(s) => Ok(Kwarg::String(s.to_str()?.to_string())),
    LuaValue::Integer(i) => Ok(Kwarg::Number(i as f64)),
    LuaValue::Number(n) => Ok(Kwarg::Number(n)),
    LuaValue::Boolean(b) => Ok(Kwarg::Boolean(b)),
    LuaValue::Table(t) => {
      let len = t.raw_len();
      if len > 0 {
        let mut array = Vec::with_capacity(len);
        for i in 1..=len {
          let item: LuaValue = t.get(i)?;
          array.push(lua_value_to_kwarg(item)?);
        }
        Ok(Kwarg::Array(array))
      } else {
        let mut map = BTreeMap::new();
        for pair in t.pairs::<String, LuaValue>() {
          let (k, v) = pair?;
          map.insert(k, lua_value_to_kwarg(v)?);
        }
        Ok(Kwarg::Table(map))
      }
    }
    other => Err(LuaError::external(format!(
      "unsupported keyword argument type: {}",
      other.type_name()
    ))),
  }
}

/// Convert a `Kwarg` back into a Lua value.
pub fn kwarg_to_lua(lua: &Lua, kwarg: &Kwarg) -> LuaResult<LuaValue> {
  match kwarg {
    Kwarg::String(s) => Ok(LuaValue::String(lua.create_string(s)?)),
    Kwarg::Number(n) => Ok(LuaValue::Number(*n)),
    Kwarg::Boolean(b) => Ok(LuaValue::Boolean(*b)),
    Kwarg::Array(items) => {
      let table = lua.create_table()?;
      for (i, item) in items.iter().enumerate() {
        table.set(i + 1, kwarg_to_lua(lua, item)?)?;
      }
      Ok(LuaValue::Table(table))
    }
    Kwarg::Table(map) => {
      let table = lua.create_table()?;
      for (k, v) in map {
        table.set(k.as_str(), kwarg_to_lua(lua, v)?)?;
      }
      Ok(LuaValue::Table(table))
    }
  }
}
