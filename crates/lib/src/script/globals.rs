//! Global Lua functions registered for build scripts.
//!
//! Declarations are collected into a shared [`ScriptDecls`] during chunk
//! execution; nothing is resolved here.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;

use super::{PropertyDecl, RuleDecl, ScriptDecls, TargetDecl};

/// Register `rule{}`, `target{}` and `property()` plus the `rafter` info
/// table in the given Lua state.
pub fn register_globals(lua: &Lua, decls: Rc<RefCell<ScriptDecls>>) -> LuaResult<()> {
  register_info_table(lua)?;
  register_rule(lua, decls.clone())?;
  register_target(lua, decls.clone())?;
  register_property(lua, decls)?;
  Ok(())
}

/// The `rafter` table: version and host facts scripts can branch on.
fn register_info_table(lua: &Lua) -> LuaResult<()> {
  let info = lua.create_table()?;
  info.set("version", env!("CARGO_PKG_VERSION"))?;
  info.set("os", std::env::consts::OS)?;
  info.set("arch", std::env::consts::ARCH)?;
  lua.globals().set("rafter", info)?;
  Ok(())
}

fn register_rule(lua: &Lua, decls: Rc<RefCell<ScriptDecls>>) -> LuaResult<()> {
  let rule_fn = lua.create_function(move |_, spec: LuaTable| {
    let name: String = spec
      .get::<Option<String>>("name")?
      .ok_or_else(|| LuaError::runtime("rule{} requires a 'name' field"))?;
    let command: String = spec
      .get::<Option<String>>("command")?
      .ok_or_else(|| LuaError::runtime(format!("rule '{name}' requires a 'command' field")))?;
    let description: Option<String> = spec.get("description")?;

    decls.borrow_mut().rules.push(RuleDecl {
      name,
      command,
      description,
    });
    Ok(())
  })?;

  lua.globals().set("rule", rule_fn)
}

fn register_target(lua: &Lua, decls: Rc<RefCell<ScriptDecls>>) -> LuaResult<()> {
  let target_fn = lua.create_function(move |_, spec: LuaTable| {
    let name: String = spec
      .get::<Option<String>>("name")?
      .ok_or_else(|| LuaError::runtime("target{} requires a 'name' field"))?;
    let rule: String = spec
      .get::<Option<String>>("rule")?
      .ok_or_else(|| LuaError::runtime(format!("target '{name}' requires a 'rule' field")))?;

    let decl = TargetDecl {
      name,
      rule,
      srcs: string_list(&spec, "srcs")?,
      deps: string_list(&spec, "deps")?,
      outputs: string_list(&spec, "outputs")?,
    };

    decls.borrow_mut().targets.push(decl);
    Ok(())
  })?;

  lua.globals().set("target", target_fn)
}

fn register_property(lua: &Lua, decls: Rc<RefCell<ScriptDecls>>) -> LuaResult<()> {
  let property_fn = lua.create_function(move |_, (name, value): (String, String)| {
    decls.borrow_mut().properties.push(PropertyDecl { name, value });
    Ok(())
  })?;

  lua.globals().set("property", property_fn)
}

/// Read an optional array-of-strings field.
fn string_list(spec: &LuaTable, field: &str) -> LuaResult<Vec<String>> {
  match spec.get::<Option<LuaTable>>(field)? {
    Some(table) => table.sequence_values::<String>().collect(),
    None => Ok(Vec::new()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lua_with_decls() -> (Lua, Rc<RefCell<ScriptDecls>>) {
    let lua = Lua::new();
    let decls = Rc::new(RefCell::new(ScriptDecls::default()));
    register_globals(&lua, decls.clone()).unwrap();
    (lua, decls)
  }

  #[test]
  fn info_table_is_populated() {
    let (lua, _decls) = lua_with_decls();
    let info: LuaTable = lua.globals().get("rafter").unwrap();
    let version: String = info.get("version").unwrap();
    assert!(!version.is_empty());
  }

  #[test]
  fn rule_without_command_is_rejected() {
    let (lua, _decls) = lua_with_decls();
    let result = lua.load(r#"rule { name = "broken" }"#).exec();
    assert!(result.is_err());
  }

  #[test]
  fn non_string_src_entry_is_rejected() {
    let (lua, _decls) = lua_with_decls();
    let result = lua
      .load(r#"target { name = "t", rule = "r", srcs = { {} } }"#)
      .exec();
    assert!(result.is_err());
  }

  #[test]
  fn declarations_accumulate_in_script_order() {
    let (lua, decls) = lua_with_decls();
    lua
      .load(
        r#"
          target { name = "first", rule = "phony" }
          target { name = "second", rule = "phony" }
        "#,
      )
      .exec()
      .unwrap();

    let decls = decls.borrow();
    assert_eq!(decls.targets[0].name, "first");
    assert_eq!(decls.targets[1].name, "second");
  }
}
