//! Build script evaluation.
//!
//! `BUILD` files are Lua chunks. Evaluating one yields a flat set of
//! declarations — rules, targets, property defaults — with no references
//! resolved: scripts may freely forward-reference names defined in other
//! files, and the model binds everything in a single deferred pass.
//!
//! The registered globals are:
//!
//! ```lua
//! rule { name = "compile", command = "cc -c ${srcs} -o ${outs}" }
//!
//! target {
//!   name = "hello.o",
//!   rule = "compile",
//!   srcs = { "hello.c" },
//!   deps = { "generated.h" },
//! }
//!
//! property("cc", "cc")
//! ```
//!
//! Dependency entries may contain `${property}` placeholders; those are
//! left symbolic here and expanded when the target is configured.

mod globals;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A user-defined rule declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDecl {
  pub name: String,
  /// Command template; `${...}` placeholders expand at job time.
  pub command: String,
  pub description: Option<String>,
}

/// A target declaration, unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDecl {
  pub name: String,
  /// Rule name; bound during model resolution.
  pub rule: String,
  /// Source files, relative to the source root.
  pub srcs: Vec<String>,
  /// Prerequisite target names. Entries containing `${` defer expansion
  /// to configuration time.
  pub deps: Vec<String>,
  /// Output files, relative to the build root. Defaults to the target
  /// name itself when empty and the rule produces output.
  pub outputs: Vec<String>,
}

/// A script-derived property default (non-hard).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
  pub name: String,
  pub value: String,
}

/// Everything one build script declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptDecls {
  pub rules: Vec<RuleDecl>,
  pub targets: Vec<TargetDecl>,
  pub properties: Vec<PropertyDecl>,
}

/// Errors from evaluating a build script.
///
/// Lua errors are captured as rendered text so the error type stays
/// `Send + Sync` across the executor boundary.
#[derive(Debug, Error)]
pub enum ScriptError {
  #[error("build script not found: {}", .0.display())]
  NotFound(PathBuf),

  #[error("cannot read build script {}: {}", .path.display(), .source)]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("error in build script {}: {}", .path.display(), .message)]
  Eval { path: PathBuf, message: String },
}

/// Evaluate one build script file into its declarations.
///
/// # Errors
///
/// Returns [`ScriptError::NotFound`] for a missing file, and
/// [`ScriptError::Eval`] with the script path for any Lua-level failure
/// (syntax errors, bad declaration shapes).
pub fn evaluate_script(path: &Path) -> Result<ScriptDecls, ScriptError> {
  if !path.is_file() {
    return Err(ScriptError::NotFound(path.to_path_buf()));
  }

  let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  evaluate_source(&source, path)
}

/// Evaluate build script source text. The path is used for chunk naming and
/// error context only.
pub fn evaluate_source(source: &str, path: &Path) -> Result<ScriptDecls, ScriptError> {
  let lua = Lua::new();
  let decls = Rc::new(RefCell::new(ScriptDecls::default()));

  globals::register_globals(&lua, decls.clone()).map_err(|e| ScriptError::Eval {
    path: path.to_path_buf(),
    message: e.to_string(),
  })?;

  lua
    .load(source)
    .set_name(format!("@{}", path.display()))
    .exec()
    .map_err(|e| ScriptError::Eval {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;

  // The Lua globals still hold clones of the collector; copy out.
  let decls = decls.borrow().clone();
  debug!(
    script = %path.display(),
    rules = decls.rules.len(),
    targets = decls.targets.len(),
    properties = decls.properties.len(),
    "evaluated build script"
  );

  Ok(decls)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn eval(source: &str) -> ScriptDecls {
    evaluate_source(source, Path::new("BUILD")).unwrap()
  }

  #[test]
  fn collects_rule_declarations() {
    let decls = eval(
      r#"
        rule { name = "compile", command = "cc -c ${srcs} -o ${outs}" }
        rule { name = "link", command = "cc ${srcs} -o ${outs}", description = "linking" }
      "#,
    );

    assert_eq!(decls.rules.len(), 2);
    assert_eq!(decls.rules[0].name, "compile");
    assert_eq!(decls.rules[1].description.as_deref(), Some("linking"));
  }

  #[test]
  fn collects_target_declarations() {
    let decls = eval(
      r#"
        target {
          name = "hello.o",
          rule = "compile",
          srcs = { "hello.c" },
          deps = { "generated.h" },
          outputs = { "hello.o" },
        }
      "#,
    );

    assert_eq!(decls.targets.len(), 1);
    let t = &decls.targets[0];
    assert_eq!(t.name, "hello.o");
    assert_eq!(t.rule, "compile");
    assert_eq!(t.srcs, vec!["hello.c"]);
    assert_eq!(t.deps, vec!["generated.h"]);
    assert_eq!(t.outputs, vec!["hello.o"]);
  }

  #[test]
  fn optional_target_fields_default_empty() {
    let decls = eval(r#"target { name = "all", rule = "phony" }"#);

    let t = &decls.targets[0];
    assert!(t.srcs.is_empty());
    assert!(t.deps.is_empty());
    assert!(t.outputs.is_empty());
  }

  #[test]
  fn collects_property_defaults() {
    let decls = eval(r#"property("cc", "gcc")"#);

    assert_eq!(decls.properties.len(), 1);
    assert_eq!(decls.properties[0].name, "cc");
    assert_eq!(decls.properties[0].value, "gcc");
  }

  #[test]
  fn scripts_can_use_plain_lua() {
    let decls = eval(
      r#"
        local objects = { "a.o", "b.o" }
        for _, obj in ipairs(objects) do
          target { name = obj, rule = "compile", srcs = { obj:gsub("%.o$", ".c") } }
        end
      "#,
    );

    assert_eq!(decls.targets.len(), 2);
    assert_eq!(decls.targets[0].srcs, vec!["a.c"]);
  }

  #[test]
  fn target_without_name_is_an_error() {
    let err = evaluate_source(r#"target { rule = "phony" }"#, Path::new("BUILD")).unwrap_err();
    assert!(matches!(err, ScriptError::Eval { .. }));
    assert!(err.to_string().contains("name"));
  }

  #[test]
  fn syntax_error_carries_script_path() {
    let err = evaluate_source("target {", Path::new("sub/BUILD")).unwrap_err();
    match err {
      ScriptError::Eval { path, .. } => assert_eq!(path, Path::new("sub/BUILD")),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn missing_file_is_not_found() {
    let err = evaluate_script(Path::new("/nonexistent/BUILD")).unwrap_err();
    assert!(matches!(err, ScriptError::NotFound(_)));
  }
}
