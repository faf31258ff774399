//! Build rules: the transformers attached to targets.
//!
//! A rule turns a target into its concrete build step. The built-in
//! variants cover aggregation (`phony`) and file copying (`copy`);
//! everything else comes from `rule{}` declarations in build scripts as
//! command templates. Rules are plain data so they round-trip through the
//! model cache; dispatch is a match, not a vtable.

use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// Rule names reserved for the built-in variants.
pub const PHONY_RULE: &str = "phony";
pub const COPY_RULE: &str = "copy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
  /// Aggregate-only: no action, no outputs, never up to date.
  Phony,
  /// Copy the target's single source to its output path.
  Copy,
  /// User-defined command rule; the template expands `${...}` against the
  /// property set plus `${target}`, `${srcs}` and `${outs}`.
  Command {
    command: String,
    description: Option<String>,
  },
}

impl Rule {
  /// The two built-in rules every model starts with.
  pub fn builtins() -> [(Symbol, Rule); 2] {
    [
      (Symbol::intern(PHONY_RULE), Rule::Phony),
      (Symbol::intern(COPY_RULE), Rule::Copy),
    ]
  }

  /// Whether targets bound to this rule produce filesystem outputs.
  pub fn produces_output(&self) -> bool {
    !matches!(self, Rule::Phony)
  }
}
