//! Targets: the concrete buildable entities of the model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// Staleness / execution state of a target.
///
/// `Building`, `UpToDate` and `Failed` are runtime states driven by the
/// executor; states are not persisted — a loaded model starts every target
/// back at `Unknown` and recomputes staleness from the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
  #[default]
  Unknown,
  UpToDate,
  Stale,
  Building,
  Failed,
}

/// A named buildable entity bound to one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
  pub name: Symbol,
  /// Bound rule name; guaranteed present in the rule dictionary after
  /// resolution.
  pub rule: Symbol,
  /// Source files, relative to the source root.
  pub srcs: Vec<String>,
  /// Resolved prerequisite targets. Grows when configuration expands
  /// deferred dependencies.
  pub deps: Vec<Symbol>,
  /// Dependency templates still containing `${...}`; expanded by the
  /// configure step against the property set.
  pub deferred_deps: Vec<String>,
  /// Declared outputs, relative to the build root.
  pub outputs: Vec<String>,
  /// True once the rule's dependency derivation has run (or was never
  /// needed). An unconfigured target cannot be considered buildable yet.
  pub configured: bool,
  /// Script that declared this target, for error context.
  pub script: PathBuf,
  #[serde(skip)]
  pub state: TargetState,
}

impl Target {
  /// The outputs this target produces: the declared list, or the target
  /// name itself when nothing is declared and the rule writes output.
  pub fn effective_outputs(&self) -> Vec<&str> {
    if self.outputs.is_empty() {
      vec![self.name.as_str()]
    } else {
      self.outputs.iter().map(String::as_str).collect()
    }
  }

  pub fn needs_configure(&self) -> bool {
    !self.configured
  }
}
