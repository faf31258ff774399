//! Executor configuration, errors and the aggregate build outcome.

use thiserror::Error;

use crate::symbol::Symbol;

use super::action::ActionError;

/// Configuration for draining a build queue.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of build actions in flight at once.
  pub parallelism: usize,

  /// Keep building targets not downstream of a failure instead of
  /// stopping at the first one.
  pub keep_going: bool,

  /// Compute and drain the job graph without running any action.
  pub dry_run: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
      keep_going: false,
      dry_run: false,
    }
  }
}

/// Errors that abort queue execution outright. Per-target action failures
/// are not errors at this level; they are aggregated in [`BuildOutcome`].
#[derive(Debug, Error)]
pub enum ExecError {
  /// Jobs remained in the queue with nothing runnable and nothing in
  /// flight: the signature of a dependency cycle.
  #[error("dependency cycle among: {}", .stuck.join(", "))]
  DependencyCycle { stuck: Vec<String> },

  #[error("build worker panicked: {0}")]
  Worker(String),
}

/// Aggregate result of draining one build queue.
#[derive(Debug, Default)]
pub struct BuildOutcome {
  /// Targets whose actions completed successfully, in completion order.
  pub built: Vec<Symbol>,

  /// Targets whose action (or configuration) failed. Fail-fast mode holds
  /// at most one entry; keep-going mode may hold several.
  pub failed: Vec<(Symbol, ActionError)>,

  /// Targets never run because a prerequisite failed, with the
  /// prerequisite that caused the skip.
  pub skipped: Vec<(Symbol, Symbol)>,

  /// Dry-run only: the targets that would build, in dispatch order.
  pub planned: Vec<Symbol>,

  /// Fail-fast only: targets left undispatched when execution stopped.
  pub aborted: Vec<Symbol>,
}

impl BuildOutcome {
  /// Success means every queued job completed successfully.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty() && self.aborted.is_empty()
  }

  pub fn first_failure(&self) -> Option<&(Symbol, ActionError)> {
    self.failed.first()
  }
}
