//! Build queue execution.
//!
//! The executor drains a [`BuildQueue`] with a single-coordinator design:
//! the coordinating flow is the only thing that touches the queue and the
//! model, and it parks on worker completion instead of polling. Workers
//! are spawned tasks that each run one self-contained build action — the
//! only place anything happens in parallel, and the reason the queue needs
//! no internal locking.
//!
//! Configure jobs mutate the model (and may grow the job graph), so they
//! run inline in the coordinator rather than on a worker.

pub mod action;
pub mod types;

use std::collections::{HashMap, HashSet};

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::model::target::TargetState;
use crate::model::{BuildJob, BuildModel, BuildQueue};
use crate::symbol::Symbol;

pub use action::{Action, ActionError};
pub use types::{BuildOutcome, ExecError, ExecuteConfig};

pub struct BuildExecutor {
  config: ExecuteConfig,
}

impl BuildExecutor {
  pub fn new(config: ExecuteConfig) -> Self {
    Self { config }
  }

  /// Drain `queue` to completion or to the first unrecoverable failure.
  ///
  /// A target's action never starts before all of its prerequisites have
  /// completed successfully. On an action failure the default policy is
  /// fail-fast: stop dispatching, let in-flight actions finish, and report
  /// aggregate failure; with `keep_going` set, everything whose
  /// prerequisites still succeeded is built and all failures are reported
  /// at the end. Failed actions are never retried.
  ///
  /// # Errors
  ///
  /// [`ExecError::DependencyCycle`] when jobs remain but none can ever
  /// become runnable. Per-target failures are not errors; inspect the
  /// returned [`BuildOutcome`].
  pub async fn execute(&self, model: &mut BuildModel, queue: &mut BuildQueue) -> Result<BuildOutcome, ExecError> {
    let parallelism = self.config.parallelism.max(1);
    let mut outcome = BuildOutcome::default();
    let mut running: JoinSet<(Symbol, Result<(), ActionError>)> = JoinSet::new();
    // Failed or skipped targets; anything depending on one is skipped too.
    let mut dead: HashSet<Symbol> = HashSet::new();
    let mut configure_failures: HashMap<Symbol, ActionError> = HashMap::new();
    let mut halted = false;

    info!(jobs = queue.len(), parallelism, dry_run = self.config.dry_run, "executing build queue");

    loop {
      while !halted && queue.has_runnable() && running.len() < parallelism {
        match queue.dequeue_job() {
          job @ BuildJob::Configure(name) => {
            debug!(target = %name, "configuring");
            if let Err(err) = model.configure_target(queue, name) {
              configure_failures.insert(name, err.into());
            }
            queue.job_completed(job);
          }
          job @ BuildJob::Run(name) => {
            if let Some(err) = configure_failures.remove(&name) {
              error!(target = %name, error = %err, "target failed");
              model.set_target_state(name, TargetState::Failed);
              dead.insert(name);
              outcome.failed.push((name, err));
              queue.job_completed(job);
              if !self.config.keep_going {
                halted = true;
              }
              continue;
            }

            if let Some(&cause) = model.prereqs(name).iter().find(|dep| dead.contains(dep)) {
              warn!(target = %name, cause = %cause, "skipping target: prerequisite failed");
              dead.insert(name);
              outcome.skipped.push((name, cause));
              queue.job_completed(job);
              continue;
            }

            if self.config.dry_run {
              outcome.planned.push(name);
              queue.job_completed(job);
              continue;
            }

            let action = match action::action_for(model, name) {
              Ok(action) => action,
              Err(err) => {
                error!(target = %name, error = %err, "target failed");
                model.set_target_state(name, TargetState::Failed);
                dead.insert(name);
                outcome.failed.push((name, err));
                queue.job_completed(job);
                halted = !self.config.keep_going;
                continue;
              }
            };

            model.set_target_state(name, TargetState::Building);
            running.spawn(async move { (name, action::run_action(action).await) });
          }
        }
      }

      if running.is_empty() {
        if halted || queue.is_empty() {
          break;
        }
        if !queue.has_runnable() {
          // Starvation: jobs remain, nothing can unblock them.
          let mut stuck: Vec<String> = queue
            .tasks()
            .filter_map(|job| match job {
              BuildJob::Run(name) => Some(name.as_str().to_string()),
              BuildJob::Configure(_) => None,
            })
            .collect();
          stuck.sort();
          error!(stuck = ?stuck, "build queue starved");
          return Err(ExecError::DependencyCycle { stuck });
        }
        continue;
      }

      let joined = running.join_next().await.expect("join_next on non-empty set");
      let (name, result) = joined.map_err(|e| ExecError::Worker(e.to_string()))?;
      queue.job_completed(BuildJob::Run(name));

      match result {
        Ok(()) => {
          debug!(target = %name, "target built");
          model.set_target_state(name, TargetState::UpToDate);
          outcome.built.push(name);
        }
        Err(err) => {
          error!(target = %name, error = %err, "target failed");
          model.set_target_state(name, TargetState::Failed);
          dead.insert(name);
          outcome.failed.push((name, err));
          if !self.config.keep_going {
            halted = true;
          }
        }
      }
    }

    if halted {
      outcome.aborted = queue
        .tasks()
        .filter_map(|job| match job {
          BuildJob::Run(name) => Some(name),
          BuildJob::Configure(_) => None,
        })
        .collect();
    }

    info!(
      built = outcome.built.len(),
      failed = outcome.failed.len(),
      skipped = outcome.skipped.len(),
      "build queue drained"
    );
    Ok(outcome)
  }
}
