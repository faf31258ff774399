//! Concrete build actions.
//!
//! A target's rule materializes into one [`Action`] at dispatch time:
//! nothing for phony aggregates, a file copy, or a shell command with its
//! `${...}` template fully expanded. Actions are self-contained values so
//! workers can run them without touching the model.

use std::path::PathBuf;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::model::expand::{ExpandError, ExpandScope, expand};
use crate::model::rule::Rule;
use crate::model::{BuildModel, ConfigureError};
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
  /// Phony targets: completing the job is the whole action.
  Nothing,

  /// Copy one source file to one output path.
  Copy { src: PathBuf, dest: PathBuf },

  /// Run an expanded command line through the shell.
  Command {
    command: String,
    cwd: PathBuf,
    /// Output paths whose parent directories must exist before the
    /// command runs.
    outputs: Vec<PathBuf>,
  },
}

#[derive(Debug, Error)]
pub enum ActionError {
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Expand(#[from] ExpandError),

  #[error("configuration failed: {0}")]
  Configure(#[from] ConfigureError),
}

/// Materialize the build action for `name` from its rule.
///
/// # Errors
///
/// Command template expansion can fail on undefined properties; that is an
/// execution error for this target, not a model error.
pub fn action_for(model: &BuildModel, name: Symbol) -> Result<Action, ActionError> {
  let target = model.target(name).expect("action for unknown target");

  match model.rule_of(target) {
    Rule::Phony => Ok(Action::Nothing),
    Rule::Copy => Ok(Action::Copy {
      src: model.src_path(&target.srcs[0]),
      dest: model.out_path(target.effective_outputs()[0]),
    }),
    Rule::Command { command, description } => {
      let srcs: Vec<String> = target
        .srcs
        .iter()
        .map(|s| model.src_path(s).display().to_string())
        .collect();
      let outputs: Vec<PathBuf> = target.effective_outputs().iter().map(|o| model.out_path(o)).collect();
      let outs: Vec<String> = outputs.iter().map(|p| p.display().to_string()).collect();

      let scope = ExpandScope::default()
        .with("target", name.as_str())
        .with("srcs", srcs.join(" "))
        .with("outs", outs.join(" "));
      let command = expand(command, model.properties(), &scope)?;

      if let Some(description) = description {
        info!(target = %name, "{description}");
      }

      Ok(Action::Command {
        command,
        cwd: model.build_root().to_path_buf(),
        outputs,
      })
    }
  }
}

/// Run one action to completion.
pub async fn run_action(action: Action) -> Result<(), ActionError> {
  match action {
    Action::Nothing => Ok(()),
    Action::Copy { src, dest } => {
      debug!(src = %src.display(), dest = %dest.display(), "copying");
      if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
      tokio::fs::copy(&src, &dest).await?;
      Ok(())
    }
    Action::Command { command, cwd, outputs } => {
      for output in &outputs {
        if let Some(parent) = output.parent() {
          tokio::fs::create_dir_all(parent).await?;
        }
      }

      debug!(cmd = %command, cwd = %cwd.display(), "running command");
      let (shell, shell_arg) = shell();
      let output = Command::new(shell).arg(shell_arg).arg(&command).current_dir(&cwd).output().await?;

      if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
          debug!(stderr = %stderr, "command stderr");
        }
        return Err(ActionError::CmdFailed {
          cmd: command,
          code: output.status.code(),
        });
      }
      Ok(())
    }
  }
}

#[cfg(unix)]
fn shell() -> (&'static str, &'static str) {
  ("/bin/sh", "-c")
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static str) {
  ("cmd.exe", "/C")
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  fn model_with_script(script: &str) -> (tempfile::TempDir, BuildModel) {
    let dir = tempdir().unwrap();
    let root = dunce::canonicalize(dir.path()).unwrap();
    fs::write(root.join("BUILD"), script).unwrap();

    let mut model = BuildModel::new(root.clone(), root);
    model.ensure_up_to_date().unwrap();
    (dir, model)
  }

  #[test]
  fn phony_target_has_no_action() {
    let (_dir, model) = model_with_script(r#"target { name = "all", rule = "phony" }"#);
    let action = action_for(&model, Symbol::intern("all")).unwrap();
    assert_eq!(action, Action::Nothing);
  }

  #[test]
  fn command_template_expands_srcs_outs_and_properties() {
    let (_dir, model) = model_with_script(
      r#"
        rule { name = "cc", command = "${compiler} -c ${srcs} -o ${outs}" }
        target { name = "main.o", rule = "cc", srcs = { "main.c" } }
        property("compiler", "gcc")
      "#,
    );

    let action = action_for(&model, Symbol::intern("main.o")).unwrap();
    match action {
      Action::Command { command, .. } => {
        let src = model.src_path("main.c").display().to_string();
        let out = model.out_path("main.o").display().to_string();
        assert_eq!(command, format!("gcc -c {src} -o {out}"));
      }
      other => panic!("expected command, got {other:?}"),
    }
  }

  #[test]
  fn undefined_property_in_template_is_an_action_error() {
    let (_dir, model) = model_with_script(
      r#"
        rule { name = "cc", command = "${missing} ${srcs}" }
        target { name = "x.o", rule = "cc", srcs = { "x.c" } }
      "#,
    );

    let err = action_for(&model, Symbol::intern("x.o")).unwrap_err();
    assert!(matches!(err, ActionError::Expand(ExpandError::Undefined(_))));
  }

  #[tokio::test]
  async fn copy_action_copies() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("in.txt");
    let dest = dir.path().join("nested/out.txt");
    fs::write(&src, "payload").unwrap();

    run_action(Action::Copy {
      src: src.clone(),
      dest: dest.clone(),
    })
    .await
    .unwrap();

    assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
  }

  #[tokio::test]
  async fn command_action_runs_in_cwd() {
    let dir = tempdir().unwrap();
    let cwd = dir.path().to_path_buf();

    run_action(Action::Command {
      command: "echo made > marker.txt".to_string(),
      cwd: cwd.clone(),
      outputs: vec![],
    })
    .await
    .unwrap();

    assert!(cwd.join("marker.txt").exists());
  }

  #[tokio::test]
  async fn failing_command_reports_exit_code() {
    let dir = tempdir().unwrap();

    let err = run_action(Action::Command {
      command: "exit 3".to_string(),
      cwd: dir.path().to_path_buf(),
      outputs: vec![],
    })
    .await
    .unwrap_err();

    assert!(matches!(err, ActionError::CmdFailed { code: Some(3), .. }));
  }
}
