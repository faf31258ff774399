//! Command implementations for the rafter driver.
//!
//! Every function here maps structured errors from the core onto exit
//! codes; the core itself never prints.

use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use tracing::warn;

use rafter_lib::consts::{BUILD_FILENAME, CACHED_MODEL, USER_PROPERTIES};
use rafter_lib::exec::{BuildExecutor, ExecError, ExecuteConfig};
use rafter_lib::model::discover::{DiscoverError, Discovered, discover_root};
use rafter_lib::model::property::read_properties_file;
use rafter_lib::model::{BuildModel, BuildQueue, ModelError};
use rafter_lib::symbol::Symbol;

use crate::exit::ExitCode;

/// Options shared by the build-like commands.
pub struct BuildOptions {
  pub defines: Vec<String>,
  pub undefines: Vec<String>,
  pub dry_run: bool,
  pub jobs: Option<usize>,
  pub keep_going: bool,
}

fn error(message: impl std::fmt::Display) {
  eprintln!("{} {message}", "error:".red().bold());
}

/// Build the requested goal targets (default `all`).
pub async fn cmd_build(targets: &[String], opts: &BuildOptions) -> ExitCode {
  let mut model = match open_model(opts) {
    Ok(model) => model,
    Err(code) => return code,
  };

  let goals: Vec<String> = if targets.is_empty() {
    vec!["all".to_string()]
  } else {
    targets.to_vec()
  };

  let code = build_goals(&mut model, &goals, opts).await;
  persist(&mut model);
  code
}

/// Initialize a build directory for the given source tree: the current
/// directory becomes the build root and gets a seeded model cache.
pub async fn cmd_init(source_dir: &Path) -> ExitCode {
  let build_root = match std::env::current_dir() {
    Ok(dir) => dir,
    Err(e) => {
      error(format_args!("cannot determine current directory: {e}"));
      return ExitCode::User;
    }
  };
  let source_root = match dunce::canonicalize(source_dir) {
    Ok(dir) => dir,
    Err(e) => {
      error(format_args!("invalid source directory {}: {e}", source_dir.display()));
      return ExitCode::User;
    }
  };
  if !source_root.join(BUILD_FILENAME).is_file() {
    error(format_args!("no build files in {}", source_root.display()));
    return ExitCode::NoBuild;
  }

  let mut model = BuildModel::new(source_root, build_root.clone());
  if let Err(code) = refresh(&mut model) {
    return code;
  }

  let cache = build_root.join(CACHED_MODEL);
  if let Err(e) = model.save_to(&cache) {
    error(e);
    return ExitCode::User;
  }

  eprintln!("{} initialized build directory at {}", "::".cyan().bold(), build_root.display());
  ExitCode::Ok
}

/// Build one target, then execute its first output with the given
/// arguments, propagating the child's exit status.
pub async fn cmd_run(target: &str, args: &[String], opts: &BuildOptions) -> ExitCode {
  let mut model = match open_model(opts) {
    Ok(model) => model,
    Err(code) => return code,
  };

  let code = build_goals(&mut model, &[target.to_string()], opts).await;
  persist(&mut model);
  if code != ExitCode::Ok {
    return code;
  }

  let sym = Symbol::intern(target);
  let Some(t) = model.target(sym) else {
    error(format_args!("target not found: {target}"));
    return ExitCode::NoTarget;
  };
  let program = model.out_path(t.effective_outputs()[0]);

  match std::process::Command::new(&program).args(args).status() {
    Ok(status) => {
      let code = status.code().unwrap_or(1);
      // Forward the child's status verbatim.
      std::process::exit(code);
    }
    Err(e) => {
      error(format_args!("cannot run {}: {e}", program.display()));
      ExitCode::BuildFailed
    }
  }
}

/// Discover the build root and bring the model up to date with the
/// property overrides applied.
fn open_model(opts: &BuildOptions) -> Result<BuildModel, ExitCode> {
  let cwd = std::env::current_dir().map_err(|e| {
    error(format_args!("cannot determine current directory: {e}"));
    ExitCode::User
  })?;

  let mut model = match discover_root(&cwd) {
    Ok(Discovered::CachedModel { model_file, .. }) => BuildModel::load(&model_file).map_err(|e| {
      error(e);
      ExitCode::BadBuild
    })?,
    Ok(Discovered::SourceRoot(root)) => BuildModel::new(root.clone(), root),
    Err(e @ DiscoverError::NoBuildFiles(_)) => {
      error(e);
      return Err(ExitCode::NoBuild);
    }
  };

  apply_properties(&mut model, opts)?;
  refresh(&mut model)?;
  Ok(model)
}

/// Apply `build.properties` then the command-line overrides, all hard.
fn apply_properties(model: &mut BuildModel, opts: &BuildOptions) -> Result<(), ExitCode> {
  let user_file = model.source_root().join(USER_PROPERTIES);
  if user_file.is_file() {
    match read_properties_file(&user_file) {
      Ok(pairs) => {
        for (name, value) in pairs {
          model.set_property(&name, &value, true);
        }
      }
      Err(e) => warn!(file = %user_file.display(), error = %e, "ignoring unreadable properties file"),
    }
  }

  for define in &opts.defines {
    let Some((name, value)) = define.split_once('=') else {
      error(format_args!("malformed -D option '{define}' (expected PROP=VALUE)"));
      return Err(ExitCode::User);
    };
    model.set_property(name, value, true);
  }
  for name in &opts.undefines {
    model.clear_property(name, true);
  }
  Ok(())
}

fn refresh(model: &mut BuildModel) -> Result<(), ExitCode> {
  match model.ensure_up_to_date() {
    Ok(_) => Ok(()),
    Err(ModelError::Resolve { errors }) => {
      for e in &errors {
        error(e);
      }
      Err(ExitCode::BadBuild)
    }
    Err(e) => {
      error(e);
      Err(ExitCode::BadBuild)
    }
  }
}

/// Queue the goals and drain the queue, reporting the outcome.
async fn build_goals(model: &mut BuildModel, goals: &[String], opts: &BuildOptions) -> ExitCode {
  let mut queue = BuildQueue::new();
  for goal in goals {
    if !model.queue_target(&mut queue, goal) {
      error(format_args!("target not found: {goal}"));
      return ExitCode::NoTarget;
    }
  }

  let config = ExecuteConfig {
    parallelism: opts.jobs.unwrap_or_else(|| ExecuteConfig::default().parallelism),
    keep_going: opts.keep_going,
    dry_run: opts.dry_run,
  };

  let outcome = match BuildExecutor::new(config).execute(model, &mut queue).await {
    Ok(outcome) => outcome,
    Err(e @ ExecError::DependencyCycle { .. }) => {
      error(e);
      return ExitCode::BadBuild;
    }
    Err(e) => {
      error(e);
      return ExitCode::BuildFailed;
    }
  };

  if opts.dry_run {
    for target in &outcome.planned {
      println!("{target}");
    }
  }

  if !outcome.is_success() {
    for (target, cause) in &outcome.failed {
      error(format_args!("{target}: {cause}"));
    }
    for (target, dep) in &outcome.skipped {
      eprintln!("{} {target}: skipped, prerequisite {dep} failed", "warning:".yellow().bold());
    }
    return ExitCode::BuildFailed;
  }

  if !opts.dry_run {
    eprintln!("{} built {} target(s)", "::".green().bold(), outcome.built.len());
  }
  ExitCode::Ok
}

/// Save the model back if anything changed; a failed save is a warning,
/// not a build failure.
fn persist(model: &mut BuildModel) {
  if !model.is_dirty() {
    return;
  }
  let cache: PathBuf = model.default_cache_file();
  if let Err(e) = model.save_to(&cache) {
    warn!(cache = %cache.display(), error = %e, "could not save model cache");
  }
}
