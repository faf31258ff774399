//! rafter: an incremental, dependency-driven build tool.

mod cmd;
mod exit;

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::BuildOptions;
use exit::ExitCode;

#[derive(Parser)]
#[command(name = "rafter")]
#[command(version, about = "Incremental, dependency-driven build tool", long_about = None)]
struct Cli {
  /// Set a property (user-forced), e.g. -Dcc=clang
  #[arg(short = 'D', value_name = "PROP=VALUE")]
  define: Vec<String>,

  /// Unset a previously set property
  #[arg(short = 'U', value_name = "PROP")]
  undefine: Vec<String>,

  /// Compute the job graph but do not execute it
  #[arg(short = 'n', long = "dry-run")]
  dry_run: bool,

  /// Number of parallel jobs (defaults to the CPU count)
  #[arg(short = 'j', long = "jobs", value_name = "N")]
  jobs: Option<usize>,

  /// Keep building targets not affected by a failure
  #[arg(short = 'k', long = "keep-going")]
  keep_going: bool,

  #[command(subcommand)]
  command: Option<Command>,

  /// Goal targets (defaults to "all")
  #[arg(value_name = "TARGET")]
  targets: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
  /// Initialize the current directory as a build root for a source tree
  Init {
    /// Top of the source tree
    source_dir: PathBuf,
  },

  /// Build a target, then execute its output
  Run {
    /// Target to build and run
    target: String,

    /// Arguments passed to the target
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
  },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
      let _ = e.print();
      return ExitCode::Ok.into();
    }
    Err(e) => {
      let _ = e.print();
      return ExitCode::User.into();
    }
  };

  let opts = BuildOptions {
    defines: cli.define,
    undefines: cli.undefine,
    dry_run: cli.dry_run,
    jobs: cli.jobs,
    keep_going: cli.keep_going,
  };

  let code = match cli.command {
    Some(Command::Init { source_dir }) => cmd::cmd_init(&source_dir).await,
    Some(Command::Run { target, args }) => cmd::cmd_run(&target, &args, &opts).await,
    None => cmd::cmd_build(&cli.targets, &opts).await,
  };
  code.into()
}
