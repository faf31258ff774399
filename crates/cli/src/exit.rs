//! Process exit codes.

/// Possible exit codes from the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
  /// Success.
  Ok = 0,
  /// Command-line option error.
  User = 1,
  /// No build files found.
  NoBuild = 2,
  /// Invalid build files (parse, resolve or cycle errors).
  BadBuild = 3,
  /// Requested target not in the build.
  NoTarget = 4,
  /// A build action failed.
  BuildFailed = 5,
}

impl From<ExitCode> for std::process::ExitCode {
  fn from(code: ExitCode) -> std::process::ExitCode {
    std::process::ExitCode::from(code as u8)
  }
}
