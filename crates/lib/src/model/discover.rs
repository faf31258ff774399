//! Build root discovery.
//!
//! Starting from a directory, walk upward until either a cached model is
//! found (an existing build root) or the topmost directory containing a
//! build script is found (the source root for a fresh model). Reaching the
//! filesystem root with neither is the "no build files" condition.
//!
//! Existence probes that fail for permission or path reasons read as
//! "not present"; they are never propagated.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::{BUILD_FILENAME, CACHED_MODEL};

#[derive(Debug, Error)]
pub enum DiscoverError {
  #[error("no build files found above {}", .0.display())]
  NoBuildFiles(PathBuf),
}

/// What the upward walk found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered {
  /// An existing build root; the path is the cached model file to load.
  CachedModel { build_root: PathBuf, model_file: PathBuf },
  /// No cache anywhere above; the topmost directory with a build script.
  SourceRoot(PathBuf),
}

/// Walk upward from `start` per the root discovery protocol.
///
/// # Errors
///
/// [`DiscoverError::NoBuildFiles`] when the filesystem root is reached
/// without finding a cached model or any build script.
pub fn discover_root(start: &Path) -> Result<Discovered, DiscoverError> {
  let start = dunce::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
  let mut top_source: Option<PathBuf> = None;

  let mut dir: &Path = &start;
  loop {
    let model_file = dir.join(CACHED_MODEL);
    if model_file.is_file() {
      debug!(build_root = %dir.display(), "found cached model");
      return Ok(Discovered::CachedModel {
        build_root: dir.to_path_buf(),
        model_file,
      });
    }
    if dir.join(BUILD_FILENAME).is_file() {
      top_source = Some(dir.to_path_buf());
    }

    match dir.parent() {
      Some(parent) => dir = parent,
      None => break,
    }
  }

  match top_source {
    Some(root) => {
      debug!(source_root = %root.display(), "found source root");
      Ok(Discovered::SourceRoot(root))
    }
    None => Err(DiscoverError::NoBuildFiles(start)),
  }
}
