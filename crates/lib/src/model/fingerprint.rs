//! Change fingerprints for build script files.
//!
//! A fingerprint records length, modification time and a SHA-256 content
//! hash. Staleness checks compare length and mtime first and only fall
//! back to rehashing when the cheap fields disagree, so an unchanged tree
//! costs one `stat` per script.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
  len: u64,
  mtime_nanos: u64,
  sha256: String,
}

impl Fingerprint {
  /// Capture the current fingerprint of `path`.
  pub fn capture(path: &Path) -> std::io::Result<Fingerprint> {
    let metadata = fs::metadata(path)?;
    let mtime_nanos = metadata
      .modified()?
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_nanos() as u64)
      .unwrap_or(0);

    let content = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    let sha256 = format!("{:x}", hasher.finalize());

    Ok(Fingerprint {
      len: metadata.len(),
      mtime_nanos,
      sha256,
    })
  }

  /// Whether the file at `path` still matches this fingerprint.
  ///
  /// Any probe failure (missing file, permission) reads as "changed" —
  /// the caller re-parses and surfaces the real error there.
  pub fn matches(&self, path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
      return false;
    };
    if metadata.len() != self.len {
      return false;
    }

    let mtime_nanos = metadata
      .modified()
      .ok()
      .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
      .map(|d| d.as_nanos() as u64);
    if mtime_nanos == Some(self.mtime_nanos) {
      return true;
    }

    // mtime moved but the size is identical: confirm via content hash so
    // a touch(1) does not force a re-parse.
    let Ok(content) = fs::read(path) else {
      return false;
    };
    let mut hasher = Sha256::new();
    hasher.update(&content);
    format!("{:x}", hasher.finalize()) == self.sha256
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn unchanged_file_matches() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("BUILD");
    fs::write(&path, "target { name = 'all', rule = 'phony' }").unwrap();

    let fp = Fingerprint::capture(&path).unwrap();
    assert!(fp.matches(&path));
  }

  #[test]
  fn content_change_is_detected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("BUILD");
    fs::write(&path, "-- one").unwrap();

    let fp = Fingerprint::capture(&path).unwrap();
    fs::write(&path, "-- two!").unwrap();
    assert!(!fp.matches(&path));
  }

  #[test]
  fn touched_but_identical_file_matches() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("BUILD");
    fs::write(&path, "-- same").unwrap();

    let fp = Fingerprint::capture(&path).unwrap();
    // Rewrite identical content; mtime may move, hash does not.
    fs::write(&path, "-- same").unwrap();
    assert!(fp.matches(&path));
  }

  #[test]
  fn missing_file_reads_as_changed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("BUILD");
    fs::write(&path, "x").unwrap();

    let fp = Fingerprint::capture(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert!(!fp.matches(&path));
  }
}
