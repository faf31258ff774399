//! Model cache persistence.
//!
//! The resolved model is persisted as one serialized blob under
//! `<build-root>/.build/model` and reloaded wholesale on the next
//! invocation, skipping re-parsing of unchanged scripts. Load and save are
//! pure data movement: nothing is re-resolved, only the blob's structure
//! and format version are validated. Writes go through a temp file and
//! rename so a crash never leaves a torn cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{CACHED_MODEL, MODEL_FORMAT_VERSION};

use super::BuildModel;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("no cached model at {}", .0.display())]
  NotFound(PathBuf),

  #[error("cannot read cached model: {0}")]
  Read(#[source] io::Error),

  #[error("cached model is corrupt: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("cached model format {0} is not supported")]
  UnsupportedFormat(u32),

  #[error("cannot serialize model: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("cannot write cached model: {0}")]
  Write(#[source] io::Error),

  #[error("model has no cache file; use save_to first")]
  NoCachePath,
}

impl BuildModel {
  /// Load a model from its serialized form, replacing in-memory state
  /// entirely. The loaded model remembers `path` for [`save`](Self::save)
  /// and starts clean.
  pub fn load(path: &Path) -> Result<BuildModel, CacheError> {
    let content = fs::read_to_string(path).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        CacheError::NotFound(path.to_path_buf())
      } else {
        CacheError::Read(e)
      }
    })?;

    let mut model: BuildModel = serde_json::from_str(&content).map_err(CacheError::Parse)?;
    if model.format != MODEL_FORMAT_VERSION {
      return Err(CacheError::UnsupportedFormat(model.format));
    }

    model.cache_path = Some(path.to_path_buf());
    model.dirty = false;
    info!(cache = %path.display(), targets = model.targets.len(), "loaded cached model");
    Ok(model)
  }

  /// Snapshot the model to `path`, clearing the dirty flag on success.
  pub fn save_to(&mut self, path: &Path) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(CacheError::Write)?;
    }

    let content = serde_json::to_string(self).map_err(CacheError::Serialize)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &content).map_err(CacheError::Write)?;
    fs::rename(&tmp, path).map_err(CacheError::Write)?;

    self.cache_path = Some(path.to_path_buf());
    self.dirty = false;
    debug!(cache = %path.display(), "saved model");
    Ok(())
  }

  /// Save back to the file the model was loaded from or last saved to.
  pub fn save(&mut self) -> Result<(), CacheError> {
    let path = self.cache_path.clone().ok_or(CacheError::NoCachePath)?;
    self.save_to(&path)
  }

  /// Whether in-memory state has diverged from the last load/save, i.e.
  /// whether a save is worth performing.
  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// The conventional cache location for this model's build root.
  pub fn default_cache_file(&self) -> PathBuf {
    self.build_root().join(CACHED_MODEL)
  }
}
