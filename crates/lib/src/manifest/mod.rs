//! Manifest loading and saving.
//!
//! The previous manifest is read at the start of a run to decide what changed; a new
//! one is written after content assembly.

mod types;

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

pub use types::*;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write manifest: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse manifest: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize manifest: {0}")]
  Serialize(#[source] serde_json::Error),
}

impl Manifest {
  pub fn parse(text: &str) -> Result<Self, ManifestError> {
    serde_json::from_str(text).map_err(ManifestError::Parse)
  }

  /// Load a manifest from disk.
  ///
  /// Returns `Ok(None)` if the file doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(ManifestError::Read(e)),
    };
    Self::parse(&content).map(Some)
  }

  /// Save as pretty-printed JSON.
  pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
    let content = serde_json::to_string_pretty(self).map_err(ManifestError::Serialize)?;
    fs::write(path, content).map_err(ManifestError::Write)
  }

  /// True when this manifest was written by a different tool version.
  pub fn requires_reload(&self, cdn_version: &str) -> bool {
    self.cdn_version != cdn_version
  }
}
