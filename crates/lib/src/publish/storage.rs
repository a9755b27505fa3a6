//! Object storage.
//!
//! [`ObjectStore`] is the seam to a bucket. [`DirectoryBucket`] mirrors a bucket
//! onto a local directory (a mounted bucket, or a web root served directly).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::util::fs::{FsError, copy_file, remove_path};
use crate::util::hash::{HashError, hash_file};

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("failed to read {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error(transparent)]
  Fs(#[from] FsError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("failed to set permissions on {path}: {source}")]
  Permissions {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("storage task failed: {0}")]
  Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
  Private,
  PublicRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
  /// Remove objects that are not present locally.
  pub delete_removed: bool,
  pub acl: Acl,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  pub uploaded: Vec<String>,
  pub deleted: Vec<String>,
  pub unchanged: usize,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
  /// Name of the bucket, used to find its edge-cache distribution.
  fn bucket(&self) -> &str;

  /// Make the bucket mirror `local_dir`.
  async fn sync_dir(&self, local_dir: &Path, options: SyncOptions) -> Result<SyncReport, StorageError>;
}

/// A bucket stored as a directory.
#[derive(Debug, Clone)]
pub struct DirectoryBucket {
  name: String,
  root: PathBuf,
}

impl DirectoryBucket {
  pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      root: root.into(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

#[async_trait]
impl ObjectStore for DirectoryBucket {
  fn bucket(&self) -> &str {
    &self.name
  }

  async fn sync_dir(&self, local_dir: &Path, options: SyncOptions) -> Result<SyncReport, StorageError> {
    let local = local_dir.to_path_buf();
    let root = self.root.clone();
    tokio::task::spawn_blocking(move || sync_blocking(&local, &root, options))
      .await
      .map_err(|e| StorageError::Task(e.to_string()))?
  }
}

fn sync_blocking(local: &Path, root: &Path, options: SyncOptions) -> Result<SyncReport, StorageError> {
  let local_keys = object_keys(local)?;
  let remote_keys = if root.is_dir() { object_keys(root)? } else { BTreeSet::new() };

  let mut report = SyncReport::default();
  let total = local_keys.len();
  let mut last_decile = 0;

  for (index, key) in local_keys.iter().enumerate() {
    let from = local.join(key);
    let to = root.join(key);

    let same = remote_keys.contains(key) && hash_file(&from)? == hash_file(&to)?;
    if same {
      report.unchanged += 1;
    } else {
      copy_file(&from, &to, true)?;
      debug!(key = %key, "finished uploading");
      report.uploaded.push(key.clone());
    }
    apply_acl(&to, options.acl)?;

    let decile = (index + 1) * 10 / total.max(1);
    if decile > last_decile {
      last_decile = decile;
      info!(progress = %format!("{}%", decile * 10), "upload progress");
    }
  }

  if options.delete_removed {
    for key in remote_keys.difference(&local_keys) {
      remove_path(&root.join(key))?;
      debug!(key = %key, "deleted object");
      report.deleted.push(key.clone());
    }
  }

  info!(
    uploaded = report.uploaded.len(),
    deleted = report.deleted.len(),
    unchanged = report.unchanged,
    "sync complete"
  );
  Ok(report)
}

/// Keys of every file below `dir`, `/`-separated.
fn object_keys(dir: &Path) -> Result<BTreeSet<String>, StorageError> {
  let mut keys = BTreeSet::new();
  for entry in WalkDir::new(dir) {
    let entry = entry.map_err(|e| StorageError::Walk {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;
    if entry.file_type().is_file() {
      let key = entry
        .path()
        .strip_prefix(dir)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .replace('\\', "/");
      keys.insert(key);
    }
  }
  Ok(keys)
}

#[cfg(unix)]
fn apply_acl(path: &Path, acl: Acl) -> Result<(), StorageError> {
  use std::os::unix::fs::PermissionsExt;
  let mode = match acl {
    Acl::PublicRead => 0o644,
    Acl::Private => 0o600,
  };
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| StorageError::Permissions {
    path: path.to_path_buf(),
    source: e,
  })
}

#[cfg(not(unix))]
fn apply_acl(_path: &Path, _acl: Acl) -> Result<(), StorageError> {
  Ok(())
}
