//! Detection of what an assembly pass changed in the content directory.
//!
//! A snapshot digests every version directory (`{lib}/{version}` and
//! `{lib}/experimental/{branch}`) plus `manifest.json`. Alias links are not
//! digested; they only ever point at a version directory that is. The
//! manifest is digested without its `$built` timestamp, so a run that rewrites
//! an otherwise identical manifest reports no change.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::consts::{EXPERIMENTAL_PREFIX, MANIFEST_FILENAME};
use crate::util::hash::{ContentHash, HashError, hash_bytes, hash_directory, hash_json};

const BUILT_KEY: &str = "$built";

/// Content-relative path -> digest.
pub type ContentSnapshot = BTreeMap<String, ContentHash>;

/// Digest every version directory below `content_dir`.
///
/// A missing content directory is an empty snapshot.
pub fn snapshot(content_dir: &Path) -> Result<ContentSnapshot, HashError> {
  let mut result = ContentSnapshot::new();
  if !content_dir.is_dir() {
    return Ok(result);
  }

  let manifest = content_dir.join(MANIFEST_FILENAME);
  if manifest.is_file() {
    result.insert(MANIFEST_FILENAME.to_string(), hash_manifest(&manifest)?);
  }

  for lib in real_subdirs(content_dir)? {
    let lib_dir = content_dir.join(&lib);
    for version in real_subdirs(&lib_dir)? {
      if version == EXPERIMENTAL_PREFIX {
        let experimental_dir = lib_dir.join(EXPERIMENTAL_PREFIX);
        for branch in real_subdirs(&experimental_dir)? {
          let key = format!("{}/{}/{}", lib, EXPERIMENTAL_PREFIX, branch);
          result.insert(key, hash_directory(&experimental_dir.join(&branch), &[])?);
        }
      } else {
        let key = format!("{}/{}", lib, version);
        result.insert(key, hash_directory(&lib_dir.join(&version), &[])?);
      }
    }
  }

  Ok(result)
}

/// Digest of a manifest file, ignoring `$built`.
///
/// A file that is not a JSON object is digested as raw bytes.
fn hash_manifest(path: &Path) -> Result<ContentHash, HashError> {
  let raw = fs::read(path).map_err(|e| HashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  })?;

  match serde_json::from_slice::<serde_json::Value>(&raw) {
    Ok(serde_json::Value::Object(mut fields)) => {
      fields.remove(BUILT_KEY);
      hash_json(&fields)
    }
    _ => Ok(hash_bytes(&raw)),
  }
}

/// Names of the directories (not links) directly below `dir`, sorted.
fn real_subdirs(dir: &Path) -> Result<Vec<String>, HashError> {
  let entries = fs::read_dir(dir).map_err(|e| HashError::WalkDir {
    message: format!("{}: {}", dir.display(), e),
  })?;

  let mut names = Vec::new();
  for entry in entries {
    let entry = entry.map_err(|e| HashError::WalkDir { message: e.to_string() })?;
    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
    if is_dir && let Some(name) = entry.file_name().to_str() {
      names.push(name.to_string());
    }
  }
  names.sort();
  Ok(names)
}

/// What changed between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilesystemChanges {
  /// True when `manifest.json` is the only changed path.
  pub only_manifest_changed: bool,
  /// Added, modified or removed paths, sorted.
  pub changed: Vec<String>,
  /// Digests after the change.
  pub hashes: ContentSnapshot,
}

impl FilesystemChanges {
  pub fn between(before: &ContentSnapshot, after: ContentSnapshot) -> Self {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let changed: Vec<String> = keys
      .into_iter()
      .filter(|key| before.get(*key) != after.get(*key))
      .cloned()
      .collect();

    let only_manifest_changed = changed.len() == 1 && changed[0] == MANIFEST_FILENAME;
    debug!(changed = changed.len(), only_manifest_changed, "computed filesystem changes");

    Self {
      only_manifest_changed,
      changed,
      hashes: after,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.changed.is_empty()
  }

  /// Idempotency token for a cache invalidation of this change set.
  pub fn invalidation_token(&self) -> Result<String, HashError> {
    Ok(hash_json(&self.hashes)?.0)
  }
}
