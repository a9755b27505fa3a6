//! Removal of content that is no longer served.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::info;

use super::{AssemblyError, ContentLayout};
use crate::consts::EXPERIMENTAL_PREFIX;
use crate::resolve::{CdnConfig, Library};
use crate::util::fs::remove_path;

/// Remove deleted versions, versions that no longer exist, and libraries that are
/// no longer configured. Libraries that failed to resolve are left alone, and
/// hidden entries are never touched.
///
/// Returns the removed content-relative paths.
pub fn prune(layout: &ContentLayout, config: &CdnConfig) -> Result<Vec<String>, AssemblyError> {
  let mut removed = Vec::new();
  if !layout.root().is_dir() {
    return Ok(removed);
  }

  let failed: BTreeSet<&str> = config.failures.iter().map(|f| f.id.as_str()).collect();
  for name in entries(layout.root())? {
    if !layout.root().join(&name).is_dir() {
      continue;
    }
    match config.library(&name) {
      Some(lib) => removed.extend(prune_library(layout, lib)?),
      None if failed.contains(name.as_str()) => {}
      None => {
        remove(layout.root(), &name)?;
        removed.push(name);
      }
    }
  }

  Ok(removed)
}

fn prune_library(layout: &ContentLayout, lib: &Library) -> Result<Vec<String>, AssemblyError> {
  let lib_dir = layout.lib_dir(&lib.id);
  let mut removed = Vec::new();
  if !lib_dir.is_dir() {
    return Ok(removed);
  }

  let served = |name: &str, experimental: bool| {
    lib
      .versions
      .iter()
      .any(|v| v.name == name && v.experimental == experimental && v.is_served())
  };

  for name in entries(&lib_dir)? {
    if name == EXPERIMENTAL_PREFIX {
      let experimental_dir = lib_dir.join(EXPERIMENTAL_PREFIX);
      for branch in entries(&experimental_dir)? {
        if !served(&branch, true) {
          remove(&experimental_dir, &branch)?;
          removed.push(format!("{}/{}/{}", lib.id, EXPERIMENTAL_PREFIX, branch));
        }
      }
      continue;
    }
    if !served(&name, false) && !lib.aliases.contains_key(&name) {
      remove(&lib_dir, &name)?;
      removed.push(format!("{}/{}", lib.id, name));
    }
  }

  Ok(removed)
}

/// Non-hidden entry names of a directory.
fn entries(dir: &Path) -> Result<Vec<String>, AssemblyError> {
  let read = fs::read_dir(dir).map_err(|e| AssemblyError::Walk {
    path: dir.to_path_buf(),
    message: e.to_string(),
  })?;
  let mut names = Vec::new();
  for entry in read {
    let entry = entry.map_err(|e| AssemblyError::Walk {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;
    if let Some(name) = entry.file_name().to_str()
      && !name.starts_with('.')
    {
      names.push(name.to_string());
    }
  }
  names.sort();
  Ok(names)
}

fn remove(parent: &Path, name: &str) -> Result<(), AssemblyError> {
  let path = parent.join(name);
  info!(path = %path.display(), "removing unpublished content");
  Ok(remove_path(&path)?)
}
