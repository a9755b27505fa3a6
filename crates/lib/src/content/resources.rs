//! Copying a built source tree into a version directory.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::AssemblyError;
use crate::consts::GIT_SHA_FILENAME;
use crate::repo_config::ResourceMapping;
use crate::util::fs::{CopyOptions, copy_dir_all, copy_file};

/// Skipped when a version has no resource rules and the whole tree is copied.
pub const WHOLE_TREE_EXCLUDES: &[&str] = &[".git", ".hg", ".svn", "node_modules", "bower_components"];

/// Copy resources from `src_root` into `dest` according to `mappings`.
///
/// No mappings copies the whole tree minus VCS metadata and installed
/// dependencies. Returns the number of files copied.
pub fn copy_resources(src_root: &Path, dest: &Path, mappings: &[ResourceMapping]) -> Result<usize, AssemblyError> {
  if mappings.is_empty() {
    let options = CopyOptions {
      exclude: WHOLE_TREE_EXCLUDES,
      ..CopyOptions::default()
    };
    return Ok(copy_dir_all(src_root, dest, options)?);
  }

  let mut copied = 0;
  for mapping in mappings {
    let src = src_root.join(relative_path(&mapping.src)?);
    let target = dest.join(relative_path(mapping.destination())?);

    let metadata = std::fs::metadata(&src).map_err(|_| AssemblyError::MissingResource {
      src: mapping.src.clone(),
    })?;
    if metadata.is_dir() {
      copied += copy_dir_all(&src, &target, CopyOptions::default())?;
    } else {
      copy_file(&src, &target, false)?;
      copied += 1;
    }
    debug!(src = %mapping.src, dest = %mapping.destination(), "copied resource");
  }
  Ok(copied)
}

/// Validate a path from a repository config as relative and contained.
fn relative_path(raw: &str) -> Result<PathBuf, AssemblyError> {
  let path = Path::new(raw.trim());
  let mut clean = PathBuf::new();
  for component in path.components() {
    match component {
      Component::Normal(part) => clean.push(part),
      Component::CurDir => {}
      _ => return Err(AssemblyError::InvalidResourcePath(raw.to_string())),
    }
  }
  Ok(clean)
}

/// Every published file below a version directory, relative with `/` separators.
pub fn list_files(version_dir: &Path) -> Result<BTreeSet<String>, AssemblyError> {
  let mut files = BTreeSet::new();
  for entry in WalkDir::new(version_dir).follow_links(true) {
    let entry = entry.map_err(|e| AssemblyError::Walk {
      path: version_dir.to_path_buf(),
      message: e.to_string(),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let relative = entry
      .path()
      .strip_prefix(version_dir)
      .unwrap_or(entry.path())
      .to_string_lossy()
      .replace('\\', "/");
    if relative != GIT_SHA_FILENAME {
      files.insert(relative);
    }
  }
  Ok(files)
}
