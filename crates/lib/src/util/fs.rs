//! Filesystem helpers shared by content assembly and staging.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum FsError {
  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy {from} to {to}: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to link {link} to {target}: {source}")]
  Link {
    target: PathBuf,
    link: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
  /// Copy what symlinks point at instead of the links.
  pub dereference: bool,
  /// Carry file modification times over to the copies.
  pub preserve_mtime: bool,
  /// Entry names skipped anywhere in the tree.
  pub exclude: &'static [&'static str],
}

/// Recursively copy `src` into `dst`, overwriting existing files.
///
/// Returns the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path, options: CopyOptions) -> Result<usize, FsError> {
  create_dir(dst)?;
  let mut copied = 0;

  let walker = WalkDir::new(src)
    .follow_links(options.dereference)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| {
      e.depth() == 0
        || e
          .file_name()
          .to_str()
          .map(|name| !options.exclude.contains(&name))
          .unwrap_or(true)
    });

  for entry in walker {
    let entry = entry.map_err(|e| FsError::Walk {
      path: src.to_path_buf(),
      message: e.to_string(),
    })?;
    let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
    if relative.as_os_str().is_empty() {
      continue;
    }
    let target = dst.join(relative);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      create_dir(&target)?;
    } else if file_type.is_symlink() {
      let link_target = fs::read_link(entry.path()).map_err(|e| copy_error(entry.path(), &target, e))?;
      remove_path(&target)?;
      create_symlink(&link_target, &target)?;
    } else {
      copy_file(entry.path(), &target, options.preserve_mtime)?;
      copied += 1;
    }
  }

  Ok(copied)
}

/// Copy one file, creating parent directories.
pub fn copy_file(from: &Path, to: &Path, preserve_mtime: bool) -> Result<(), FsError> {
  if let Some(parent) = to.parent() {
    create_dir(parent)?;
  }
  // Never write through a link into the file it points at.
  if to.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
    remove_path(to)?;
  }
  fs::copy(from, to).map_err(|e| copy_error(from, to, e))?;

  if preserve_mtime {
    let modified = fs::metadata(from)
      .and_then(|m| m.modified())
      .map_err(|e| copy_error(from, to, e))?;
    fs::File::options()
      .write(true)
      .open(to)
      .and_then(|f| f.set_modified(modified))
      .map_err(|e| copy_error(from, to, e))?;
  }
  Ok(())
}

pub fn create_dir(path: &Path) -> Result<(), FsError> {
  fs::create_dir_all(path).map_err(|e| FsError::CreateDir {
    path: path.to_path_buf(),
    source: e,
  })
}

/// Remove a path (file, directory, or symlink). Missing paths are fine.
pub fn remove_path(path: &Path) -> Result<(), FsError> {
  let Ok(metadata) = path.symlink_metadata() else {
    return Ok(());
  };
  if metadata.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  }
  .map_err(|e| FsError::Remove {
    path: path.to_path_buf(),
    source: e,
  })
}

/// Remove everything inside `dir`, creating it if needed.
pub fn empty_dir(dir: &Path) -> Result<(), FsError> {
  if !dir.exists() {
    return create_dir(dir);
  }
  let entries = fs::read_dir(dir).map_err(|e| FsError::Walk {
    path: dir.to_path_buf(),
    message: e.to_string(),
  })?;
  for entry in entries {
    let entry = entry.map_err(|e| FsError::Walk {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;
    remove_path(&entry.path())?;
  }
  Ok(())
}

/// Point `link` at the directory `target` (relative to the link's parent).
///
/// Symlink on unix; elsewhere the directory is copied.
#[cfg(unix)]
pub fn create_dir_link(target: &Path, link: &Path) -> Result<(), FsError> {
  remove_path(link)?;
  create_symlink(target, link)
}

#[cfg(not(unix))]
pub fn create_dir_link(target: &Path, link: &Path) -> Result<(), FsError> {
  remove_path(link)?;
  let absolute = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
  tracing::warn!(
    target = %absolute.display(),
    link = %link.display(),
    "symlinks not available, copying directory"
  );
  copy_dir_all(&absolute, link, CopyOptions::default()).map(|_| ())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<(), FsError> {
  std::os::unix::fs::symlink(target, link).map_err(|e| FsError::Link {
    target: target.to_path_buf(),
    link: link.to_path_buf(),
    source: e,
  })
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> Result<(), FsError> {
  let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
  let result = if resolved.is_dir() {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  };
  result.map_err(|e| {
    tracing::warn!(link = %link.display(), error = %e, "failed to create symlink");
    FsError::Link {
      target: target.to_path_buf(),
      link: link.to_path_buf(),
      source: e,
    }
  })
}

fn copy_error(from: &Path, to: &Path, source: io::Error) -> FsError {
  FsError::Copy {
    from: from.to_path_buf(),
    to: to.to_path_buf(),
    source,
  }
}
