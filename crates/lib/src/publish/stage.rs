//! Staging: a dereferenced copy of the content tree ready for upload.

use std::path::Path;

use tracing::info;

use crate::util::fs::{CopyOptions, FsError, copy_dir_all, empty_dir};

/// Entries of the content tree that are never published.
const STAGE_EXCLUDES: &[&str] = &[".git"];

/// Empty `staging_dir`, then copy `content_dir` into it with symlinks resolved
/// and modification times kept. Returns the number of staged files.
pub fn stage(content_dir: &Path, staging_dir: &Path) -> Result<usize, FsError> {
  empty_dir(staging_dir)?;
  let staged = copy_dir_all(
    content_dir,
    staging_dir,
    CopyOptions {
      dereference: true,
      preserve_mtime: true,
      exclude: STAGE_EXCLUDES,
    },
  )?;
  info!(
    content = %content_dir.display(),
    staging = %staging_dir.display(),
    files = staged,
    "staged content"
  );
  Ok(staged)
}
