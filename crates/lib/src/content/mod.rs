//! Assembly of the published content tree.
//!
//! # Modules
//!
//! - [`layout`] - where libraries, versions and aliases live
//! - [`resources`] - copying built files into a version directory
//! - [`prune`] - removing content that is no longer served
//! - [`links`] - alias links
//! - [`generate`] - the new `manifest.json`

pub mod generate;
pub mod layout;
pub mod links;
pub mod prune;
pub mod resources;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

pub use generate::{BuiltVersions, generate_manifest};
pub use layout::ContentLayout;
pub use links::refresh_alias_links;
pub use prune::prune;

use crate::manifest::ManifestError;
use crate::util::fs::{FsError, create_dir, remove_path};
use crate::version::Version;

#[derive(Debug, Error)]
pub enum AssemblyError {
  #[error(transparent)]
  Fs(#[from] FsError),

  #[error("resource '{src}' does not exist in the source tree")]
  MissingResource { src: String },

  #[error("resource path '{0}' must be relative and stay inside the project")]
  InvalidResourcePath(String),

  #[error("failed to read {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Manifest(#[from] ManifestError),
}

/// Replace a version's directory with the resources of a built source tree and
/// record the commit it came from. Returns the number of files copied.
pub fn install_version(
  layout: &ContentLayout,
  lib_id: &str,
  version: &Version,
  src_root: &Path,
) -> Result<usize, AssemblyError> {
  let dest = layout.version_dir(lib_id, version);
  remove_path(&dest)?;

  let mappings = version.resources.mappings.as_deref().unwrap_or_default();
  let copied = resources::copy_resources(src_root, &dest, mappings)?;
  create_dir(&dest)?;

  let sha_path = layout.git_sha_path(lib_id, version);
  std::fs::write(&sha_path, &version.commit_sha).map_err(|e| AssemblyError::Write {
    path: sha_path,
    source: e,
  })?;

  info!(library = lib_id, version = %version.name, files = copied, "installed version");
  Ok(copied)
}
