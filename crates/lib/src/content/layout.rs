use std::path::{Path, PathBuf};

use crate::consts::{GIT_SHA_FILENAME, MANIFEST_FILENAME};
use crate::version::Version;

/// Paths inside the content tree.
///
/// ```text
/// {root}/manifest.json
/// {root}/{lib}/{version}/...
/// {root}/{lib}/{alias} -> {version}
/// {root}/{lib}/experimental/{branch}/...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLayout {
  root: PathBuf,
}

impl ContentLayout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn manifest_path(&self) -> PathBuf {
    self.root.join(MANIFEST_FILENAME)
  }

  pub fn lib_dir(&self, lib_id: &str) -> PathBuf {
    self.root.join(lib_id)
  }

  pub fn version_dir(&self, lib_id: &str, version: &Version) -> PathBuf {
    self.lib_dir(lib_id).join(version.path_name())
  }

  pub fn alias_dir(&self, lib_id: &str, alias: &str) -> PathBuf {
    self.lib_dir(lib_id).join(alias)
  }

  pub fn git_sha_path(&self, lib_id: &str, version: &Version) -> PathBuf {
    self.version_dir(lib_id, version).join(GIT_SHA_FILENAME)
  }
}
