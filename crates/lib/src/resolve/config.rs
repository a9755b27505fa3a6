//! The resolved desired state of a publish run.

use serde::Serialize;

use crate::alias::Aliases;
use crate::manifest::Manifest;
use crate::source::SourceInfo;
use crate::version::Version;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryDisplay {
  pub name: String,
  pub description: String,
  pub docs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Library {
  pub id: String,
  pub source: SourceInfo,
  pub versions: Vec<Version>,
  pub aliases: Aliases,
  pub display: LibraryDisplay,
}

impl Library {
  pub fn version(&self, name: &str) -> Option<&Version> {
    self.versions.iter().find(|v| v.name == name)
  }
}

/// State of the content repository at the start of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentInfo {
  pub commit_sha: Option<String>,
  pub tree_sha: Option<String>,
  #[serde(skip)]
  pub manifest: Manifest,
}

/// A library that could not be resolved at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryFailure {
  pub id: String,
  pub error: String,
}

/// Every library and version of a run, with their classifications.
///
/// Built once by the resolver and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CdnConfig {
  pub cdn_version: String,
  pub libs: Vec<Library>,
  pub content_info: ContentInfo,
  pub force_reload: bool,
  /// Libraries dropped from `libs` because their resolution failed.
  pub failures: Vec<LibraryFailure>,
}

impl CdnConfig {
  pub fn lib_ids(&self) -> Vec<&str> {
    self.libs.iter().map(|l| l.id.as_str()).collect()
  }

  pub fn library(&self, id: &str) -> Option<&Library> {
    self.libs.iter().find(|l| l.id == id)
  }

  /// Every `(library, version)` pair.
  pub fn lib_versions(&self) -> impl Iterator<Item = (&Library, &Version)> {
    self.libs.iter().flat_map(|lib| lib.versions.iter().map(move |v| (lib, v)))
  }

  pub fn updatable_versions(&self) -> impl Iterator<Item = (&Library, &Version)> {
    self.lib_versions().filter(|(_, v)| v.can_update())
  }

  pub fn versions_needing_update(&self) -> impl Iterator<Item = (&Library, &Version)> {
    self.lib_versions().filter(|(_, v)| v.needs_update)
  }
}
