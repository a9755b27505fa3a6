//! Generation of the published `manifest.json`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use super::resources::list_files;
use super::{AssemblyError, ContentLayout};
use crate::manifest::{Manifest, ManifestLib, ManifestResource, ManifestVersion};
use crate::resolve::{CdnConfig, Library};
use crate::version::Version;

/// `(library id, version name)` pairs whose build succeeded this run.
pub type BuiltVersions = BTreeSet<(String, String)>;

/// Describe what is in the content tree after assembly.
///
/// Every served version with content on disk is listed. Its `git_sha` is the
/// commit actually in place: the new commit when it was built (or was already
/// current), otherwise the previously recorded sha so the next run retries.
pub fn generate_manifest(
  config: &CdnConfig,
  layout: &ContentLayout,
  built: &BuiltVersions,
  now: DateTime<Utc>,
) -> Result<Manifest, AssemblyError> {
  let mut libraries = BTreeMap::new();
  for lib in &config.libs {
    libraries.insert(lib.id.clone(), manifest_lib(lib, layout, built)?);
  }

  // Libraries that failed to resolve keep their previous entry.
  for failure in &config.failures {
    if let Some(previous) = config.content_info.manifest.library(&failure.id) {
      libraries.insert(failure.id.clone(), previous.clone());
    }
  }

  Ok(Manifest {
    cdn_version: config.cdn_version.clone(),
    built: Some(now),
    libraries,
  })
}

fn manifest_lib(lib: &Library, layout: &ContentLayout, built: &BuiltVersions) -> Result<ManifestLib, AssemblyError> {
  let mut versions = Vec::new();
  for version in lib.versions.iter().filter(|v| v.is_served()) {
    let Some(git_sha) = sha_in_place(&lib.id, version, built) else {
      warn!(library = %lib.id, version = %version.name, "version has no published content, leaving it out");
      continue;
    };
    let dir = layout.version_dir(&lib.id, version);
    if !dir.is_dir() {
      warn!(library = %lib.id, version = %version.name, "version directory missing, leaving it out");
      continue;
    }

    versions.push(ManifestVersion {
      name: version.name.clone(),
      ref_name: Some(version.ref_name.clone()),
      git_sha,
      resources: resources(version, &list_files(&dir)?),
    });
  }

  let listed: BTreeSet<&str> = versions.iter().map(|v| v.name.as_str()).collect();
  let aliases = lib
    .aliases
    .iter()
    .filter(|(_, target)| listed.contains(target.as_str()))
    .map(|(alias, target)| (alias.clone(), target.clone()))
    .collect();

  Ok(ManifestLib {
    name: lib.display.name.clone(),
    description: lib.display.description.clone(),
    docs_url: lib.display.docs.clone(),
    aliases,
    versions,
  })
}

fn sha_in_place(lib_id: &str, version: &Version, built: &BuiltVersions) -> Option<String> {
  let was_built = built.contains(&(lib_id.to_string(), version.name.clone()));
  let already_current = version.can_update() && !version.needs_update;
  if was_built || already_current {
    Some(version.commit_sha.clone())
  } else {
    version.manifest_sha.clone()
  }
}

/// Entrypoints plus every other file found on disk.
fn resources(version: &Version, files: &BTreeSet<String>) -> BTreeMap<String, ManifestResource> {
  let mut resources: BTreeMap<String, ManifestResource> = files
    .iter()
    .map(|path| (path.clone(), ManifestResource::default()))
    .collect();

  for (path, description) in &version.resources.entrypoints {
    resources.insert(
      path.clone(),
      ManifestResource {
        entrypoint: true,
        description: Some(description.clone()).filter(|d| !d.is_empty()),
      },
    );
  }
  resources
}
