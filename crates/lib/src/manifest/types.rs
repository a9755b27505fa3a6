//! Published manifest types.
//!
//! The manifest is the durable record of what was last published. It lives at the
//! root of the content tree as `manifest.json`:
//!
//! ```json
//! {
//!   "$cdn-version": "0.4.0",
//!   "$built": "2017-02-01T10:00:00Z",
//!   "libraries": {
//!     "web-components": {
//!       "name": "Web Components",
//!       "description": "Shared components",
//!       "docs_url": "https://example.com",
//!       "aliases": { "latest": "1.2.0", "1.x.x": "1.2.0" },
//!       "versions": [
//!         {
//!           "name": "1.2.0",
//!           "ref": "1.2.0",
//!           "git_sha": "a1b2c3...",
//!           "resources": {
//!             "components.js": { "entrypoint": true, "description": "Main bundle" }
//!           }
//!         }
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
  /// Version of the tool that wrote this manifest.
  #[serde(rename = "$cdn-version", default)]
  pub cdn_version: String,
  #[serde(rename = "$built", default, skip_serializing_if = "Option::is_none")]
  pub built: Option<DateTime<Utc>>,
  #[serde(default)]
  pub libraries: BTreeMap<String, ManifestLib>,
}

impl Manifest {
  pub fn library(&self, id: &str) -> Option<&ManifestLib> {
    self.libraries.get(id)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLib {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub docs_url: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub aliases: BTreeMap<String, String>,
  #[serde(default)]
  pub versions: Vec<ManifestVersion>,
}

impl ManifestLib {
  pub fn version(&self, name: &str) -> Option<&ManifestVersion> {
    self.versions.iter().find(|v| v.name == name)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestVersion {
  pub name: String,
  #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
  pub ref_name: Option<String>,
  #[serde(default)]
  pub git_sha: String,
  #[serde(default)]
  pub resources: BTreeMap<String, ManifestResource>,
}

impl ManifestVersion {
  /// Entrypoint paths and their descriptions.
  pub fn entrypoints(&self) -> BTreeMap<String, String> {
    self
      .resources
      .iter()
      .filter(|(_, r)| r.entrypoint)
      .map(|(path, r)| (path.clone(), r.description.clone().unwrap_or_default()))
      .collect()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestResource {
  #[serde(default)]
  pub entrypoint: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}
