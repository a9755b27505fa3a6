//! Per-repository publishing configuration (`.cdn-config.yml`).
//!
//! ```yaml
//! name: BYU Web Components
//! description: Web components for BYU sites
//! docs_url: https://github.com/byuweb/web-components
//! entrypoints:
//!   dist/components.js: Main bundle
//!   dist/components.css: Styles
//! resources:
//!   - dist/
//!   - src: README.md
//!     dest: docs/README.md
//! build:
//!   dependencies: npm ci
//!   build: npm run dist
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a repository configuration.
#[derive(Debug, Error)]
pub enum RepoConfigError {
  #[error("failed to parse repository config: {0}")]
  Parse(#[from] serde_yaml::Error),
}

/// Publishing metadata declared inside a library's repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default, alias = "docs")]
  pub docs_url: Option<String>,
  /// Resource path -> human-readable description.
  #[serde(default)]
  pub entrypoints: BTreeMap<String, Option<String>>,
  #[serde(default)]
  pub resources: Vec<ResourceSpec>,
  #[serde(default)]
  pub build: Option<BuildOverrides>,
}

impl RepoConfig {
  pub fn parse(text: &str) -> Result<Self, RepoConfigError> {
    // An empty document is a valid, empty config.
    if text.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(text)?)
  }

  /// Resource rules with the shorthand string form expanded.
  pub fn mappings(&self) -> Vec<ResourceMapping> {
    self.resources.iter().map(ResourceSpec::to_mapping).collect()
  }

  /// Entrypoints with missing descriptions replaced by empty strings.
  pub fn entrypoint_descriptions(&self) -> BTreeMap<String, String> {
    self
      .entrypoints
      .iter()
      .map(|(path, desc)| (path.clone(), desc.clone().unwrap_or_default()))
      .collect()
  }
}

/// A resource rule as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceSpec {
  Path(String),
  Mapping(ResourceMapping),
}

impl ResourceSpec {
  pub fn to_mapping(&self) -> ResourceMapping {
    match self {
      ResourceSpec::Path(src) => ResourceMapping {
        src: src.clone(),
        dest: None,
      },
      ResourceSpec::Mapping(mapping) => mapping.clone(),
    }
  }
}

/// Copies `src` (file or directory, relative to the repository root) to `dest`
/// (relative to the version directory; defaults to `src`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMapping {
  pub src: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dest: Option<String>,
}

impl ResourceMapping {
  pub fn destination(&self) -> &str {
    self.dest.as_deref().unwrap_or(&self.src)
  }
}

/// Explicit build commands; an absent field means "infer".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOverrides {
  #[serde(default)]
  pub dependencies: Option<String>,
  #[serde(default)]
  pub build: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_full_config() {
    let config = RepoConfig::parse(
      r#"
name: Web Components
description: Shared components
docs_url: https://example.com/docs
entrypoints:
  dist/components.js: Main bundle
  dist/components.css:
resources:
  - dist/
  - src: README.md
    dest: docs/README.md
build:
  dependencies: npm ci
"#,
    )
    .unwrap();

    assert_eq!(config.name.as_deref(), Some("Web Components"));
    assert_eq!(config.docs_url.as_deref(), Some("https://example.com/docs"));

    let entrypoints = config.entrypoint_descriptions();
    assert_eq!(entrypoints["dist/components.js"], "Main bundle");
    assert_eq!(entrypoints["dist/components.css"], "");

    let mappings = config.mappings();
    assert_eq!(mappings.len(), 2);
    assert_eq!(mappings[0].src, "dist/");
    assert_eq!(mappings[0].destination(), "dist/");
    assert_eq!(mappings[1].destination(), "docs/README.md");

    let build = config.build.unwrap();
    assert_eq!(build.dependencies.as_deref(), Some("npm ci"));
    assert!(build.build.is_none());
  }

  #[test]
  fn docs_alias_is_accepted() {
    let config = RepoConfig::parse("docs: https://example.com\n").unwrap();
    assert_eq!(config.docs_url.as_deref(), Some("https://example.com"));
  }

  #[test]
  fn empty_document_is_default() {
    assert_eq!(RepoConfig::parse("\n").unwrap(), RepoConfig::default());
  }

  #[test]
  fn malformed_yaml_is_error() {
    assert!(RepoConfig::parse("entrypoints: [unterminated").is_err());
  }
}
