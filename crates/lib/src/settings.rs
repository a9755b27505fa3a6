//! Run settings (`cdnpub.yml`).
//!
//! ```yaml
//! bucket: cdn.example.org
//! content_source:
//!   source: github:byuweb/web-community-cdn
//!   branch: content
//! libraries:
//!   web-components:
//!     source: github:byuweb/byu-web-components
//!   theme:
//!     source: github:byuweb/byu-theme
//!     options:
//!       api_base: https://ghe.example.com/api/v3
//! experimental_retention: 30days
//! request_timeout: 30s
//! edge_cache:
//!   api_base: https://edge.example.org/api
//! ```
//!
//! Relative paths are resolved against the directory of the settings file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

use crate::resolve::ContentOrigin;
use crate::source::{ParseError, SourceInfo};

/// Environment variable that forces dry-run mode when set to `1` or `true`.
pub const DRY_RUN_ENV: &str = "CDNPUB_DRY_RUN";

#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("failed to read settings '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse settings '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("invalid settings: {0}")]
  Invalid(String),

  #[error("invalid content source: {0}")]
  ContentSource(#[from] ParseError),
}

/// A duration written in humantime notation (`30days`, `45s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl<'de> Deserialize<'de> for HumanDuration {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text)
      .map(HumanDuration)
      .map_err(serde::de::Error::custom)
  }
}

/// Where a library's source lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibrarySource {
  pub source: String,
  #[serde(default)]
  pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentSourceSettings {
  pub source: String,
  #[serde(default = "default_content_branch")]
  pub branch: String,
  #[serde(default)]
  pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GithubSettings {
  #[serde(default)]
  pub api_base: Option<String>,
  /// Environment variable holding the API token.
  #[serde(default = "default_github_token_env")]
  pub token_env: String,
}

impl Default for GithubSettings {
  fn default() -> Self {
    Self {
      api_base: None,
      token_env: default_github_token_env(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageSettings {
  /// Directory under which bucket directories live.
  #[serde(default = "default_storage_root")]
  pub root: PathBuf,
}

impl Default for StorageSettings {
  fn default() -> Self {
    Self {
      root: default_storage_root(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeCacheSettings {
  pub api_base: String,
  #[serde(default)]
  pub token_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
  pub bucket: String,
  #[serde(default)]
  pub libraries: BTreeMap<String, LibrarySource>,
  /// Content repository; without it the previous state is read from `content_dir`.
  #[serde(default)]
  pub content_source: Option<ContentSourceSettings>,
  #[serde(default = "default_content_dir")]
  pub content_dir: PathBuf,
  #[serde(default = "default_staging_dir")]
  pub staging_dir: PathBuf,
  #[serde(default = "default_work_dir")]
  pub work_dir: PathBuf,
  #[serde(default = "default_retention")]
  pub experimental_retention: HumanDuration,
  #[serde(default = "default_request_timeout")]
  pub request_timeout: HumanDuration,
  #[serde(default = "default_parallelism")]
  pub parallelism: usize,
  #[serde(default = "default_build_parallelism")]
  pub build_parallelism: usize,
  #[serde(default)]
  pub dry_run: bool,
  #[serde(default)]
  pub github: GithubSettings,
  #[serde(default)]
  pub storage: StorageSettings,
  #[serde(default)]
  pub edge_cache: Option<EdgeCacheSettings>,
}

fn default_content_branch() -> String {
  "content".to_string()
}

fn default_github_token_env() -> String {
  "GITHUB_TOKEN".to_string()
}

fn default_storage_root() -> PathBuf {
  PathBuf::from("buckets")
}

fn default_content_dir() -> PathBuf {
  PathBuf::from("content")
}

fn default_staging_dir() -> PathBuf {
  PathBuf::from("staging")
}

fn default_work_dir() -> PathBuf {
  PathBuf::from("work")
}

fn default_retention() -> HumanDuration {
  HumanDuration(Duration::from_secs(30 * 24 * 60 * 60))
}

fn default_request_timeout() -> HumanDuration {
  HumanDuration(Duration::from_secs(30))
}

fn default_parallelism() -> usize {
  8
}

fn default_build_parallelism() -> usize {
  4
}

impl Settings {
  /// Load, validate and normalize settings from a YAML file.
  pub fn load(path: &Path) -> Result<Self, SettingsError> {
    let text = fs::read_to_string(path).map_err(|e| SettingsError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    let base = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    let base = dunce::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());
    Self::parse(&text, &base).map_err(|e| match e {
      SettingsError::Parse { source, .. } => SettingsError::Parse {
        path: path.to_path_buf(),
        source,
      },
      other => other,
    })
  }

  /// Parse settings text, resolving relative paths against `base_dir`.
  pub fn parse(text: &str, base_dir: &Path) -> Result<Self, SettingsError> {
    let mut settings: Settings = serde_yaml::from_str(text).map_err(|e| SettingsError::Parse {
      path: PathBuf::new(),
      source: e,
    })?;

    settings.validate()?;

    for dir in [
      &mut settings.content_dir,
      &mut settings.staging_dir,
      &mut settings.work_dir,
      &mut settings.storage.root,
    ] {
      if dir.is_relative() {
        *dir = base_dir.join(&*dir);
      }
    }

    if env_flag(DRY_RUN_ENV) {
      debug!("dry run forced by {}", DRY_RUN_ENV);
      settings.dry_run = true;
    }

    Ok(settings)
  }

  fn validate(&self) -> Result<(), SettingsError> {
    if self.bucket.trim().is_empty() {
      return Err(SettingsError::Invalid("bucket must not be empty".to_string()));
    }
    if self.parallelism == 0 || self.build_parallelism == 0 {
      return Err(SettingsError::Invalid("parallelism must be at least 1".to_string()));
    }
    if self.staging_dir == self.content_dir {
      return Err(SettingsError::Invalid(
        "staging_dir and content_dir must be different directories".to_string(),
      ));
    }
    Ok(())
  }

  /// Where the previous state is read from.
  pub fn content_origin(&self) -> Result<ContentOrigin, SettingsError> {
    match &self.content_source {
      Some(content) => Ok(ContentOrigin::Remote {
        source: SourceInfo::parse(&content.source, &content.options)?,
        branch: content.branch.clone(),
        mirror: Some(self.content_dir.clone()),
      }),
      None => Ok(ContentOrigin::Local {
        dir: self.content_dir.clone(),
      }),
    }
  }

  pub fn github_token(&self) -> Option<String> {
    std::env::var(&self.github.token_env).ok().filter(|t| !t.is_empty())
  }

  /// Directory the bucket is mirrored into.
  pub fn bucket_dir(&self) -> PathBuf {
    self.storage.root.join(&self.bucket)
  }
}

fn env_flag(name: &str) -> bool {
  std::env::var(name)
    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    .unwrap_or(false)
}
