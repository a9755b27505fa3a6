//! Source-host access for library repositories.
//!
//! Libraries declare where their source lives with a short descriptor such as
//! `github:byuweb/byu-theme-components`. The descriptor is parsed into a closed
//! [`SourceInfo`] variant, and every variant is served by a [`SourceHost`].
//!
//! # Modules
//!
//! - [`github`] - GitHub REST adapter
//! - [`bounded`] - concurrency and timeout limits for any host

pub mod bounded;
pub mod github;
mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use types::*;

/// A parsed source descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceInfo {
  /// A repository on GitHub or a GitHub-compatible API.
  Github {
    owner: String,
    repo: String,
    /// Overrides the default API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_base: Option<String>,
  },
}

impl SourceInfo {
  /// Parse a descriptor like `github:owner/repo`.
  ///
  /// `options` carries adapter-specific settings; `api_base` is honoured for GitHub.
  pub fn parse(source: &str, options: &BTreeMap<String, String>) -> Result<Self, ParseError> {
    let (scheme, rest) = source
      .split_once(':')
      .ok_or_else(|| ParseError::MissingScheme(source.to_string()))?;

    match scheme {
      "github" => {
        let rest = rest.trim_end_matches('/').trim_end_matches(".git");
        let (owner, repo) = rest
          .split_once('/')
          .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
          .ok_or_else(|| ParseError::InvalidGithub(source.to_string()))?;
        Ok(SourceInfo::Github {
          owner: owner.to_string(),
          repo: repo.to_string(),
          api_base: options.get("api_base").cloned(),
        })
      }
      other => Err(ParseError::UnknownScheme(other.to_string())),
    }
  }
}

impl fmt::Display for SourceInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceInfo::Github { owner, repo, .. } => write!(f, "github:{}/{}", owner, repo),
    }
  }
}

/// Errors from parsing a source descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("source '{0}' has no scheme (expected e.g. 'github:owner/repo')")]
  MissingScheme(String),

  #[error("unsupported source scheme '{0}'")]
  UnknownScheme(String),

  #[error("invalid github source '{0}', expected 'github:owner/repo'")]
  InvalidGithub(String),
}

/// Errors from talking to a source host.
#[derive(Debug, Error)]
pub enum SourceError {
  /// The requested file does not exist at the ref.
  #[error("'{path}' not found at '{git_ref}'")]
  NotFound { path: String, git_ref: String },

  #[error("request to {url} failed: {message}")]
  Http { url: String, message: String },

  #[error("request to {url} returned HTTP {status}")]
  Status { url: String, status: u16 },

  #[error("failed to decode response from {url}: {message}")]
  Decode { url: String, message: String },

  #[error("request timed out after {0:?}")]
  Timeout(Duration),

  #[error("source host unavailable: {0}")]
  Unavailable(String),
}

impl SourceError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, SourceError::NotFound { .. })
  }
}

/// Capabilities required from a source-control host.
#[async_trait]
pub trait SourceHost: Send + Sync {
  /// List every tag and branch of the repository.
  async fn list_refs(&self, source: &SourceInfo) -> Result<RefListing, SourceError>;

  /// Fetch a file's contents at a ref.
  async fn file_contents(&self, source: &SourceInfo, git_ref: &str, path: &str) -> Result<String, SourceError>;

  /// Fetch the head commit of a branch.
  async fn latest_commit(&self, source: &SourceInfo, branch: &str) -> Result<CommitInfo, SourceError>;
}
