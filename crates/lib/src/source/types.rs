//! Snapshots of source-control state returned by a [`SourceHost`](super::SourceHost).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a ref is a tag or a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
  Tag,
  Branch,
}

/// A tag or branch as seen by the source host at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefInfo {
  /// Human-facing name of the ref.
  pub name: String,
  /// Identifier used to fetch files at this ref.
  pub ref_name: String,
  pub kind: RefKind,
  pub tarball_url: String,
  pub commit_sha: String,
  /// Browser URL for the ref.
  pub view_url: String,
  /// Commit timestamp reported by the host, if it could be fetched.
  pub last_update: Option<DateTime<Utc>>,
}

/// Tags and branches of a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefListing {
  pub tags: Vec<RefInfo>,
  pub branches: Vec<RefInfo>,
}

/// Head commit of a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
  pub sha: String,
  pub tree_sha: String,
  pub date: Option<DateTime<Utc>>,
}
