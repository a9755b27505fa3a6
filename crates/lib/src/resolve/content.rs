//! Where the previously published content is read from.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::consts::{GIT_SHA_FILENAME, MANIFEST_FILENAME};
use crate::manifest::{Manifest, ManifestError};
use crate::source::{CommitInfo, SourceError, SourceHost, SourceInfo};

/// The published content tree: either a branch of a content repository on the
/// source host, or a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentOrigin {
  Remote {
    source: SourceInfo,
    branch: String,
    /// Local directory assembly works in. A version missing here has no
    /// content sha, whatever the branch records, so it is rebuilt.
    mirror: Option<PathBuf>,
  },
  Local {
    dir: PathBuf,
  },
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
  #[error("failed to fetch manifest: {0}")]
  Fetch(#[from] SourceError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),
}

impl ContentOrigin {
  /// Load the previous manifest. `Ok(None)` means nothing was published yet.
  pub async fn manifest(&self, host: &Arc<dyn SourceHost>) -> Result<Option<Manifest>, ContentError> {
    match self {
      ContentOrigin::Remote { source, branch, .. } => match host.file_contents(source, branch, MANIFEST_FILENAME).await {
        Ok(text) => Ok(Some(Manifest::parse(&text)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
      },
      ContentOrigin::Local { dir } => Ok(Manifest::load(&dir.join(MANIFEST_FILENAME))?),
    }
  }

  /// Read the commit sha recorded next to a published version, if any.
  pub async fn content_sha(&self, host: &Arc<dyn SourceHost>, lib_id: &str, version_path: &str) -> Option<String> {
    let relative = format!("{}/{}/{}", lib_id, version_path, GIT_SHA_FILENAME);
    match self {
      ContentOrigin::Remote { source, branch, mirror } => {
        if let Some(mirror) = mirror
          && !tokio::fs::try_exists(mirror.join(&relative)).await.unwrap_or(false)
        {
          debug!(path = %relative, mirror = %mirror.display(), "version missing from local content");
          return None;
        }
        match host.file_contents(source, branch, &relative).await {
          Ok(text) => Some(text.trim().to_string()),
          Err(e) => {
            debug!(path = %relative, error = %e, "no published content sha");
            None
          }
        }
      }
      ContentOrigin::Local { dir } => tokio::fs::read_to_string(dir.join(&relative))
        .await
        .ok()
        .map(|s| s.trim().to_string()),
    }
  }

  /// Head commit of the content branch; unavailable for local content.
  pub async fn commit(&self, host: &Arc<dyn SourceHost>) -> Option<CommitInfo> {
    match self {
      ContentOrigin::Remote { source, branch, .. } => match host.latest_commit(source, branch).await {
        Ok(commit) => Some(commit),
        Err(e) => {
          warn!(%source, branch, error = %e, "unable to read content commit");
          None
        }
      },
      ContentOrigin::Local { .. } => None,
    }
  }
}
