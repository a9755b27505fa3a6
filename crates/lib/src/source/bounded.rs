//! Rate limiting for source-host requests.
//!
//! Resolution fans out across every library and every ref. Wrapping the host in a
//! [`BoundedHost`] caps the number of in-flight requests and turns slow requests
//! into ordinary [`SourceError::Timeout`] failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{CommitInfo, RefListing, SourceError, SourceHost, SourceInfo};

/// A [`SourceHost`] that shares a fixed number of request permits.
pub struct BoundedHost {
  inner: Arc<dyn SourceHost>,
  permits: Arc<Semaphore>,
  timeout: Duration,
}

impl BoundedHost {
  pub fn new(inner: Arc<dyn SourceHost>, parallelism: usize, timeout: Duration) -> Self {
    Self {
      inner,
      permits: Arc::new(Semaphore::new(parallelism.max(1))),
      timeout,
    }
  }

  async fn limited<T, F>(&self, fut: F) -> Result<T, SourceError>
  where
    F: Future<Output = Result<T, SourceError>> + Send,
  {
    let _permit = self
      .permits
      .acquire()
      .await
      .map_err(|e| SourceError::Unavailable(e.to_string()))?;

    match tokio::time::timeout(self.timeout, fut).await {
      Ok(result) => result,
      Err(_) => {
        debug!(timeout = ?self.timeout, "source request timed out");
        Err(SourceError::Timeout(self.timeout))
      }
    }
  }
}

#[async_trait]
impl SourceHost for BoundedHost {
  async fn list_refs(&self, source: &SourceInfo) -> Result<RefListing, SourceError> {
    self.limited(self.inner.list_refs(source)).await
  }

  async fn file_contents(&self, source: &SourceInfo, git_ref: &str, path: &str) -> Result<String, SourceError> {
    self.limited(self.inner.file_contents(source, git_ref, path)).await
  }

  async fn latest_commit(&self, source: &SourceInfo, branch: &str) -> Result<CommitInfo, SourceError> {
    self.limited(self.inner.latest_commit(source, branch)).await
  }
}
