//! Publishing the assembled content.
//!
//! The content directory is staged (links resolved), synchronized to the
//! bucket, and the edge cache is asked to drop every path that may have changed.
//! A failed sync aborts the publish; a failed invalidation only warns.

pub mod edge;
pub mod stage;
pub mod storage;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

pub use edge::{EdgeCache, EdgeCacheError, HttpEdgeCache, InvalidationBatch, find_distribution};
pub use stage::stage;
pub use storage::{Acl, DirectoryBucket, ObjectStore, StorageError, SyncOptions, SyncReport};

use crate::alias::aliases_for;
use crate::changes::FilesystemChanges;
use crate::consts::{EXPERIMENTAL_PREFIX, MANIFEST_FILENAME};
use crate::resolve::CdnConfig;
use crate::util::fs::FsError;
use crate::util::hash::HashError;

#[derive(Debug, Error)]
pub enum PublishError {
  #[error("failed to stage content: {0}")]
  Stage(#[from] FsError),

  #[error("failed to sync bucket: {0}")]
  Sync(#[from] StorageError),

  #[error("failed to compute invalidation reference: {0}")]
  Token(#[from] HashError),

  #[error("staging task failed: {0}")]
  Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvalidationStatus {
  Created {
    distribution_id: String,
    invalidation_id: String,
    paths: Vec<String>,
  },
  /// No distribution serves the bucket.
  NoDistribution,
  /// No edge cache is configured.
  NotConfigured,
  Failed { error: String },
  /// Dry run.
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
  pub bucket: String,
  pub staged_files: usize,
  pub dry_run: bool,
  /// `None` on a dry run.
  pub sync: Option<SyncReport>,
  pub invalidation: InvalidationStatus,
}

/// Stages, uploads and invalidates.
pub struct PublishCoordinator<'a> {
  store: &'a dyn ObjectStore,
  cache: Option<&'a dyn EdgeCache>,
  dry_run: bool,
}

impl<'a> PublishCoordinator<'a> {
  pub fn new(store: &'a dyn ObjectStore, cache: Option<&'a dyn EdgeCache>, dry_run: bool) -> Self {
    Self { store, cache, dry_run }
  }

  pub async fn publish(
    &self,
    config: &CdnConfig,
    content_dir: &Path,
    staging_dir: &Path,
    changes: &FilesystemChanges,
  ) -> Result<PublishReport, PublishError> {
    let bucket = self.store.bucket().to_string();

    let (content, staging) = (content_dir.to_path_buf(), staging_dir.to_path_buf());
    let staged_files = tokio::task::spawn_blocking(move || stage(&content, &staging))
      .await
      .map_err(|e| PublishError::Task(e.to_string()))??;

    if self.dry_run {
      info!(bucket = %bucket, files = staged_files, "dry run, not uploading");
      return Ok(PublishReport {
        bucket,
        staged_files,
        dry_run: true,
        sync: None,
        invalidation: InvalidationStatus::Skipped,
      });
    }

    info!(bucket = %bucket, "uploading content");
    let sync = self
      .store
      .sync_dir(
        staging_dir,
        SyncOptions {
          delete_removed: true,
          acl: Acl::PublicRead,
        },
      )
      .await?;

    let invalidation = match self.cache {
      Some(cache) => {
        let batch = InvalidationBatch {
          caller_reference: changes.invalidation_token()?,
          paths: invalidation_paths(config),
        };
        self.invalidate(cache, &bucket, batch).await
      }
      None => {
        info!("no edge cache configured, skipping invalidation");
        InvalidationStatus::NotConfigured
      }
    };

    Ok(PublishReport {
      bucket,
      staged_files,
      dry_run: false,
      sync: Some(sync),
      invalidation,
    })
  }

  async fn invalidate(&self, cache: &dyn EdgeCache, bucket: &str, batch: InvalidationBatch) -> InvalidationStatus {
    let distribution = match find_distribution(cache, bucket).await {
      Ok(Some(distribution)) => distribution,
      Ok(None) => {
        warn!(
          bucket,
          "!!! no distribution found for bucket, the edge cache will keep serving stale content !!!"
        );
        return InvalidationStatus::NoDistribution;
      }
      Err(e) => {
        error!(bucket, error = %e, "failed to list distributions");
        return InvalidationStatus::Failed { error: e.to_string() };
      }
    };

    info!(distribution = %distribution.id, paths = ?batch.paths, "invalidating");
    match cache.create_invalidation(&distribution.id, &batch).await {
      Ok(invalidation_id) => {
        info!(distribution = %distribution.id, invalidation = %invalidation_id, "invalidation created");
        InvalidationStatus::Created {
          distribution_id: distribution.id,
          invalidation_id,
          paths: batch.paths,
        }
      }
      Err(e) => {
        error!(distribution = %distribution.id, error = %e, "failed to create invalidation");
        InvalidationStatus::Failed { error: e.to_string() }
      }
    }
  }
}

/// Edge-cache paths touched by the versions of this run.
///
/// For every version that needs an update: the aliases pointing at it, its name,
/// and its experimental path. `/manifest.json` is always last.
///
/// An experimental version also gets `/{lib}/{name}/*` even though its content
/// lives only under `experimental/`; that extra path matches nothing.
pub fn invalidation_paths(config: &CdnConfig) -> Vec<String> {
  let mut paths: Vec<String> = Vec::new();
  let mut push = |path: String| {
    if !paths.contains(&path) {
      paths.push(path);
    }
  };

  for (lib, version) in config.versions_needing_update() {
    for alias in aliases_for(&lib.aliases, &version.name) {
      push(format!("/{}/{}/*", lib.id, alias));
    }
    push(format!("/{}/{}/*", lib.id, version.name));
    if version.experimental {
      push(format!("/{}/{}/{}/*", lib.id, EXPERIMENTAL_PREFIX, version.name));
    }
  }
  push(format!("/{}", MANIFEST_FILENAME));
  paths
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::sync::Mutex;

  use async_trait::async_trait;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  use super::edge::{Distribution, DistributionPage};
  use super::*;
  use crate::alias::Aliases;
  use crate::util::testutil::{cdn_config, library, version};

  #[derive(Default)]
  struct RecordingCache {
    distributions: Vec<Distribution>,
    batches: Mutex<Vec<(String, InvalidationBatch)>>,
    fail: bool,
  }

  #[async_trait]
  impl EdgeCache for RecordingCache {
    async fn list_distributions(&self, _marker: Option<&str>) -> Result<DistributionPage, EdgeCacheError> {
      Ok(DistributionPage {
        items: self.distributions.clone(),
        next_marker: None,
      })
    }

    async fn create_invalidation(&self, id: &str, batch: &InvalidationBatch) -> Result<String, EdgeCacheError> {
      if self.fail {
        return Err(EdgeCacheError::Status {
          url: "test".to_string(),
          status: 500,
        });
      }
      self.batches.lock().unwrap().push((id.to_string(), batch.clone()));
      Ok("I1".to_string())
    }
  }

  struct FailingStore;

  #[async_trait]
  impl ObjectStore for FailingStore {
    fn bucket(&self) -> &str {
      "cdn.example.org"
    }

    async fn sync_dir(&self, local_dir: &Path, _options: SyncOptions) -> Result<SyncReport, StorageError> {
      Err(StorageError::Walk {
        path: local_dir.to_path_buf(),
        message: "denied".to_string(),
      })
    }
  }

  fn needing_update(name: &str) -> crate::version::Version {
    let mut v = version(name, "old");
    v.needs_update = true;
    v
  }

  fn content(temp: &TempDir) -> std::path::PathBuf {
    let dir = temp.path().join("content");
    fs::create_dir_all(dir.join("foo/1.2.0")).unwrap();
    fs::write(dir.join("foo/1.2.0/foo.js"), "js").unwrap();
    fs::write(dir.join("manifest.json"), "{}").unwrap();
    dir
  }

  #[test]
  fn paths_list_aliases_then_name_then_manifest() {
    let mut lib = library("foo", vec![needing_update("1.2.0")]);
    lib.aliases = Aliases::from([("1.x.x".to_string(), "1.2.0".to_string())]);

    let paths = invalidation_paths(&cdn_config(vec![lib]));

    assert_eq!(paths, vec!["/foo/1.x.x/*", "/foo/1.2.0/*", "/manifest.json"]);
  }

  #[test]
  fn paths_skip_current_versions() {
    let mut feature = needing_update("feature");
    feature.experimental = true;
    let lib = library("foo", vec![needing_update("1.0.0"), version("0.9.0", "same"), feature]);

    let paths = invalidation_paths(&cdn_config(vec![lib]));

    assert_eq!(
      paths,
      vec![
        "/foo/1.0.x/*",
        "/foo/1.x.x/*",
        "/foo/latest/*",
        "/foo/1.0.0/*",
        "/foo/feature/*",
        "/foo/experimental/feature/*",
        "/manifest.json",
      ]
    );
  }

  #[tokio::test]
  async fn dry_run_stops_after_staging() {
    let temp = TempDir::new().unwrap();
    let content = content(&temp);
    let bucket = DirectoryBucket::new("cdn.example.org", temp.path().join("bucket"));
    let cache = RecordingCache::default();

    let report = PublishCoordinator::new(&bucket, Some(&cache), true)
      .publish(
        &cdn_config(vec![]),
        &content,
        &temp.path().join("staging"),
        &FilesystemChanges::default(),
      )
      .await
      .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.staged_files, 2);
    assert_eq!(report.invalidation, InvalidationStatus::Skipped);
    assert!(!bucket.root().exists());
    assert!(cache.batches.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn publishes_and_invalidates_matching_distribution() {
    let temp = TempDir::new().unwrap();
    let content = content(&temp);
    let bucket = DirectoryBucket::new("cdn.example.org", temp.path().join("bucket"));
    let cache = RecordingCache {
      distributions: vec![Distribution {
        id: "E2".to_string(),
        aliases: vec!["cdn.example.org".to_string()],
      }],
      ..RecordingCache::default()
    };
    let config = cdn_config(vec![library("foo", vec![needing_update("1.2.0")])]);
    let changes = FilesystemChanges::default();

    let report = PublishCoordinator::new(&bucket, Some(&cache), false)
      .publish(&config, &content, &temp.path().join("staging"), &changes)
      .await
      .unwrap();

    assert!(bucket.root().join("foo/1.2.0/foo.js").is_file());
    assert_eq!(report.sync.unwrap().uploaded.len(), 2);
    assert!(matches!(report.invalidation, InvalidationStatus::Created { .. }));

    let batches = cache.batches.lock().unwrap();
    assert_eq!(batches[0].0, "E2");
    assert_eq!(batches[0].1.caller_reference, changes.invalidation_token().unwrap());
    assert_eq!(batches[0].1.paths.last().map(String::as_str), Some("/manifest.json"));
  }

  #[tokio::test]
  #[traced_test]
  async fn missing_distribution_is_not_fatal() {
    let temp = TempDir::new().unwrap();
    let content = content(&temp);
    let bucket = DirectoryBucket::new("cdn.example.org", temp.path().join("bucket"));
    let cache = RecordingCache::default();

    let report = PublishCoordinator::new(&bucket, Some(&cache), false)
      .publish(
        &cdn_config(vec![]),
        &content,
        &temp.path().join("staging"),
        &FilesystemChanges::default(),
      )
      .await
      .unwrap();

    assert_eq!(report.invalidation, InvalidationStatus::NoDistribution);
    assert!(logs_contain("no distribution found for bucket"));
  }

  #[tokio::test]
  async fn invalidation_failure_is_not_fatal() {
    let temp = TempDir::new().unwrap();
    let content = content(&temp);
    let bucket = DirectoryBucket::new("cdn.example.org", temp.path().join("bucket"));
    let cache = RecordingCache {
      distributions: vec![Distribution {
        id: "E2".to_string(),
        aliases: vec!["cdn.example.org".to_string()],
      }],
      fail: true,
      ..RecordingCache::default()
    };

    let report = PublishCoordinator::new(&bucket, Some(&cache), false)
      .publish(
        &cdn_config(vec![]),
        &content,
        &temp.path().join("staging"),
        &FilesystemChanges::default(),
      )
      .await
      .unwrap();

    assert!(matches!(report.invalidation, InvalidationStatus::Failed { .. }));
    assert!(bucket.root().join("manifest.json").is_file());
  }

  #[tokio::test]
  async fn sync_failure_is_fatal() {
    let temp = TempDir::new().unwrap();
    let content = content(&temp);

    let err = PublishCoordinator::new(&FailingStore, None, false)
      .publish(
        &cdn_config(vec![]),
        &content,
        &temp.path().join("staging"),
        &FilesystemChanges::default(),
      )
      .await
      .unwrap_err();

    assert!(matches!(err, PublishError::Sync(_)));
  }
}
