//! A full publish run.
//!
//! 1. Resolve every configured library into a `CdnConfig`
//! 2. Snapshot the content directory
//! 3. Build and install versions that need an update
//! 4. Prune content that is no longer served
//! 5. Refresh alias links
//! 6. Write the new manifest
//! 7. Snapshot again and compute the changes
//! 8. Stage, upload and invalidate
//!
//! Failures of a single library or version are recorded in the [`RunReport`]
//! and never stop the run. Only an unreadable previous state, a broken content
//! directory or a failed upload abort it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::build::{BuildError, BuildNotice, Builder, TarballFetcher, VersionBuild};
use crate::changes::{ContentSnapshot, FilesystemChanges, snapshot};
use crate::content::{AssemblyError, BuiltVersions, ContentLayout, generate_manifest, prune, refresh_alias_links};
use crate::manifest::ManifestError;
use crate::publish::{
  DirectoryBucket, EdgeCache, EdgeCacheError, HttpEdgeCache, ObjectStore, PublishCoordinator, PublishError,
  PublishReport,
};
use crate::resolve::{CdnConfig, LibraryFailure, ResolveError, Resolver};
use crate::settings::{Settings, SettingsError};
use crate::source::bounded::BoundedHost;
use crate::source::github::GitHubClient;
use crate::source::{SourceError, SourceHost};
use crate::util::fs::{FsError, create_dir};
use crate::util::hash::HashError;
use crate::version::{Classification, Version};

#[derive(Debug, Error)]
pub enum RunError {
  #[error(transparent)]
  Settings(#[from] SettingsError),

  #[error("failed to create source client: {0}")]
  SourceClient(#[from] SourceError),

  #[error("failed to create build client: {0}")]
  BuildClient(#[from] BuildError),

  #[error("failed to create edge-cache client: {0}")]
  EdgeCacheClient(#[from] EdgeCacheError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error("failed to snapshot content: {0}")]
  Snapshot(#[from] HashError),

  #[error("failed to assemble content: {0}")]
  Assembly(#[from] AssemblyError),

  #[error("failed to create content directory: {0}")]
  ContentDir(#[from] FsError),

  #[error("failed to write manifest: {0}")]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Publish(#[from] PublishError),

  #[error("task failed: {0}")]
  Task(String),
}

/// Clients a run talks to, built once from [`Settings`].
pub struct Clients {
  pub host: Arc<dyn SourceHost>,
  pub fetcher: TarballFetcher,
  pub store: Box<dyn ObjectStore>,
  pub cache: Option<Box<dyn EdgeCache>>,
}

impl Clients {
  pub fn from_settings(settings: &Settings) -> Result<Self, RunError> {
    let token = settings.github_token();
    let timeout = settings.request_timeout.0;

    let host = source_host(settings)?;
    let fetcher = TarballFetcher::new(token.as_deref(), timeout)?;
    let store: Box<dyn ObjectStore> = Box::new(DirectoryBucket::new(&settings.bucket, settings.bucket_dir()));

    let cache = match &settings.edge_cache {
      Some(edge) => {
        let cache_token = edge
          .token_env
          .as_ref()
          .and_then(|name| std::env::var(name).ok())
          .filter(|t| !t.is_empty());
        let cache: Box<dyn EdgeCache> = Box::new(HttpEdgeCache::new(&edge.api_base, cache_token.as_deref(), timeout)?);
        Some(cache)
      }
      None => None,
    };

    Ok(Self {
      host,
      fetcher,
      store,
      cache,
    })
  }
}

/// The rate-limited source host described by `settings`.
pub fn source_host(settings: &Settings) -> Result<Arc<dyn SourceHost>, RunError> {
  let token = settings.github_token();
  let github = GitHubClient::new(settings.github.api_base.as_deref(), token.as_deref())?;
  Ok(Arc::new(BoundedHost::new(
    Arc::new(github),
    settings.parallelism,
    settings.request_timeout.0,
  )))
}

/// What happened to one version during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
  Updated,
  Unchanged,
  Skipped,
  Ignored,
  Deleted,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionReport {
  pub library: String,
  pub version: String,
  pub experimental: bool,
  pub status: VersionStatus,
  pub reasons: Vec<String>,
  pub notices: Vec<BuildNotice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
  pub dry_run: bool,
  pub versions: Vec<VersionReport>,
  pub library_failures: Vec<LibraryFailure>,
  pub pruned: Vec<String>,
  pub changes: FilesystemChanges,
  pub publish: PublishReport,
}

impl RunReport {
  pub fn count(&self, status: VersionStatus) -> usize {
    self.versions.iter().filter(|v| v.status == status).count()
  }

  pub fn has_failures(&self) -> bool {
    !self.library_failures.is_empty() || self.count(VersionStatus::Failed) > 0
  }
}

/// Resolve the desired state without touching the content directory.
pub async fn plan(settings: &Settings, host: Arc<dyn SourceHost>, now: DateTime<Utc>) -> Result<CdnConfig, RunError> {
  let resolver = Resolver::new(host, settings.content_origin()?, settings.experimental_retention.0).at(now);
  Ok(resolver.load_cdn_config(&settings.libraries).await?)
}

/// Run the whole pipeline.
pub async fn run(settings: &Settings, clients: &Clients, now: DateTime<Utc>) -> Result<RunReport, RunError> {
  info!(bucket = %settings.bucket, libraries = settings.libraries.len(), dry_run = settings.dry_run, "starting run");

  let config = plan(settings, clients.host.clone(), now).await?;
  info!(
    libraries = config.libs.len(),
    failed = config.failures.len(),
    needing_update = config.versions_needing_update().count(),
    force_reload = config.force_reload,
    "resolved libraries"
  );

  let layout = ContentLayout::new(&settings.content_dir);
  let before = blocking_snapshot(layout.root()).await?;

  let builder = Builder::new(
    clients.fetcher.clone(),
    layout.clone(),
    settings.work_dir.clone(),
    settings.build_parallelism,
  );
  let builds = builder.build_all(&config).await;
  let built: BuiltVersions = builds
    .iter()
    .filter(|b| b.result.is_ok())
    .map(|b| (b.lib_id.clone(), b.version.clone()))
    .collect();

  let (pruned, after) = {
    let config = config.clone();
    let layout = layout.clone();
    tokio::task::spawn_blocking(move || assemble(&config, &layout, &built, now))
      .await
      .map_err(|e| RunError::Task(e.to_string()))??
  };

  let changes = FilesystemChanges::between(&before, after);
  if changes.is_empty() {
    info!("content unchanged");
  } else {
    info!(changed = changes.changed.len(), only_manifest = changes.only_manifest_changed, "content changed");
  }

  let coordinator = PublishCoordinator::new(&*clients.store, clients.cache.as_deref(), settings.dry_run);
  let publish = coordinator
    .publish(&config, &settings.content_dir, &settings.staging_dir, &changes)
    .await?;

  let report = RunReport {
    dry_run: settings.dry_run,
    versions: version_reports(&config, &builds),
    library_failures: config.failures.clone(),
    pruned,
    changes,
    publish,
  };
  info!(
    updated = report.count(VersionStatus::Updated),
    failed = report.count(VersionStatus::Failed),
    library_failures = report.library_failures.len(),
    "run complete"
  );
  Ok(report)
}

/// Steps 4 to 7, all filesystem work.
fn assemble(
  config: &CdnConfig,
  layout: &ContentLayout,
  built: &BuiltVersions,
  now: DateTime<Utc>,
) -> Result<(Vec<String>, ContentSnapshot), RunError> {
  create_dir(layout.root())?;
  let pruned = prune(layout, config)?;

  for lib in &config.libs {
    refresh_alias_links(layout, lib)?;
  }

  let manifest = generate_manifest(config, layout, built, now)?;
  manifest.save(&layout.manifest_path())?;

  Ok((pruned, snapshot(layout.root())?))
}

async fn blocking_snapshot(root: &Path) -> Result<ContentSnapshot, RunError> {
  let root = root.to_path_buf();
  tokio::task::spawn_blocking(move || snapshot(&root))
    .await
    .map_err(|e| RunError::Task(e.to_string()))?
    .map_err(RunError::from)
}

/// One entry per resolved version, in library then version order.
pub fn version_reports(config: &CdnConfig, builds: &[VersionBuild]) -> Vec<VersionReport> {
  let results: BTreeMap<(&str, &str), &VersionBuild> = builds
    .iter()
    .map(|b| ((b.lib_id.as_str(), b.version.as_str()), b))
    .collect();

  config
    .lib_versions()
    .map(|(lib, version)| {
      let build = results.get(&(lib.id.as_str(), version.name.as_str())).copied();
      version_report(&lib.id, version, build)
    })
    .collect()
}

fn version_report(lib_id: &str, version: &Version, build: Option<&VersionBuild>) -> VersionReport {
  let mut reasons: Vec<String> = version.messages().into_iter().map(str::to_string).collect();
  let mut notices = Vec::new();

  let status = match (version.needs_update, build.map(|b| &b.result)) {
    (true, Some(Ok(outcome))) => {
      notices = outcome.notices.clone();
      VersionStatus::Updated
    }
    (true, Some(Err(e))) => {
      reasons.push(e.to_string());
      VersionStatus::Failed
    }
    (true, None) => {
      warn!(library = lib_id, version = %version.name, "version needed an update but was not built");
      reasons.push("build did not run".to_string());
      VersionStatus::Failed
    }
    (false, _) => match version.classification() {
      Classification::Ok => VersionStatus::Unchanged,
      Classification::Skipped(_) => VersionStatus::Skipped,
      Classification::Ignored(_) => VersionStatus::Ignored,
      Classification::Deleted(_) => VersionStatus::Deleted,
    },
  };

  VersionReport {
    library: lib_id.to_string(),
    version: version.name.clone(),
    experimental: version.experimental,
    status,
    reasons,
    notices,
  }
}
