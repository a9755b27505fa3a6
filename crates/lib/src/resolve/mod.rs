//! Resolution of the desired CDN state.
//!
//! The [`Resolver`] reads the previous manifest, lists every ref of every
//! configured library and classifies each one into a [`Version`]. Libraries and
//! refs are resolved concurrently; a library that fails to resolve is recorded in
//! [`CdnConfig::failures`] without affecting the others.

mod config;
mod content;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub use config::*;
pub use content::*;

use crate::alias::{Aliases, compute_aliases};
use crate::consts::{CDN_VERSION, EXPERIMENTAL_PREFIX, LATEST_ALIAS, MASTER_ALIAS, MASTER_BRANCH, REPO_CONFIG_FILENAME};
use crate::manifest::ManifestLib;
use crate::repo_config::RepoConfig;
use crate::settings::LibrarySource;
use crate::source::{ParseError, RefInfo, SourceError, SourceHost, SourceInfo};
use crate::version::{Version, VersionContext, create_version};

/// Errors that abort the whole resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("failed to load previous manifest: {0}")]
  Content(#[from] ContentError),
}

/// Errors that drop a single library from the run.
#[derive(Debug, Error)]
pub enum LibraryError {
  #[error("invalid source: {0}")]
  Parse(#[from] ParseError),

  #[error("failed to list refs: {0}")]
  ListRefs(#[source] SourceError),

  #[error("resolution task failed: {0}")]
  Task(String),
}

pub struct Resolver {
  host: Arc<dyn SourceHost>,
  content: ContentOrigin,
  experimental_retention: Duration,
  now: DateTime<Utc>,
}

struct Shared {
  host: Arc<dyn SourceHost>,
  content: ContentOrigin,
  ctx: VersionContext,
}

impl Resolver {
  pub fn new(host: Arc<dyn SourceHost>, content: ContentOrigin, experimental_retention: Duration) -> Self {
    Self {
      host,
      content,
      experimental_retention,
      now: Utc::now(),
    }
  }

  /// Pin the clock used for experimental expiry.
  pub fn at(mut self, now: DateTime<Utc>) -> Self {
    self.now = now;
    self
  }

  pub async fn load_cdn_config(&self, libraries: &BTreeMap<String, LibrarySource>) -> Result<CdnConfig, ResolveError> {
    let previous = self.content.manifest(&self.host).await?;
    let force_reload = match &previous {
      None => {
        info!("no previous manifest, every version will be rebuilt");
        true
      }
      Some(manifest) if manifest.requires_reload(CDN_VERSION) => {
        info!(
          previous = %manifest.cdn_version,
          current = CDN_VERSION,
          "manifest written by another version, every version will be rebuilt"
        );
        true
      }
      Some(_) => false,
    };
    let manifest = previous.unwrap_or_default();

    let shared = Arc::new(Shared {
      host: self.host.clone(),
      content: self.content.clone(),
      ctx: VersionContext {
        force_reload,
        now: self.now,
        experimental_retention: self.experimental_retention,
      },
    });

    let commit_task = {
      let shared = shared.clone();
      tokio::spawn(async move { shared.content.commit(&shared.host).await })
    };

    let mut join_set = JoinSet::new();
    for (id, source) in libraries {
      let shared = shared.clone();
      let id = id.clone();
      let source = source.clone();
      let manifest_lib = manifest.library(&id).cloned();

      join_set.spawn(async move {
        let result = resolve_library(shared, &id, &source, manifest_lib).await;
        (id, result)
      });
    }

    let mut libs = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((_, Ok(lib))) => libs.push(lib),
        Ok((id, Err(e))) => {
          error!(library = %id, error = %e, "library resolution failed");
          failures.push(LibraryFailure {
            id,
            error: e.to_string(),
          });
        }
        Err(e) => error!(error = %e, "library resolution task panicked"),
      }
    }
    for id in libraries.keys() {
      if !libs.iter().any(|l| &l.id == id) && !failures.iter().any(|f| &f.id == id) {
        failures.push(LibraryFailure {
          id: id.clone(),
          error: "resolution task panicked".to_string(),
        });
      }
    }
    libs.sort_by(|a, b| a.id.cmp(&b.id));
    failures.sort_by(|a, b| a.id.cmp(&b.id));

    let commit = match commit_task.await {
      Ok(commit) => commit,
      Err(e) => {
        warn!(error = %e, "content commit task failed");
        None
      }
    };

    Ok(CdnConfig {
      cdn_version: CDN_VERSION.to_string(),
      libs,
      content_info: ContentInfo {
        commit_sha: commit.as_ref().map(|c| c.sha.clone()),
        tree_sha: commit.map(|c| c.tree_sha),
        manifest,
      },
      force_reload,
      failures,
    })
  }
}

/// Fetch and parse `.cdn-config.yml` at a ref. Any failure means no config.
pub async fn fetch_repo_config(host: &Arc<dyn SourceHost>, source: &SourceInfo, git_ref: &str) -> Option<RepoConfig> {
  match host.file_contents(source, git_ref, REPO_CONFIG_FILENAME).await {
    Ok(text) => match RepoConfig::parse(&text) {
      Ok(config) => Some(config),
      Err(e) => {
        warn!(%source, git_ref, error = %e, "invalid repository config");
        None
      }
    },
    Err(e) => {
      debug!(%source, git_ref, error = %e, "no repository config");
      None
    }
  }
}

/// Commit date of an experimental branch head, the only refs that expire.
///
/// Each lookup is its own host request; a failure leaves the date unknown.
async fn branch_date(
  host: &Arc<dyn SourceHost>,
  source: &SourceInfo,
  git_ref: &RefInfo,
  experimental: bool,
) -> Option<DateTime<Utc>> {
  if !experimental || git_ref.last_update.is_some() {
    return git_ref.last_update;
  }
  match host.latest_commit(source, &git_ref.commit_sha).await {
    Ok(commit) => commit.date,
    Err(e) => {
      warn!(%source, git_ref = %git_ref.name, error = %e, "unable to fetch commit date");
      None
    }
  }
}

/// A ref with the name and flavour it is published under.
struct Candidate {
  name: String,
  git_ref: RefInfo,
  experimental: bool,
}

fn candidates(tags: Vec<RefInfo>, branches: Vec<RefInfo>) -> Vec<Candidate> {
  let tags = tags.into_iter().map(|t| Candidate {
    name: t.name.clone(),
    git_ref: t,
    experimental: false,
  });
  let branches = branches.into_iter().map(|b| {
    if b.ref_name == MASTER_BRANCH {
      Candidate {
        name: MASTER_ALIAS.to_string(),
        git_ref: b,
        experimental: false,
      }
    } else {
      Candidate {
        name: b.name.clone(),
        git_ref: b,
        experimental: true,
      }
    }
  });
  tags.chain(branches).collect()
}

async fn resolve_library(
  shared: Arc<Shared>,
  id: &str,
  source: &LibrarySource,
  manifest_lib: Option<ManifestLib>,
) -> Result<Library, LibraryError> {
  let info = SourceInfo::parse(&source.source, &source.options)?;
  let listing = shared.host.list_refs(&info).await.map_err(LibraryError::ListRefs)?;
  debug!(
    library = id,
    tags = listing.tags.len(),
    branches = listing.branches.len(),
    "listed refs"
  );

  let mut join_set = JoinSet::new();
  for (index, candidate) in candidates(listing.tags, listing.branches).into_iter().enumerate() {
    let shared = shared.clone();
    let info = info.clone();
    let id = id.to_string();
    let manifest_version = manifest_lib
      .as_ref()
      .and_then(|lib| lib.version(&candidate.name))
      .cloned();

    join_set.spawn(async move {
      let Candidate {
        name,
        mut git_ref,
        experimental,
      } = candidate;
      let path_name = if experimental {
        format!("{}/{}", EXPERIMENTAL_PREFIX, name)
      } else {
        name.clone()
      };

      let (repo_config, content_sha, last_update) = tokio::join!(
        fetch_repo_config(&shared.host, &info, &git_ref.ref_name),
        shared.content.content_sha(&shared.host, &id, &path_name),
        branch_date(&shared.host, &info, &git_ref, experimental),
      );
      git_ref.last_update = last_update;

      let version = create_version(
        &name,
        &git_ref,
        manifest_version.as_ref(),
        repo_config.as_ref(),
        content_sha.as_deref(),
        experimental,
        &shared.ctx,
      );
      (index, version, repo_config)
    });
  }

  let mut resolved = Vec::with_capacity(join_set.len());
  while let Some(joined) = join_set.join_next().await {
    resolved.push(joined.map_err(|e| LibraryError::Task(e.to_string()))?);
  }
  resolved.sort_by_key(|(index, ..)| *index);

  let mut configs = HashMap::new();
  let mut versions = Vec::with_capacity(resolved.len());
  for (_, version, repo_config) in resolved {
    debug!(library = id, version = %version.name, classification = %version.classification(), needs_update = version.needs_update, "resolved version");
    configs.insert(version.ref_name.clone(), repo_config);
    versions.push(version);
  }

  let aliases = compute_aliases(versions.iter().map(|v| v.name.as_str()));
  let display = display_metadata(&shared, &info, id, &versions, &aliases, &configs, manifest_lib.as_ref()).await;

  Ok(Library {
    id: id.to_string(),
    source: info,
    versions,
    aliases,
    display,
  })
}

/// Display metadata from the config at the latest version, else the previous manifest.
async fn display_metadata(
  shared: &Shared,
  info: &SourceInfo,
  id: &str,
  versions: &[Version],
  aliases: &Aliases,
  configs: &HashMap<String, Option<RepoConfig>>,
  manifest_lib: Option<&ManifestLib>,
) -> LibraryDisplay {
  let latest_ref = aliases
    .get(LATEST_ALIAS)
    .and_then(|latest| versions.iter().find(|v| &v.name == latest))
    .map(|v| v.ref_name.clone())
    .unwrap_or_else(|| MASTER_BRANCH.to_string());

  let config = match configs.get(&latest_ref) {
    Some(config) => config.clone(),
    None => fetch_repo_config(&shared.host, info, &latest_ref).await,
  };

  let manifest_name = manifest_lib.map(|lib| lib.name.clone()).filter(|n| !n.is_empty());
  match (config, manifest_lib) {
    (Some(config), _) => LibraryDisplay {
      name: config.name.or(manifest_name).unwrap_or_else(|| id.to_string()),
      description: config.description.unwrap_or_default(),
      docs: config.docs_url.unwrap_or_default(),
    },
    (None, Some(lib)) => {
      warn!(library = id, git_ref = %latest_ref, "using display metadata from previous manifest");
      LibraryDisplay {
        name: manifest_name.unwrap_or_else(|| id.to_string()),
        description: lib.description.clone(),
        docs: lib.docs_url.clone(),
      }
    }
    (None, None) => LibraryDisplay {
      name: id.to_string(),
      ..LibraryDisplay::default()
    },
  }
}
