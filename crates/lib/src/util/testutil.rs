//! Test utilities for cdnpub-lib.
//!
//! An in-memory [`SourceHost`] plus shorthand constructors for refs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alias::{Aliases, compute_aliases};
use crate::consts::CDN_VERSION;
use crate::resolve::{CdnConfig, ContentInfo, Library, LibraryDisplay};
use crate::source::{CommitInfo, RefInfo, RefKind, RefListing, SourceError, SourceHost, SourceInfo};
use crate::version::{Version, VersionResources};

pub fn github(owner_repo: &str) -> SourceInfo {
  let (owner, repo) = owner_repo.split_once('/').unwrap();
  SourceInfo::Github {
    owner: owner.to_string(),
    repo: repo.to_string(),
    api_base: None,
  }
}

pub fn tag(name: &str, sha: &str) -> RefInfo {
  RefInfo {
    name: name.to_string(),
    ref_name: name.to_string(),
    kind: RefKind::Tag,
    tarball_url: format!("https://example.test/tarball/{}", name),
    commit_sha: sha.to_string(),
    view_url: format!("https://example.test/tree/{}", name),
    last_update: None,
  }
}

pub fn branch(name: &str, sha: &str, last_update: Option<DateTime<Utc>>) -> RefInfo {
  RefInfo {
    kind: RefKind::Branch,
    last_update,
    ..tag(name, sha)
  }
}

/// A publishable version whose previous record matches `sha`.
pub fn version(name: &str, sha: &str) -> Version {
  Version {
    name: name.to_string(),
    ref_name: name.to_string(),
    tarball_url: format!("https://example.test/tarball/{}", name),
    commit_sha: sha.to_string(),
    manifest_sha: Some(sha.to_string()),
    content_sha: Some(sha.to_string()),
    link: format!("https://example.test/tree/{}", name),
    resources: VersionResources {
      entrypoints: BTreeMap::new(),
      mappings: Some(Vec::new()),
    },
    build: None,
    ignored: None,
    skipped: None,
    deleted: None,
    needs_update: false,
    experimental: false,
    last_update: None,
  }
}

/// A library with aliases computed from its version names.
pub fn library(id: &str, versions: Vec<Version>) -> Library {
  let aliases: Aliases = compute_aliases(versions.iter().map(|v| v.name.as_str()));
  Library {
    id: id.to_string(),
    source: github(&format!("org/{}", id)),
    versions,
    aliases,
    display: LibraryDisplay {
      name: id.to_string(),
      ..LibraryDisplay::default()
    },
  }
}

pub fn cdn_config(libs: Vec<Library>) -> CdnConfig {
  CdnConfig {
    cdn_version: CDN_VERSION.to_string(),
    libs,
    content_info: ContentInfo::default(),
    force_reload: false,
    failures: Vec::new(),
  }
}

/// Source host backed by maps keyed on the source's display form.
#[derive(Default)]
pub struct MockHost {
  refs: HashMap<String, RefListing>,
  files: HashMap<(String, String, String), String>,
  commits: HashMap<(String, String), CommitInfo>,
  failing: HashSet<String>,
  requests: Mutex<Vec<String>>,
  commit_requests: Mutex<Vec<String>>,
}

impl MockHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_refs(mut self, source: &str, tags: Vec<RefInfo>, branches: Vec<RefInfo>) -> Self {
    self.refs.insert(source.to_string(), RefListing { tags, branches });
    self
  }

  pub fn with_file(mut self, source: &str, git_ref: &str, path: &str, contents: &str) -> Self {
    self.files.insert(
      (source.to_string(), git_ref.to_string(), path.to_string()),
      contents.to_string(),
    );
    self
  }

  pub fn with_commit(mut self, source: &str, branch: &str, sha: &str, tree_sha: &str) -> Self {
    self.commits.insert(
      (source.to_string(), branch.to_string()),
      CommitInfo {
        sha: sha.to_string(),
        tree_sha: tree_sha.to_string(),
        date: None,
      },
    );
    self
  }

  /// Record a dated commit, looked up by sha or branch name.
  pub fn with_commit_date(mut self, source: &str, git_ref: &str, date: DateTime<Utc>) -> Self {
    self.commits.insert(
      (source.to_string(), git_ref.to_string()),
      CommitInfo {
        sha: git_ref.to_string(),
        tree_sha: String::new(),
        date: Some(date),
      },
    );
    self
  }

  /// Make `list_refs` fail for a source.
  pub fn failing(mut self, source: &str) -> Self {
    self.failing.insert(source.to_string());
    self
  }

  /// Every file request made, as `source@ref:path`.
  pub fn file_requests(&self) -> Vec<String> {
    self.requests.lock().unwrap().clone()
  }

  /// Every commit lookup made, as `source@ref`.
  pub fn commit_requests(&self) -> Vec<String> {
    self.commit_requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl SourceHost for MockHost {
  async fn list_refs(&self, source: &SourceInfo) -> Result<RefListing, SourceError> {
    let key = source.to_string();
    if self.failing.contains(&key) {
      return Err(SourceError::Unavailable(key));
    }
    Ok(self.refs.get(&key).cloned().unwrap_or_default())
  }

  async fn file_contents(&self, source: &SourceInfo, git_ref: &str, path: &str) -> Result<String, SourceError> {
    let key = (source.to_string(), git_ref.to_string(), path.to_string());
    self
      .requests
      .lock()
      .unwrap()
      .push(format!("{}@{}:{}", key.0, key.1, key.2));
    self.files.get(&key).cloned().ok_or_else(|| SourceError::NotFound {
      path: path.to_string(),
      git_ref: git_ref.to_string(),
    })
  }

  async fn latest_commit(&self, source: &SourceInfo, branch: &str) -> Result<CommitInfo, SourceError> {
    self
      .commit_requests
      .lock()
      .unwrap()
      .push(format!("{}@{}", source, branch));
    self
      .commits
      .get(&(source.to_string(), branch.to_string()))
      .cloned()
      .ok_or_else(|| SourceError::NotFound {
        path: String::new(),
        git_ref: branch.to_string(),
      })
  }
}
