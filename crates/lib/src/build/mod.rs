//! Building versions that need an update.
//!
//! For each version flagged `needs_update`, the ref's tarball is downloaded and
//! unpacked into a work directory, the selected dependency and build commands are
//! run there, and the configured resources are installed into the content tree.
//!
//! # Modules
//!
//! - [`strategy`] - pure command selection
//! - [`detect`] - file detection in a checked-out project
//! - [`cmd`] - shell command runner
//! - [`fetch`] - tarball download and unpacking

pub mod cmd;
pub mod detect;
pub mod fetch;
pub mod strategy;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub use fetch::TarballFetcher;
pub use strategy::{BuildConfig, BuildPlan, BuildStep, ProjectFiles};

use crate::content::{AssemblyError, ContentLayout, install_version};
use crate::resolve::CdnConfig;
use crate::util::fs::{FsError, empty_dir, remove_path};
use crate::version::Version;

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("failed to download {url}: {message}")]
  Download { url: String, message: String },

  #[error("download of {url} timed out after {after:?}")]
  Timeout { url: String, after: Duration },

  #[error("failed to unpack {path}: {message}")]
  Unpack { path: PathBuf, message: String },

  #[error("failed to spawn '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command '{cmd}' failed with exit code {code:?}: {stderr}")]
  CommandFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Fs(#[from] FsError),

  #[error(transparent)]
  Assembly(#[from] AssemblyError),

  #[error("build task failed: {0}")]
  Task(String),
}

/// Something worth reporting about a build that still succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BuildNotice {
  /// No build command applies; the source tree was published as-is.
  NoBuildStep,
  /// The dependency command failed; the build step ran anyway.
  DependenciesFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
  pub plan: BuildPlan,
  pub notices: Vec<BuildNotice>,
  pub files: usize,
}

/// Result of building one version.
#[derive(Debug)]
pub struct VersionBuild {
  pub lib_id: String,
  pub version: String,
  pub result: Result<BuildOutcome, BuildError>,
}

#[derive(Debug, Clone)]
pub struct Builder {
  fetcher: TarballFetcher,
  layout: ContentLayout,
  work_dir: PathBuf,
  parallelism: usize,
}

impl Builder {
  pub fn new(fetcher: TarballFetcher, layout: ContentLayout, work_dir: PathBuf, parallelism: usize) -> Self {
    Self {
      fetcher,
      layout,
      work_dir,
      parallelism: parallelism.max(1),
    }
  }

  /// Build every version of `config` that needs an update.
  ///
  /// Builds run concurrently up to the configured parallelism; a failed build
  /// never cancels the others.
  pub async fn build_all(&self, config: &CdnConfig) -> Vec<VersionBuild> {
    let semaphore = Arc::new(Semaphore::new(self.parallelism));
    let builder = Arc::new(self.clone());
    let mut join_set = JoinSet::new();

    for (lib, version) in config.versions_needing_update() {
      let semaphore = semaphore.clone();
      let builder = builder.clone();
      let lib_id = lib.id.clone();
      let version = version.clone();

      join_set.spawn(async move {
        let result = match semaphore.acquire_owned().await {
          Ok(_permit) => builder.build_version(&lib_id, &version).await,
          Err(e) => Err(BuildError::Task(e.to_string())),
        };
        VersionBuild {
          lib_id,
          version: version.name,
          result,
        }
      });
    }

    let mut builds = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(build) => {
          if let Err(e) = &build.result {
            error!(library = %build.lib_id, version = %build.version, error = %e, "build failed");
          }
          builds.push(build);
        }
        Err(e) => error!(error = %e, "build task panicked"),
      }
    }
    builds.sort_by(|a, b| (&a.lib_id, &a.version).cmp(&(&b.lib_id, &b.version)));
    builds
  }

  /// Fetch, build and install one version.
  pub async fn build_version(&self, lib_id: &str, version: &Version) -> Result<BuildOutcome, BuildError> {
    info!(library = lib_id, version = %version.name, git_ref = %version.ref_name, "building version");

    let work = self.work_dir.join(lib_id).join(version.path_name());
    empty_dir(&work)?;
    let result = self.build_in(lib_id, version, &work).await;
    if let Err(e) = remove_path(&work) {
      warn!(path = %work.display(), error = %e, "failed to clean up work directory");
    }
    result
  }

  async fn build_in(&self, lib_id: &str, version: &Version, work: &std::path::Path) -> Result<BuildOutcome, BuildError> {
    let src = self.fetcher.fetch(&version.tarball_url, work).await?;

    let files = ProjectFiles::detect(&src).await;
    let plan = BuildPlan::select(&files, &BuildConfig::from_overrides(version.build.as_ref()));
    let mut notices = Vec::new();

    if let Some(deps) = &plan.dependencies
      && let Err(e) = cmd::run_command(deps, &src).await
    {
      warn!(library = lib_id, version = %version.name, error = %e, "dependency installation failed, building anyway");
      notices.push(BuildNotice::DependenciesFailed(e.to_string()));
    }

    match &plan.build {
      Some(build) => {
        cmd::run_command(build, &src).await?;
      }
      None => {
        info!(library = lib_id, version = %version.name, "no build step, publishing sources as-is");
        notices.push(BuildNotice::NoBuildStep);
      }
    }

    let layout = self.layout.clone();
    let lib = lib_id.to_string();
    let installed = version.clone();
    let files = tokio::task::spawn_blocking(move || install_version(&layout, &lib, &installed, &src))
      .await
      .map_err(|e| BuildError::Task(e.to_string()))??;

    Ok(BuildOutcome { plan, notices, files })
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::fetch::tests::tarball;
  use super::*;
  use crate::consts::GIT_SHA_FILENAME;
  use crate::repo_config::{BuildOverrides, ResourceMapping};
  use crate::util::testutil::{cdn_config, library, version};

  fn builder(temp: &TempDir) -> Builder {
    Builder::new(
      TarballFetcher::new(None, Duration::from_secs(10)).unwrap(),
      ContentLayout::new(temp.path().join("content")),
      temp.path().join("work"),
      2,
    )
  }

  fn needing_update(name: &str, url: String) -> Version {
    let mut v = version(name, "old");
    v.commit_sha = format!("sha-{}", name);
    v.tarball_url = url;
    v.needs_update = true;
    v
  }

  #[tokio::test]
  async fn builds_and_installs_without_build_step() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/tarball/1.0.0")
      .with_body(tarball(&[("foo.js", "plain")]))
      .create_async()
      .await;

    let temp = TempDir::new().unwrap();
    let v = needing_update("1.0.0", format!("{}/tarball/1.0.0", server.url()));
    let outcome = builder(&temp).build_version("foo", &v).await.unwrap();

    assert_eq!(outcome.notices, vec![BuildNotice::NoBuildStep]);
    assert_eq!(outcome.files, 1);
    let dir = temp.path().join("content/foo/1.0.0");
    assert_eq!(fs::read_to_string(dir.join("foo.js")).unwrap(), "plain");
    assert_eq!(fs::read_to_string(dir.join(GIT_SHA_FILENAME)).unwrap(), "sha-1.0.0");
    assert!(!temp.path().join("work/foo/1.0.0").exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn runs_explicit_commands_and_copies_mappings() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/tarball/2.0.0")
      .with_body(tarball(&[("src/foo.js", "source")]))
      .create_async()
      .await;

    let temp = TempDir::new().unwrap();
    let mut v = needing_update("2.0.0", format!("{}/tarball/2.0.0", server.url()));
    v.build = Some(BuildOverrides {
      dependencies: Some("exit 1".to_string()),
      build: Some("mkdir -p dist && cp src/foo.js dist/foo.min.js".to_string()),
    });
    v.resources.mappings = Some(vec![ResourceMapping {
      src: "dist/".to_string(),
      dest: Some(".".to_string()),
    }]);

    let outcome = builder(&temp).build_version("foo", &v).await.unwrap();

    assert!(matches!(outcome.notices.as_slice(), [BuildNotice::DependenciesFailed(_)]));
    assert_eq!(
      fs::read_to_string(temp.path().join("content/foo/2.0.0/foo.min.js")).unwrap(),
      "source"
    );
    assert!(!temp.path().join("content/foo/2.0.0/src").exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn failed_build_command_leaves_previous_content() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/tarball/1.0.0")
      .with_body(tarball(&[("foo.js", "new")]))
      .create_async()
      .await;

    let temp = TempDir::new().unwrap();
    let previous = temp.path().join("content/foo/1.0.0");
    fs::create_dir_all(&previous).unwrap();
    fs::write(previous.join("foo.js"), "old").unwrap();

    let mut v = needing_update("1.0.0", format!("{}/tarball/1.0.0", server.url()));
    v.build = Some(BuildOverrides {
      dependencies: None,
      build: Some("exit 2".to_string()),
    });

    let err = builder(&temp).build_version("foo", &v).await.unwrap_err();
    assert!(matches!(err, BuildError::CommandFailed { code: Some(2), .. }));
    assert_eq!(fs::read_to_string(previous.join("foo.js")).unwrap(), "old");
  }

  #[tokio::test]
  async fn build_all_isolates_failures() {
    let mut server = mockito::Server::new_async().await;
    let _ok = server
      .mock("GET", "/tarball/1.0.0")
      .with_body(tarball(&[("foo.js", "ok")]))
      .create_async()
      .await;
    let _missing = server
      .mock("GET", "/tarball/1.1.0")
      .with_status(500)
      .create_async()
      .await;

    let temp = TempDir::new().unwrap();
    let config = cdn_config(vec![library(
      "foo",
      vec![
        needing_update("1.0.0", format!("{}/tarball/1.0.0", server.url())),
        needing_update("1.1.0", format!("{}/tarball/1.1.0", server.url())),
        version("0.9.0", "current"),
      ],
    )]);

    let builds = builder(&temp).build_all(&config).await;

    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].version, "1.0.0");
    assert!(builds[0].result.is_ok());
    assert_eq!(builds[1].version, "1.1.0");
    assert!(matches!(builds[1].result, Err(BuildError::Download { .. })));
  }
}
