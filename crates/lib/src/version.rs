//! Version classification.
//!
//! Every ref of a library becomes a [`Version`]. Whether it can be published, and
//! whether it has to be rebuilt, depends only on the ref itself, its repository
//! config, the previous manifest entry and the digest recorded next to the
//! previously published content.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::consts::EXPERIMENTAL_PREFIX;
use crate::manifest::ManifestVersion;
use crate::repo_config::{BuildOverrides, RepoConfig, ResourceMapping};
use crate::source::RefInfo;

pub const REASON_NO_CONFIG: &str = "There is no valid .cdn-config.yml present";
pub const REASON_CONFIG_REMOVED: &str = "There is no longer a valid .cdn-config.yml present";

/// Why a version is not (re)published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Classification {
  Ok,
  /// The ref never had a valid config; it does not belong on the CDN.
  Ignored(String),
  /// The ref is on the CDN but cannot be updated right now.
  Skipped(String),
  /// The ref should be removed from the CDN.
  Deleted(String),
}

impl fmt::Display for Classification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Classification::Ok => write!(f, "ok"),
      Classification::Ignored(reason) => write!(f, "ignored: {}", reason),
      Classification::Skipped(reason) => write!(f, "skipped: {}", reason),
      Classification::Deleted(reason) => write!(f, "deleted: {}", reason),
    }
  }
}

/// Inputs shared by every version of a run.
#[derive(Debug, Clone)]
pub struct VersionContext {
  pub force_reload: bool,
  pub now: DateTime<Utc>,
  pub experimental_retention: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionResources {
  /// Entrypoint path -> description.
  pub entrypoints: BTreeMap<String, String>,
  /// Copy rules; `None` when the version has no current config.
  pub mappings: Option<Vec<ResourceMapping>>,
}

/// A resolved, classified version of a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
  /// Published name; differs from `ref_name` for the master branch.
  pub name: String,
  pub ref_name: String,
  pub tarball_url: String,
  pub commit_sha: String,
  /// Sha recorded for this version in the previous manifest.
  pub manifest_sha: Option<String>,
  /// Sha recorded next to the previously published content.
  pub content_sha: Option<String>,
  pub link: String,
  pub resources: VersionResources,
  pub build: Option<BuildOverrides>,
  pub ignored: Option<String>,
  pub skipped: Option<String>,
  pub deleted: Option<String>,
  pub needs_update: bool,
  pub experimental: bool,
  pub last_update: Option<DateTime<Utc>>,
}

impl Version {
  pub fn can_update(&self) -> bool {
    self.ignored.is_none() && self.skipped.is_none() && self.deleted.is_none()
  }

  pub fn in_manifest(&self) -> bool {
    self.manifest_sha.is_some()
  }

  /// Most significant classification; deletion wins over config problems.
  pub fn classification(&self) -> Classification {
    if let Some(reason) = &self.deleted {
      Classification::Deleted(reason.clone())
    } else if let Some(reason) = &self.skipped {
      Classification::Skipped(reason.clone())
    } else if let Some(reason) = &self.ignored {
      Classification::Ignored(reason.clone())
    } else {
      Classification::Ok
    }
  }

  /// Every attached reason, in ignored/skipped/deleted order.
  pub fn messages(&self) -> Vec<&str> {
    [&self.ignored, &self.skipped, &self.deleted]
      .into_iter()
      .filter_map(|r| r.as_deref())
      .collect()
  }

  /// Directory of this version below its library in the content tree.
  pub fn path_name(&self) -> String {
    if self.experimental {
      format!("{}/{}", EXPERIMENTAL_PREFIX, self.name)
    } else {
      self.name.clone()
    }
  }

  /// Whether this version's content stays on the CDN.
  pub fn is_served(&self) -> bool {
    self.ignored.is_none() && self.deleted.is_none()
  }
}

/// Classify one ref.
pub fn create_version(
  name: &str,
  git_ref: &RefInfo,
  manifest_version: Option<&ManifestVersion>,
  repo_config: Option<&RepoConfig>,
  content_sha: Option<&str>,
  experimental: bool,
  ctx: &VersionContext,
) -> Version {
  let mut ignored = None;
  let mut skipped = None;

  let (entrypoints, mappings, build) = match (repo_config, manifest_version) {
    (Some(config), _) => (
      config.entrypoint_descriptions(),
      Some(config.mappings()),
      config.build.clone(),
    ),
    (None, Some(previous)) => {
      skipped = Some(REASON_CONFIG_REMOVED.to_string());
      (previous.entrypoints(), None, None)
    }
    (None, None) => {
      ignored = Some(REASON_NO_CONFIG.to_string());
      (BTreeMap::new(), None, None)
    }
  };

  let deleted = if experimental && is_expired(git_ref.last_update, ctx) {
    Some(format!(
      "Experimental branch hasn't been updated in {}",
      humantime::format_duration(ctx.experimental_retention)
    ))
  } else {
    None
  };

  let manifest_sha = manifest_version.map(|v| v.git_sha.clone());
  let content_sha = content_sha.map(|s| s.trim().to_string());
  let sha = &git_ref.commit_sha;

  let mut version = Version {
    name: name.to_string(),
    ref_name: git_ref.ref_name.clone(),
    tarball_url: git_ref.tarball_url.clone(),
    commit_sha: sha.clone(),
    link: git_ref.view_url.clone(),
    resources: VersionResources { entrypoints, mappings },
    build,
    ignored,
    skipped,
    deleted,
    needs_update: false,
    experimental,
    last_update: git_ref.last_update,
    manifest_sha,
    content_sha,
  };

  version.needs_update = version.can_update()
    && (ctx.force_reload
      || version.manifest_sha.as_deref() != Some(sha.as_str())
      || version.content_sha.as_deref() != Some(sha.as_str()));

  version
}

fn is_expired(last_update: Option<DateTime<Utc>>, ctx: &VersionContext) -> bool {
  let Some(last_update) = last_update else {
    return false;
  };
  let retention = TimeDelta::from_std(ctx.experimental_retention).unwrap_or(TimeDelta::MAX);
  match ctx.now.checked_sub_signed(retention) {
    Some(expiration) => last_update < expiration,
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::manifest::ManifestResource;
  use crate::source::RefKind;

  const DAY: Duration = Duration::from_secs(24 * 60 * 60);

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 3, 1, 0, 0, 0).unwrap()
  }

  fn ctx(force_reload: bool) -> VersionContext {
    VersionContext {
      force_reload,
      now: now(),
      experimental_retention: 30 * DAY,
    }
  }

  fn git_ref(name: &str, sha: &str, days_old: i64) -> RefInfo {
    RefInfo {
      name: name.to_string(),
      ref_name: name.to_string(),
      kind: RefKind::Tag,
      tarball_url: format!("https://example.com/tarball/{}", name),
      commit_sha: sha.to_string(),
      view_url: format!("https://example.com/tree/{}", name),
      last_update: Some(now() - TimeDelta::days(days_old)),
    }
  }

  fn config() -> RepoConfig {
    RepoConfig::parse("entrypoints:\n  foo.js: Main\nresources:\n  - foo.js\n").unwrap()
  }

  fn manifest_version(name: &str, sha: &str) -> ManifestVersion {
    let mut resources = BTreeMap::new();
    resources.insert(
      "old.js".to_string(),
      ManifestResource {
        entrypoint: true,
        description: Some("Old entry".to_string()),
      },
    );
    resources.insert("old.css".to_string(), ManifestResource::default());
    ManifestVersion {
      name: name.to_string(),
      ref_name: None,
      git_sha: sha.to_string(),
      resources,
    }
  }

  #[test]
  fn unchanged_version_does_not_need_update() {
    let previous = manifest_version("1.0.0", "abc");
    let version = create_version(
      "1.0.0",
      &git_ref("1.0.0", "abc", 1),
      Some(&previous),
      Some(&config()),
      Some("abc\n"),
      false,
      &ctx(false),
    );

    assert!(version.can_update());
    assert!(!version.needs_update);
    assert_eq!(version.classification(), Classification::Ok);
    assert!(version.messages().is_empty());
  }

  #[test]
  fn force_reload_marks_unchanged_version() {
    let previous = manifest_version("1.0.0", "abc");
    let version = create_version(
      "1.0.0",
      &git_ref("1.0.0", "abc", 1),
      Some(&previous),
      Some(&config()),
      Some("abc"),
      false,
      &ctx(true),
    );
    assert!(version.needs_update);
  }

  #[test]
  fn either_recorded_sha_mismatch_triggers_update() {
    let previous = manifest_version("1.0.0", "abc");

    let stale_content = create_version(
      "1.0.0",
      &git_ref("1.0.0", "abc", 1),
      Some(&previous),
      Some(&config()),
      Some("old"),
      false,
      &ctx(false),
    );
    assert!(stale_content.needs_update);

    let stale_manifest = create_version(
      "1.0.0",
      &git_ref("1.0.0", "abc", 1),
      Some(&manifest_version("1.0.0", "old")),
      Some(&config()),
      Some("abc"),
      false,
      &ctx(false),
    );
    assert!(stale_manifest.needs_update);

    let new_version = create_version(
      "1.1.0",
      &git_ref("1.1.0", "def", 1),
      None,
      Some(&config()),
      None,
      false,
      &ctx(false),
    );
    assert!(new_version.needs_update);
    assert!(!new_version.in_manifest());
  }

  #[test]
  fn config_present_uses_its_entrypoints_and_mappings() {
    let version = create_version(
      "1.0.0",
      &git_ref("1.0.0", "abc", 1),
      Some(&manifest_version("1.0.0", "abc")),
      Some(&config()),
      None,
      false,
      &ctx(false),
    );
    assert_eq!(version.resources.entrypoints["foo.js"], "Main");
    assert_eq!(version.resources.mappings.as_ref().unwrap().len(), 1);
  }

  #[test]
  fn missing_config_with_manifest_entry_is_skipped() {
    let previous = manifest_version("1.0.0", "abc");
    let version = create_version(
      "1.0.0",
      &git_ref("1.0.0", "def", 1),
      Some(&previous),
      None,
      Some("abc"),
      false,
      &ctx(true),
    );

    assert_eq!(version.skipped.as_deref(), Some(REASON_CONFIG_REMOVED));
    assert!(version.ignored.is_none());
    assert!(!version.can_update());
    assert!(!version.needs_update);
    assert!(version.is_served());
    // Keeps serving the previously published entrypoints.
    assert_eq!(version.resources.entrypoints.len(), 1);
    assert_eq!(version.resources.entrypoints["old.js"], "Old entry");
    assert!(version.resources.mappings.is_none());
  }

  #[test]
  fn missing_config_without_manifest_entry_is_ignored() {
    let version = create_version(
      "1.0.0",
      &git_ref("1.0.0", "abc", 1),
      None,
      None,
      None,
      false,
      &ctx(true),
    );

    assert_eq!(version.ignored.as_deref(), Some(REASON_NO_CONFIG));
    assert!(!version.can_update());
    assert!(!version.needs_update);
    assert!(!version.is_served());
    assert_eq!(version.classification(), Classification::Ignored(REASON_NO_CONFIG.to_string()));
  }

  #[test]
  fn stale_experimental_branch_is_deleted() {
    let version = create_version(
      "feature-x",
      &git_ref("feature-x", "abc", 45),
      None,
      Some(&config()),
      None,
      true,
      &ctx(false),
    );

    let reason = version.deleted.clone().unwrap();
    assert!(!reason.is_empty());
    assert!(reason.contains("30days"));
    assert!(!version.can_update());
    assert!(!version.needs_update);
    assert!(matches!(version.classification(), Classification::Deleted(_)));
  }

  #[test]
  fn deletion_applies_regardless_of_config() {
    let version = create_version(
      "feature-x",
      &git_ref("feature-x", "abc", 45),
      None,
      None,
      None,
      true,
      &ctx(false),
    );
    assert!(version.ignored.is_some());
    assert!(version.deleted.is_some());
    assert_eq!(version.messages().len(), 2);
    assert!(matches!(version.classification(), Classification::Deleted(_)));
  }

  #[test]
  fn fresh_experimental_branch_is_kept() {
    let version = create_version(
      "feature-x",
      &git_ref("feature-x", "abc", 3),
      None,
      Some(&config()),
      None,
      true,
      &ctx(false),
    );
    assert!(version.deleted.is_none());
    assert!(version.needs_update);
    assert_eq!(version.path_name(), "experimental/feature-x");
  }

  #[test]
  fn old_tags_are_never_deleted() {
    let version = create_version(
      "0.1.0",
      &git_ref("0.1.0", "abc", 900),
      None,
      Some(&config()),
      None,
      false,
      &ctx(false),
    );
    assert!(version.deleted.is_none());
    assert_eq!(version.path_name(), "0.1.0");
  }

  #[test]
  fn unknown_last_update_is_not_expired() {
    let mut info = git_ref("feature-x", "abc", 0);
    info.last_update = None;
    let version = create_version("feature-x", &info, None, Some(&config()), None, true, &ctx(false));
    assert!(version.deleted.is_none());
  }

  #[test]
  fn can_update_is_false_whenever_a_reason_is_set() {
    let cases = [
      (Some(config()), None, 1, false),
      (None, Some(manifest_version("x", "abc")), 1, false),
      (None, None, 1, false),
      (Some(config()), None, 90, true),
    ];

    for (config, previous, days_old, experimental) in cases {
      let version = create_version(
        "x",
        &git_ref("x", "abc", days_old),
        previous.as_ref(),
        config.as_ref(),
        None,
        experimental,
        &ctx(true),
      );
      let any_reason = version.ignored.is_some() || version.skipped.is_some() || version.deleted.is_some();
      assert_eq!(version.can_update(), !any_reason);
      assert!(!version.needs_update || version.can_update());
    }
  }
}
