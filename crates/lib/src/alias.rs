//! Floating version aliases.
//!
//! Every semver version name contributes two buckets, `{major}.x.x` and
//! `{major}.{minor}.x`, each pointing at the highest version that satisfies it.
//! `latest` points at the highest version overall, or at the master alias when
//! no tag is a valid semver version.
//!
//! Pre-release versions never satisfy a wildcard range, so a bucket whose only
//! members are pre-releases is left out.

use std::collections::BTreeMap;

use crate::consts::{LATEST_ALIAS, MASTER_ALIAS};

/// Alias name -> version name.
pub type Aliases = BTreeMap<String, String>;

/// Parse a version name the way tags are usually written (`1.2.3` or `v1.2.3`).
pub fn parse_semver(name: &str) -> Option<semver::Version> {
  let trimmed = name.strip_prefix('v').unwrap_or(name);
  semver::Version::parse(trimmed).ok()
}

/// Compute aliases from a set of version names.
pub fn compute_aliases<'a, I>(names: I) -> Aliases
where
  I: IntoIterator<Item = &'a str>,
{
  let parsed: Vec<(semver::Version, &str)> = names
    .into_iter()
    .filter_map(|name| parse_semver(name).map(|v| (v, name)))
    .collect();

  let releases: Vec<&(semver::Version, &str)> = parsed.iter().filter(|(v, _)| v.pre.is_empty()).collect();

  let max_matching = |pred: &dyn Fn(&semver::Version) -> bool| -> Option<String> {
    releases
      .iter()
      .filter(|(v, _)| pred(v))
      // Equal versions (`1.0.0` and `v1.0.0`) resolve to the smaller name.
      .max_by(|(a, a_name), (b, b_name)| a.cmp(b).then_with(|| b_name.cmp(a_name)))
      .map(|(_, name)| name.to_string())
  };

  let mut aliases = Aliases::new();
  for (version, _) in &parsed {
    let (major, minor) = (version.major, version.minor);

    let major_alias = format!("{}.x.x", major);
    if !aliases.contains_key(&major_alias)
      && let Some(target) = max_matching(&|v| v.major == major)
    {
      aliases.insert(major_alias, target);
    }

    let minor_alias = format!("{}.{}.x", major, minor);
    if !aliases.contains_key(&minor_alias)
      && let Some(target) = max_matching(&|v| v.major == major && v.minor == minor)
    {
      aliases.insert(minor_alias, target);
    }
  }

  let latest = max_matching(&|_| true).unwrap_or_else(|| MASTER_ALIAS.to_string());
  aliases.insert(LATEST_ALIAS.to_string(), latest);

  aliases
}

/// Aliases that currently point at `version_name`.
pub fn aliases_for<'a>(aliases: &'a Aliases, version_name: &str) -> Vec<&'a str> {
  aliases
    .iter()
    .filter(|(_, target)| target.as_str() == version_name)
    .map(|(alias, _)| alias.as_str())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn aliases(pairs: &[(&str, &str)]) -> Aliases {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn computes_major_minor_and_latest() {
    let result = compute_aliases(["1.0.0", "1.1.0", "2.0.0"]);
    assert_eq!(
      result,
      aliases(&[
        ("1.x.x", "1.1.0"),
        ("1.1.x", "1.1.0"),
        ("1.0.x", "1.0.0"),
        ("2.x.x", "2.0.0"),
        ("2.0.x", "2.0.0"),
        ("latest", "2.0.0"),
      ])
    );
  }

  #[test]
  fn latest_falls_back_to_master_alias() {
    let result = compute_aliases(["unstable", "feature-x", "not-a-version"]);
    assert_eq!(result, aliases(&[("latest", "unstable")]));
  }

  #[test]
  fn empty_input_only_has_latest() {
    let result = compute_aliases(std::iter::empty());
    assert_eq!(result, aliases(&[("latest", MASTER_ALIAS)]));
  }

  #[test]
  fn uses_semver_precedence_not_string_order() {
    let result = compute_aliases(["1.9.0", "1.10.0", "1.2.0"]);
    assert_eq!(result["1.x.x"], "1.10.0");
    assert_eq!(result["latest"], "1.10.0");
  }

  #[test]
  fn prerelease_sorts_below_release() {
    let result = compute_aliases(["2.0.0-beta.1", "2.0.0", "1.0.0"]);
    assert_eq!(result["2.x.x"], "2.0.0");
    assert_eq!(result["2.0.x"], "2.0.0");
    assert_eq!(result["latest"], "2.0.0");
  }

  #[test]
  fn prerelease_only_bucket_is_omitted() {
    let result = compute_aliases(["1.0.0", "2.0.0-rc.1"]);
    assert!(!result.contains_key("2.x.x"));
    assert!(!result.contains_key("2.0.x"));
    assert_eq!(result["latest"], "1.0.0");
  }

  #[test]
  fn v_prefixed_tags_keep_their_name() {
    let result = compute_aliases(["v1.0.0", "v1.0.1"]);
    assert_eq!(result["1.0.x"], "v1.0.1");
    assert_eq!(result["latest"], "v1.0.1");
  }

  #[test]
  fn result_is_independent_of_input_order() {
    let a = compute_aliases(["1.0.0", "2.1.0", "2.0.3", "unstable"]);
    let b = compute_aliases(["unstable", "2.0.3", "1.0.0", "2.1.0"]);
    assert_eq!(a, b);
  }

  #[test]
  fn equal_versions_resolve_to_the_same_name_in_any_order() {
    let a = compute_aliases(["1.0.0", "v1.0.0"]);
    let b = compute_aliases(["v1.0.0", "1.0.0"]);
    assert_eq!(a, b);
    assert_eq!(a["1.0.x"], "1.0.0");
    assert_eq!(a["latest"], "1.0.0");
  }

  #[test]
  fn aliases_for_finds_every_alias_of_a_version() {
    let computed = compute_aliases(["1.0.0", "1.2.0"]);
    let mut found = aliases_for(&computed, "1.2.0");
    found.sort();
    assert_eq!(found, vec!["1.2.x", "1.x.x", "latest"]);
    assert_eq!(aliases_for(&computed, "1.0.0"), vec!["1.0.x"]);
    assert!(aliases_for(&computed, "9.9.9").is_empty());
  }
}
