//! Implementation of the `cdnpub plan` command.
//!
//! Resolves every configured library against its source host and prints the
//! classification of each version. Nothing is built or written.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use cdnpub_lib::pipeline::{plan, source_host};
use cdnpub_lib::resolve::{CdnConfig, Library};
use cdnpub_lib::settings::Settings;

use crate::output::{
  self, planned_status, print_info, print_json, print_stat, print_success, print_warning, status_symbol, truncate_sha,
};

pub fn cmd_plan(config: &Path, json: bool, verbose: bool) -> Result<()> {
  let settings =
    Settings::load(config).with_context(|| format!("Failed to load settings: {}", config.display()))?;
  let host = source_host(&settings).context("Failed to create source client")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let cdn = rt
    .block_on(plan(&settings, host, Utc::now()))
    .context("Failed to resolve libraries")?;

  if json {
    return print_json(&cdn);
  }

  print_summary(&cdn);
  for lib in &cdn.libs {
    println!();
    print_library(lib, verbose);
  }
  for failure in &cdn.failures {
    print_warning(&format!("{}: {}", failure.id, failure.error));
  }

  Ok(())
}

fn print_summary(cdn: &CdnConfig) {
  let pending = cdn.versions_needing_update().count();
  if pending == 0 {
    print_success("Everything is up to date");
  } else {
    print_info(&format!("{} version(s) need an update", pending));
  }
  print_stat("Libraries", &cdn.libs.len().to_string());
  print_stat("Versions", &cdn.lib_versions().count().to_string());
  if cdn.force_reload {
    print_stat("Reload", "every version (tool version changed)");
  }
  if let Some(sha) = &cdn.content_info.commit_sha {
    print_stat("Content", truncate_sha(sha));
  }
}

fn print_library(lib: &Library, verbose: bool) {
  println!("{} ({})", lib.display.name, lib.id);
  for version in &lib.versions {
    let status = planned_status(version.needs_update, &version.classification());
    let mut line = format!("  {} {}", status_symbol(status), version.path_name());
    if version.needs_update {
      let from = version.manifest_sha.as_deref().map(truncate_sha).unwrap_or("new");
      line.push_str(&format!(" {} {} {}", from, output::symbols::ARROW, truncate_sha(&version.commit_sha)));
    }
    println!("{}", line);
    for message in version.messages() {
      println!("      {}", message);
    }
  }

  if verbose && !lib.aliases.is_empty() {
    println!("  aliases:");
    for (alias, target) in &lib.aliases {
      println!("    {} {} {}", alias, output::symbols::ARROW, target);
    }
  }
}
