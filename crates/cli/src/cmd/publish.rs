//! Implementation of the `cdnpub publish` command.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use cdnpub_lib::pipeline::{Clients, RunReport, VersionStatus, run};
use cdnpub_lib::publish::InvalidationStatus;
use cdnpub_lib::settings::Settings;

use crate::output::{print_error, print_info, print_json, print_stat, print_success, print_warning, status_symbol};

/// Run the full pipeline and print the run report.
///
/// Library and version failures are reported but do not fail the command;
/// the run still publishes everything else.
pub fn cmd_publish(config: &Path, dry_run: bool, json: bool) -> Result<()> {
  let mut settings =
    Settings::load(config).with_context(|| format!("Failed to load settings: {}", config.display()))?;
  settings.dry_run |= dry_run;
  debug!(settings = %config.display(), dry_run = settings.dry_run, "loaded settings");

  let clients = Clients::from_settings(&settings).context("Failed to create clients")?;

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(run(&settings, &clients, Utc::now()))
    .context("Publish failed")?;

  if json {
    return print_json(&report);
  }

  print_report(&report);
  let elapsed = Duration::from_secs(started.elapsed().as_secs());
  print_stat("Took", &humantime::format_duration(elapsed).to_string());
  Ok(())
}

fn print_report(report: &RunReport) {
  for version in &report.versions {
    if version.status == VersionStatus::Unchanged || version.status == VersionStatus::Ignored {
      continue;
    }
    println!("{} {}@{}", status_symbol(version.status), version.library, version.version);
    for reason in &version.reasons {
      println!("    {}", reason);
    }
  }
  for failure in &report.library_failures {
    print_error(&format!("{}: {}", failure.id, failure.error));
  }

  println!();
  if report.dry_run {
    print_info(&format!(
      "Dry run: staged {} file(s), nothing uploaded",
      report.publish.staged_files
    ));
  } else if report.has_failures() {
    print_warning("Published with failures");
  } else {
    print_success("Published");
  }

  print_stat("Updated", &report.count(VersionStatus::Updated).to_string());
  print_stat("Failed", &report.count(VersionStatus::Failed).to_string());
  print_stat("Pruned", &report.pruned.len().to_string());
  print_stat("Changed paths", &report.changes.changed.len().to_string());
  if let Some(sync) = &report.publish.sync {
    print_stat("Uploaded", &sync.uploaded.len().to_string());
    print_stat("Deleted", &sync.deleted.len().to_string());
  }

  match &report.publish.invalidation {
    InvalidationStatus::Created { invalidation_id, paths, .. } => {
      print_stat("Invalidation", &format!("{} ({} paths)", invalidation_id, paths.len()))
    }
    InvalidationStatus::NoDistribution => print_warning("No distribution found for the bucket; cache not invalidated"),
    InvalidationStatus::Failed { error } => print_warning(&format!("Invalidation failed: {}", error)),
    InvalidationStatus::NotConfigured | InvalidationStatus::Skipped => {}
  }
}
