//! Implementation of the `cdnpub build-plan` command.
//!
//! Runs build-strategy selection against a local checkout without running
//! anything.

use std::path::Path;

use anyhow::{Context, Result, bail};

use cdnpub_lib::build::{BuildConfig, BuildPlan, ProjectFiles};
use cdnpub_lib::repo_config::BuildOverrides;

use crate::output::{print_json, print_stat, print_warning};

pub fn cmd_build_plan(dir: &Path, dependencies: Option<String>, build: Option<String>, json: bool) -> Result<()> {
  if !dir.is_dir() {
    bail!("Not a directory: {}", dir.display());
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let files = rt.block_on(ProjectFiles::detect(dir));

  let overrides = BuildOverrides { dependencies, build };
  let plan = BuildPlan::select(&files, &BuildConfig::from_overrides(Some(&overrides)));

  if json {
    return print_json(&serde_json::json!({ "files": files, "plan": plan }));
  }

  print_stat("Dependencies", plan.dependencies.as_deref().unwrap_or("(none)"));
  print_stat("Build", plan.build.as_deref().unwrap_or("(none)"));
  if !plan.has_build_step() {
    print_warning("No build step; sources would be published as-is");
  }
  Ok(())
}
