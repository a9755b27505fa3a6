mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cdnpub_lib::consts::DEFAULT_SETTINGS_FILENAME;

/// cdnpub - publish versioned front-end libraries to a CDN
#[derive(Parser)]
#[command(name = "cdnpub")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve every library and show what a publish would do
  Plan {
    /// Path to the settings file
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILENAME)]
    config: PathBuf,

    /// Print the resolved configuration as JSON
    #[arg(long)]
    json: bool,
  },

  /// Build changed versions and publish the content
  Publish {
    /// Path to the settings file
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILENAME)]
    config: PathBuf,

    /// Assemble and stage, but do not upload or invalidate
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
  },

  /// Compute the aliases for a set of version names
  Aliases {
    /// Version names, e.g. 1.0.0 1.1.0 v2.0.0
    #[arg(required = true)]
    names: Vec<String>,

    #[arg(long)]
    json: bool,
  },

  /// Show the commands that would build a checked-out project
  BuildPlan {
    /// Project directory
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Explicit dependency command ("inferred" to detect)
    #[arg(long)]
    dependencies: Option<String>,

    /// Explicit build command ("inferred" to detect)
    #[arg(long)]
    build: Option<String>,

    #[arg(long)]
    json: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Plan { config, json } => cmd::cmd_plan(&config, json, cli.verbose),
    Commands::Publish { config, dry_run, json } => cmd::cmd_publish(&config, dry_run, json),
    Commands::Aliases { names, json } => cmd::cmd_aliases(&names, json),
    Commands::BuildPlan {
      dir,
      dependencies,
      build,
      json,
    } => cmd::cmd_build_plan(&dir, dependencies, build, json),
  }
}
