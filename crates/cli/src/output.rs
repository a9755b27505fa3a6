//! CLI output formatting utilities.
//!
//! Colored status lines go through `owo-colors` and are dropped when the stream
//! is not a terminal.

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use cdnpub_lib::pipeline::VersionStatus;
use cdnpub_lib::version::Classification;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const MODIFY: &str = "~";
  pub const REMOVE: &str = "-";
  pub const SKIP: &str = "○";
}

pub fn truncate_sha(sha: &str) -> &str {
  let len = sha.len().min(7);
  &sha[..len]
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Symbol for a version line, colored by outcome.
pub fn status_symbol(status: VersionStatus) -> String {
  let (symbol, color): (&str, fn(&str) -> String) = match status {
    VersionStatus::Updated => (symbols::MODIFY, |s| s.green().to_string()),
    VersionStatus::Unchanged => (symbols::SUCCESS, |s| s.dimmed().to_string()),
    VersionStatus::Skipped => (symbols::WARNING, |s| s.yellow().to_string()),
    VersionStatus::Ignored => (symbols::SKIP, |s| s.dimmed().to_string()),
    VersionStatus::Deleted => (symbols::REMOVE, |s| s.red().to_string()),
    VersionStatus::Failed => (symbols::ERROR, |s| s.red().to_string()),
  };
  symbol.if_supports_color(Stream::Stdout, |s| color(s)).to_string()
}

/// Status a version would get if nothing failed while building it.
pub fn planned_status(needs_update: bool, classification: &Classification) -> VersionStatus {
  match classification {
    Classification::Deleted(_) => VersionStatus::Deleted,
    Classification::Skipped(_) => VersionStatus::Skipped,
    Classification::Ignored(_) => VersionStatus::Ignored,
    Classification::Ok if needs_update => VersionStatus::Updated,
    Classification::Ok => VersionStatus::Unchanged,
  }
}
