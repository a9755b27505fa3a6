//! Shell command execution for build steps.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use super::BuildError;

/// Lines of stderr kept in a failure.
const STDERR_TAIL_LINES: usize = 20;

/// Run `cmd` through the platform shell in `working_dir`.
///
/// The inherited environment is kept (package managers need `PATH` and `HOME`);
/// `CI=true` is set so tools do not prompt. Returns the trimmed stdout.
pub async fn run_command(cmd: &str, working_dir: &Path) -> Result<String, BuildError> {
  info!(cmd = %cmd, working_dir = %working_dir.display(), "executing command");

  let (shell, shell_args) = shell();
  let output = Command::new(shell)
    .args(shell_args)
    .arg(cmd)
    .current_dir(working_dir)
    .env("CI", "true")
    .kill_on_drop(true)
    .output()
    .await
    .map_err(|e| BuildError::Spawn {
      cmd: cmd.to_string(),
      source: e,
    })?;

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  let stderr = String::from_utf8_lossy(&output.stderr);

  if !output.status.success() {
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }
    return Err(BuildError::CommandFailed {
      cmd: cmd.to_string(),
      code: output.status.code(),
      stderr: tail(&stderr, STDERR_TAIL_LINES),
    });
  }

  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }
  Ok(stdout)
}

fn tail(text: &str, lines: usize) -> String {
  let all: Vec<&str> = text.trim_end().lines().collect();
  all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(unix)]
fn shell() -> (&'static str, &'static [&'static str]) {
  ("/bin/sh", &["-c"])
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static [&'static str]) {
  ("cmd.exe", &["/C"])
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[tokio::test]
  async fn runs_in_working_dir() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("marker.txt"), "here").unwrap();

    #[cfg(unix)]
    let cmd = "cat marker.txt";
    #[cfg(windows)]
    let cmd = "type marker.txt";

    assert_eq!(run_command(cmd, temp.path()).await.unwrap(), "here");
  }

  #[tokio::test]
  async fn sets_ci_variable() {
    let temp = TempDir::new().unwrap();

    #[cfg(unix)]
    let cmd = "echo $CI";
    #[cfg(windows)]
    let cmd = "echo %CI%";

    assert_eq!(run_command(cmd, temp.path()).await.unwrap(), "true");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn failure_carries_code_and_stderr() {
    let temp = TempDir::new().unwrap();
    let err = run_command("echo broken >&2; exit 3", temp.path()).await.unwrap_err();
    match err {
      BuildError::CommandFailed { code, stderr, .. } => {
        assert_eq!(code, Some(3));
        assert_eq!(stderr, "broken");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn tail_keeps_last_lines() {
    assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
    assert_eq!(tail("only", 5), "only");
  }
}
