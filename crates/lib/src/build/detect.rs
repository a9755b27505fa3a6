//! Detection of the files that drive build inference.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use super::strategy::ProjectFiles;

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
  #[serde(default)]
  scripts: BTreeMap<String, serde_json::Value>,
}

impl ProjectFiles {
  /// Inspect a checked-out project. An unreadable `package.json` counts as
  /// present with no scripts.
  pub async fn detect(dir: &Path) -> Self {
    let has_package_json = is_file(&dir.join("package.json")).await;
    let npm_scripts = if has_package_json {
      npm_scripts(&dir.join("package.json")).await
    } else {
      BTreeSet::new()
    };

    Self {
      has_package_json,
      has_yarn_lock: is_file(&dir.join("yarn.lock")).await,
      has_bower_json: is_file(&dir.join("bower.json")).await,
      has_gulpfile: is_file(&dir.join("gulpfile.js")).await,
      npm_scripts,
    }
  }
}

async fn is_file(path: &Path) -> bool {
  tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn npm_scripts(path: &Path) -> BTreeSet<String> {
  let parsed = match tokio::fs::read_to_string(path).await {
    Ok(text) => serde_json::from_str::<PackageJson>(&text).map_err(|e| e.to_string()),
    Err(e) => Err(e.to_string()),
  };
  match parsed {
    Ok(package) => package.scripts.into_keys().collect(),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "unreadable package.json");
      BTreeSet::new()
    }
  }
}
