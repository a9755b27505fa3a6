//! Build-strategy selection.
//!
//! Pure decisions over what a checked-out project contains and what its
//! repository config asks for. Explicit commands always win; otherwise the
//! command is inferred from well-known files.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::repo_config::BuildOverrides;

/// Config value that asks for the command to be inferred.
pub const INFERRED: &str = "inferred";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStep {
  Inferred,
  Explicit(String),
}

impl BuildStep {
  fn from_override(value: Option<&str>) -> Self {
    match value.map(str::trim) {
      None | Some("") | Some(INFERRED) => BuildStep::Inferred,
      Some(command) => BuildStep::Explicit(command.to_string()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildConfig {
  pub dependencies: BuildStep,
  pub build: BuildStep,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      dependencies: BuildStep::Inferred,
      build: BuildStep::Inferred,
    }
  }
}

impl BuildConfig {
  pub fn from_overrides(overrides: Option<&BuildOverrides>) -> Self {
    match overrides {
      Some(o) => Self {
        dependencies: BuildStep::from_override(o.dependencies.as_deref()),
        build: BuildStep::from_override(o.build.as_deref()),
      },
      None => Self::default(),
    }
  }
}

/// Presence of the files that drive inference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectFiles {
  pub has_package_json: bool,
  pub has_yarn_lock: bool,
  pub has_bower_json: bool,
  pub has_gulpfile: bool,
  /// Script names declared in `package.json`.
  pub npm_scripts: BTreeSet<String>,
}

/// Commands to run for one version; `None` means no such step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
  pub dependencies: Option<String>,
  pub build: Option<String>,
}

impl BuildPlan {
  pub fn select(files: &ProjectFiles, config: &BuildConfig) -> Self {
    Self {
      dependencies: select_dependencies(files, config),
      build: select_build(files, config),
    }
  }

  pub fn has_build_step(&self) -> bool {
    self.build.is_some()
  }
}

pub fn select_dependencies(files: &ProjectFiles, config: &BuildConfig) -> Option<String> {
  if let BuildStep::Explicit(command) = &config.dependencies {
    return Some(command.clone());
  }
  if files.has_yarn_lock {
    Some("yarn".to_string())
  } else if files.has_package_json {
    Some("npm install".to_string())
  } else if files.has_bower_json {
    Some("bower install".to_string())
  } else {
    None
  }
}

pub fn select_build(files: &ProjectFiles, config: &BuildConfig) -> Option<String> {
  if let BuildStep::Explicit(command) = &config.build {
    return Some(command.clone());
  }
  if files.has_package_json && files.npm_scripts.contains("build") {
    if files.has_yarn_lock {
      Some("yarn build".to_string())
    } else {
      Some("npm run build".to_string())
    }
  } else if files.has_gulpfile {
    Some("gulp".to_string())
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn npm_project(scripts: &[&str]) -> ProjectFiles {
    ProjectFiles {
      has_package_json: true,
      npm_scripts: scripts.iter().map(|s| s.to_string()).collect(),
      ..ProjectFiles::default()
    }
  }

  #[test]
  fn yarn_project_with_build_script() {
    let files = ProjectFiles {
      has_yarn_lock: true,
      ..npm_project(&["build", "test"])
    };
    let plan = BuildPlan::select(&files, &BuildConfig::default());
    assert_eq!(plan.dependencies.as_deref(), Some("yarn"));
    assert_eq!(plan.build.as_deref(), Some("yarn build"));
  }

  #[test]
  fn npm_project_with_build_script() {
    let plan = BuildPlan::select(&npm_project(&["build"]), &BuildConfig::default());
    assert_eq!(plan.dependencies.as_deref(), Some("npm install"));
    assert_eq!(plan.build.as_deref(), Some("npm run build"));
  }

  #[test]
  fn package_json_without_build_script_falls_through_to_gulp() {
    let files = ProjectFiles {
      has_gulpfile: true,
      ..npm_project(&["test"])
    };
    assert_eq!(select_build(&files, &BuildConfig::default()).as_deref(), Some("gulp"));
    assert_eq!(select_build(&npm_project(&[]), &BuildConfig::default()), None);
  }

  #[test]
  fn bower_only_project() {
    let files = ProjectFiles {
      has_bower_json: true,
      ..ProjectFiles::default()
    };
    let plan = BuildPlan::select(&files, &BuildConfig::default());
    assert_eq!(plan.dependencies.as_deref(), Some("bower install"));
    assert!(!plan.has_build_step());
  }

  #[test]
  fn plain_project_has_no_steps() {
    let plan = BuildPlan::select(&ProjectFiles::default(), &BuildConfig::default());
    assert_eq!(plan, BuildPlan::default());
  }

  #[test]
  fn explicit_commands_win() {
    let overrides = BuildOverrides {
      dependencies: Some("npm ci".to_string()),
      build: Some("make dist".to_string()),
    };
    let files = ProjectFiles {
      has_yarn_lock: true,
      ..npm_project(&["build"])
    };
    let plan = BuildPlan::select(&files, &BuildConfig::from_overrides(Some(&overrides)));
    assert_eq!(plan.dependencies.as_deref(), Some("npm ci"));
    assert_eq!(plan.build.as_deref(), Some("make dist"));
  }

  #[test]
  fn inferred_keyword_and_missing_fields_infer() {
    let overrides = BuildOverrides {
      dependencies: Some(INFERRED.to_string()),
      build: None,
    };
    let config = BuildConfig::from_overrides(Some(&overrides));
    assert_eq!(config, BuildConfig::default());
  }
}
