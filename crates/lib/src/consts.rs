pub const APP_NAME: &str = "cdnpub";

/// Version of this tool, recorded as `$cdn-version` in the manifest.
pub const CDN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The branch that is published under [`MASTER_ALIAS`] instead of its own name.
pub const MASTER_BRANCH: &str = "master";

/// Reserved version name for the master branch; also the `latest` fallback.
pub const MASTER_ALIAS: &str = "unstable";

/// Path segment that namespaces experimental branches in the content tree.
pub const EXPERIMENTAL_PREFIX: &str = "experimental";

pub const LATEST_ALIAS: &str = "latest";

/// Per-repository publishing configuration file.
pub const REPO_CONFIG_FILENAME: &str = ".cdn-config.yml";

pub const MANIFEST_FILENAME: &str = "manifest.json";

/// File inside each published version directory holding the commit it was built from.
pub const GIT_SHA_FILENAME: &str = ".git-sha";

pub const DEFAULT_SETTINGS_FILENAME: &str = "cdnpub.yml";
