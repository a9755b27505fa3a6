//! Alias links (`{lib}/latest -> 1.2.0`).

use std::path::Path;

use tracing::{debug, warn};

use super::{AssemblyError, ContentLayout};
use crate::resolve::Library;
use crate::util::fs::create_dir_link;

/// Point every alias of `lib` at its target version directory.
///
/// Aliases whose target is not served or has no content are skipped, as are
/// aliases that collide with a real version name. Returns the aliases linked.
pub fn refresh_alias_links(layout: &ContentLayout, lib: &Library) -> Result<Vec<String>, AssemblyError> {
  let mut linked = Vec::new();

  for (alias, target) in &lib.aliases {
    if lib.versions.iter().any(|v| &v.name == alias) {
      warn!(library = %lib.id, alias = %alias, "alias collides with a version name, not linking");
      continue;
    }

    let Some(version) = lib.version(target).filter(|v| v.is_served()) else {
      debug!(library = %lib.id, alias = %alias, target = %target, "alias target is not served");
      continue;
    };
    if !layout.version_dir(&lib.id, version).is_dir() {
      debug!(library = %lib.id, alias = %alias, target = %target, "alias target has no content");
      continue;
    }

    create_dir_link(Path::new(&version.path_name()), &layout.alias_dir(&lib.id, alias))?;
    linked.push(alias.clone());
  }

  Ok(linked)
}
