use anyhow::Result;

use cdnpub_lib::alias::compute_aliases;

use crate::output::{print_json, symbols};

pub fn cmd_aliases(names: &[String], json: bool) -> Result<()> {
  let aliases = compute_aliases(names.iter().map(String::as_str));
  if json {
    return print_json(&aliases);
  }
  for (alias, target) in &aliases {
    println!("{} {} {}", alias, symbols::ARROW, target);
  }
  Ok(())
}
