//! Shared utilities: content digests, filesystem helpers and test doubles.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
