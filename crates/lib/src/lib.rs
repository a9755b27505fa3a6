//! cdnpub-lib: Core types and logic for cdnpub
//!
//! This crate resolves library versions from source control and publishes them to a CDN:
//! - `source`: source-host adapters that list refs and fetch files
//! - `resolve`: turns refs into classified `Version`s and builds the `CdnConfig`
//! - `alias`: floating semver aliases (`1.x.x`, `1.2.x`, `latest`)
//! - `build`: build-strategy selection and execution for versions that changed
//! - `content`: assembly of the published content tree and its manifest
//! - `publish`: staging, object-storage sync and edge-cache invalidation

pub mod alias;
pub mod build;
pub mod changes;
pub mod consts;
pub mod content;
pub mod manifest;
pub mod pipeline;
pub mod publish;
pub mod repo_config;
pub mod resolve;
pub mod settings;
pub mod source;
pub mod util;
pub mod version;
