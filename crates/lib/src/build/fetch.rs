//! Source tarball download and unpacking.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use sha2::{Digest, Sha256};
use tar::Archive;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::BuildError;
use crate::consts::APP_NAME;

const ARCHIVE_NAME: &str = "source.tar.gz";
const SOURCE_DIR: &str = "src";

/// Downloads ref tarballs from the source host.
#[derive(Debug, Clone)]
pub struct TarballFetcher {
  http: reqwest::Client,
  timeout: Duration,
}

impl TarballFetcher {
  pub fn new(token: Option<&str>, timeout: Duration) -> Result<Self, BuildError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(APP_NAME));
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| BuildError::Download {
        url: String::new(),
        message: format!("invalid token: {}", e),
      })?;
      headers.insert(AUTHORIZATION, value);
    }
    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| BuildError::Download {
        url: String::new(),
        message: e.to_string(),
      })?;
    Ok(Self { http, timeout })
  }

  /// Download `url` into `work_dir` and unpack it, returning the source tree.
  pub async fn fetch(&self, url: &str, work_dir: &Path) -> Result<PathBuf, BuildError> {
    let archive = work_dir.join(ARCHIVE_NAME);
    let size = tokio::time::timeout(self.timeout, self.download(url, &archive))
      .await
      .map_err(|_| BuildError::Timeout {
        url: url.to_string(),
        after: self.timeout,
      })??;
    info!(url, size, "downloaded source tarball");

    let dest = work_dir.join(SOURCE_DIR);
    let unpack_archive = archive.clone();
    let unpack_dest = dest.clone();
    tokio::task::spawn_blocking(move || unpack_tarball(&unpack_archive, &unpack_dest))
      .await
      .map_err(|e| BuildError::Unpack {
        path: archive.clone(),
        message: e.to_string(),
      })??;

    Ok(dest)
  }

  async fn download(&self, url: &str, dest: &Path) -> Result<usize, BuildError> {
    let response = self.http.get(url).send().await.map_err(|e| BuildError::Download {
      url: url.to_string(),
      message: e.to_string(),
    })?;

    if !response.status().is_success() {
      return Err(BuildError::Download {
        url: url.to_string(),
        message: format!("HTTP {}", response.status()),
      });
    }

    let bytes = response.bytes().await.map_err(|e| BuildError::Download {
      url: url.to_string(),
      message: e.to_string(),
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));
    debug!(url, sha256 = %digest, "tarball digest");

    let mut file = tokio::fs::File::create(dest).await.map_err(|e| BuildError::Io {
      path: dest.to_path_buf(),
      source: e,
    })?;
    file.write_all(&bytes).await.map_err(|e| BuildError::Io {
      path: dest.to_path_buf(),
      source: e,
    })?;
    file.flush().await.map_err(|e| BuildError::Io {
      path: dest.to_path_buf(),
      source: e,
    })?;

    Ok(bytes.len())
  }
}

/// Unpack a `.tar.gz`, dropping the archive's top-level directory.
///
/// Entries that would land outside `dest` are skipped.
pub fn unpack_tarball(archive_path: &Path, dest: &Path) -> Result<(), BuildError> {
  let unpack_err = |e: std::io::Error| BuildError::Unpack {
    path: archive_path.to_path_buf(),
    message: e.to_string(),
  };

  std::fs::create_dir_all(dest).map_err(unpack_err)?;
  let file = File::open(archive_path).map_err(unpack_err)?;
  let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

  for entry in archive.entries().map_err(unpack_err)? {
    let mut entry = entry.map_err(unpack_err)?;
    let path = entry.path().map_err(unpack_err)?.into_owned();

    let stripped: PathBuf = path.components().skip(1).collect();
    if stripped.as_os_str().is_empty() {
      continue;
    }
    if !stripped.components().all(|c| matches!(c, Component::Normal(_))) {
      debug!(path = %path.display(), "skipping archive entry outside destination");
      continue;
    }

    let dest_path = dest.join(&stripped);
    if let Some(parent) = dest_path.parent() {
      std::fs::create_dir_all(parent).map_err(unpack_err)?;
    }
    entry.unpack(&dest_path).map_err(unpack_err)?;
  }

  Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
  use flate2::Compression;
  use flate2::write::GzEncoder;
  use tempfile::TempDir;

  use super::*;

  /// Build a GitHub-style tarball: every file below one top-level directory.
  pub(crate) fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
      let mut header = tar::Header::new_gnu();
      header.set_size(contents.len() as u64);
      header.set_mode(0o644);
      header.set_cksum();
      builder
        .append_data(&mut header, format!("org-repo-abc123/{}", path), contents.as_bytes())
        .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
  }

  #[test]
  fn unpack_strips_top_level_directory() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("a.tar.gz");
    std::fs::write(&archive, tarball(&[("package.json", "{}"), ("dist/app.js", "js")])).unwrap();

    let dest = temp.path().join("out");
    unpack_tarball(&archive, &dest).unwrap();

    assert_eq!(std::fs::read_to_string(dest.join("dist/app.js")).unwrap(), "js");
    assert!(dest.join("package.json").is_file());
    assert!(!dest.join("org-repo-abc123").exists());
  }

  #[test]
  fn unpack_rejects_garbage() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("bad.tar.gz");
    std::fs::write(&archive, "not a tarball").unwrap();

    let err = unpack_tarball(&archive, &temp.path().join("out")).unwrap_err();
    assert!(matches!(err, BuildError::Unpack { .. }));
  }

  #[tokio::test]
  async fn fetch_downloads_and_unpacks() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/tarball/1.0.0")
      .match_header("authorization", "Bearer secret")
      .with_body(tarball(&[("README.md", "hello")]))
      .create_async()
      .await;

    let temp = TempDir::new().unwrap();
    let fetcher = TarballFetcher::new(Some("secret"), Duration::from_secs(10)).unwrap();
    let src = fetcher
      .fetch(&format!("{}/tarball/1.0.0", server.url()), temp.path())
      .await
      .unwrap();

    assert_eq!(std::fs::read_to_string(src.join("README.md")).unwrap(), "hello");
  }

  #[tokio::test]
  async fn fetch_reports_http_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/tarball/missing")
      .with_status(404)
      .create_async()
      .await;

    let temp = TempDir::new().unwrap();
    let fetcher = TarballFetcher::new(None, Duration::from_secs(10)).unwrap();
    let err = fetcher
      .fetch(&format!("{}/tarball/missing", server.url()), temp.path())
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::Download { ref message, .. } if message.contains("404")));
  }
}
