//! GitHub REST adapter.
//!
//! Only the handful of endpoints needed for resolution are used:
//!
//! - `GET /repos/{owner}/{repo}/tags` and `/branches` (paginated)
//! - `GET /repos/{owner}/{repo}/commits/{ref}` for commit dates and tree shas
//!
//! Listing refs never fetches commits; callers ask for the dates they need
//! through [`SourceHost::latest_commit`], one request at a time.
//! - `GET /repos/{owner}/{repo}/contents/{path}?ref=` with the raw media type

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{CommitInfo, RefInfo, RefKind, RefListing, SourceError, SourceHost, SourceInfo};
use crate::consts::APP_NAME;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_WEB_BASE: &str = "https://github.com";

const PER_PAGE: usize = 100;
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

#[derive(Debug, Deserialize)]
struct ApiRef {
  name: String,
  commit: ApiRefCommit,
  #[serde(default)]
  tarball_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRefCommit {
  sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
  sha: String,
  commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
  tree: ApiRefCommit,
  #[serde(default)]
  committer: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
struct ApiSignature {
  date: Option<DateTime<Utc>>,
}

/// Client for the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
  http: reqwest::Client,
  api_base: String,
  web_base: String,
}

impl GitHubClient {
  /// Create a client; `token` is sent as a bearer token when present.
  pub fn new(api_base: Option<&str>, token: Option<&str>) -> Result<Self, SourceError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(APP_NAME));
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| SourceError::Unavailable(format!("invalid token: {}", e)))?;
      headers.insert(AUTHORIZATION, value);
    }

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| SourceError::Unavailable(e.to_string()))?;

    Ok(Self {
      http,
      api_base: api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/').to_string(),
      web_base: DEFAULT_WEB_BASE.to_string(),
    })
  }

  /// Override the base URL used for browser links.
  pub fn with_web_base(mut self, web_base: &str) -> Self {
    self.web_base = web_base.trim_end_matches('/').to_string();
    self
  }

  fn repo_url(&self, source: &SourceInfo) -> (String, String) {
    match source {
      SourceInfo::Github { owner, repo, api_base } => {
        let base = api_base.as_deref().unwrap_or(&self.api_base).trim_end_matches('/');
        (
          format!("{}/repos/{}/{}", base, owner, repo),
          format!("{}/{}/{}", self.web_base, owner, repo),
        )
      }
    }
  }

  async fn get(&self, url: &str, query: &[(&str, String)], accept: Option<&str>) -> Result<reqwest::Response, SourceError> {
    debug!(url, "github request");
    let mut request = self.http.get(url).query(query);
    if let Some(accept) = accept {
      request = request.header(ACCEPT, accept);
    }
    request.send().await.map_err(|e| SourceError::Http {
      url: url.to_string(),
      message: e.to_string(),
    })
  }

  async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, SourceError> {
    let response = self.get(url, query, None).await?;
    if !response.status().is_success() {
      return Err(SourceError::Status {
        url: url.to_string(),
        status: response.status().as_u16(),
      });
    }
    response.json().await.map_err(|e| SourceError::Decode {
      url: url.to_string(),
      message: e.to_string(),
    })
  }

  async fn list_paged(&self, url: &str) -> Result<Vec<ApiRef>, SourceError> {
    let mut all = Vec::new();
    let mut page = 1usize;
    loop {
      let batch: Vec<ApiRef> = self
        .get_json(url, &[("per_page", PER_PAGE.to_string()), ("page", page.to_string())])
        .await?;
      let done = batch.len() < PER_PAGE;
      all.extend(batch);
      if done {
        return Ok(all);
      }
      page += 1;
    }
  }

  async fn commit(&self, repo_url: &str, git_ref: &str) -> Result<ApiCommit, SourceError> {
    self.get_json(&format!("{}/commits/{}", repo_url, git_ref), &[]).await
  }

  fn to_ref_info(repo_url: &str, web_url: &str, api_ref: ApiRef, kind: RefKind) -> RefInfo {
    let tarball_url = api_ref
      .tarball_url
      .unwrap_or_else(|| format!("{}/tarball/{}", repo_url, api_ref.name));

    RefInfo {
      view_url: format!("{}/tree/{}", web_url, api_ref.name),
      ref_name: api_ref.name.clone(),
      name: api_ref.name,
      kind,
      tarball_url,
      commit_sha: api_ref.commit.sha,
      last_update: None,
    }
  }
}

#[async_trait]
impl SourceHost for GitHubClient {
  async fn list_refs(&self, source: &SourceInfo) -> Result<RefListing, SourceError> {
    let (repo_url, web_url) = self.repo_url(source);

    let tags = self.list_paged(&format!("{}/tags", repo_url)).await?;
    let branches = self.list_paged(&format!("{}/branches", repo_url)).await?;
    debug!(%source, tags = tags.len(), branches = branches.len(), "listed refs");

    Ok(RefListing {
      tags: tags
        .into_iter()
        .map(|tag| Self::to_ref_info(&repo_url, &web_url, tag, RefKind::Tag))
        .collect(),
      branches: branches
        .into_iter()
        .map(|branch| Self::to_ref_info(&repo_url, &web_url, branch, RefKind::Branch))
        .collect(),
    })
  }

  async fn file_contents(&self, source: &SourceInfo, git_ref: &str, path: &str) -> Result<String, SourceError> {
    let (repo_url, _) = self.repo_url(source);
    let url = format!("{}/contents/{}", repo_url, path.trim_start_matches('/'));

    let response = self
      .get(&url, &[("ref", git_ref.to_string())], Some(RAW_MEDIA_TYPE))
      .await?;

    match response.status() {
      status if status.is_success() => response.text().await.map_err(|e| SourceError::Decode {
        url,
        message: e.to_string(),
      }),
      StatusCode::NOT_FOUND => Err(SourceError::NotFound {
        path: path.to_string(),
        git_ref: git_ref.to_string(),
      }),
      status => Err(SourceError::Status {
        url,
        status: status.as_u16(),
      }),
    }
  }

  async fn latest_commit(&self, source: &SourceInfo, branch: &str) -> Result<CommitInfo, SourceError> {
    let (repo_url, _) = self.repo_url(source);
    let commit = self.commit(&repo_url, branch).await?;
    Ok(CommitInfo {
      sha: commit.sha,
      tree_sha: commit.commit.tree.sha,
      date: commit.commit.committer.and_then(|c| c.date),
    })
  }
}
