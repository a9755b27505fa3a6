//! Edge-cache invalidation.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::APP_NAME;

#[derive(Debug, Error)]
pub enum EdgeCacheError {
  #[error("failed to create edge-cache client: {0}")]
  Client(String),

  #[error("edge-cache request to {url} failed: {message}")]
  Request { url: String, message: String },

  #[error("edge-cache request to {url} returned {status}")]
  Status { url: String, status: u16 },
}

/// A CDN distribution in front of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Distribution {
  pub id: String,
  #[serde(default)]
  pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DistributionPage {
  #[serde(default)]
  pub items: Vec<Distribution>,
  /// Marker for the following page; absent on the last one.
  #[serde(default)]
  pub next_marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationBatch {
  pub caller_reference: String,
  pub paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InvalidationResponse {
  id: String,
}

#[async_trait]
pub trait EdgeCache: Send + Sync {
  async fn list_distributions(&self, marker: Option<&str>) -> Result<DistributionPage, EdgeCacheError>;

  /// Submit a batch and return the invalidation id.
  async fn create_invalidation(
    &self,
    distribution_id: &str,
    batch: &InvalidationBatch,
  ) -> Result<String, EdgeCacheError>;
}

/// Find the distribution serving `alias`, walking every page of the listing.
pub async fn find_distribution(cache: &dyn EdgeCache, alias: &str) -> Result<Option<Distribution>, EdgeCacheError> {
  let mut marker: Option<String> = None;
  loop {
    let page = cache.list_distributions(marker.as_deref()).await?;
    if let Some(found) = page.items.into_iter().find(|d| d.aliases.iter().any(|a| a == alias)) {
      return Ok(Some(found));
    }
    match page.next_marker {
      Some(next) if marker.as_deref() != Some(next.as_str()) => {
        debug!(marker = %next, "fetching next distribution page");
        marker = Some(next);
      }
      Some(next) => {
        warn!(marker = %next, "distribution listing did not advance, giving up");
        return Ok(None);
      }
      None => return Ok(None),
    }
  }
}

/// JSON-over-HTTP edge-cache API.
#[derive(Debug, Clone)]
pub struct HttpEdgeCache {
  http: reqwest::Client,
  api_base: String,
}

impl HttpEdgeCache {
  pub fn new(api_base: &str, token: Option<&str>, timeout: std::time::Duration) -> Result<Self, EdgeCacheError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(APP_NAME));
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| EdgeCacheError::Client(format!("invalid token: {}", e)))?;
      headers.insert(AUTHORIZATION, value);
    }
    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(timeout)
      .build()
      .map_err(|e| EdgeCacheError::Client(e.to_string()))?;

    Ok(Self {
      http,
      api_base: api_base.trim_end_matches('/').to_string(),
    })
  }

  async fn check(url: &str, response: reqwest::Response) -> Result<reqwest::Response, EdgeCacheError> {
    let status = response.status();
    if status.is_success() {
      Ok(response)
    } else {
      Err(EdgeCacheError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      })
    }
  }
}

fn request_error(url: &str, e: reqwest::Error) -> EdgeCacheError {
  EdgeCacheError::Request {
    url: url.to_string(),
    message: e.to_string(),
  }
}

#[async_trait]
impl EdgeCache for HttpEdgeCache {
  async fn list_distributions(&self, marker: Option<&str>) -> Result<DistributionPage, EdgeCacheError> {
    let url = format!("{}/distributions", self.api_base);
    let mut request = self.http.get(&url);
    if let Some(marker) = marker {
      request = request.query(&[("marker", marker)]);
    }
    let response = request.send().await.map_err(|e| request_error(&url, e))?;
    Self::check(&url, response)
      .await?
      .json()
      .await
      .map_err(|e| request_error(&url, e))
  }

  async fn create_invalidation(
    &self,
    distribution_id: &str,
    batch: &InvalidationBatch,
  ) -> Result<String, EdgeCacheError> {
    let url = format!("{}/distributions/{}/invalidations", self.api_base, distribution_id);
    let response = self
      .http
      .post(&url)
      .json(batch)
      .send()
      .await
      .map_err(|e| request_error(&url, e))?;
    let created: InvalidationResponse = Self::check(&url, response)
      .await?
      .json()
      .await
      .map_err(|e| request_error(&url, e))?;
    Ok(created.id)
  }
}
