//! Image search collaborators.

use crate::config::VisualSettings;
use crate::error::{ReelcastError, Result};
use crate::openai::http_client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// One image search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHit {
    /// Direct URL of the full-size image.
    pub url: String,
    pub title: Option<String>,
    /// Width reported by the search engine, if any.
    pub width: Option<u32>,
    /// Page the image was found on.
    pub attribution: Option<String>,
}

/// Paginated image search.
#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// Results for zero-based `page`. An empty page means there are no more.
    async fn search_page(&self, query: &str, page: u32) -> Result<Vec<ImageHit>>;
}

/// Google Images through SerpAPI.
pub struct SerpApiSearch {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    images_results: Vec<SerpApiImage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpApiImage {
    original: Option<String>,
    title: Option<String>,
    original_width: Option<u32>,
    link: Option<String>,
}

impl SerpApiSearch {
    pub fn with_config(settings: &VisualSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ReelcastError::Config(format!("{} not set", settings.api_key_env)))?;

        Ok(Self {
            http: http_client(settings.fetch_timeout())?,
            endpoint: settings.search_endpoint.clone(),
            api_key,
        })
    }
}

impl SerpApiResponse {
    fn into_hits(self) -> Result<Vec<ImageHit>> {
        // SerpAPI reports "no results" as an error string on the last page.
        if let Some(error) = self.error {
            if self.images_results.is_empty() && !error.to_lowercase().contains("hasn't returned any results") {
                return Err(ReelcastError::ImageSearch(error));
            }
        }

        Ok(self
            .images_results
            .into_iter()
            .filter_map(|img| {
                img.original.map(|url| ImageHit {
                    url,
                    title: img.title,
                    width: img.original_width,
                    attribution: img.link,
                })
            })
            .collect())
    }
}

#[async_trait]
impl ImageSearch for SerpApiSearch {
    #[instrument(skip(self), fields(query = %query, page = page))]
    async fn search_page(&self, query: &str, page: u32) -> Result<Vec<ImageHit>> {
        let page = page.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("engine", "google_images"),
                ("q", query),
                ("ijn", page.as_str()),
                ("num", "100"),
                ("tbs", "isz:lt,islt:svga"),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: SerpApiResponse = response.json().await?;
        let hits = body.into_hits()?;
        debug!("Search page returned {} hits", hits.len());
        Ok(hits)
    }
}
