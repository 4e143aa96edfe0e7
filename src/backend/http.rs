//! HTTP implementation of the catalog backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::backend::parse::{parse_preview_body, WireEntry, MAX_PREVIEW_SIZE};
use crate::backend::{
    CatalogBackend, CatalogPage, ExploreRequest, ExploredCard, FeedPreview, SearchRequest,
};
use crate::config::BackendConfig;
use crate::discovery::types::{Source, WarmupPriority};
use crate::{Result, ScoutError};

const SEARCH_PATH: &str = "api/sources/search";
const SOURCES_PATH: &str = "api/sources/";
const EXPLORE_PATH: &str = "api/explore/cards";
const WARMUP_PATH: &str = "api/sources/warmup";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    next_offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    cards: Vec<WireCard>,
}

#[derive(Debug, Deserialize)]
struct WireCard {
    source_id: String,
    url: String,
    #[serde(default)]
    platform_name: String,
    #[serde(default)]
    feed_title: Option<String>,
    #[serde(default)]
    entries: Vec<WireEntry>,
}

#[derive(Debug, Serialize)]
struct WarmupRequest<'a> {
    source_ids: &'a [String],
    priority: WarmupPriority,
}

/// Catalog backend speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    /// Create a backend from configuration.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ScoutError::Http(format!("failed to create HTTP client: {}", e)))?;

        Self::with_client(client, &config.base_url)
    }

    /// Create a backend around an existing client.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ScoutError::Validation(format!("invalid backend URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ScoutError::Validation(format!("invalid endpoint {}: {}", path, e)))
    }

    fn preview_url(&self, source_id: &str) -> Result<Url> {
        let mut url = self.endpoint(SOURCES_PATH)?;
        url.path_segments_mut()
            .map_err(|_| ScoutError::Validation("backend URL cannot have a path".to_string()))?
            .pop_if_empty()
            .push(source_id)
            .push("preview");
        Ok(url)
    }

    async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ScoutError::Http(format!(
                "HTTP error: {} ({})",
                status,
                response.url().path()
            )))
        }
    }
}

#[async_trait]
impl CatalogBackend for HttpBackend {
    async fn search(&self, request: &SearchRequest) -> Result<CatalogPage> {
        let mut params: Vec<(&str, String)> = vec![
            ("limit", request.limit.to_string()),
            ("offset", request.offset.to_string()),
        ];
        if let Some(query) = &request.query {
            params.push(("q", query.clone()));
        }
        if let Some(category) = &request.category {
            params.push(("category", category.clone()));
        }
        if !request.exclude_ids.is_empty() {
            params.push(("exclude", request.exclude_ids.join(",")));
        }

        let response = self
            .client
            .get(self.endpoint(SEARCH_PATH)?)
            .query(&params)
            .send()
            .await
            .map_err(|e| ScoutError::Catalog(format!("failed to fetch catalog page: {}", e)))?;
        let response = Self::ensure_success(response)
            .await
            .map_err(|e| ScoutError::Catalog(e.to_string()))?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ScoutError::Catalog(format!("invalid catalog page: {}", e)))?;

        debug!(
            offset = request.offset,
            count = body.sources.len(),
            total = ?body.total,
            "catalog page fetched"
        );

        Ok(CatalogPage {
            sources: body.sources,
            total: body.total,
            next_offset: body.next_offset,
        })
    }

    async fn preview(&self, source_id: &str) -> Result<FeedPreview> {
        let response = self.client.get(self.preview_url(source_id)?).send().await?;
        let status = response.status();

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_PREVIEW_SIZE {
                return Err(ScoutError::Preview(format!(
                    "preview too large: {} bytes (max {} bytes)",
                    content_length, MAX_PREVIEW_SIZE
                )));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ScoutError::Preview(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            // Error bodies carry a message worth keeping in the negative cache entry.
            return match parse_preview_body(&bytes, content_type.as_deref()) {
                Err(ScoutError::Preview(message)) => Err(ScoutError::Preview(message)),
                _ => Err(ScoutError::Http(format!("HTTP error: {}", status))),
            };
        }

        parse_preview_body(&bytes, content_type.as_deref())
    }

    async fn explore_cards(&self, request: &ExploreRequest) -> Result<Vec<ExploredCard>> {
        let mut params: Vec<(&str, String)> = vec![
            ("count", request.count.to_string()),
            ("entries", request.entries_per_card.to_string()),
        ];
        if !request.exclude_ids.is_empty() {
            params.push(("exclude", request.exclude_ids.join(",")));
        }

        let response = self
            .client
            .get(self.endpoint(EXPLORE_PATH)?)
            .query(&params)
            .send()
            .await?;
        let body: ExploreResponse = Self::ensure_success(response).await?.json().await?;

        Ok(body
            .cards
            .into_iter()
            .map(|card| ExploredCard {
                platform_name: if card.platform_name.is_empty() {
                    card.source_id.clone()
                } else {
                    card.platform_name
                },
                source_id: card.source_id,
                url: card.url,
                feed_title: card.feed_title,
                entries: card
                    .entries
                    .into_iter()
                    .filter_map(WireEntry::into_entry)
                    .collect(),
            })
            .collect())
    }

    async fn warmup(&self, source_ids: &[String], priority: WarmupPriority) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(WARMUP_PATH)?)
            .json(&WarmupRequest {
                source_ids,
                priority,
            })
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
