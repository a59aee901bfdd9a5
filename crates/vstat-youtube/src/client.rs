//! HTTP client for the YouTube Data API v3.
//!
//! Built on the shared [`HttpFetcher`] so every call goes through the same
//! request pacer. Error envelopes are mapped to [`MetricsError::Quota`] or
//! [`MetricsError::Api`]; neither is retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;
use vstat_core::{ApiConfig, MAX_API_BATCH};
use vstat_storage::{BackoffPolicy, FetchError, HttpClientConfig, HttpFetcher, PacingConfig};

use crate::error::MetricsError;
use crate::types::{ApiErrorEnvelope, SearchListResponse, VideoItem, VideoListResponse};
use crate::{DiscoverySource, MetricsSource, SearchRequest, VideoStatistics};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";

const SOURCE_ID: &str = "youtube";
const QUOTA_REASONS: [&str; 4] = [
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

pub struct YoutubeClient {
    http: HttpFetcher,
    api_key: String,
    base_url: Url,
}

impl YoutubeClient {
    /// Creates a client pointed at the production API.
    pub fn new(api_key: &str, http: HttpClientConfig) -> Result<Self, MetricsError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, http)
    }

    /// Creates a client with a custom base URL (wiremock in tests).
    pub fn with_base_url(api_key: &str, base_url: &str, http: HttpClientConfig) -> Result<Self, MetricsError> {
        // A single trailing slash keeps `Url::join` appending the endpoint
        // instead of replacing the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalised).map_err(|e| MetricsError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            http: HttpFetcher::new(http)?,
            api_key: api_key.to_string(),
            base_url: parsed,
        })
    }

    pub fn from_api_config(api_key: &str, api: &ApiConfig) -> Result<Self, MetricsError> {
        let http = HttpClientConfig {
            timeout: Duration::from_secs(api.timeout_secs),
            user_agent: Some(format!("vstat/{}", env!("CARGO_PKG_VERSION"))),
            backoff: BackoffPolicy {
                max_retries: api.max_retries,
                ..BackoffPolicy::default()
            },
            pacing: PacingConfig::per_second(api.requests_per_sec),
        };
        Self::with_base_url(api_key, &api.base_url, http)
    }

    fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url, MetricsError> {
        let mut url = self.base_url.join(endpoint).map_err(|e| MetricsError::InvalidBaseUrl {
            url: self.base_url.to_string(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().copied())
            .append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, MetricsError> {
        let url = self.build_url(endpoint, params)?;
        let response = match self.http.fetch_bytes(SOURCE_ID, &url).await {
            Ok(response) => response,
            Err(FetchError::HttpStatus { status, body, .. }) => return Err(api_error(status, &body)),
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&response.body).map_err(|source| MetricsError::Deserialize {
            context: endpoint.to_string(),
            source,
        })
    }

    async fn list_videos(&self, ids: &[String], part: &str) -> Result<Vec<VideoItem>, MetricsError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_API_BATCH {
            return Err(MetricsError::BatchTooLarge {
                size: ids.len(),
                limit: MAX_API_BATCH,
            });
        }

        let joined = ids.join(",");
        let response: VideoListResponse = self
            .request_json("videos", &[("part", part), ("id", &joined)])
            .await?;
        debug!(requested = ids.len(), returned = response.items.len(), part, "videos.list");
        Ok(response.items)
    }
}

fn api_error(status: u16, body: &str) -> MetricsError {
    let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) else {
        return MetricsError::Api {
            status,
            reason: "unknown".to_string(),
            message: body.chars().take(200).collect(),
        };
    };

    let reason = envelope
        .error
        .errors
        .first()
        .map(|detail| detail.reason.clone())
        .unwrap_or_default();
    if QUOTA_REASONS.contains(&reason.as_str()) {
        return MetricsError::Quota {
            reason,
            message: envelope.error.message,
        };
    }
    MetricsError::Api {
        status,
        reason,
        message: envelope.error.message,
    }
}

#[async_trait]
impl MetricsSource for YoutubeClient {
    async fn video_statistics(&self, ids: &[String]) -> Result<Vec<VideoStatistics>, MetricsError> {
        self.list_videos(ids, "statistics")
            .await?
            .into_iter()
            .map(|item| {
                let metrics = item.statistics.snapshot(&item.id)?;
                Ok(VideoStatistics { id: item.id, metrics })
            })
            .collect()
    }
}

#[async_trait]
impl DiscoverySource for YoutubeClient {
    async fn search_video_ids(&self, request: &SearchRequest) -> Result<Vec<String>, MetricsError> {
        let max_results = request.max_results.to_string();
        let published_after = request.published_after_rfc3339();
        let published_before = request.published_before_rfc3339();
        let response: SearchListResponse = self
            .request_json(
                "search",
                &[
                    ("part", "id"),
                    ("q", &request.query),
                    ("type", "video"),
                    ("maxResults", &max_results),
                    ("publishedAfter", &published_after),
                    ("publishedBefore", &published_before),
                    ("order", "viewCount"),
                    ("topicId", &request.topic_id),
                    ("videoDuration", &request.video_duration),
                ],
            )
            .await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect())
    }

    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoItem>, MetricsError> {
        self.list_videos(ids, "snippet,contentDetails,statistics").await
    }
}
