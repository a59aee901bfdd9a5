//! Metrics and discovery source contracts plus the YouTube Data API adapter.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, SecondsFormat, Utc};
use vstat_core::{MetricSnapshot, SearchConfig, MAX_API_BATCH};

mod client;
mod error;
pub mod types;

pub use client::{YoutubeClient, DEFAULT_BASE_URL};
pub use error::MetricsError;
pub use types::VideoItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStatistics {
    pub id: String,
    pub metrics: MetricSnapshot,
}

/// External source of per-video popularity counters.
///
/// One call covers at most [`MetricsSource::max_batch_size`] identifiers; the
/// response may omit identifiers the source no longer serves.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    fn max_batch_size(&self) -> usize {
        MAX_API_BATCH
    }

    async fn video_statistics(&self, ids: &[String]) -> Result<Vec<VideoStatistics>, MetricsError>;
}

#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn search_video_ids(&self, request: &SearchRequest) -> Result<Vec<String>, MetricsError>;

    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoItem>, MetricsError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub topic_id: String,
    pub video_duration: String,
    pub max_results: u32,
    pub published_after: DateTime<Utc>,
    pub published_before: DateTime<Utc>,
}

impl SearchRequest {
    /// Window ends at `anchor` + cutoff (UTC) and starts one day earlier.
    pub fn for_anchor(search: &SearchConfig, anchor: NaiveDate) -> Self {
        let published_before = anchor.and_time(search.cutoff_utc).and_utc();
        let published_after = anchor
            .checked_sub_days(Days::new(1))
            .map(|previous| previous.and_time(search.cutoff_utc).and_utc())
            .unwrap_or(published_before);
        Self {
            query: search.query.clone(),
            topic_id: search.topic_id.clone(),
            video_duration: search.video_duration.clone(),
            max_results: search.max_results,
            published_after,
            published_before,
        }
    }

    pub fn published_after_rfc3339(&self) -> String {
        self.published_after.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn published_before_rfc3339(&self) -> String {
        self.published_before.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
