//! Core domain model for vstat: discovery cohorts, daily refresh measurements
//! and the two warehouse table rows they are reconciled into.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

mod config;

pub use config::{ApiConfig, ConfigError, PipelineConfig, RetentionWindow, SearchConfig, MAX_API_BATCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub view_count: i64,
    pub like_count: i64,
    pub favorite_count: i64,
    pub comment_count: i64,
}

/// One discovered video as written to the `raw/videos` partition.
///
/// Dates and timestamps keep the textual encoding of the discovery artifact;
/// they only become typed values during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub channel_id: String,
    pub channel_title: String,
    pub category_id: String,
    pub tags: Vec<String>,
    pub duration: String,
    pub definition: String,
    pub initial: MetricSnapshot,
    pub collection_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub id: String,
    pub initial_collection_date: NaiveDate,
    pub collection_date: NaiveDate,
    pub collection_count: i32,
    pub metrics: MetricSnapshot,
}

impl RefreshRecord {
    pub fn day_zero(id: impl Into<String>, discovery_date: NaiveDate, metrics: MetricSnapshot) -> Self {
        Self {
            id: id.into(),
            initial_collection_date: discovery_date,
            collection_date: discovery_date,
            collection_count: 1,
            metrics,
        }
    }

    /// Returns `None` when the refresh date precedes the discovery date.
    pub fn measured(
        id: impl Into<String>,
        discovery_date: NaiveDate,
        refresh_date: NaiveDate,
        metrics: MetricSnapshot,
    ) -> Option<Self> {
        let collection_count = elapsed_day_count(discovery_date, refresh_date)?;
        Some(Self {
            id: id.into(),
            initial_collection_date: discovery_date,
            collection_date: refresh_date,
            collection_count,
            metrics,
        })
    }
}

/// 1-based day count since discovery, inclusive of the discovery day.
pub fn elapsed_day_count(discovery_date: NaiveDate, refresh_date: NaiveDate) -> Option<i32> {
    let days = refresh_date.signed_duration_since(discovery_date).num_days();
    if days < 0 {
        return None;
    }
    i32::try_from(days + 1).ok()
}

pub const VIDEOS_COLUMNS: [&str; 14] = [
    "video_id",
    "video_title",
    "video_description_truncated",
    "video_description_length",
    "video_published_datetime",
    "channel_id",
    "channel_title",
    "video_category_id",
    "video_tags_truncated",
    "video_tags_length",
    "video_duration",
    "video_definition",
    "collection_date",
    "ingested_datetime",
];

pub const VIDEO_STATS_COLUMNS: [&str; 9] = [
    "video_id",
    "initial_collection_date",
    "collection_date",
    "collection_count",
    "view_count",
    "like_count",
    "favorite_count",
    "comment_count",
    "ingested_datetime",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRow {
    pub video_id: String,
    pub video_title: String,
    pub video_description_truncated: String,
    pub video_description_length: i32,
    pub video_published_datetime: DateTime<Utc>,
    pub channel_id: String,
    pub channel_title: String,
    pub video_category_id: i32,
    pub video_tags_truncated: String,
    pub video_tags_length: i32,
    pub video_duration: String,
    pub video_definition: String,
    pub collection_date: NaiveDate,
    pub ingested_datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatsRow {
    pub video_id: String,
    pub initial_collection_date: NaiveDate,
    pub collection_date: NaiveDate,
    pub collection_count: i32,
    pub view_count: i64,
    pub like_count: i64,
    pub favorite_count: i64,
    pub comment_count: i64,
    pub ingested_datetime: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn elapsed_count_is_inclusive_of_discovery_day() {
        assert_eq!(elapsed_day_count(date(2024, 1, 10), date(2024, 1, 10)), Some(1));
        assert_eq!(elapsed_day_count(date(2024, 1, 10), date(2024, 1, 12)), Some(3));
        assert_eq!(elapsed_day_count(date(2024, 2, 27), date(2024, 3, 1)), Some(4));
    }

    #[test]
    fn refresh_before_discovery_is_rejected() {
        assert_eq!(elapsed_day_count(date(2024, 1, 10), date(2024, 1, 9)), None);
        assert!(RefreshRecord::measured("v1", date(2024, 1, 10), date(2024, 1, 9), MetricSnapshot::default()).is_none());
    }

    #[test]
    fn day_zero_row_uses_discovery_date_and_count_one() {
        let metrics = MetricSnapshot {
            view_count: 100,
            ..MetricSnapshot::default()
        };
        let row = RefreshRecord::day_zero("v1", date(2024, 1, 10), metrics);
        assert_eq!(row.collection_date, date(2024, 1, 10));
        assert_eq!(row.initial_collection_date, date(2024, 1, 10));
        assert_eq!(row.collection_count, 1);
        assert_eq!(row.metrics.view_count, 100);
    }
}
