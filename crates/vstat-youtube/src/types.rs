//! Wire types for the `videos.list` and `search.list` endpoints.

use chrono::NaiveDate;
use serde::Deserialize;
use vstat_core::{CohortRecord, MetricSnapshot};

use crate::error::MetricsError;

/// Category recorded when the snippet carries none.
pub const UNCATEGORIZED: &str = "0";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub snippet: Snippet,
    #[serde(default)]
    pub content_details: ContentDetails,
    #[serde(default)]
    pub statistics: Statistics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub category_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDetails {
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Counter {
    Number(i64),
    Text(String),
}

/// Sparse counters: hidden likes or disabled comments are simply absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub view_count: Option<Counter>,
    pub like_count: Option<Counter>,
    pub favorite_count: Option<Counter>,
    pub comment_count: Option<Counter>,
}

impl Statistics {
    /// Absent counters become zero; malformed ones are a contract violation.
    pub fn snapshot(&self, id: &str) -> Result<MetricSnapshot, MetricsError> {
        Ok(MetricSnapshot {
            view_count: counter_value(id, "viewCount", self.view_count.as_ref())?,
            like_count: counter_value(id, "likeCount", self.like_count.as_ref())?,
            favorite_count: counter_value(id, "favoriteCount", self.favorite_count.as_ref())?,
            comment_count: counter_value(id, "commentCount", self.comment_count.as_ref())?,
        })
    }
}

fn counter_value(id: &str, field: &'static str, counter: Option<&Counter>) -> Result<i64, MetricsError> {
    let invalid = |value: String| MetricsError::InvalidCounter {
        id: id.to_string(),
        field,
        value,
    };
    match counter {
        None => Ok(0),
        Some(Counter::Number(n)) if *n >= 0 => Ok(*n),
        Some(Counter::Number(n)) => Err(invalid(n.to_string())),
        Some(Counter::Text(text)) => text
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|n| i64::try_from(n).ok())
            .ok_or_else(|| invalid(text.clone())),
    }
}

impl VideoItem {
    pub fn into_cohort_record(self, collection_date: NaiveDate) -> Result<CohortRecord, MetricsError> {
        if self.snippet.published_at.trim().is_empty() {
            return Err(MetricsError::MissingField {
                id: self.id,
                field: "publishedAt",
            });
        }
        let initial = self.statistics.snapshot(&self.id)?;
        let category_id = if self.snippet.category_id.trim().is_empty() {
            UNCATEGORIZED.to_string()
        } else {
            self.snippet.category_id
        };
        Ok(CohortRecord {
            id: self.id,
            title: self.snippet.title,
            description: self.snippet.description,
            published_at: self.snippet.published_at,
            channel_id: self.snippet.channel_id,
            channel_title: self.snippet.channel_title,
            category_id,
            tags: self.snippet.tags,
            duration: self.content_details.duration,
            definition: self.content_details.definition,
            initial,
            collection_date: collection_date.format("%Y-%m-%d").to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItem {
    #[serde(default)]
    pub id: SearchItemId,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItemId {
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(json: serde_json::Value) -> Statistics {
        serde_json::from_value(json).expect("statistics")
    }

    #[test]
    fn missing_counters_default_to_zero() {
        let snapshot = stats(serde_json::json!({ "viewCount": "150" }))
            .snapshot("v1")
            .expect("snapshot");
        assert_eq!(
            snapshot,
            MetricSnapshot {
                view_count: 150,
                ..MetricSnapshot::default()
            }
        );
    }

    #[test]
    fn numeric_counters_are_accepted() {
        let snapshot = stats(serde_json::json!({ "viewCount": 7, "likeCount": "2" }))
            .snapshot("v1")
            .expect("snapshot");
        assert_eq!(snapshot.view_count, 7);
        assert_eq!(snapshot.like_count, 2);
    }

    #[test]
    fn malformed_counter_is_rejected() {
        let err = stats(serde_json::json!({ "commentCount": "lots" }))
            .snapshot("v1")
            .expect_err("non-numeric counter");
        assert!(matches!(err, MetricsError::InvalidCounter { field: "commentCount", .. }));

        assert!(stats(serde_json::json!({ "viewCount": -1 })).snapshot("v1").is_err());
    }

    fn item(snippet: serde_json::Value) -> VideoItem {
        serde_json::from_value(serde_json::json!({ "id": "v1", "snippet": snippet })).expect("video item")
    }

    #[test]
    fn missing_category_is_recorded_as_uncategorized() {
        let anchor = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let record = item(serde_json::json!({ "publishedAt": "2024-01-09T21:04:11Z" }))
            .into_cohort_record(anchor)
            .expect("record");
        assert_eq!(record.category_id, "0");
        assert_eq!(record.initial, MetricSnapshot::default());
    }

    #[test]
    fn missing_publish_time_is_rejected() {
        let anchor = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let err = item(serde_json::json!({ "categoryId": "19" }))
            .into_cohort_record(anchor)
            .expect_err("no publishedAt");
        assert!(matches!(err, MetricsError::MissingField { field: "publishedAt", .. }));
    }
}
