//! Canonical `videos` / `video_stats` rows from raw cohort and refresh records.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use thiserror::Error;
use vstat_core::{CohortRecord, RefreshRecord, VideoRow, VideoStatsRow};

pub const DESCRIPTION_BUDGET: usize = 100;
pub const TAGS_BUDGET: usize = 300;
pub const TAG_SEPARATOR: &str = ",";

/// Raw `videos` column → canonical column. Anything not listed is dropped.
pub const VIDEO_RENAMES: &[(&str, &str)] = &[
    ("id", "video_id"),
    ("title", "video_title"),
    ("description", "video_description"),
    ("publishedAt", "video_published_datetime"),
    ("channelId", "channel_id"),
    ("channelTitle", "channel_title"),
    ("videoCategoryId", "video_category_id"),
    ("tags", "video_tags"),
    ("videoDuration", "video_duration"),
    ("videoDefinition", "video_definition"),
    ("collectionDate", "collection_date"),
    ("initialViewCount", "view_count"),
    ("initialLikeCount", "like_count"),
    ("initialFavoriteCount", "favorite_count"),
    ("initialCommentCount", "comment_count"),
];

pub const STATS_RENAMES: &[(&str, &str)] = &[
    ("id", "video_id"),
    ("initialCollectionDate", "initial_collection_date"),
    ("collectionDate", "collection_date"),
    ("collectionCount", "collection_count"),
    ("viewCount", "view_count"),
    ("likeCount", "like_count"),
    ("favoriteCount", "favorite_count"),
    ("commentCount", "comment_count"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("video {id}: {field} {value:?} is not an RFC 3339 timestamp")]
    InvalidTimestamp {
        id: String,
        field: &'static str,
        value: String,
    },
    #[error("video {id}: {field} {value:?} is not a YYYY-MM-DD date")]
    InvalidDate {
        id: String,
        field: &'static str,
        value: String,
    },
    #[error("video {id}: category id {value:?} is not an integer")]
    InvalidCategory { id: String, value: String },
}

/// Types, truncates and stamps rows. The only state is the ingestion stamp,
/// fixed once per run.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    ingested_at: DateTime<Utc>,
}

impl Normalizer {
    /// The stamp is kept at microsecond precision, the resolution the
    /// warehouse stores.
    pub fn new(ingested_at: DateTime<Utc>) -> Self {
        Self {
            ingested_at: ingested_at.trunc_subsecs(6),
        }
    }

    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    pub fn videos<T>(&self, rows: &[T]) -> Result<Vec<VideoRow>, NormalizeError>
    where
        T: Normalize<Output = VideoRow>,
    {
        rows.iter().map(|row| row.normalize(self)).collect()
    }

    pub fn video_stats<T>(&self, rows: &[T]) -> Result<Vec<VideoStatsRow>, NormalizeError>
    where
        T: Normalize<Output = VideoStatsRow>,
    {
        rows.iter().map(|row| row.normalize(self)).collect()
    }
}

/// Conversion into a canonical warehouse row. Implemented for the raw records
/// and for the canonical rows themselves, where it is a no-op.
pub trait Normalize {
    type Output;

    fn normalize(&self, normalizer: &Normalizer) -> Result<Self::Output, NormalizeError>;
}

impl Normalize for CohortRecord {
    type Output = VideoRow;

    fn normalize(&self, normalizer: &Normalizer) -> Result<VideoRow, NormalizeError> {
        let published = DateTime::parse_from_rfc3339(self.published_at.trim())
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| NormalizeError::InvalidTimestamp {
                id: self.id.clone(),
                field: "publishedAt",
                value: self.published_at.clone(),
            })?;
        let category = match self.category_id.trim() {
            "" => 0,
            text => text.parse::<i32>().map_err(|_| NormalizeError::InvalidCategory {
                id: self.id.clone(),
                value: self.category_id.clone(),
            })?,
        };
        let collection_date = parse_cohort_date(self)?;
        let tags = self.tags.join(TAG_SEPARATOR);

        Ok(VideoRow {
            video_id: self.id.clone(),
            video_title: self.title.clone(),
            video_description_truncated: truncate_chars(&self.description, DESCRIPTION_BUDGET),
            video_description_length: char_length(&self.description),
            video_published_datetime: published,
            channel_id: self.channel_id.clone(),
            channel_title: self.channel_title.clone(),
            video_category_id: category,
            video_tags_truncated: truncate_chars(&tags, TAGS_BUDGET),
            video_tags_length: char_length(&tags),
            video_duration: self.duration.clone(),
            video_definition: self.definition.clone(),
            collection_date,
            ingested_datetime: normalizer.ingested_at,
        })
    }
}

impl Normalize for VideoRow {
    type Output = VideoRow;

    fn normalize(&self, _normalizer: &Normalizer) -> Result<VideoRow, NormalizeError> {
        Ok(VideoRow {
            video_description_truncated: truncate_chars(&self.video_description_truncated, DESCRIPTION_BUDGET),
            video_tags_truncated: truncate_chars(&self.video_tags_truncated, TAGS_BUDGET),
            ..self.clone()
        })
    }
}

impl Normalize for RefreshRecord {
    type Output = VideoStatsRow;

    fn normalize(&self, normalizer: &Normalizer) -> Result<VideoStatsRow, NormalizeError> {
        Ok(VideoStatsRow {
            video_id: self.id.clone(),
            initial_collection_date: self.initial_collection_date,
            collection_date: self.collection_date,
            collection_count: self.collection_count,
            view_count: self.metrics.view_count,
            like_count: self.metrics.like_count,
            favorite_count: self.metrics.favorite_count,
            comment_count: self.metrics.comment_count,
            ingested_datetime: normalizer.ingested_at,
        })
    }
}

impl Normalize for VideoStatsRow {
    type Output = VideoStatsRow;

    fn normalize(&self, _normalizer: &Normalizer) -> Result<VideoStatsRow, NormalizeError> {
        Ok(self.clone())
    }
}

pub fn parse_cohort_date(record: &CohortRecord) -> Result<NaiveDate, NormalizeError> {
    NaiveDate::parse_from_str(record.collection_date.trim(), "%Y-%m-%d").map_err(|_| {
        NormalizeError::InvalidDate {
            id: record.id.clone(),
            field: "collectionDate",
            value: record.collection_date.clone(),
        }
    })
}

fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn char_length(text: &str) -> i32 {
    i32::try_from(text.chars().count()).unwrap_or(i32::MAX)
}
