use std::env::VarError;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Upper bound the metrics API accepts for one `videos.list` id batch.
pub const MAX_API_BATCH: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    pub retention_days: u32,
    pub lookback_offset_days: u32,
}

impl RetentionWindow {
    pub fn candidate_dates(&self, anchor: NaiveDate) -> Vec<NaiveDate> {
        (self.lookback_offset_days..self.retention_days)
            .filter_map(|offset| anchor.checked_sub_days(Days::new(u64::from(offset))))
            .collect()
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self {
            retention_days: 7,
            lookback_offset_days: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub requests_per_sec: u32,
}

const SEARCH_DURATIONS: [&str; 4] = ["any", "short", "medium", "long"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub query: String,
    pub topic_id: String,
    pub video_duration: String,
    pub max_results: u32,
    pub cutoff_utc: NaiveTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub bucket_uri: String,
    pub window: RetentionWindow,
    pub api_batch_limit: usize,
    pub time_zone: Tz,
    pub api: ApiConfig,
    pub search: SearchConfig,
    pub log_level: String,
    pub database_url: Option<String>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Build the configuration from an arbitrary env-var lookup so tests can
    /// feed a plain map instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let or_default = |var: &str, default: &str| -> String {
            lookup(var).unwrap_or_else(|_| default.to_string())
        };
        let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason,
        };
        let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
            or_default(var, default)
                .parse::<u32>()
                .map_err(|e| invalid(var, e.to_string()))
        };
        let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
            or_default(var, default)
                .parse::<u64>()
                .map_err(|e| invalid(var, e.to_string()))
        };
        let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
            or_default(var, default)
                .parse::<usize>()
                .map_err(|e| invalid(var, e.to_string()))
        };

        let retention_days = parse_u32("VSTAT_RETENTION_DAYS", "7")?;
        if retention_days == 0 {
            return Err(invalid("VSTAT_RETENTION_DAYS", "must be at least 1".to_string()));
        }
        let lookback_offset_days = parse_u32("VSTAT_LOOKBACK_OFFSET_DAYS", "1")?;
        if lookback_offset_days >= retention_days {
            return Err(invalid(
                "VSTAT_LOOKBACK_OFFSET_DAYS",
                format!("must be smaller than the retention window ({retention_days})"),
            ));
        }

        let api_batch_limit = parse_usize("VSTAT_API_BATCH_LIMIT", "50")?;
        if !(1..=MAX_API_BATCH).contains(&api_batch_limit) {
            return Err(invalid(
                "VSTAT_API_BATCH_LIMIT",
                format!("must be between 1 and {MAX_API_BATCH}"),
            ));
        }

        let time_zone = or_default("VSTAT_TIME_ZONE", "Australia/Melbourne")
            .parse::<Tz>()
            .map_err(|e| invalid("VSTAT_TIME_ZONE", e.to_string()))?;

        let video_duration = or_default("VSTAT_SEARCH_DURATION", "medium");
        if !SEARCH_DURATIONS.contains(&video_duration.as_str()) {
            return Err(invalid(
                "VSTAT_SEARCH_DURATION",
                format!("must be one of {}", SEARCH_DURATIONS.join(", ")),
            ));
        }
        let max_results = parse_u32("VSTAT_SEARCH_MAX_RESULTS", "50")?;
        if !(1..=MAX_API_BATCH as u32).contains(&max_results) {
            return Err(invalid(
                "VSTAT_SEARCH_MAX_RESULTS",
                format!("must be between 1 and {MAX_API_BATCH}"),
            ));
        }

        let cutoff_utc = NaiveTime::parse_from_str(&or_default("VSTAT_SEARCH_CUTOFF_UTC", "13:30:00"), "%H:%M:%S")
            .map_err(|e| invalid("VSTAT_SEARCH_CUTOFF_UTC", e.to_string()))?;

        Ok(Self {
            bucket_uri: or_default("VSTAT_BUCKET_URI", "./bucket"),
            window: RetentionWindow {
                retention_days,
                lookback_offset_days,
            },
            api_batch_limit,
            time_zone,
            api: ApiConfig {
                api_key: lookup("YOUTUBE_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                base_url: or_default("VSTAT_API_BASE_URL", "https://www.googleapis.com/youtube/v3/"),
                timeout_secs: parse_u64("VSTAT_HTTP_TIMEOUT_SECS", "20")?,
                max_retries: parse_usize("VSTAT_HTTP_MAX_RETRIES", "0")?,
                requests_per_sec: parse_u32("VSTAT_API_REQUESTS_PER_SEC", "5")?,
            },
            search: SearchConfig {
                query: or_default("VSTAT_SEARCH_QUERY", "japan + travel"),
                topic_id: or_default("VSTAT_SEARCH_TOPIC_ID", "/m/07bxq"),
                video_duration,
                max_results,
                cutoff_utc,
            },
            log_level: or_default("VSTAT_LOG_LEVEL", "info"),
            database_url: lookup("DATABASE_URL").ok(),
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("YOUTUBE_API_KEY".to_string()))
    }

    /// "Yesterday" in the configured zone: the fixed date every record of a run is keyed by.
    pub fn anchor_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = now.with_timezone(&self.time_zone).date_naive();
        today.checked_sub_days(Days::new(1)).unwrap_or(today)
    }
}
