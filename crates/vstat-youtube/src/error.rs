use thiserror::Error;
use vstat_storage::FetchError;

/// Errors returned by the metrics/discovery API client.
///
/// Quota and API failures are not scoped to one partition, so they end the run
/// and recovery is a re-run of the whole date. Discovery skips a video that
/// fails with `MissingField`.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("HTTP error: {0}")]
    Fetch(#[from] FetchError),

    #[error("API quota exhausted ({reason}): {message}")]
    Quota { reason: String, message: String },

    #[error("API error {status} ({reason}): {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {field} {value:?} for video {id}")]
    InvalidCounter {
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("video {id} has no {field}")]
    MissingField { id: String, field: &'static str },

    #[error("batch of {size} ids exceeds the API limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
