//! Batched re-measurement of located cohorts.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};
use vstat_core::{MetricSnapshot, RefreshRecord};
use vstat_storage::{PartitionStore, StoreError};
use vstat_youtube::{MetricsError, MetricsSource};

use crate::artifact::{decode_cohort_ids, ArtifactError};
use crate::locator::LocatedPartition;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("reading cohort partition {key}: {source}")]
    CohortRead {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("decoding cohort partition {key}: {source}")]
    CohortDecode {
        key: String,
        #[source]
        source: ArtifactError,
    },
    #[error("metrics request for cohort {cohort_date} failed: {source}")]
    Metrics {
        cohort_date: NaiveDate,
        #[source]
        source: MetricsError,
    },
}

impl RefreshError {
    pub fn is_partition_scoped(&self) -> bool {
        matches!(self, Self::CohortRead { .. } | Self::CohortDecode { .. })
    }
}

pub struct MetricRefresher<'a> {
    source: &'a dyn MetricsSource,
    batch_limit: usize,
    refresh_date: NaiveDate,
}

impl<'a> MetricRefresher<'a> {
    /// `batch_limit` is clamped to what the source accepts per call.
    pub fn new(source: &'a dyn MetricsSource, batch_limit: usize, refresh_date: NaiveDate) -> Self {
        let batch_limit = batch_limit.min(source.max_batch_size()).max(1);
        Self {
            source,
            batch_limit,
            refresh_date,
        }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    pub async fn refresh_partition(
        &self,
        store: &dyn PartitionStore,
        partition: &LocatedPartition,
    ) -> Result<Vec<RefreshRecord>, RefreshError> {
        let bytes = store.get(&partition.key).map_err(|source| RefreshError::CohortRead {
            key: partition.key.clone(),
            source,
        })?;
        let ids = decode_cohort_ids(&bytes).map_err(|source| RefreshError::CohortDecode {
            key: partition.key.clone(),
            source,
        })?;

        self.refresh_ids(partition.cohort_date, &ids)
            .await
            .map_err(|source| RefreshError::Metrics {
                cohort_date: partition.cohort_date,
                source,
            })
    }

    /// One record per requested id the source answered for, in cohort order.
    ///
    /// Duplicate ids are requested once. Ids the source did not return are
    /// dropped; ids it returned without being asked are ignored.
    pub async fn refresh_ids(&self, cohort_date: NaiveDate, ids: &[String]) -> Result<Vec<RefreshRecord>, MetricsError> {
        if cohort_date > self.refresh_date {
            warn!(%cohort_date, refresh_date = %self.refresh_date, "cohort is newer than the refresh date; skipping");
            return Ok(Vec::new());
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let requested: Vec<String> = ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect();

        let mut answered: HashMap<String, MetricSnapshot> = HashMap::with_capacity(requested.len());
        for chunk in requested.chunks(self.batch_limit) {
            let stats = self.source.video_statistics(chunk).await?;
            debug!(%cohort_date, requested = chunk.len(), returned = stats.len(), "metrics batch");
            for item in stats {
                if seen.contains(item.id.as_str()) {
                    answered.insert(item.id, item.metrics);
                }
            }
        }

        let missing = requested.len() - answered.len();
        if missing > 0 {
            debug!(%cohort_date, missing, "ids absent from metrics response were dropped");
        }

        let records: Vec<RefreshRecord> = requested
            .into_iter()
            .filter_map(|id| {
                let metrics = answered.remove(&id)?;
                RefreshRecord::measured(id, cohort_date, self.refresh_date, metrics)
            })
            .collect();

        info!(%cohort_date, records = records.len(), "refreshed cohort");
        Ok(records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use vstat_storage::MemoryPartitionStore;
    use vstat_youtube::VideoStatistics;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ids(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("v{i}")).collect()
    }

    /// Answers every requested id except those in `withhold`; views are `100 + position in batch`.
    #[derive(Default)]
    pub(crate) struct FakeMetrics {
        pub(crate) calls: Mutex<Vec<Vec<String>>>,
        pub(crate) withhold: HashSet<String>,
        pub(crate) extra: Option<String>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl MetricsSource for FakeMetrics {
        async fn video_statistics(&self, ids: &[String]) -> Result<Vec<VideoStatistics>, MetricsError> {
            self.calls.lock().unwrap().push(ids.to_vec());
            if self.fail {
                return Err(MetricsError::Quota {
                    reason: "quotaExceeded".into(),
                    message: "quota".into(),
                });
            }
            let mut out: Vec<VideoStatistics> = ids
                .iter()
                .enumerate()
                .filter(|(_, id)| !self.withhold.contains(*id))
                .map(|(i, id)| VideoStatistics {
                    id: id.clone(),
                    metrics: MetricSnapshot {
                        view_count: i as i64 + 100,
                        ..MetricSnapshot::default()
                    },
                })
                .collect();
            if let Some(extra) = &self.extra {
                out.push(VideoStatistics {
                    id: extra.clone(),
                    metrics: MetricSnapshot::default(),
                });
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn identifiers_are_chunked_to_the_batch_limit() {
        let source = FakeMetrics::default();
        let refresher = MetricRefresher::new(&source, 50, date(2024, 1, 14));

        let records = refresher.refresh_ids(date(2024, 1, 12), &ids(120)).await.unwrap();

        let sizes: Vec<usize> = source.calls.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(records.len(), 120);
        assert!(records.iter().all(|r| r.collection_count == 3));
        assert!(records.iter().all(|r| r.collection_date == date(2024, 1, 14)));
    }

    #[tokio::test]
    async fn batch_limit_never_exceeds_source_cap() {
        let source = FakeMetrics::default();
        assert_eq!(MetricRefresher::new(&source, 500, date(2024, 1, 14)).batch_limit(), 50);
        assert_eq!(MetricRefresher::new(&source, 0, date(2024, 1, 14)).batch_limit(), 1);
    }

    #[tokio::test]
    async fn unanswered_ids_are_dropped_without_error() {
        let all = ids(50);
        let source = FakeMetrics {
            withhold: all[40..].iter().cloned().collect(),
            extra: Some("not-requested".into()),
            ..FakeMetrics::default()
        };
        let refresher = MetricRefresher::new(&source, 50, date(2024, 1, 14));

        let records = refresher.refresh_ids(date(2024, 1, 12), &all).await.unwrap();
        assert_eq!(records.len(), 40);
        assert_eq!(records[0].id, "v0");
        assert_eq!(records[39].id, "v39");
        assert!(records.iter().all(|r| r.id != "not-requested"));
    }

    #[tokio::test]
    async fn duplicate_ids_are_requested_once() {
        let source = FakeMetrics::default();
        let refresher = MetricRefresher::new(&source, 50, date(2024, 1, 14));
        let input = vec!["a".to_string(), "b".to_string(), "a".to_string()];

        let records = refresher.refresh_ids(date(2024, 1, 14), &input).await.unwrap();
        assert_eq!(source.calls.lock().unwrap()[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].collection_count, 1);
    }

    #[tokio::test]
    async fn metrics_failure_is_not_partition_scoped() {
        let store = MemoryPartitionStore::new();
        let key = "raw/videos/collection_date=2024-01-12/2024-01-12.parquet";
        let cohort = crate::artifact::encode_cohort(&[]).unwrap();
        store.put(key, &cohort).unwrap();

        let source = FakeMetrics {
            fail: true,
            ..FakeMetrics::default()
        };
        let refresher = MetricRefresher::new(&source, 50, date(2024, 1, 14));
        let partition = LocatedPartition {
            cohort_date: date(2024, 1, 12),
            key: key.to_string(),
        };

        // An empty cohort never reaches the source.
        assert!(refresher.refresh_partition(&store, &partition).await.unwrap().is_empty());

        let err = refresher.refresh_ids(date(2024, 1, 12), &ids(3)).await.unwrap_err();
        assert!(matches!(err, MetricsError::Quota { .. }));
    }

    #[tokio::test]
    async fn corrupt_partition_is_partition_scoped() {
        let store = MemoryPartitionStore::new();
        let key = "raw/videos/collection_date=2024-01-12/2024-01-12.parquet";
        store.put(key, b"garbage").unwrap();

        let source = FakeMetrics::default();
        let refresher = MetricRefresher::new(&source, 50, date(2024, 1, 14));
        let err = refresher
            .refresh_partition(
                &store,
                &LocatedPartition {
                    cohort_date: date(2024, 1, 12),
                    key: key.to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_partition_scoped());
        assert!(source.calls.lock().unwrap().is_empty());
    }
}
