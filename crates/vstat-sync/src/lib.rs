//! Run orchestration: discovery, daily metric refresh, and normalization into
//! the warehouse tables.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;
use vstat_core::{CohortRecord, PipelineConfig, RefreshRecord, MAX_API_BATCH};
use vstat_storage::{PartitionLayout, PartitionStore, StoreError, StoredObject};
use vstat_youtube::{DiscoverySource, MetricsError, MetricsSource, SearchRequest};

pub mod aggregate;
pub mod artifact;
pub mod locator;
pub mod normalize;
pub mod reconcile;
pub mod refresh;
pub mod warehouse;

pub use aggregate::{RefreshAggregator, RefreshBatch};
pub use locator::{locate_in_store, locate_partitions, LocatedPartition};
pub use normalize::{Normalize, NormalizeError, Normalizer};
pub use reconcile::{day_zero_rows, reconcile, Reconciled};
pub use refresh::{MetricRefresher, RefreshError};
pub use warehouse::{LoadSummary, PostgresWarehouse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Written { key: String, rows: usize },
    NoData,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryRunSummary {
    pub run_id: Uuid,
    pub anchor: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub search_hits: usize,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRunSummary {
    pub run_id: Uuid,
    pub anchor: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub partitions_located: usize,
    pub partitions_skipped: usize,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizeRunSummary {
    pub run_id: Uuid,
    pub anchor: NaiveDate,
    pub ingested_at: DateTime<Utc>,
    pub videos: usize,
    pub video_stats: usize,
    pub duplicates_replaced: usize,
    pub outcome: RunOutcome,
    pub loaded: Option<LoadSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub collection_date: NaiveDate,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    pub rows: usize,
}

impl ParquetManifestFile {
    fn from_stored(name: &str, stored: StoredObject, rows: usize) -> Self {
        Self {
            name: name.to_string(),
            path: stored.key,
            sha256: stored.content_hash,
            bytes: stored.byte_size as u64,
            rows,
        }
    }
}

pub struct StatsPipeline {
    config: PipelineConfig,
    store: Arc<dyn PartitionStore>,
}

impl StatsPipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn PartitionStore>) -> Self {
        Self { config, store }
    }

    pub async fn run_discovery(&self, source: &dyn DiscoverySource, anchor: NaiveDate) -> Result<DiscoveryRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("discovery_run", %run_id, %anchor);
        self.discover(source, run_id, anchor).instrument(span).await
    }

    async fn discover(&self, source: &dyn DiscoverySource, run_id: Uuid, anchor: NaiveDate) -> Result<DiscoveryRunSummary> {
        let started_at = Utc::now();
        let request = SearchRequest::for_anchor(&self.config.search, anchor);
        let ids = source
            .search_video_ids(&request)
            .await
            .context("searching for new videos")?;

        let mut cohort: Vec<CohortRecord> = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_API_BATCH) {
            let items = source
                .video_details(chunk)
                .await
                .context("fetching video details")?;
            for item in items {
                match item.into_cohort_record(anchor) {
                    Ok(record) => cohort.push(record),
                    Err(MetricsError::MissingField { id, field }) => {
                        warn!(video_id = %id, field, "dropping video without a required field");
                    }
                    Err(err) => return Err(err).context("mapping video details"),
                }
            }
        }

        let outcome = if cohort.is_empty() {
            info!("search returned no videos; nothing written");
            RunOutcome::NoData
        } else {
            let key = PartitionLayout::raw_videos().object_key(anchor);
            let bytes = artifact::encode_cohort(&cohort).context("encoding cohort partition")?;
            self.store
                .put(&key, &bytes)
                .with_context(|| format!("writing {key}"))?;
            info!(key = %key, videos = cohort.len(), "wrote cohort partition");
            RunOutcome::Written { key, rows: cohort.len() }
        };

        Ok(DiscoveryRunSummary {
            run_id,
            anchor,
            started_at,
            finished_at: Utc::now(),
            search_hits: ids.len(),
            outcome,
        })
    }

    /// Re-measures every cohort still in the retention window and writes one
    /// refresh partition for `anchor`. Nothing is written when a metrics
    /// request fails or no records were produced.
    pub async fn run_refresh(&self, source: &dyn MetricsSource, anchor: NaiveDate) -> Result<RefreshRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("refresh_run", %run_id, %anchor);
        self.refresh(source, run_id, anchor).instrument(span).await
    }

    async fn refresh(&self, source: &dyn MetricsSource, run_id: Uuid, anchor: NaiveDate) -> Result<RefreshRunSummary> {
        let started_at = Utc::now();
        let located = locate_in_store(
            self.store.as_ref(),
            &PartitionLayout::raw_videos(),
            anchor,
            &self.config.window,
        )
        .context("probing cohort partitions")?;

        let refresher = MetricRefresher::new(source, self.config.api_batch_limit, anchor);
        info!(partitions = located.len(), batch_limit = refresher.batch_limit(), "refreshing cohorts");
        let mut aggregator = RefreshAggregator::new();
        let mut partitions_skipped = 0;

        for partition in &located {
            match refresher.refresh_partition(self.store.as_ref(), partition).await {
                Ok(records) => aggregator.push_partition(partition.cohort_date, records),
                Err(err) if err.is_partition_scoped() => {
                    warn!(key = %partition.key, error = %err, "skipping unreadable cohort partition");
                    partitions_skipped += 1;
                }
                Err(err) => return Err(err).context("refreshing metrics"),
            }
        }

        let outcome = match aggregator.finish() {
            None => {
                info!("no refresh records produced; nothing written");
                RunOutcome::NoData
            }
            Some(batch) => {
                let key = PartitionLayout::raw_video_stats().object_key(anchor);
                let bytes = artifact::encode_refresh(&batch.records).context("encoding refresh partition")?;
                self.store
                    .put(&key, &bytes)
                    .with_context(|| format!("writing {key}"))?;
                info!(key = %key, records = batch.records.len(), cohorts = batch.cohorts.len(), "wrote refresh partition");
                RunOutcome::Written {
                    key,
                    rows: batch.records.len(),
                }
            }
        };

        Ok(RefreshRunSummary {
            run_id,
            anchor,
            started_at,
            finished_at: Utc::now(),
            partitions_located: located.len(),
            partitions_skipped,
            outcome,
        })
    }

    /// Builds the `videos` and `video_stats` tables for `anchor` from the
    /// cohort and refresh partitions of that date, exports them as parquet and
    /// optionally loads them into `warehouse`.
    pub async fn run_normalize(
        &self,
        anchor: NaiveDate,
        ingested_at: DateTime<Utc>,
        warehouse: Option<&PostgresWarehouse>,
    ) -> Result<NormalizeRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("normalize_run", %run_id, %anchor);
        self.normalize(run_id, anchor, ingested_at, warehouse)
            .instrument(span)
            .await
    }

    async fn normalize(
        &self,
        run_id: Uuid,
        anchor: NaiveDate,
        ingested_at: DateTime<Utc>,
        warehouse: Option<&PostgresWarehouse>,
    ) -> Result<NormalizeRunSummary> {
        let normalizer = Normalizer::new(ingested_at);

        let cohort = match self.read_partition(&PartitionLayout::raw_videos(), anchor)? {
            Some(bytes) => artifact::decode_cohort(&bytes).context("decoding cohort partition")?,
            None => Vec::new(),
        };
        let refreshes: Vec<RefreshRecord> = match self.read_partition(&PartitionLayout::raw_video_stats(), anchor)? {
            Some(bytes) => artifact::decode_refresh(&bytes).context("decoding refresh partition")?,
            None => Vec::new(),
        };

        if cohort.is_empty() && refreshes.is_empty() {
            info!("no cohort or refresh partition for this date; nothing written");
            return Ok(NormalizeRunSummary {
                run_id,
                anchor,
                ingested_at: normalizer.ingested_at(),
                videos: 0,
                video_stats: 0,
                duplicates_replaced: 0,
                outcome: RunOutcome::NoData,
                loaded: None,
            });
        }

        let videos = normalizer.videos(&cohort).context("normalizing videos")?;
        let day_zero = day_zero_rows(&cohort).context("building day-zero stats")?;
        let reconciled = reconcile(day_zero, refreshes);
        let video_stats = normalizer
            .video_stats(&reconciled.rows)
            .context("normalizing video stats")?;

        let videos_bytes = artifact::encode_videos(&videos).context("encoding videos table")?;
        let stats_bytes = artifact::encode_video_stats(&video_stats).context("encoding video_stats table")?;
        let videos_file = self.put(&PartitionLayout::warehouse("videos").object_key(anchor), &videos_bytes)?;
        let stats_file = self.put(&PartitionLayout::warehouse("video_stats").object_key(anchor), &stats_bytes)?;

        let manifest = ParquetManifest {
            schema_version: 1,
            run_id,
            collection_date: anchor,
            files: vec![
                ParquetManifestFile::from_stored("videos", videos_file, videos.len()),
                ParquetManifestFile::from_stored("video_stats", stats_file, video_stats.len()),
            ],
        };
        let manifest_key = format!(
            "{}manifest.json",
            PartitionLayout::warehouse("manifests").partition_prefix(anchor)
        );
        let manifest_bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
        self.put(&manifest_key, &manifest_bytes)?;
        info!(
            videos = videos.len(),
            video_stats = video_stats.len(),
            replaced = reconciled.replaced,
            manifest = %manifest_key,
            "wrote warehouse snapshot"
        );

        let loaded = match warehouse {
            Some(warehouse) => {
                warehouse.ensure_tables().await.context("creating warehouse tables")?;
                Some(
                    warehouse
                        .load(anchor, &videos, &video_stats)
                        .await
                        .context("loading warehouse tables")?,
                )
            }
            None => None,
        };

        Ok(NormalizeRunSummary {
            run_id,
            anchor,
            ingested_at: normalizer.ingested_at(),
            videos: videos.len(),
            video_stats: video_stats.len(),
            duplicates_replaced: reconciled.replaced,
            outcome: RunOutcome::Written {
                key: manifest_key,
                rows: videos.len() + video_stats.len(),
            },
            loaded,
        })
    }

    fn read_partition(&self, layout: &PartitionLayout, date: NaiveDate) -> Result<Option<Vec<u8>>> {
        let prefix = layout.partition_prefix(date);
        let Some(key) = self
            .store
            .list(&prefix)
            .with_context(|| format!("listing {prefix}"))?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        match self.store.get(&key) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {key}")),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject> {
        self.store.put(key, bytes).with_context(|| format!("writing {key}"))
    }
}
