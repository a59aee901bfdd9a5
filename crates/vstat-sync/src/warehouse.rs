//! Truncate-and-reload of one collection date into a Postgres-protocol warehouse.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::info;
use vstat_core::{VideoRow, VideoStatsRow};

/// Rows per INSERT statement; keeps bind parameters well under the protocol's 65535.
const INSERT_CHUNK: usize = 1_000;

const CREATE_VIDEOS: &str = r#"
CREATE TABLE IF NOT EXISTS videos (
    video_id                    TEXT        NOT NULL,
    video_title                 TEXT        NOT NULL,
    video_description_truncated TEXT        NOT NULL,
    video_description_length    INTEGER     NOT NULL,
    video_published_datetime    TIMESTAMPTZ NOT NULL,
    channel_id                  TEXT        NOT NULL,
    channel_title               TEXT        NOT NULL,
    video_category_id           INTEGER     NOT NULL,
    video_tags_truncated        TEXT        NOT NULL,
    video_tags_length           INTEGER     NOT NULL,
    video_duration              TEXT        NOT NULL,
    video_definition            TEXT        NOT NULL,
    collection_date             DATE        NOT NULL,
    ingested_datetime           TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_VIDEO_STATS: &str = r#"
CREATE TABLE IF NOT EXISTS video_stats (
    video_id                TEXT        NOT NULL,
    initial_collection_date DATE        NOT NULL,
    collection_date         DATE        NOT NULL,
    collection_count        INTEGER     NOT NULL,
    view_count              BIGINT      NOT NULL,
    like_count              BIGINT      NOT NULL,
    favorite_count          BIGINT      NOT NULL,
    comment_count           BIGINT      NOT NULL,
    ingested_datetime       TIMESTAMPTZ NOT NULL
)
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub videos: usize,
    pub video_stats: usize,
}

pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_VIDEOS).execute(&self.pool).await?;
        sqlx::query(CREATE_VIDEO_STATS).execute(&self.pool).await?;
        Ok(())
    }

    /// Replaces everything previously loaded for `collection_date` in one transaction.
    ///
    /// `video_stats` rows are matched on their `collection_date`; a normalize run
    /// for date D only ever carries stats rows dated D.
    pub async fn load(
        &self,
        collection_date: NaiveDate,
        videos: &[VideoRow],
        video_stats: &[VideoStatsRow],
    ) -> Result<LoadSummary, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM videos WHERE collection_date = $1")
            .bind(collection_date)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM video_stats WHERE collection_date = $1")
            .bind(collection_date)
            .execute(&mut *tx)
            .await?;

        for chunk in videos.chunks(INSERT_CHUNK) {
            insert_videos(&mut tx, chunk).await?;
        }
        for chunk in video_stats.chunks(INSERT_CHUNK) {
            insert_video_stats(&mut tx, chunk).await?;
        }

        tx.commit().await?;
        info!(%collection_date, videos = videos.len(), video_stats = video_stats.len(), "loaded warehouse tables");
        Ok(LoadSummary {
            videos: videos.len(),
            video_stats: video_stats.len(),
        })
    }
}

async fn insert_videos(tx: &mut Transaction<'_, Postgres>, rows: &[VideoRow]) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO videos (video_id, video_title, video_description_truncated, video_description_length, \
         video_published_datetime, channel_id, channel_title, video_category_id, video_tags_truncated, \
         video_tags_length, video_duration, video_definition, collection_date, ingested_datetime) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.video_id)
            .push_bind(&row.video_title)
            .push_bind(&row.video_description_truncated)
            .push_bind(row.video_description_length)
            .push_bind(row.video_published_datetime)
            .push_bind(&row.channel_id)
            .push_bind(&row.channel_title)
            .push_bind(row.video_category_id)
            .push_bind(&row.video_tags_truncated)
            .push_bind(row.video_tags_length)
            .push_bind(&row.video_duration)
            .push_bind(&row.video_definition)
            .push_bind(row.collection_date)
            .push_bind(row.ingested_datetime);
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

async fn insert_video_stats(tx: &mut Transaction<'_, Postgres>, rows: &[VideoStatsRow]) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO video_stats (video_id, initial_collection_date, collection_date, collection_count, \
         view_count, like_count, favorite_count, comment_count, ingested_datetime) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.video_id)
            .push_bind(row.initial_collection_date)
            .push_bind(row.collection_date)
            .push_bind(row.collection_count)
            .push_bind(row.view_count)
            .push_bind(row.like_count)
            .push_bind(row.favorite_count)
            .push_bind(row.comment_count)
            .push_bind(row.ingested_datetime);
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}
