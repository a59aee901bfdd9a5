//! Parquet encoding of the raw partitions and the warehouse snapshots.
//!
//! Raw artifacts keep the API's camelCase column names. Decoding resolves
//! columns through the rename tables in [`crate::normalize`], so lowercased
//! or already-canonical column names read the same way.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    ArrowTimestampType, TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType,
};
use arrow_array::{
    Array, ArrayRef, Date32Array, Int32Array, Int64Array, ListArray, PrimitiveArray, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{ArrowError, DataType, Field as ArrowField, Schema, TimeUnit};
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::errors::ParquetError;
use thiserror::Error;
use vstat_core::{CohortRecord, MetricSnapshot, RefreshRecord, VideoRow, VideoStatsRow};

use crate::normalize::{STATS_RENAMES, VIDEO_RENAMES};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("missing column {0}")]
    MissingColumn(&'static str),
    #[error("column {column} has unsupported type {data_type}")]
    UnexpectedType {
        column: &'static str,
        data_type: DataType,
    },
    #[error("invalid value {value:?} in column {column} (row {row})")]
    InvalidValue {
        column: &'static str,
        row: usize,
        value: String,
    },
}

fn tags_field(name: &str) -> ArrowField {
    ArrowField::new(
        name,
        DataType::List(Arc::new(ArrowField::new("item", DataType::Utf8, true))),
        false,
    )
}

fn utc_micros() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
}

fn strings<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from(values.map(Some).collect::<Vec<_>>()))
}

fn write_parquet(batch: RecordBatch) -> Result<Vec<u8>, ArtifactError> {
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None)?;
    writer.write(&batch)?;
    Ok(writer.into_inner()?)
}

fn read_parquet(bytes: &[u8]) -> Result<Vec<RecordBatch>, ArtifactError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes))?.build()?;
    Ok(reader.collect::<Result<Vec<_>, ArrowError>>()?)
}

pub fn encode_cohort(records: &[CohortRecord]) -> Result<Vec<u8>, ArtifactError> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("id", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("description", DataType::Utf8, false),
        ArrowField::new("publishedAt", DataType::Utf8, false),
        ArrowField::new("channelId", DataType::Utf8, false),
        ArrowField::new("channelTitle", DataType::Utf8, false),
        ArrowField::new("videoCategoryId", DataType::Utf8, false),
        tags_field("tags"),
        ArrowField::new("videoDuration", DataType::Utf8, false),
        ArrowField::new("videoDefinition", DataType::Utf8, false),
        ArrowField::new("initialViewCount", DataType::Int64, false),
        ArrowField::new("initialLikeCount", DataType::Int64, false),
        ArrowField::new("initialFavoriteCount", DataType::Int64, false),
        ArrowField::new("initialCommentCount", DataType::Int64, false),
        ArrowField::new("collectionDate", DataType::Utf8, false),
    ]));

    let mut tags = ListBuilder::new(StringBuilder::new());
    for record in records {
        for tag in &record.tags {
            tags.values().append_value(tag);
        }
        tags.append(true);
    }

    let counter = |f: fn(&MetricSnapshot) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from(
            records.iter().map(|r| f(&r.initial)).collect::<Vec<_>>(),
        ))
    };

    let batch = RecordBatch::try_new(
        schema,
        vec![
            strings(records.iter().map(|r| r.id.as_str())),
            strings(records.iter().map(|r| r.title.as_str())),
            strings(records.iter().map(|r| r.description.as_str())),
            strings(records.iter().map(|r| r.published_at.as_str())),
            strings(records.iter().map(|r| r.channel_id.as_str())),
            strings(records.iter().map(|r| r.channel_title.as_str())),
            strings(records.iter().map(|r| r.category_id.as_str())),
            Arc::new(tags.finish()),
            strings(records.iter().map(|r| r.duration.as_str())),
            strings(records.iter().map(|r| r.definition.as_str())),
            counter(|m| m.view_count),
            counter(|m| m.like_count),
            counter(|m| m.favorite_count),
            counter(|m| m.comment_count),
            strings(records.iter().map(|r| r.collection_date.as_str())),
        ],
    )?;
    write_parquet(batch)
}

pub fn encode_refresh(records: &[RefreshRecord]) -> Result<Vec<u8>, ArtifactError> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("id", DataType::Utf8, false),
        ArrowField::new("initialCollectionDate", DataType::Date32, false),
        ArrowField::new("collectionDate", DataType::Date32, false),
        ArrowField::new("collectionCount", DataType::Int32, false),
        ArrowField::new("viewCount", DataType::Int64, false),
        ArrowField::new("likeCount", DataType::Int64, false),
        ArrowField::new("favoriteCount", DataType::Int64, false),
        ArrowField::new("commentCount", DataType::Int64, false),
    ]));

    let counter = |f: fn(&MetricSnapshot) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from(
            records.iter().map(|r| f(&r.metrics)).collect::<Vec<_>>(),
        ))
    };

    let batch = RecordBatch::try_new(
        schema,
        vec![
            strings(records.iter().map(|r| r.id.as_str())),
            Arc::new(Date32Array::from(
                records
                    .iter()
                    .map(|r| date_to_days(r.initial_collection_date))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Date32Array::from(
                records
                    .iter()
                    .map(|r| date_to_days(r.collection_date))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Int32Array::from(
                records.iter().map(|r| r.collection_count).collect::<Vec<_>>(),
            )),
            counter(|m| m.view_count),
            counter(|m| m.like_count),
            counter(|m| m.favorite_count),
            counter(|m| m.comment_count),
        ],
    )?;
    write_parquet(batch)
}

pub fn encode_videos(rows: &[VideoRow]) -> Result<Vec<u8>, ArtifactError> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("video_id", DataType::Utf8, false),
        ArrowField::new("video_title", DataType::Utf8, false),
        ArrowField::new("video_description_truncated", DataType::Utf8, false),
        ArrowField::new("video_description_length", DataType::Int32, false),
        ArrowField::new("video_published_datetime", utc_micros(), false),
        ArrowField::new("channel_id", DataType::Utf8, false),
        ArrowField::new("channel_title", DataType::Utf8, false),
        ArrowField::new("video_category_id", DataType::Int32, false),
        ArrowField::new("video_tags_truncated", DataType::Utf8, false),
        ArrowField::new("video_tags_length", DataType::Int32, false),
        ArrowField::new("video_duration", DataType::Utf8, false),
        ArrowField::new("video_definition", DataType::Utf8, false),
        ArrowField::new("collection_date", DataType::Date32, false),
        ArrowField::new("ingested_datetime", utc_micros(), false),
    ]));

    let timestamps = |f: fn(&VideoRow) -> DateTime<Utc>| -> ArrayRef {
        Arc::new(
            TimestampMicrosecondArray::from(
                rows.iter().map(|r| f(r).timestamp_micros()).collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        )
    };
    let ints = |f: fn(&VideoRow) -> i32| -> ArrayRef {
        Arc::new(Int32Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };

    let batch = RecordBatch::try_new(
        schema,
        vec![
            strings(rows.iter().map(|r| r.video_id.as_str())),
            strings(rows.iter().map(|r| r.video_title.as_str())),
            strings(rows.iter().map(|r| r.video_description_truncated.as_str())),
            ints(|r| r.video_description_length),
            timestamps(|r| r.video_published_datetime),
            strings(rows.iter().map(|r| r.channel_id.as_str())),
            strings(rows.iter().map(|r| r.channel_title.as_str())),
            ints(|r| r.video_category_id),
            strings(rows.iter().map(|r| r.video_tags_truncated.as_str())),
            ints(|r| r.video_tags_length),
            strings(rows.iter().map(|r| r.video_duration.as_str())),
            strings(rows.iter().map(|r| r.video_definition.as_str())),
            Arc::new(Date32Array::from(
                rows.iter().map(|r| date_to_days(r.collection_date)).collect::<Vec<_>>(),
            )),
            timestamps(|r| r.ingested_datetime),
        ],
    )?;
    write_parquet(batch)
}

pub fn encode_video_stats(rows: &[VideoStatsRow]) -> Result<Vec<u8>, ArtifactError> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("video_id", DataType::Utf8, false),
        ArrowField::new("initial_collection_date", DataType::Date32, false),
        ArrowField::new("collection_date", DataType::Date32, false),
        ArrowField::new("collection_count", DataType::Int32, false),
        ArrowField::new("view_count", DataType::Int64, false),
        ArrowField::new("like_count", DataType::Int64, false),
        ArrowField::new("favorite_count", DataType::Int64, false),
        ArrowField::new("comment_count", DataType::Int64, false),
        ArrowField::new("ingested_datetime", utc_micros(), false),
    ]));

    let counts = |f: fn(&VideoStatsRow) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };

    let batch = RecordBatch::try_new(
        schema,
        vec![
            strings(rows.iter().map(|r| r.video_id.as_str())),
            Arc::new(Date32Array::from(
                rows.iter()
                    .map(|r| date_to_days(r.initial_collection_date))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Date32Array::from(
                rows.iter().map(|r| date_to_days(r.collection_date)).collect::<Vec<_>>(),
            )),
            Arc::new(Int32Array::from(
                rows.iter().map(|r| r.collection_count).collect::<Vec<_>>(),
            )),
            counts(|r| r.view_count),
            counts(|r| r.like_count),
            counts(|r| r.favorite_count),
            counts(|r| r.comment_count),
            Arc::new(
                TimestampMicrosecondArray::from(
                    rows.iter()
                        .map(|r| r.ingested_datetime.timestamp_micros())
                        .collect::<Vec<_>>(),
                )
                .with_timezone("UTC"),
            ),
        ],
    )?;
    write_parquet(batch)
}

/// A record batch viewed through a rename table: canonical name → column.
///
/// Source names match ASCII case-insensitively; the canonical name is accepted
/// as well. Columns not named in the table are never read.
struct RenamedBatch<'a> {
    batch: &'a RecordBatch,
    columns: HashMap<&'static str, usize>,
}

impl<'a> RenamedBatch<'a> {
    fn resolve(batch: &'a RecordBatch, renames: &'static [(&'static str, &'static str)]) -> Self {
        let schema = batch.schema();
        let mut columns = HashMap::new();
        for (source, canonical) in renames {
            let found = schema.fields().iter().position(|field| {
                field.name().eq_ignore_ascii_case(source) || field.name().eq_ignore_ascii_case(canonical)
            });
            if let Some(index) = found {
                columns.insert(*canonical, index);
            }
        }
        Self { batch, columns }
    }

    fn rows(&self) -> usize {
        self.batch.num_rows()
    }

    fn optional(&self, canonical: &'static str) -> Option<&ArrayRef> {
        self.columns.get(canonical).map(|&i| self.batch.column(i))
    }

    fn required(&self, canonical: &'static str) -> Result<&ArrayRef, ArtifactError> {
        self.optional(canonical)
            .ok_or(ArtifactError::MissingColumn(canonical))
    }

    fn strings(&self, canonical: &'static str) -> Result<Vec<String>, ArtifactError> {
        let column = self.required(canonical)?;
        let values = column
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ArtifactError::UnexpectedType {
                column: canonical,
                data_type: column.data_type().clone(),
            })?;
        Ok((0..values.len())
            .map(|i| {
                if values.is_null(i) {
                    String::new()
                } else {
                    values.value(i).to_string()
                }
            })
            .collect())
    }

    fn counters(&self, canonical: &'static str) -> Result<Vec<i64>, ArtifactError> {
        let Some(column) = self.optional(canonical) else {
            return Ok(vec![0; self.rows()]);
        };
        let any = column.as_any();
        if let Some(values) = any.downcast_ref::<Int64Array>() {
            return Ok((0..values.len())
                .map(|i| if values.is_null(i) { 0 } else { values.value(i) })
                .collect());
        }
        if let Some(values) = any.downcast_ref::<Int32Array>() {
            return Ok((0..values.len())
                .map(|i| if values.is_null(i) { 0 } else { i64::from(values.value(i)) })
                .collect());
        }
        if let Some(values) = any.downcast_ref::<StringArray>() {
            return (0..values.len())
                .map(|row| {
                    if values.is_null(row) {
                        return Ok(0);
                    }
                    let raw = values.value(row);
                    raw.trim().parse::<i64>().map_err(|_| ArtifactError::InvalidValue {
                        column: canonical,
                        row,
                        value: raw.to_string(),
                    })
                })
                .collect();
        }
        Err(ArtifactError::UnexpectedType {
            column: canonical,
            data_type: column.data_type().clone(),
        })
    }

    /// Typed Date32, a timestamp of any unit, or text as `YYYY-MM-DD` /
    /// `YYYY-MM-DD HH:MM:SS`.
    fn dates(&self, canonical: &'static str) -> Result<Vec<NaiveDate>, ArtifactError> {
        let column = self.required(canonical)?;
        let invalid = |row: usize, value: String| ArtifactError::InvalidValue {
            column: canonical,
            row,
            value,
        };
        if let DataType::Timestamp(unit, _) = column.data_type() {
            let days = match unit {
                TimeUnit::Second => timestamp_dates(column.as_primitive::<TimestampSecondType>()),
                TimeUnit::Millisecond => timestamp_dates(column.as_primitive::<TimestampMillisecondType>()),
                TimeUnit::Microsecond => timestamp_dates(column.as_primitive::<TimestampMicrosecondType>()),
                TimeUnit::Nanosecond => timestamp_dates(column.as_primitive::<TimestampNanosecondType>()),
            };
            return days
                .into_iter()
                .enumerate()
                .map(|(row, day)| day.ok_or_else(|| invalid(row, "null".to_string())))
                .collect();
        }
        let any = column.as_any();
        if let Some(values) = any.downcast_ref::<Date32Array>() {
            return (0..values.len())
                .map(|row| {
                    if values.is_null(row) {
                        return Err(invalid(row, "null".to_string()));
                    }
                    days_to_date(values.value(row)).ok_or_else(|| invalid(row, values.value(row).to_string()))
                })
                .collect();
        }
        if let Some(values) = any.downcast_ref::<StringArray>() {
            return (0..values.len())
                .map(|row| {
                    let raw = if values.is_null(row) { "" } else { values.value(row) };
                    parse_loose_date(raw).ok_or_else(|| invalid(row, raw.to_string()))
                })
                .collect();
        }
        Err(ArtifactError::UnexpectedType {
            column: canonical,
            data_type: column.data_type().clone(),
        })
    }

    fn int32s(&self, canonical: &'static str) -> Result<Vec<i32>, ArtifactError> {
        self.counters(canonical)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                i32::try_from(value).map_err(|_| ArtifactError::InvalidValue {
                    column: canonical,
                    row,
                    value: value.to_string(),
                })
            })
            .collect()
    }

    fn string_lists(&self, canonical: &'static str) -> Result<Vec<Vec<String>>, ArtifactError> {
        let Some(column) = self.optional(canonical) else {
            return Ok(vec![Vec::new(); self.rows()]);
        };
        let unexpected = || ArtifactError::UnexpectedType {
            column: canonical,
            data_type: column.data_type().clone(),
        };
        let lists = column
            .as_any()
            .downcast_ref::<ListArray>()
            .ok_or_else(unexpected)?;
        (0..lists.len())
            .map(|row| {
                if lists.is_null(row) {
                    return Ok(Vec::new());
                }
                let items = lists.value(row);
                let items = items
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(unexpected)?;
                Ok((0..items.len())
                    .filter(|&i| !items.is_null(i))
                    .map(|i| items.value(i).to_string())
                    .collect())
            })
            .collect()
    }
}

fn timestamp_dates<T: ArrowTimestampType>(values: &PrimitiveArray<T>) -> Vec<Option<NaiveDate>> {
    (0..values.len())
        .map(|i| {
            if values.is_null(i) {
                None
            } else {
                values.value_as_datetime(i).map(|ts| ts.date())
            }
        })
        .collect()
}

fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

pub fn decode_cohort_ids(bytes: &[u8]) -> Result<Vec<String>, ArtifactError> {
    let mut ids = Vec::new();
    for batch in read_parquet(bytes)? {
        ids.extend(RenamedBatch::resolve(&batch, VIDEO_RENAMES).strings("video_id")?);
    }
    Ok(ids)
}

pub fn decode_cohort(bytes: &[u8]) -> Result<Vec<CohortRecord>, ArtifactError> {
    let mut records = Vec::new();
    for batch in read_parquet(bytes)? {
        let view = RenamedBatch::resolve(&batch, VIDEO_RENAMES);
        let ids = view.strings("video_id")?;
        let titles = view.strings("video_title")?;
        let descriptions = view.strings("video_description")?;
        let published = view.strings("video_published_datetime")?;
        let channel_ids = view.strings("channel_id")?;
        let channel_titles = view.strings("channel_title")?;
        let categories = view.strings("video_category_id")?;
        let tags = view.string_lists("video_tags")?;
        let durations = view.strings("video_duration")?;
        let definitions = view.strings("video_definition")?;
        let views = view.counters("view_count")?;
        let likes = view.counters("like_count")?;
        let favorites = view.counters("favorite_count")?;
        let comments = view.counters("comment_count")?;
        let dates = view.strings("collection_date")?;

        for row in 0..view.rows() {
            records.push(CohortRecord {
                id: ids[row].clone(),
                title: titles[row].clone(),
                description: descriptions[row].clone(),
                published_at: published[row].clone(),
                channel_id: channel_ids[row].clone(),
                channel_title: channel_titles[row].clone(),
                category_id: categories[row].clone(),
                tags: tags[row].clone(),
                duration: durations[row].clone(),
                definition: definitions[row].clone(),
                initial: MetricSnapshot {
                    view_count: views[row],
                    like_count: likes[row],
                    favorite_count: favorites[row],
                    comment_count: comments[row],
                },
                collection_date: dates[row].clone(),
            });
        }
    }
    Ok(records)
}

pub fn decode_refresh(bytes: &[u8]) -> Result<Vec<RefreshRecord>, ArtifactError> {
    let mut records = Vec::new();
    for batch in read_parquet(bytes)? {
        let view = RenamedBatch::resolve(&batch, STATS_RENAMES);
        let ids = view.strings("video_id")?;
        let initial_dates = view.dates("initial_collection_date")?;
        let dates = view.dates("collection_date")?;
        let counts = view.int32s("collection_count")?;
        let views = view.counters("view_count")?;
        let likes = view.counters("like_count")?;
        let favorites = view.counters("favorite_count")?;
        let comments = view.counters("comment_count")?;

        for row in 0..view.rows() {
            records.push(RefreshRecord {
                id: ids[row].clone(),
                initial_collection_date: initial_dates[row],
                collection_date: dates[row],
                collection_count: counts[row],
                metrics: MetricSnapshot {
                    view_count: views[row],
                    like_count: likes[row],
                    favorite_count: favorites[row],
                    comment_count: comments[row],
                },
            });
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstat_core::{VIDEOS_COLUMNS, VIDEO_STATS_COLUMNS};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn column_names(bytes: &[u8]) -> Vec<String> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes)).unwrap();
        builder.schema().fields().iter().map(|f| f.name().clone()).collect()
    }

    fn cohort_record(id: &str, collection_date: &str) -> CohortRecord {
        CohortRecord {
            id: id.to_string(),
            title: format!("title {id}"),
            description: "a description".to_string(),
            published_at: "2024-01-09T21:04:11Z".to_string(),
            channel_id: "UC1".to_string(),
            channel_title: "channel".to_string(),
            category_id: "19".to_string(),
            tags: vec!["japan".to_string(), "travel".to_string()],
            duration: "PT5M".to_string(),
            definition: "hd".to_string(),
            initial: MetricSnapshot {
                view_count: 100,
                like_count: 5,
                favorite_count: 0,
                comment_count: 1,
            },
            collection_date: collection_date.to_string(),
        }
    }

    #[test]
    fn epoch_day_conversion_matches_arrow() {
        assert_eq!(date_to_days(date(1970, 1, 1)), 0);
        assert_eq!(date_to_days(date(2024, 1, 10)), 19_732);
        assert_eq!(days_to_date(19_732), Some(date(2024, 1, 10)));
    }

    #[test]
    fn cohort_artifact_preserves_tags_and_counters() {
        let mut untagged = cohort_record("v2", "2024-01-10");
        untagged.tags.clear();
        let records = vec![cohort_record("v1", "2024-01-10"), untagged];

        let bytes = encode_cohort(&records).expect("encode");
        assert_eq!(decode_cohort(&bytes).expect("decode"), records);
        assert_eq!(decode_cohort_ids(&bytes).expect("ids"), vec!["v1", "v2"]);
    }

    #[test]
    fn refresh_artifact_columns_use_source_names() {
        let record = RefreshRecord::measured("v1", date(2024, 1, 10), date(2024, 1, 12), MetricSnapshot::default())
            .expect("valid dates");
        let bytes = encode_refresh(&[record.clone()]).expect("encode");
        assert_eq!(
            column_names(&bytes),
            vec![
                "id",
                "initialCollectionDate",
                "collectionDate",
                "collectionCount",
                "viewCount",
                "likeCount",
                "favoriteCount",
                "commentCount"
            ]
        );
        assert_eq!(decode_refresh(&bytes).expect("decode"), vec![record]);
    }

    #[test]
    fn lowercased_text_columns_decode_through_rename_table() {
        let schema = Arc::new(Schema::new(vec![
            ArrowField::new("id", DataType::Utf8, false),
            ArrowField::new("initialcollectiondate", DataType::Utf8, false),
            ArrowField::new("collectiondate", DataType::Utf8, false),
            ArrowField::new("collectioncount", DataType::Utf8, false),
            ArrowField::new("viewcount", DataType::Utf8, false),
            ArrowField::new("unrelated", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                strings(["v1"].into_iter()),
                strings(["2024-01-10 00:00:00"].into_iter()),
                strings(["2024-01-12"].into_iter()),
                strings(["3"].into_iter()),
                strings(["150"].into_iter()),
                strings(["dropped"].into_iter()),
            ],
        )
        .unwrap();
        let bytes = write_parquet(batch).unwrap();

        let records = decode_refresh(&bytes).expect("decode");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].initial_collection_date, date(2024, 1, 10));
        assert_eq!(records[0].collection_date, date(2024, 1, 12));
        assert_eq!(records[0].collection_count, 3);
        assert_eq!(records[0].metrics.view_count, 150);
        assert_eq!(records[0].metrics.like_count, 0);
    }

    #[test]
    fn timestamp_date_columns_decode_to_their_day() {
        let five_am = 1_704_844_800 + 5 * 3_600;
        let schema = Arc::new(Schema::new(vec![
            ArrowField::new("id", DataType::Utf8, false),
            ArrowField::new("initialCollectionDate", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
            ArrowField::new("collectionDate", utc_micros(), false),
            ArrowField::new("collectionCount", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                strings(["v1"].into_iter()),
                Arc::new(arrow_array::TimestampNanosecondArray::from(vec![five_am * 1_000_000_000])),
                Arc::new(TimestampMicrosecondArray::from(vec![(five_am + 2 * 86_400) * 1_000_000]).with_timezone("UTC")),
                Arc::new(Int64Array::from(vec![3])),
            ],
        )
        .unwrap();
        let bytes = write_parquet(batch).unwrap();

        let records = decode_refresh(&bytes).expect("decode");
        assert_eq!(records[0].initial_collection_date, date(2024, 1, 10));
        assert_eq!(records[0].collection_date, date(2024, 1, 12));
        assert_eq!(records[0].collection_count, 3);
    }

    #[test]
    fn missing_id_column_is_reported() {
        let schema = Arc::new(Schema::new(vec![ArrowField::new("title", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(schema, vec![strings(["t"].into_iter())]).unwrap();
        let bytes = write_parquet(batch).unwrap();
        assert!(matches!(
            decode_cohort_ids(&bytes),
            Err(ArtifactError::MissingColumn("video_id"))
        ));
        assert!(matches!(decode_cohort_ids(b"not parquet"), Err(ArtifactError::Parquet(_))));
    }

    #[test]
    fn warehouse_snapshots_use_canonical_column_order() {
        assert_eq!(column_names(&encode_videos(&[]).unwrap()), VIDEOS_COLUMNS);
        assert_eq!(column_names(&encode_video_stats(&[]).unwrap()), VIDEO_STATS_COLUMNS);
    }
}
