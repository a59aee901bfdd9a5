//! Date-partitioned object storage + rate-limited HTTP fetch utilities for vstat.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

mod http;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse, HttpClientConfig,
    HttpFetcher, PacingConfig, RequestPacer, RetryDisposition,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("unsupported bucket uri {0:?}: only file:// and plain paths are supported")]
    UnsupportedUri(String),
    #[error("i/o error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub content_hash: String,
    pub byte_size: usize,
}

/// Keyed blob store organised as `<prefix>/collection_date=<date>/<file>`.
///
/// `list` returns keys in ascending key order; an absent prefix is an empty
/// listing, never an error. `put` overwrites, which is what makes re-running a
/// date safe.
pub trait PartitionStore: Send + Sync {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StoreError>;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Key layout of one dataset: `<root>/<dataset>/collection_date=<date>/<date>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    root: String,
    dataset: String,
    extension: String,
}

impl PartitionLayout {
    pub fn new(root: &str, dataset: &str, extension: &str) -> Self {
        Self {
            root: root.trim_matches('/').to_string(),
            dataset: dataset.trim_matches('/').to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn raw_videos() -> Self {
        Self::new("raw", "videos", "parquet")
    }

    pub fn raw_video_stats() -> Self {
        Self::new("raw", "video_stats", "parquet")
    }

    pub fn warehouse(table: &str) -> Self {
        Self::new("warehouse", table, "parquet")
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn partition_prefix(&self, date: NaiveDate) -> String {
        format!("{}/{}/collection_date={}/", self.root, self.dataset, date.format("%Y-%m-%d"))
    }

    pub fn object_key(&self, date: NaiveDate) -> String {
        format!(
            "{}{}.{}",
            self.partition_prefix(date),
            date.format("%Y-%m-%d"),
            self.extension
        )
    }
}

#[derive(Debug, Clone)]
pub struct FsPartitionStore {
    root: PathBuf,
}

impl FsPartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Accepts `file:///abs/path`, `file://rel/path` or a plain path.
    pub fn from_bucket_uri(uri: &str) -> Result<Self, StoreError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Self::new(path));
        }
        if uri.contains("://") {
            return Err(StoreError::UnsupportedUri(uri.to_string()));
        }
        Ok(Self::new(uri))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_err(key: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        key: key.to_string(),
        source,
    }
}

impl PartitionStore for FsPartitionStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.resolve(prefix)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(prefix)(err)),
        };

        let base = prefix.trim_start_matches('/').trim_end_matches('/');
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(prefix))?;
            if !entry.file_type().map_err(io_err(prefix))?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            keys.push(format!("{base}/{name}"));
        }
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(err) => Err(io_err(key)(err)),
        }
    }

    /// Writes through a temp file in the target directory and renames it into place.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StoreError> {
        let absolute_path = self.resolve(key)?;
        let parent = absolute_path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent).map_err(io_err(key))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let written = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp_path, &absolute_path));

        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err(key)(err));
        }

        debug!(key, bytes = bytes.len(), "stored object");
        Ok(StoredObject {
            key: key.to_string(),
            content_hash: sha256_hex(bytes),
            byte_size: bytes.len(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryPartitionStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl PartitionStore for MemoryPartitionStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StoreError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes.to_vec());
        Ok(StoredObject {
            key: key.to_string(),
            content_hash: sha256_hex(bytes),
            byte_size: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn content_hashing_is_stable() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn layout_builds_hive_style_keys() {
        let layout = PartitionLayout::raw_video_stats();
        assert_eq!(
            layout.partition_prefix(date(2024, 1, 12)),
            "raw/video_stats/collection_date=2024-01-12/"
        );
        assert_eq!(
            layout.object_key(date(2024, 1, 12)),
            "raw/video_stats/collection_date=2024-01-12/2024-01-12.parquet"
        );
        assert_eq!(
            PartitionLayout::warehouse("videos").object_key(date(2024, 1, 2)),
            "warehouse/videos/collection_date=2024-01-02/2024-01-02.parquet"
        );
    }

    #[test]
    fn fs_put_overwrites_and_lists_partition() {
        let dir = tempdir().expect("tempdir");
        let store = FsPartitionStore::new(dir.path());
        let key = PartitionLayout::raw_videos().object_key(date(2024, 1, 10));

        let first = store.put(&key, b"first").expect("first put");
        let second = store.put(&key, b"second version").expect("second put");
        assert_ne!(first.content_hash, second.content_hash);
        assert_eq!(store.get(&key).expect("get"), b"second version");

        let listed = store
            .list(&PartitionLayout::raw_videos().partition_prefix(date(2024, 1, 10)))
            .expect("list");
        assert_eq!(listed, vec![key]);
    }

    #[test]
    fn fs_missing_prefix_lists_empty() {
        let dir = tempdir().expect("tempdir");
        let store = FsPartitionStore::new(dir.path());
        assert!(store.list("raw/videos/collection_date=2020-01-01/").unwrap().is_empty());
        assert!(matches!(store.get("raw/none.parquet"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn fs_rejects_escaping_keys() {
        let store = FsPartitionStore::new("/tmp/vstat");
        assert!(matches!(store.put("../etc/passwd", b"x"), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn bucket_uri_schemes() {
        assert_eq!(
            FsPartitionStore::from_bucket_uri("file:///data/bucket").unwrap().root(),
            Path::new("/data/bucket")
        );
        assert_eq!(FsPartitionStore::from_bucket_uri("./bucket").unwrap().root(), Path::new("./bucket"));
        assert!(matches!(
            FsPartitionStore::from_bucket_uri("s3://bucket"),
            Err(StoreError::UnsupportedUri(_))
        ));
    }

    #[test]
    fn memory_list_is_prefix_scoped() {
        let store = MemoryPartitionStore::new();
        store.put("raw/videos/collection_date=2024-01-10/a.parquet", b"a").unwrap();
        store.put("raw/videos/collection_date=2024-01-11/b.parquet", b"b").unwrap();
        store.put("raw/video_stats/collection_date=2024-01-10/c.parquet", b"c").unwrap();

        let listed = store.list("raw/videos/collection_date=2024-01-10/").unwrap();
        assert_eq!(listed, vec!["raw/videos/collection_date=2024-01-10/a.parquet".to_string()]);
        assert_eq!(store.keys().len(), 3);
    }
}
