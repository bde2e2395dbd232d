//! Same-day dedupe: key derivation plus the existence/mark store contract.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Asia::Shanghai;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const KEY_PREFIX: &str = "kv:attendance:";

/// Calendar date in the platform's civil timezone (UTC+8).
pub fn civil_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Shanghai).date_naive()
}

/// Dedupe key for `token` on the civil day containing `now`.
pub fn attendance_key_at(token: &str, now: DateTime<Utc>) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!(
        "{KEY_PREFIX}{digest:x}:{}",
        civil_date(now).format("%Y-%m-%d")
    )
}

pub fn attendance_key(token: &str) -> String {
    attendance_key_at(token, Utc::now())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dedupe store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("dedupe store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("dedupe store lock poisoned")]
    Poisoned,
    #[error("dedupe store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Existence check + mark over dedupe keys.
///
/// Callers treat a failed lookup as "not attended" and ignore a failed mark.
#[async_trait]
pub trait DedupeStore: Send + Sync {
    async fn has_attended(&self, key: &str) -> Result<bool, StoreError>;

    async fn mark_attended(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store, good for a single invocation or a long-lived HTTP process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    keys: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupeStore for MemoryStore {
    async fn has_attended(&self, key: &str) -> Result<bool, StoreError> {
        let keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(keys.contains(key))
    }

    async fn mark_attended(&self, key: &str) -> Result<(), StoreError> {
        let mut keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        keys.insert(key.to_string());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    keys: BTreeSet<String>,
}

/// JSON file store so cron invocations can dedupe across processes.
///
/// Keys from earlier civil days are pruned on every mark. File access runs on the
/// blocking pool, serialized by a lock shared with every in-flight task.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`, creating the parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(Self {
            path,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` against the store file off the async runtime, holding the store lock.
    async fn with_file<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;
            op(&path)
        })
        .await?
    }
}

fn read_store(path: &Path) -> Result<StoreFile, StoreError> {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(StoreFile::default()),
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(StoreFile::default()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_store(path: &Path, file: &StoreFile) -> Result<(), StoreError> {
    let encoded = serde_json::to_string_pretty(file)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, encoded).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn key_date(key: &str) -> Option<&str> {
    key.rsplit(':').next()
}

#[async_trait]
impl DedupeStore for FileStore {
    async fn has_attended(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.with_file(move |path| Ok(read_store(path)?.keys.contains(&key)))
            .await
    }

    async fn mark_attended(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_file(move |path| {
            let mut file = read_store(path)?;
            let today = key_date(&key).map(str::to_string);
            file.keys
                .retain(|existing| key_date(existing) == today.as_deref());
            file.keys.insert(key);
            write_store(path, &file)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_key_shape() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 4, 0, 0).unwrap();
        let key = attendance_key_at("token", now);
        assert_eq!(
            key,
            "kv:attendance:3c469e9d6c5875d37a43f353d4f88e61fcf812c66eee3457465a40b0da4153e0:2025-03-01"
        );
    }

    #[test]
    fn test_key_is_stable_within_a_civil_day() {
        // 2025-03-01 00:30 and 23:30 in UTC+8.
        let early = Utc.with_ymd_and_hms(2025, 2, 28, 16, 30, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 15, 30, 0).unwrap();
        assert_eq!(attendance_key_at("abc", early), attendance_key_at("abc", late));
        assert!(attendance_key_at("abc", early).ends_with(":2025-03-01"));
    }

    #[test]
    fn test_key_changes_across_utc8_midnight() {
        let before = Utc.with_ymd_and_hms(2025, 3, 1, 15, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 1, 16, 0, 0).unwrap();
        assert_ne!(attendance_key_at("abc", before), attendance_key_at("abc", after));
        assert!(attendance_key_at("abc", after).ends_with(":2025-03-02"));
    }

    #[test]
    fn test_different_tokens_never_share_a_key() {
        let now = Utc::now();
        assert_ne!(attendance_key_at("a", now), attendance_key_at("b", now));
    }

    #[tokio::test]
    async fn test_memory_store_marks_keys() {
        let store = MemoryStore::new();
        assert!(!store.has_attended("k").await.unwrap());
        store.mark_attended("k").await.unwrap();
        assert!(store.has_attended("k").await.unwrap());
        assert!(!store.has_attended("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state").join("attendance.json");

        let store = FileStore::open(&path).expect("open store");
        assert!(!store.has_attended("kv:attendance:aa:2025-03-01").await.unwrap());
        store
            .mark_attended("kv:attendance:aa:2025-03-01")
            .await
            .unwrap();

        let reopened = FileStore::open(&path).expect("reopen store");
        assert!(reopened
            .has_attended("kv:attendance:aa:2025-03-01")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_file_store_prunes_previous_days() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path().join("attendance.json")).expect("open store");
        store
            .mark_attended("kv:attendance:aa:2025-03-01")
            .await
            .unwrap();
        store
            .mark_attended("kv:attendance:bb:2025-03-02")
            .await
            .unwrap();

        assert!(!store
            .has_attended("kv:attendance:aa:2025-03-01")
            .await
            .unwrap());
        assert!(store
            .has_attended("kv:attendance:bb:2025-03-02")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_file_store_reports_corruption() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("attendance.json");
        fs::write(&path, "{not json").unwrap();
        let store = FileStore::open(&path).expect("open store");
        let err = store.has_attended("k").await.expect_err("corrupt file");
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_file_store_concurrent_marks_all_persist() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("attendance.json");
        let store = FileStore::open(&path).expect("open store");

        let (first, second, third) = tokio::join!(
            store.mark_attended("kv:attendance:aa:2025-03-01"),
            store.mark_attended("kv:attendance:bb:2025-03-01"),
            store.mark_attended("kv:attendance:cc:2025-03-01"),
        );
        first.unwrap();
        second.unwrap();
        third.unwrap();

        let reopened = FileStore::open(&path).expect("reopen store");
        for key in ["aa", "bb", "cc"] {
            assert!(reopened
                .has_attended(&format!("kv:attendance:{key}:2025-03-01"))
                .await
                .unwrap());
        }
    }
}
