//! Persisted record of notified items
//!
//! Records are stored one JSON object per line. `record` appends and syncs a
//! single line, so a crash mid-write can only damage that line; `load` skips
//! unreadable lines, evicts entries past the retention window and rewrites
//! the file with the survivors (temp file + rename).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::DedupKey;

/// Errors from reading or writing the dedup file
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("dedup store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode dedup record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One persisted notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupRecord {
    /// Canonical URL
    pub key: String,
    /// Item id, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// When the item was first notified
    pub notified_at: DateTime<Utc>,
}

impl DedupRecord {
    /// Whether the record has aged out at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        // An expiry past chrono's range never arrives
        self.notified_at
            .checked_add_signed(retention)
            .is_some_and(|expires| now >= expires)
    }
}

/// TTL-bounded dedup store backed by a JSON-lines file
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    retention: Duration,
    records: HashMap<String, DedupRecord>,
    /// item id -> canonical URL
    item_ids: HashMap<String, String>,
}

impl DedupStore {
    pub fn new(path: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            path: path.into(),
            retention,
            records: HashMap::new(),
            item_ids: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read the file, evict expired entries and compact.
    ///
    /// A missing file is an empty store. Any other I/O failure is returned so
    /// the caller does not proceed without history.
    pub fn load(&mut self, now: DateTime<Utc>) -> Result<&HashMap<String, DedupRecord>, StorageError> {
        let mut records: HashMap<String, DedupRecord> = HashMap::new();
        let mut total = 0usize;

        match File::open(&self.path) {
            Ok(file) => {
                for (line_no, line) in BufReader::new(file).lines().enumerate() {
                    let line = line.map_err(|e| self.io_error(e))?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    total += 1;
                    match serde_json::from_str::<DedupRecord>(&line) {
                        // Later lines win
                        Ok(record) => {
                            records.insert(record.key.clone(), record);
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Skipping unreadable dedup record {}:{}: {}",
                                self.path.display(),
                                line_no + 1,
                                e
                            );
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e)),
        }

        let retention = self.retention;
        records.retain(|_, r| !r.is_expired(now, retention));

        if total > 0 {
            tracing::debug!(
                "Dedup store {}: {} lines read, {} records kept",
                self.path.display(),
                total,
                records.len()
            );
        }

        self.records = records;
        self.rebuild_index();
        self.compact()?;

        Ok(&self.records)
    }

    /// Whether the key was notified within the retention window
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.records.contains_key(&key.canonical_url)
            || key
                .item_id
                .as_ref()
                .is_some_and(|id| self.item_ids.contains_key(id))
    }

    /// Durably record a notification; returns once the line is synced
    pub fn record(&mut self, key: &DedupKey, at: DateTime<Utc>) -> Result<(), StorageError> {
        let record = DedupRecord {
            key: key.canonical_url.clone(),
            item_id: key.item_id.clone(),
            notified_at: at,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        self.ensure_parent_dir()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes()).map_err(|e| self.io_error(e))?;
        file.sync_data().map_err(|e| self.io_error(e))?;

        if let Some(id) = &record.item_id {
            self.item_ids.insert(id.clone(), record.key.clone());
        }
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    /// Load, evict and compact; returns the surviving record count
    pub fn prune(&mut self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        Ok(self.load(now)?.len())
    }

    fn rebuild_index(&mut self) {
        self.item_ids = self
            .records
            .values()
            .filter_map(|r| r.item_id.as_ref().map(|id| (id.clone(), r.key.clone())))
            .collect();
    }

    /// Rewrite the file with the in-memory records, oldest first
    fn compact(&self) -> Result<(), StorageError> {
        if self.records.is_empty() && !self.path.exists() {
            return Ok(());
        }

        let mut sorted: Vec<&DedupRecord> = self.records.values().collect();
        sorted.sort_by(|a, b| a.notified_at.cmp(&b.notified_at).then_with(|| a.key.cmp(&b.key)));

        let mut contents = String::new();
        for record in sorted {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }

        self.ensure_parent_dir()?;
        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(|e| self.io_error(e))?;
        file.write_all(contents.as_bytes()).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;

        fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn ensure_parent_dir(&self) -> Result<(), StorageError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))
            }
            _ => Ok(()),
        }
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(url: &str, id: Option<&str>) -> DedupKey {
        DedupKey::new(url, id.map(str::to_string))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn store(dir: &TempDir, hours: i64) -> DedupStore {
        DedupStore::new(dir.path().join("notified.jsonl"), Duration::hours(hours))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir, 24);
        assert!(s.load(t0()).unwrap().is_empty());
        assert!(!s.path().exists());
    }

    #[test]
    fn test_ttl_boundary() {
        let dir = TempDir::new().unwrap();
        let k = key("https://www.amazon.it/dp/B000000001", None);

        let mut s = store(&dir, 24);
        s.load(t0()).unwrap();
        s.record(&k, t0()).unwrap();

        let mut before = store(&dir, 24);
        before.load(t0() + Duration::hours(24) - Duration::seconds(1)).unwrap();
        assert!(before.contains(&k));

        let mut at = store(&dir, 24);
        at.load(t0() + Duration::hours(24)).unwrap();
        assert!(!at.contains(&k));

        // Eviction was compacted away
        let mut after = store(&dir, 24);
        after.load(t0()).unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn test_retention_beyond_calendar_never_expires() {
        let dir = TempDir::new().unwrap();
        let k = key("https://www.amazon.it/dp/B000000001", None);
        let huge = Duration::days(365_000_000);

        let mut s = DedupStore::new(dir.path().join("notified.jsonl"), huge);
        s.load(t0()).unwrap();
        s.record(&k, t0()).unwrap();

        let mut reloaded = DedupStore::new(dir.path().join("notified.jsonl"), huge);
        reloaded.load(t0() + Duration::days(3650)).unwrap();
        assert!(reloaded.contains(&k));
    }

    #[test]
    fn test_item_id_matches_other_url() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir, 120);
        s.load(t0()).unwrap();
        s.record(&key("https://www.amazon.it/Funko/dp/B000000001", Some("B000000001")), t0())
            .unwrap();

        let mut reloaded = store(&dir, 120);
        reloaded.load(t0()).unwrap();
        assert!(reloaded.contains(&key("https://www.amazon.it/dp/B000000001", Some("B000000001"))));
        assert!(!reloaded.contains(&key("https://www.amazon.it/dp/B000000002", Some("B000000002"))));
    }

    #[test]
    fn test_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let k = key("https://www.amazon.it/dp/B000000001", None);
        let mut s = store(&dir, 120);
        s.load(t0()).unwrap();
        s.record(&k, t0()).unwrap();
        s.record(&k, t0() + Duration::hours(1)).unwrap();

        let mut reloaded = store(&dir, 120);
        let records = reloaded.load(t0() + Duration::hours(2)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[&k.canonical_url].notified_at, t0() + Duration::hours(1));

        let contents = fs::read_to_string(reloaded.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notified.jsonl");
        let good = serde_json::to_string(&DedupRecord {
            key: "https://www.amazon.it/dp/B000000001".to_string(),
            item_id: None,
            notified_at: t0(),
        })
        .unwrap();
        fs::write(&path, format!("{}\n{{\"key\": \"trunc\n\n", good)).unwrap();

        let mut s = DedupStore::new(&path, Duration::hours(24));
        assert_eq!(s.prune(t0()).unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_unreadable_path_is_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let mut s = DedupStore::new(dir.path(), Duration::hours(24));
        assert!(matches!(s.load(t0()), Err(StorageError::Io { .. })));
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let mut s = DedupStore::new(dir.path().join("state/notified.jsonl"), Duration::hours(24));
        s.load(t0()).unwrap();
        s.record(&key("https://www.amazon.it/dp/B000000001", None), t0()).unwrap();
        assert!(s.path().exists());
    }
}
