//! Record collection synchronized to a string-keyed blob store.

use crate::error::{LedgerError, Result};
use crate::plate::normalize_plate;
use crate::record::{migrate, Record, DEFAULT_SEGMENTS};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Key under which the whole record collection is stored.
pub const RECORDS_KEY: &str = "plate-records";

/// A flat string-keyed value store.
pub trait BlobStore {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LedgerError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Writes go to a temp file in the same directory, then replace the
    /// previous blob in one rename.
    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            LedgerError::Storage(format!(
                "Failed to create data directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| LedgerError::Storage(format!("Failed to create temp file: {}", e)))?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(|e| LedgerError::Storage(format!("Failed to write temp file: {}", e)))?;

        let path = self.path_for(key);
        temp_file.persist(&path).map_err(|e| {
            LedgerError::Storage(format!("Failed to replace {}: {}", path.display(), e))
        })?;

        Ok(())
    }
}

/// In-memory blob store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    values: HashMap<String, String>,
}

impl MemoryBlobStore {
    pub fn with_value(key: &str, value: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(key.to_string(), value.to_string());
        Self { values }
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The record collection and the blob it is mirrored to.
pub struct RecordStore<B: BlobStore> {
    blob: B,
    records: Vec<Record>,
}

impl<B: BlobStore> RecordStore<B> {
    /// Load the collection from `blob`. Unreadable or malformed data leaves
    /// the collection empty; it is logged, never returned.
    pub fn load(blob: B) -> Self {
        let records = match blob.read(RECORDS_KEY) {
            Ok(Some(raw)) => parse_blob(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Could not read saved records, starting empty: {}", e);
                Vec::new()
            }
        };

        tracing::debug!("Loaded {} records", records.len());
        Self { blob, records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn blob(&self) -> &B {
        &self.blob
    }

    /// Prepend `record` and persist.
    pub fn insert(&mut self, record: Record) -> Result<()> {
        tracing::info!("Saving record {} for plate {}", record.id, record.plate);
        self.records.insert(0, record);
        self.persist()
    }

    /// Remove the record with `id`. Unknown ids are a no-op; returns
    /// whether a record was removed.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let before = self.records.len();
        self.records.retain(|record| record.id != id);
        let removed = self.records.len() != before;
        if removed {
            tracing::info!("Deleted record {}", id);
        } else {
            tracing::debug!("No record with id {} to delete", id);
        }
        self.persist()?;
        Ok(removed)
    }

    /// Records whose plate contains `plate_filter` (normalized) and whose
    /// segment equals `segment_filter`, newest first. Empty filters match
    /// everything.
    pub fn query(&self, plate_filter: Option<&str>, segment_filter: Option<&str>) -> Vec<&Record> {
        let plate_filter = plate_filter.map(normalize_plate).unwrap_or_default();
        let segment_filter = segment_filter.map(str::trim).unwrap_or_default();

        let mut matches: Vec<&Record> = self
            .records
            .iter()
            .filter(|record| plate_filter.is_empty() || record.plate.contains(&plate_filter))
            .filter(|record| segment_filter.is_empty() || record.segment == segment_filter)
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches
    }

    /// Default segments followed by any other segment seen in the records.
    pub fn segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = DEFAULT_SEGMENTS.iter().map(|s| s.to_string()).collect();
        for record in &self.records {
            let segment = record.segment.trim();
            if !segment.is_empty() && !segments.iter().any(|s| s == segment) {
                segments.push(segment.to_string());
            }
        }
        segments
    }

    fn persist(&mut self) -> Result<()> {
        let raw = serde_json::to_string(&self.records)
            .map_err(|e| LedgerError::Storage(format!("Failed to serialize records: {}", e)))?;
        self.blob.write(RECORDS_KEY, &raw)
    }
}

fn parse_blob(raw: &str) -> Vec<Record> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(values)) => migrate(values),
        Ok(Value::Null) => Vec::new(),
        Ok(other) => {
            tracing::warn!(
                "Saved records are not a list (found {}), starting empty",
                json_kind(&other)
            );
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("Saved records are corrupted, starting empty: {}", e);
            Vec::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Features;

    fn record(plate: &str, segment: &str, timestamp: i64) -> Record {
        let mut record = Record::new(plate, segment, "", "", Features::default()).unwrap();
        record.timestamp = timestamp;
        record
    }

    fn store_with(records: Vec<Record>) -> RecordStore<MemoryBlobStore> {
        let mut store = RecordStore::load(MemoryBlobStore::default());
        for r in records {
            store.insert(r).unwrap();
        }
        store
    }

    #[test]
    fn test_load_missing_blob_is_empty() {
        let store = RecordStore::load(MemoryBlobStore::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_malformed_blob_is_empty() {
        for raw in ["{not json", "{\"plate\": \"AB1234\"}", "42"] {
            let store = RecordStore::load(MemoryBlobStore::with_value(RECORDS_KEY, raw));
            assert!(store.is_empty(), "expected empty store for {:?}", raw);
        }
    }

    #[test]
    fn test_insert_prepends_and_persists() {
        let store = store_with(vec![record("AA1111", "Otro", 1), record("BB2222", "Otro", 2)]);
        assert_eq!(store.records()[0].plate, "BB2222");

        let raw = store.blob().read(RECORDS_KEY).unwrap().unwrap();
        let reloaded = RecordStore::load(MemoryBlobStore::with_value(RECORDS_KEY, &raw));
        assert_eq!(reloaded.records(), store.records());
    }

    #[test]
    fn test_delete_unknown_id_is_noop() {
        let mut store = store_with(vec![record("AA1111", "Otro", 1)]);
        assert!(!store.delete("missing").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_removes_and_persists() {
        let first = record("AA1111", "Otro", 1);
        let id = first.id.clone();
        let mut store = store_with(vec![first, record("BB2222", "Otro", 2)]);
        assert!(store.delete(&id).unwrap());
        assert!(store.get(&id).is_none());

        let raw = store.blob().read(RECORDS_KEY).unwrap().unwrap();
        assert!(!raw.contains(&id));
    }

    #[test]
    fn test_query_filters_and_sorts_newest_first() {
        let store = store_with(vec![
            record("AB1234", "Autos de remates", 30),
            record("AB9999", "Otro", 50),
            record("ZZ1234", "Autos de remates", 40),
        ]);

        let plates: Vec<&str> = store.query(None, None).iter().map(|r| r.plate.as_str()).collect();
        assert_eq!(plates, vec!["AB9999", "ZZ1234", "AB1234"]);

        let plates: Vec<&str> = store
            .query(Some(" ab "), None)
            .iter()
            .map(|r| r.plate.as_str())
            .collect();
        assert_eq!(plates, vec!["AB9999", "AB1234"]);

        let plates: Vec<&str> = store
            .query(Some("1234"), Some("Autos de remates"))
            .iter()
            .map(|r| r.plate.as_str())
            .collect();
        assert_eq!(plates, vec!["ZZ1234", "AB1234"]);
    }

    #[test]
    fn test_query_unknown_segment_is_empty() {
        let store = store_with(vec![record("AB1234", "Otro", 1)]);
        assert!(store.query(None, Some("Camiones mineros")).is_empty());
        assert_eq!(store.query(Some(""), Some("")).len(), 1);
    }

    #[test]
    fn test_segments_union_defaults_and_history() {
        let store = store_with(vec![
            record("AA1111", "Flota municipal", 1),
            record("BB2222", "Otro", 2),
            record("CC3333", "Flota municipal", 3),
        ]);
        let segments = store.segments();
        assert_eq!(segments.len(), DEFAULT_SEGMENTS.len() + 1);
        assert_eq!(segments.last().map(String::as_str), Some("Flota municipal"));
    }

    #[test]
    fn test_file_blob_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut blob = FileBlobStore::new(dir.path().join("nested"));
        assert_eq!(blob.read(RECORDS_KEY).unwrap(), None);

        blob.write(RECORDS_KEY, "[]").unwrap();
        blob.write(RECORDS_KEY, "[1]").unwrap();
        assert_eq!(blob.read(RECORDS_KEY).unwrap().as_deref(), Some("[1]"));
        assert!(blob.path_for(RECORDS_KEY).ends_with("plate-records.json"));
    }

    #[test]
    fn test_file_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::load(FileBlobStore::new(dir.path()));
        store.insert(record("AB1234", "Otro", 5)).unwrap();

        let reloaded = RecordStore::load(FileBlobStore::new(dir.path()));
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.records()[0].plate, "AB1234");
    }
}
