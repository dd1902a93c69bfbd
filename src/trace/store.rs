//! Durable storage behind trace lists

use super::error::StoreError;
use super::event::TraceEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Serialized form of a trace list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: u64,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub events: Vec<TraceEvent>,
}

/// Persistence backend for trace lists.
///
/// All calls are synchronous and may fail; callers apply a change in memory
/// only after the store accepted it.
pub trait TraceStore: Send + Sync {
    /// Create an empty trace list and return its id
    fn create(&self, name: &str, description: &str) -> Result<u64, StoreError>;

    /// Write the full contents of a trace list
    fn save(&self, record: &TraceRecord) -> Result<(), StoreError>;

    fn set_name(&self, id: u64, name: &str) -> Result<(), StoreError>;

    fn set_description(&self, id: u64, description: &str) -> Result<(), StoreError>;

    fn delete(&self, id: u64) -> Result<(), StoreError>;

    /// Every stored trace list, ordered by id
    fn load_all(&self) -> Result<Vec<TraceRecord>, StoreError>;
}

/// Volatile store, used for scratch sessions and tests
pub struct MemoryTraceStore {
    records: Mutex<BTreeMap<u64, TraceRecord>>,
    /// Ids are handed out once, deleted ones are not reused
    next_id: AtomicU64,
    /// When set, every write is rejected
    failing: AtomicBool,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stored copy of a trace list
    pub fn record(&self, id: u64) -> Option<TraceRecord> {
        self.records.lock().get(&id).cloned()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("store is read-only".into()));
        }
        Ok(())
    }

    fn update<F>(&self, id: u64, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut TraceRecord),
    {
        self.check_writable()?;
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        f(record);
        Ok(())
    }
}

impl TraceStore for MemoryTraceStore {
    fn create(&self, name: &str, description: &str) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut records = self.records.lock();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        records.insert(
            id,
            TraceRecord {
                id,
                name: name.to_string(),
                description: description.to_string(),
                events: Vec::new(),
            },
        );
        Ok(id)
    }

    fn save(&self, record: &TraceRecord) -> Result<(), StoreError> {
        self.update(record.id, |stored| *stored = record.clone())
    }

    fn set_name(&self, id: u64, name: &str) -> Result<(), StoreError> {
        self.update(id, |record| record.name = name.to_string())
    }

    fn set_description(&self, id: u64, description: &str) -> Result<(), StoreError> {
        self.update(id, |record| record.description = description.to_string())
    }

    fn delete(&self, id: u64) -> Result<(), StoreError> {
        self.check_writable()?;
        self.records
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { id })
    }

    fn load_all(&self) -> Result<Vec<TraceRecord>, StoreError> {
        Ok(self.records.lock().values().cloned().collect())
    }
}

impl Default for MemoryTraceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Store keeping one JSON document per trace list in a directory
pub struct JsonTraceStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on the directory
    lock: Mutex<()>,
}

impl JsonTraceStore {
    /// Open (and create if needed) a store directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        log::debug!("Opened trace store at {}", root.display());
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the lowest id never handed out
    fn counter_path(&self) -> PathBuf {
        self.root.join("next_id")
    }

    /// Next free id, never below one already used by a trace file
    fn next_id(&self) -> Result<u64, StoreError> {
        let path = self.counter_path();
        let recorded = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            content
                .trim()
                .parse::<u64>()
                .map_err(|_| StoreError::Corrupt { path })?
        } else {
            0
        };
        let on_disk = self.ids()?.last().map_or(0, |last| last + 1);
        Ok(recorded.max(on_disk))
    }

    fn write_next_id(&self, id: u64) -> Result<(), StoreError> {
        let path = self.counter_path();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, id.to_string()).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn path_of(&self, id: u64) -> PathBuf {
        self.root.join(format!("trace-{}.json", id))
    }

    fn read(&self, id: u64) -> Result<TraceRecord, StoreError> {
        let path = self.path_of(id);
        if !path.exists() {
            return Err(StoreError::NotFound { id });
        }
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write through a temporary file so readers never see partial documents
    fn write(&self, record: &TraceRecord) -> Result<(), StoreError> {
        let path = self.path_of(record.id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, content).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn ids(&self) -> Result<Vec<u64>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut ids: Vec<u64> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                name.strip_prefix("trace-")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

impl TraceStore for JsonTraceStore {
    fn create(&self, name: &str, description: &str) -> Result<u64, StoreError> {
        let _guard = self.lock.lock();
        let id = self.next_id()?;
        self.write_next_id(id + 1)?;
        self.write(&TraceRecord {
            id,
            name: name.to_string(),
            description: description.to_string(),
            events: Vec::new(),
        })?;
        Ok(id)
    }

    fn save(&self, record: &TraceRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        self.read(record.id)?;
        self.write(record)
    }

    fn set_name(&self, id: u64, name: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut record = self.read(id)?;
        record.name = name.to_string();
        self.write(&record)
    }

    fn set_description(&self, id: u64, description: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut record = self.read(id)?;
        record.description = description.to_string();
        self.write(&record)
    }

    fn delete(&self, id: u64) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let path = self.path_of(id);
        if !path.exists() {
            return Err(StoreError::NotFound { id });
        }
        fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })
    }

    fn load_all(&self) -> Result<Vec<TraceRecord>, StoreError> {
        let _guard = self.lock.lock();
        self.ids()?.into_iter().map(|id| self.read(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::types::BreakpointAddress;
    use crate::trace::event::{TraceEventType, TraceRegister};

    #[test]
    fn test_memory_store_rejects_when_failing() {
        let store = MemoryTraceStore::new();
        let id = store.create("Foo", "Bar").unwrap();

        store.set_failing(true);
        assert!(matches!(
            store.set_name(id, "Baz"),
            Err(StoreError::Rejected(_))
        ));
        assert_eq!(store.record(id).unwrap().name, "Foo");

        store.set_failing(false);
        store.set_name(id, "Baz").unwrap();
        assert_eq!(store.record(id).unwrap().name, "Baz");
    }

    #[test]
    fn test_memory_store_never_reuses_ids() {
        let store = MemoryTraceStore::new();
        assert_eq!(store.create("a", "").unwrap(), 0);
        assert_eq!(store.create("b", "").unwrap(), 1);
        store.delete(1).unwrap();
        assert_eq!(store.create("c", "").unwrap(), 2);
        assert!(store.record(1).is_none());
        assert!(matches!(store.delete(7), Err(StoreError::NotFound { id: 7 })));
    }

    #[test]
    fn test_json_store_never_reuses_ids() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonTraceStore::open(dir.path()).unwrap();
            assert_eq!(store.create("a", "").unwrap(), 0);
            assert_eq!(store.create("b", "").unwrap(), 1);
            store.delete(1).unwrap();
            assert_eq!(store.create("c", "").unwrap(), 2);
            store.delete(2).unwrap();
        }

        // The high-water mark survives reopening with no file left behind
        let store = JsonTraceStore::open(dir.path()).unwrap();
        assert_eq!(store.create("d", "").unwrap(), 3);
        let ids: Vec<u64> = store.load_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 3]);
    }

    #[test]
    fn test_json_store_corrupt_counter() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTraceStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("next_id"), "many").unwrap();

        assert!(matches!(
            store.create("a", ""),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_json_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let id = {
            let store = JsonTraceStore::open(dir.path()).unwrap();
            let id = store.create("Foo", "Bar").unwrap();
            let event = TraceEvent::new(
                3,
                BreakpointAddress::new("target", 0x100),
                TraceEventType::Echo,
                vec![TraceRegister::new("rip", 0x1100, &[0x90, 0xc3])],
            );
            store
                .save(&TraceRecord {
                    id,
                    name: "Foo".into(),
                    description: "Bar".into(),
                    events: vec![event],
                })
                .unwrap();
            store.set_description(id, "Updated").unwrap();
            id
        };

        let store = JsonTraceStore::open(dir.path()).unwrap();
        let records = store.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].description, "Updated");
        assert_eq!(records[0].events.len(), 1);
        assert_eq!(records[0].events[0].registers()[0].memory(), vec![0x90, 0xc3]);
    }

    #[test]
    fn test_json_store_save_unknown_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTraceStore::open(dir.path()).unwrap();
        let record = TraceRecord {
            id: 4,
            name: String::new(),
            description: String::new(),
            events: Vec::new(),
        };
        assert!(matches!(store.save(&record), Err(StoreError::NotFound { id: 4 })));
    }
}
