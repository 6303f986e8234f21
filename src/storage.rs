use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::{trace, warn};

/// Persistent key-value store for UI state, the equivalent of the browser's
/// local storage. Values are opaque strings; callers decide what to put in
/// them (usually a JSON blob).
///
/// Implementations use interior mutability so the store can be shared as
/// `Rc<dyn Storage>` between the table, the filter widgets, the season tabs
/// and the theme toggle. Everything runs on the event-loop thread.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// File-backed store: one JSON object per state file, key -> blob string.
/// The file is re-read and re-written on every access so independent
/// components observe each other's writes, like local storage does.
/// I/O or parse failures degrade to "nothing stored" and are only logged.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Map<String, Value> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                trace!(path = %self.path.display(), error = %e, "no state file yet");
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "state file is not a JSON object, starting empty");
                Map::new()
            }
        }
    }

    fn write_all(&self, map: &Map<String, Value>) {
        if let Some(parent) = self.path.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warn!(path = %self.path.display(), error = %e, "cannot create state directory");
            return;
        }
        let raw = match serde_json::to_string_pretty(&Value::Object(map.clone())) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "cannot serialize state file");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, raw) {
            warn!(path = %self.path.display(), error = %e, "cannot write state file");
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_all().get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = self.read_all();
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_all(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = self.read_all();
        if map.remove(key).is_some() {
            self.write_all(&map);
        }
    }
}

/// In-memory store used by the tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Reads a stored blob as a JSON object, the `JSON.parse(...) || {}` pattern:
/// missing keys and malformed blobs both come back as an empty object.
pub fn read_json_object(storage: &dyn Storage, key: &str) -> Map<String, Value> {
    let Some(raw) = storage.get(key) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!(key, "malformed stored state, falling back to empty");
            Map::new()
        }
    }
}

pub fn write_json_object(storage: &dyn Storage, key: &str, object: &Map<String, Value>) {
    match serde_json::to_string(&Value::Object(object.clone())) {
        Ok(raw) => storage.set(key, &raw),
        Err(e) => warn!(key, error = %e, "cannot serialize state blob"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_roundtrip() {
        let store = MemoryStorage::new();
        assert_eq!(store.get("theme"), None);
        store.set("theme", "dark");
        assert_eq!(store.get("theme").as_deref(), Some("dark"));
        store.remove("theme");
        assert_eq!(store.get("theme"), None);
    }

    #[test]
    fn malformed_blob_reads_as_empty_object() {
        let store = MemoryStorage::new();
        store.set("leaderboardFilters", "{not json");
        assert!(read_json_object(&store, "leaderboardFilters").is_empty());

        store.set("leaderboardFilters", "[1,2,3]");
        assert!(read_json_object(&store, "leaderboardFilters").is_empty());
    }

    #[test]
    fn json_object_roundtrip() {
        let store = MemoryStorage::new();
        let mut map = Map::new();
        map.insert("page".into(), Value::from(3));
        write_json_object(&store, "k", &map);
        let back = read_json_object(&store, "k");
        assert_eq!(back.get("page"), Some(&Value::from(3)));
    }
}
