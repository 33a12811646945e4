//! Durable user preferences (last location, collapsed panels, ...)

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to encode preference '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
    #[error("stored preference '{key}' is unreadable: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

/// String key/value store backed by whatever the host keeps across reloads.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.borrow_mut().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key) else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StorageError::Decode {
            key: key.to_string(),
            source,
        })
}

pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, raw);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        assert_eq!(load_json::<Vec<u32>>(&store, "panels").unwrap(), None);

        save_json(&store, "panels", &vec![1, 3]).unwrap();
        assert_eq!(store.get("panels").as_deref(), Some("[1,3]"));
        assert_eq!(load_json::<Vec<u32>>(&store, "panels").unwrap(), Some(vec![1, 3]));

        store.remove("panels");
        assert_eq!(store.get("panels"), None);
    }

    #[test]
    fn test_corrupt_entry_reports_key() {
        let store = MemoryStore::new();
        store.set("location", "{not json".to_string());

        let error = load_json::<String>(&store, "location").unwrap_err();
        assert!(matches!(&error, StorageError::Decode { key, .. } if key == "location"));
        assert!(error.to_string().contains("'location'"));
    }
}
