// src/cache.rs
//! Device-local key/value cache of JSON blobs that survives restarts.
//! Holds the signed-in user and the last known active plan.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::db::APP_DATA_DIR;
use crate::store::StoreError;

pub const USER_KEY: &str = "user";
pub const ACTIVE_PLAN_KEY: &str = "activePlan";
const CACHE_FILE_NAME: &str = "cache.json";

pub fn get_cache_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir().ok_or(StoreError::DataDir)?;
    Ok(data_dir.join(APP_DATA_DIR).join(CACHE_FILE_NAME))
}

#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An unreadable or corrupt file reads as an empty cache.
    fn load(&self) -> Map<String, Value> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Map::new();
        };
        match serde_json::from_str(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "ignoring unreadable session cache");
                Map::new()
            }
        }
    }

    fn store(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
        Ok(())
    }

    /// Returns `None` when the key is missing or no longer decodes as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.load().remove(key)?;
        serde_json::from_value(value).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let mut map = self.load();
        map.insert(key.to_string(), serde_json::to_value(value)?);
        self.store(&map)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.load();
        if map.remove(key).is_some() {
            self.store(&map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;

    #[test]
    fn set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("nested").join("cache.json"));
        assert!(cache.get::<User>(USER_KEY).is_none());

        let user = User {
            id: 7,
            username: "sam".into(),
            token: Some("abc".into()),
        };
        cache.set(USER_KEY, &user).unwrap();
        assert_eq!(cache.get::<User>(USER_KEY), Some(user));

        // Keys are independent
        cache.set(ACTIVE_PLAN_KEY, &serde_json::json!({"id": 1})).unwrap();
        cache.remove(USER_KEY).unwrap();
        assert!(cache.get::<User>(USER_KEY).is_none());
        assert!(cache.get::<Value>(ACTIVE_PLAN_KEY).is_some());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").unwrap();
        let cache = SessionCache::new(&path);
        assert!(cache.get::<Value>(USER_KEY).is_none());
        cache.set(USER_KEY, &1).unwrap();
        assert_eq!(cache.get::<i32>(USER_KEY), Some(1));
    }
}
