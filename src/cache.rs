use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::CacheConfig;
use crate::error::NavError;
use crate::normalize::NavTree;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub timestamp: u64,
    pub payload: NavTree,
    #[serde(
        rename = "etagOrVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
}

impl CacheEntry {
    pub fn new(timestamp: u64, payload: NavTree, version: Option<String>) -> Self {
        Self {
            timestamp,
            payload,
            version,
        }
    }
}

/// Key/value backend for cache entries. Values are serialized entries.
pub trait CacheStorage {
    fn get(&self, key: &str) -> Result<Option<String>, NavError>;
    fn set(&self, key: &str, value: &str) -> Result<(), NavError>;
    fn remove(&self, key: &str) -> Result<(), NavError>;
}

/// One JSON file per key in a directory.
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe_name = key.replace(['/', '\\', ':'], "_");
        self.dir.join(format!("{}.json", safe_name))
    }
}

impl CacheStorage for FsStorage {
    fn get(&self, key: &str) -> Result<Option<String>, NavError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NavError::storage(key, e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), NavError> {
        fs::create_dir_all(&self.dir).map_err(|e| NavError::storage(key, e.to_string()))?;
        fs::write(self.path_for(key), value).map_err(|e| NavError::storage(key, e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), NavError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NavError::storage(key, e.to_string())),
        }
    }
}

/// In-process store. Clones share the same map, like tabs sharing one
/// origin's storage.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    /// Total bytes of values allowed; `None` is unlimited.
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn locked(
        &self,
        key: &str,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, NavError> {
        self.entries
            .lock()
            .map_err(|_| NavError::storage(key, "storage lock poisoned"))
    }
}

impl CacheStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, NavError> {
        Ok(self.locked(key)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), NavError> {
        let mut entries = self.locked(key)?;
        if let Some(quota) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if used + value.len() > quota {
                return Err(NavError::storage(key, "quota exceeded"));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), NavError> {
        self.locked(key)?.remove(key);
        Ok(())
    }
}

/// Time-boxed, best-effort cache of normalized trees keyed by language.
///
/// Reads never fail: missing, unreadable and corrupt entries are all misses,
/// and corrupt ones are removed. Writes never fail either; a rejected write
/// only means the next load fetches again.
pub struct CacheGate {
    storage: Box<dyn CacheStorage>,
    config: CacheConfig,
}

impl CacheGate {
    pub fn new(storage: Box<dyn CacheStorage>, config: CacheConfig) -> Self {
        Self { storage, config }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Box::new(MemoryStorage::new()), config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn key(&self, lang: &str) -> String {
        format!("nav:{}:{}", self.config.schema, lang)
    }

    pub fn read(&self, lang: &str) -> Option<CacheEntry> {
        let key = self.key(lang);
        let data = match self.storage.get(&key) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(code = e.code(), "cache read failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&data) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key = key.as_str(), "discarding corrupt cache entry: {}", e);
                self.storage.remove(&key).ok();
                None
            }
        }
    }

    pub fn write(&self, lang: &str, entry: &CacheEntry) {
        let key = self.key(lang);
        let data = match serde_json::to_string(entry) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(key = key.as_str(), "cache entry not serializable: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set(&key, &data) {
            tracing::debug!(code = e.code(), "cache write ignored: {}", e);
        }
    }

    /// Explicit cache clear for one language.
    pub fn clear(&self, lang: &str) {
        if let Err(e) = self.storage.remove(&self.key(lang)) {
            tracing::debug!(code = e.code(), "cache clear failed: {}", e);
        }
    }

    /// `now - timestamp < ttl`. Entries stamped in the future count as fresh.
    pub fn is_fresh(&self, entry: &CacheEntry, now_ms: u64) -> bool {
        now_ms.saturating_sub(entry.timestamp) < self.config.ttl_ms
    }

    /// A cache entry fresh at `now_ms`, if any.
    pub fn read_fresh(&self, lang: &str, now_ms: u64) -> Option<CacheEntry> {
        self.read(lang).filter(|e| self.is_fresh(e, now_ms))
    }
}
