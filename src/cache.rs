//! Keyed store for collector results.
//!
//! Results are kept as serialized JSON under an operation key. Invalidation is
//! explicit: nothing expires on its own.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use walkdir::WalkDir;

const CACHE_EXTENSION: &str = "cache";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Cache entry '{key}' is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A keyed store of serialized operation results.
pub trait CacheStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, CacheError>;

    fn put(&mut self, key: &str, value: String) -> Result<(), CacheError>;

    /// Drop every entry, returning how many were removed.
    fn invalidate(&mut self) -> Result<usize, CacheError>;
}

/// Return the cached value for `key`, or compute, store and return it.
pub fn cached<T, E, F>(store: &mut dyn CacheStore, key: &str, compute: F) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: FnOnce() -> Result<T, E>,
{
    if let Some(raw) = store.get(key)? {
        tracing::info!(key, "using cached result");
        return serde_json::from_str(&raw)
            .map_err(|source| {
                CacheError::Corrupt {
                    key: key.to_string(),
                    source,
                }
            })
            .map_err(E::from);
    }

    let value = compute()?;
    let raw = serde_json::to_string(&value).map_err(CacheError::from)?;
    store.put(key, raw)?;
    tracing::info!(key, "saved result to cache");
    Ok(value)
}

/// Cache entries stored as files in a directory, one `<key>.cache` per entry.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: Utf8PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Utf8PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.{}", file, CACHE_EXTENSION))
    }
}

impl CacheStore for FileCache {
    fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn put(&mut self, key: &str, value: String) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.entry_path(key), value)?;
        Ok(())
    }

    fn invalidate(&mut self) -> Result<usize, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let entries: Vec<_> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == CACHE_EXTENSION)
            })
            .collect();

        for entry in &entries {
            tracing::info!(path = %entry.path().display(), "removing cache entry");
            std::fs::remove_file(entry.path())?;
        }
        Ok(entries.len())
    }
}

/// In-process cache, mostly useful for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn invalidate(&mut self) -> Result<usize, CacheError> {
        let count = self.entries.len();
        self.entries.clear();
        Ok(count)
    }
}
