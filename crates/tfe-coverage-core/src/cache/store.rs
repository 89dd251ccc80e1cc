//! Cache persistence across runs
//!
//! The cache is stored as one JSON document. Loading never fails a run: a
//! missing or empty file is an empty cache, and an unreadable one is an empty
//! cache plus a diagnostic for the caller to report.

use super::{CacheEntry, CacheKey, InventoryCache, NormalizeStats};
use crate::error::{CoverageError, Result};
use crate::model::{InventoryItem, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CACHE_VERSION: u32 = 1;
const BACKUP_SUFFIX: &str = "backup";

/// On-disk cache document
#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    entries: Vec<PersistedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    source: Source,
    scope: String,
    fetched_at: DateTime<Utc>,
    #[serde(default)]
    stats: NormalizeStats,
    /// Entries written without one never match a normalizer
    #[serde(default)]
    normalizer: String,
    snapshot: Vec<InventoryItem>,
}

/// Cache loaded from disk
#[derive(Debug)]
pub struct LoadedCache {
    pub cache: InventoryCache,
    /// Why the file was ignored, when it was
    pub diagnostic: Option<CoverageError>,
}

/// Reads and writes the persisted cache file
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(BACKUP_SUFFIX);
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: impl Into<String>) -> LoadedCache {
        let diagnostic = CoverageError::CacheCorruption {
            path: self.path.clone(),
            reason: reason.into(),
        };
        tracing::warn!("{}", diagnostic);
        LoadedCache {
            cache: InventoryCache::new(),
            diagnostic: Some(diagnostic),
        }
    }

    /// Load the cache; never fails
    pub fn load(&self) -> LoadedCache {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Cache file not found, starting empty");
            return LoadedCache {
                cache: InventoryCache::new(),
                diagnostic: None,
            };
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => return self.corrupt(e.to_string()),
        };
        if content.trim().is_empty() {
            return LoadedCache {
                cache: InventoryCache::new(),
                diagnostic: None,
            };
        }

        let document: CacheDocument = match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => return self.corrupt(e.to_string()),
        };

        // Version check
        if document.version > CACHE_VERSION {
            return self.corrupt(format!(
                "cache version {} is newer than supported version {}",
                document.version, CACHE_VERSION
            ));
        }

        let mut cache = InventoryCache::new();
        for entry in document.entries {
            cache.insert_loaded(
                CacheKey::new(entry.source, entry.scope),
                CacheEntry {
                    snapshot: Arc::new(entry.snapshot),
                    fetched_at: entry.fetched_at,
                    stats: entry.stats,
                    normalizer: entry.normalizer,
                },
            );
        }

        tracing::debug!(entries = cache.len(), "Loaded inventory cache");
        LoadedCache {
            cache,
            diagnostic: None,
        }
    }

    /// Save the cache, keeping the previous file as a backup.
    ///
    /// The new document is written to a temporary file beside the cache and
    /// renamed into place, so a failed save leaves the previous file intact.
    pub fn save(&self, cache: &InventoryCache) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let document = CacheDocument {
            version: CACHE_VERSION,
            saved_at: Utc::now(),
            entries: cache
                .entries()
                .into_iter()
                .map(|(key, entry)| PersistedEntry {
                    source: key.source,
                    scope: key.scope.clone(),
                    fetched_at: entry.fetched_at,
                    stats: entry.stats,
                    normalizer: entry.normalizer.clone(),
                    snapshot: entry.snapshot.as_ref().clone(),
                })
                .collect(),
        };

        let content = serde_json::to_string_pretty(&document)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        // Create backup if cache file exists
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }
        file.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(entries = document.entries.len(), path = %self.path.display(), "Saved inventory cache");
        Ok(())
    }

    /// Delete the cache file and its backup; returns whether a cache file existed
    pub fn clear(&self) -> Result<bool> {
        let existed = self.path.exists();
        if existed {
            fs::remove_file(&self.path)?;
        }
        let backup = self.backup_path();
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        Ok(existed)
    }
}
