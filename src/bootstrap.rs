//! On-disk state that must exist before any backend is reachable.
//!
//! The only thing persisted is the last base URL that passed a liveness
//! probe, so a later run can still bind somewhere when every probe fails.
//!
//! File: `~/.tradejournal/endpoint.json`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::EndpointStore;

/// Default cache file path: `~/.tradejournal/endpoint.json`.
pub fn default_endpoint_cache_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tradejournal")
        .join("endpoint.json")
}

/// Serialized contents of the endpoint cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    #[serde(default)]
    pub last_working_endpoint: Option<String>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// File-backed [`EndpointStore`].
#[derive(Debug, Clone)]
pub struct EndpointCache {
    path: PathBuf,
}

impl EndpointCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record. A missing or corrupt file yields the default record.
    pub fn load_record(&self) -> EndpointRecord {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt endpoint cache");
                EndpointRecord::default()
            }),
            Err(_) => EndpointRecord::default(),
        }
    }

    pub fn save_record(&self, record: &EndpointRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(&self.path, json)
    }
}

impl Default for EndpointCache {
    fn default() -> Self {
        Self::new(default_endpoint_cache_path())
    }
}

impl EndpointStore for EndpointCache {
    fn load(&self) -> Option<String> {
        self.load_record()
            .last_working_endpoint
            .filter(|url| !url.is_empty())
    }

    fn save(&self, url: &str) {
        let record = EndpointRecord {
            last_working_endpoint: Some(url.to_string()),
            updated_at: Some(Utc::now()),
        };
        if let Err(e) = self.save_record(&record) {
            // Losing the cache only costs the next run a fallback option.
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist endpoint choice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempdir().unwrap();
        let cache = EndpointCache::new(dir.path().join("nope.json"));
        assert_eq!(cache.load(), None);
        assert_eq!(cache.load_record(), EndpointRecord::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let cache = EndpointCache::new(dir.path().join("nested").join("endpoint.json"));

        cache.save("http://backup.example/api");
        assert_eq!(cache.load().as_deref(), Some("http://backup.example/api"));
        assert!(cache.load_record().updated_at.is_some());

        cache.save("http://primary.example/api");
        assert_eq!(cache.load().as_deref(), Some("http://primary.example/api"));
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("endpoint.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = EndpointCache::new(&path);
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn empty_endpoint_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("endpoint.json");
        std::fs::write(&path, r#"{"last_working_endpoint": ""}"#).unwrap();

        assert_eq!(EndpointCache::new(&path).load(), None);
    }
}
