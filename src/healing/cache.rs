//! Persisted selector-repair cache.
//!
//! Maps a selector-group key to the replacement selectors that were proven
//! to work, with confidence bookkeeping so entries that stop working decay
//! and eventually drop out. Lives at `~/.applywright/selector_cache.json`
//! and crosses process restarts; the session-scoped "attempted" set does not
//! (see [`super::SelectorHealer`]).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Failures tolerated before a repair entry is evicted.
const MAX_FAILURES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairEntry {
    pub selectors: Vec<String>,
    /// 0.0–1.0; bumped on success, halved on failure.
    pub confidence: f64,
    pub failures: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    entries: HashMap<String, RepairEntry>,
}

#[derive(Debug)]
pub struct RepairCache {
    path: Option<PathBuf>,
    entries: HashMap<String, RepairEntry>,
}

impl RepairCache {
    /// Load from the standard state directory. Missing or unreadable files
    /// start an empty cache — a corrupt cache must never block extraction.
    pub fn load_default() -> Self {
        let path = crate::core::config::state_dir().map(|d| d.join("selector_cache.json"));
        Self::load(path)
    }

    pub fn load(path: Option<PathBuf>) -> Self {
        let entries = path
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|raw| serde_json::from_str::<CacheFile>(&raw).ok())
            .map(|f| f.entries)
            .unwrap_or_default();
        if !entries.is_empty() {
            info!("Selector repair cache loaded: {} entries", entries.len());
        }
        Self { path, entries }
    }

    /// In-memory cache that never touches disk. Used by tests.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&RepairEntry> {
        self.entries.get(key)
    }

    pub fn record_success(&mut self, key: &str, selectors: Vec<String>) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RepairEntry {
                selectors: Vec::new(),
                confidence: 0.5,
                failures: 0,
                updated_at: Utc::now(),
            });
        entry.selectors = selectors;
        entry.confidence = (entry.confidence + 0.2).min(1.0);
        entry.failures = 0;
        entry.updated_at = Utc::now();
        self.save();
    }

    pub fn record_failure(&mut self, key: &str) {
        let evict = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.failures += 1;
                entry.confidence /= 2.0;
                entry.updated_at = Utc::now();
                entry.failures >= MAX_FAILURES
            }
            None => false,
        };
        if evict {
            info!("Evicting repair entry after {} failures: {}", MAX_FAILURES, key);
            self.entries.remove(key);
        }
        self.save();
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Cannot create cache dir {}: {}", parent.display(), e);
                return;
            }
        }
        let file = CacheFile {
            entries: self.entries.clone(),
        };
        match serde_json::to_string_pretty(&file) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("Cannot write selector cache {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Cannot serialize selector cache: {}", e),
        }
    }
}
