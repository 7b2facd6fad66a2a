use crate::tether::model::RemoteRecord;
use crate::tether::storage::Storage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One link between a remote record and a local folder. The owning map is
/// keyed by folder path, not by record id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub record_id: String,
    pub record_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_status_color: Option<String>,
    /// Epoch milliseconds of the last structural change to this link.
    pub cached_at: u64,
}

impl CacheEntry {
    pub fn from_record(record: &RemoteRecord, cached_at: u64) -> Self {
        Self {
            record_id: record.id.clone(),
            record_title: record.title.clone(),
            record_status: Some(record.effective_status().to_string()),
            record_status_color: Some(record.status_color.clone()),
            cached_at,
        }
    }

    /// Refresh the mutable status fields. Returns whether anything changed.
    pub fn refresh_status(&mut self, status: &str, status_color: &str) -> bool {
        let mut changed = false;
        if self.record_status.as_deref() != Some(status) {
            self.record_status = Some(status.to_string());
            changed = true;
        }
        if self.record_status_color.as_deref() != Some(status_color) {
            self.record_status_color = Some(status_color.to_string());
            changed = true;
        }
        changed
    }
}

/// `record_id -> path` view of a cache. When external edits left several
/// paths pointing at one record, the first path in key order is canonical
/// and the others are listed in `duplicates`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordIndex {
    pub canonical: BTreeMap<String, String>,
    pub duplicates: Vec<String>,
}

/// Sole owner of the folder-path -> [`CacheEntry`] map and its persisted form.
#[derive(Debug, Clone)]
pub struct CacheStore {
    file: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheStore {
    #[cfg(test)]
    pub fn empty(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache file. Missing or unreadable data yields an empty cache.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let entries = match read_entries(&file) {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!(cache = %file.display(), "no link cache yet; starting empty");
                BTreeMap::new()
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(cache = %file.display(), %error, "link cache unreadable; starting empty");
                BTreeMap::new()
            }
        };
        Self { file, entries }
    }

    /// Persist the whole map. The write goes to a sibling temp file that is
    /// renamed over the target, so readers never see a partial document.
    pub fn save(&self) -> Result<()> {
        let parent = self
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let data = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to stage cache in {}", parent.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())
            .context("failed to write staged cache")?;
        tmp.persist(&self.file)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to write {}", self.file.display()))?;
        Ok(())
    }

    /// Drop every entry whose folder no longer exists and persist when
    /// anything was removed.
    pub fn prune(&mut self, storage: &dyn Storage) -> Result<usize> {
        let stale = self
            .entries
            .keys()
            .filter(|path| !storage.exists(path))
            .cloned()
            .collect::<Vec<_>>();
        for path in &stale {
            if let Some(entry) = self.entries.remove(path) {
                info!(path = %path, record_id = %entry.record_id, "pruned stale link");
            }
        }
        if !stale.is_empty() {
            self.save()?;
        }
        Ok(stale.len())
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn entries(&self) -> &BTreeMap<String, CacheEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut CacheEntry> {
        self.entries.get_mut(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(path.into(), entry)
    }

    pub fn remove(&mut self, path: &str) -> Option<CacheEntry> {
        self.entries.remove(path)
    }

    /// Move an entry to a new path key, keeping its record fields and
    /// stamping `cached_at`.
    pub fn rekey(&mut self, from: &str, to: &str, cached_at: u64) -> bool {
        let Some(mut entry) = self.entries.remove(from) else {
            return false;
        };
        entry.cached_at = cached_at;
        self.entries.insert(to.to_string(), entry);
        true
    }

    pub fn record_index(&self) -> RecordIndex {
        let mut index = RecordIndex::default();
        for (path, entry) in &self.entries {
            if index.canonical.contains_key(&entry.record_id) {
                index.duplicates.push(path.clone());
            } else {
                index
                    .canonical
                    .insert(entry.record_id.clone(), path.clone());
            }
        }
        index
    }

    pub fn path_for_record(&self, record_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.record_id == record_id)
            .map(|(path, _)| path.as_str())
    }

    /// Link `record` to `path` explicitly, dropping any other link held by
    /// the same record. Returns the paths whose links were dropped.
    pub fn link(&mut self, path: &str, record: &RemoteRecord, cached_at: u64) -> Vec<String> {
        let dropped = self
            .entries
            .iter()
            .filter(|(p, entry)| entry.record_id == record.id && p.as_str() != path)
            .map(|(p, _)| p.clone())
            .collect::<Vec<_>>();
        for p in &dropped {
            self.entries.remove(p);
        }
        self.entries
            .insert(path.to_string(), CacheEntry::from_record(record, cached_at));
        dropped
    }
}

fn read_entries(file: &Path) -> Result<Option<BTreeMap<String, CacheEntry>>> {
    if !file.exists() {
        return Ok(None);
    }
    let raw =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    if raw.trim().is_empty() {
        return Ok(Some(BTreeMap::new()));
    }
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tether::storage::MemoryStorage;
    use tempfile::tempdir;

    fn entry(id: &str, title: &str) -> CacheEntry {
        CacheEntry {
            record_id: id.to_string(),
            record_title: title.to_string(),
            record_status: Some("Active".to_string()),
            record_status_color: Some("#00ff00".to_string()),
            cached_at: 1,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempdir().expect("tempdir");
        let store = CacheStore::load(tmp.path().join("state/link_cache.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join("link_cache.json");
        fs::write(&file, "{ not json").expect("write");
        let store = CacheStore::load(&file);
        assert!(store.is_empty());
    }

    #[test]
    fn save_then_load_keeps_camel_case_document() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join("state/link_cache.json");
        let mut store = CacheStore::empty(&file);
        store.insert("Acme", entry("42", "Acme"));
        store.save().expect("save");

        let raw = fs::read_to_string(&file).expect("read");
        assert!(raw.contains("\"recordId\": \"42\""));
        assert!(raw.contains("\"cachedAt\": 1"));

        let reloaded = CacheStore::load(&file);
        assert_eq!(reloaded.get("Acme"), Some(&entry("42", "Acme")));
    }

    #[test]
    fn prune_removes_entries_for_missing_folders() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join("link_cache.json");
        let mut store = CacheStore::empty(&file);
        store.insert("Acme", entry("42", "Acme"));
        store.insert("Globex", entry("7", "Globex"));

        let storage = MemoryStorage::with_folders(["Globex"]);
        let removed = store.prune(&storage).expect("prune");

        assert_eq!(removed, 1);
        assert!(store.get("Acme").is_none());
        assert!(store.get("Globex").is_some());
        let reloaded = CacheStore::load(&file);
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn prune_without_changes_does_not_write() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join("link_cache.json");
        let mut store = CacheStore::empty(&file);
        store.insert("Acme", entry("42", "Acme"));

        let storage = MemoryStorage::with_folders(["Acme"]);
        assert_eq!(store.prune(&storage).expect("prune"), 0);
        assert!(!file.exists());
    }

    #[test]
    fn record_index_keeps_first_path_as_canonical() {
        let tmp = tempdir().expect("tempdir");
        let mut store = CacheStore::empty(tmp.path().join("c.json"));
        store.insert("Acme", entry("42", "Acme"));
        store.insert("Acme copy", entry("42", "Acme"));
        store.insert("Globex", entry("7", "Globex"));

        let index = store.record_index();
        assert_eq!(index.canonical.get("42").map(String::as_str), Some("Acme"));
        assert_eq!(index.duplicates, vec!["Acme copy".to_string()]);
    }

    #[test]
    fn rekey_preserves_record_fields() {
        let tmp = tempdir().expect("tempdir");
        let mut store = CacheStore::empty(tmp.path().join("c.json"));
        store.insert("Acme", entry("42", "Acme"));

        assert!(store.rekey("Acme", "_Archive/Acme", 99));
        let moved = store.get("_Archive/Acme").expect("moved");
        assert_eq!(moved.record_id, "42");
        assert_eq!(moved.cached_at, 99);
        assert!(store.get("Acme").is_none());
        assert!(!store.rekey("Acme", "elsewhere", 100));
    }

    #[test]
    fn manual_link_drops_previous_link_for_record() {
        let tmp = tempdir().expect("tempdir");
        let mut store = CacheStore::empty(tmp.path().join("c.json"));
        store.insert("Old Acme", entry("42", "Acme"));

        let record = RemoteRecord::new("42", "Acme", "Active", "#00ff00");
        let dropped = store.link("Acme", &record, 5);

        assert_eq!(dropped, vec!["Old Acme".to_string()]);
        assert_eq!(store.path_for_record("42"), Some("Acme"));
        assert_eq!(store.len(), 1);
    }
}
