// Media cache: a flat JSON object on disk mapping absolute local file paths
// to the identifier the platform returned for them. Loaded lazily, written
// back whole after every insert or removal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PublishError, Result};

/// Persistent path -> identifier store.
#[derive(Debug)]
pub struct MediaCache {
    path: PathBuf,
    entries: Option<BTreeMap<String, String>>,
}

impl MediaCache {
    /// A cache backed by `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MediaCache {
            path: path.into(),
            entries: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up an identifier by key.
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.loaded()?.get(key).cloned())
    }

    /// Insert or replace an entry and write the whole store to disk.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.loaded()?.insert(key.into(), value.into());
        self.save()
    }

    /// Forget one entry. Returns the removed value.
    pub fn remove(&mut self, key: &str) -> Result<Option<String>> {
        let removed = self.loaded()?.remove(key);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    /// Forget every entry.
    pub fn clear(&mut self) -> Result<()> {
        self.entries = Some(BTreeMap::new());
        self.save()
    }

    /// Snapshot of all entries, ordered by key.
    pub fn entries(&mut self) -> Result<Vec<(String, String)>> {
        Ok(self
            .loaded()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Discard the in-memory copy and read the file again.
    pub fn reload(&mut self) -> Result<()> {
        self.entries = Some(read_store(&self.path)?);
        Ok(())
    }

    fn loaded(&mut self) -> Result<&mut BTreeMap<String, String>> {
        let entries = match self.entries.take() {
            Some(entries) => entries,
            None => read_store(&self.path)?,
        };
        Ok(self.entries.insert(entries))
    }

    fn save(&self) -> Result<()> {
        let empty = BTreeMap::new();
        let entries = self.entries.as_ref().unwrap_or(&empty);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PublishError::io(format!("failed to create cache dir {}", parent.display()), e)
                })?;
            }
        }
        let data = serde_json::to_string_pretty(entries)
            .map_err(|e| PublishError::protocol(format!("failed to encode media cache: {e}")))?;
        std::fs::write(&self.path, data).map_err(|e| {
            PublishError::io(format!("failed to write media cache {}", self.path.display()), e)
        })?;
        debug!(path = %self.path.display(), entries = entries.len(), "media cache saved");
        Ok(())
    }
}

/// Missing file means an empty cache; a file that is not a JSON object of
/// strings is an error rather than something to overwrite.
fn read_store(path: &Path) -> Result<BTreeMap<String, String>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no media cache yet");
            return Ok(BTreeMap::new());
        }
        Err(e) => {
            return Err(PublishError::io(
                format!("failed to read media cache {}", path.display()),
                e,
            ))
        }
    };
    let entries: BTreeMap<String, String> = serde_json::from_str(&data).map_err(|e| {
        PublishError::protocol(format!("media cache {} is malformed: {e}", path.display()))
    })?;
    info!(path = %path.display(), entries = entries.len(), "media cache loaded");
    Ok(entries)
}
