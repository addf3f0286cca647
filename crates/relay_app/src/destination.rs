//! Per-user destination preferences persisted as a RON map.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use relay_engine::AtomicFileWriter;
use relay_logging::{relay_info, relay_warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STORE: &str = "./.linkrelay_destinations.ron";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub sink_id: String,
    pub sink_name: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

type Records = BTreeMap<String, DestinationRecord>;

/// Every save re-reads the whole file and rewrites it atomically.
pub struct DestinationStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DestinationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `None` means the caller's default sink applies.
    pub fn get(&self, user: &str) -> Option<DestinationRecord> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load().remove(user)
    }

    pub fn save(
        &self,
        user: &str,
        sink_id: &str,
        sink_name: &str,
    ) -> anyhow::Result<DestinationRecord> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.load();
        let record = DestinationRecord {
            sink_id: sink_id.to_string(),
            sink_name: sink_name.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        records.insert(user.to_string(), record.clone());
        self.store(&records)?;
        relay_info!("Destination for {user} set to {sink_name} ({sink_id})");
        Ok(record)
    }

    /// Returns whether a record was removed.
    pub fn clear(&self, user: &str) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.load();
        if records.remove(user).is_none() {
            return Ok(false);
        }
        self.store(&records)?;
        relay_info!("Destination for {user} cleared");
        Ok(true)
    }

    fn load(&self) -> Records {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Records::new(),
            Err(err) => {
                relay_warn!("Failed to read destinations from {:?}: {}", self.path, err);
                return Records::new();
            }
        };
        match ron::from_str(&content) {
            Ok(records) => records,
            Err(err) => {
                relay_warn!("Failed to parse destinations from {:?}: {}", self.path, err);
                Records::new()
            }
        }
    }

    fn store(&self, records: &Records) -> anyhow::Result<()> {
        let content = ron::ser::to_string_pretty(records, ron::ser::PrettyConfig::new())
            .context("serializing destinations")?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self
            .path
            .file_name()
            .with_context(|| format!("{} has no file name", self.path.display()))?
            .to_string_lossy()
            .into_owned();
        AtomicFileWriter::new(dir)
            .write(&file_name, content.as_bytes())
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_store_has_no_preference() {
        let temp = TempDir::new().unwrap();
        let store = DestinationStore::new(temp.path().join("dest.ron"));
        assert_eq!(store.get("alice"), None);
        assert!(!store.clear("alice").unwrap());
    }

    #[test]
    fn save_keeps_other_users() {
        let temp = TempDir::new().unwrap();
        let store = DestinationStore::new(temp.path().join("dest.ron"));
        store.save("alice", "/srv/a", "Archive").unwrap();
        let saved = store.save("bob", "/srv/b", "Backup").unwrap();

        let reopened = DestinationStore::new(temp.path().join("dest.ron"));
        assert_eq!(reopened.get("alice").unwrap().sink_name, "Archive");
        assert_eq!(reopened.get("bob"), Some(saved.clone()));
        assert!(chrono::DateTime::parse_from_rfc3339(&saved.timestamp).is_ok());

        assert!(reopened.clear("alice").unwrap());
        assert_eq!(reopened.get("alice"), None);
        assert_eq!(reopened.get("bob"), Some(saved));
    }

    #[test]
    fn corrupt_store_reads_as_empty_and_is_replaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dest.ron");
        fs::write(&path, "{{ not ron").unwrap();
        let store = DestinationStore::new(&path);
        assert_eq!(store.get("alice"), None);
        store.save("alice", "/srv/a", "Archive").unwrap();
        assert_eq!(store.get("alice").unwrap().sink_id, "/srv/a");
    }
}
