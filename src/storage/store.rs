use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

use super::models::now_millis;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data directory not found")]
    DataDirNotFound,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Canonical keys of the durable store. One key per collection plus sync
/// metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Users,
    Subjects,
    Chapters,
    Videos,
    Questions,
    Notes,
    LiveClasses,
    Classes,
    UserProgress,
    DeviceId,
    /// Millisecond timestamp of the last local durable write.
    LastUpdate,
    /// Millisecond timestamp of the last completed sync cycle.
    LastSync,
    CurrentUser,
    /// Full-state mirror snapshot shared with peer devices.
    CloudSnapshot,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Users => "users",
            StoreKey::Subjects => "subjects",
            StoreKey::Chapters => "chapters",
            StoreKey::Videos => "videos",
            StoreKey::Questions => "questions",
            StoreKey::Notes => "notes",
            StoreKey::LiveClasses => "live-classes",
            StoreKey::Classes => "classes",
            StoreKey::UserProgress => "user-progress",
            StoreKey::DeviceId => "device-id",
            StoreKey::LastUpdate => "last-update",
            StoreKey::LastSync => "last-sync",
            StoreKey::CurrentUser => "current-user",
            StoreKey::CloudSnapshot => "cloud-snapshot",
        }
    }
}

/// Key-value durable storage scoped to a data directory, one file per key.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|p| p.join("edusync"))
            .ok_or(StorageError::DataDirNotFound)
    }

    /// Initialize the storage directory
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)?;
        Ok(())
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }

    /// Read the raw value for a key. Read failures other than absence are
    /// logged and reported as absence; callers fall back to defaults.
    pub fn get(&self, key: StoreKey) -> Option<String> {
        match fs::read_to_string(self.key_path(key.as_str())) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("Store read failed for key '{}': {}", key.as_str(), e);
                None
            }
        }
    }

    pub fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        fs::create_dir_all(&self.base_path)?;
        fs::write(self.key_path(key.as_str()), value)?;
        Ok(())
    }

    pub fn remove(&self, key: StoreKey) -> Result<()> {
        match fs::remove_file(self.key_path(key.as_str())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every stored key.
    pub fn clear(&self) -> Result<()> {
        if !self.base_path.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Return the persisted device id, generating and storing one on first
    /// run.
    pub fn ensure_device_id(&self) -> Result<String> {
        if let Some(id) = self.get(StoreKey::DeviceId) {
            let id = id.trim().to_string();
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(|c| (c as char).to_ascii_lowercase())
            .collect();
        let id = format!("device-{}-{}", now_millis(), suffix);
        self.set(StoreKey::DeviceId, &id)?;
        log::info!("Generated device id {}", id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        store.init().unwrap();
        (dir, store)
    }

    #[test]
    fn test_set_get_remove() {
        let (_dir, store) = store();
        assert!(store.get(StoreKey::Users).is_none());

        store.set(StoreKey::Users, "[]").unwrap();
        assert_eq!(store.get(StoreKey::Users).as_deref(), Some("[]"));

        store.remove(StoreKey::Users).unwrap();
        assert!(store.get(StoreKey::Users).is_none());

        // Removing an absent key is not an error
        store.remove(StoreKey::Users).unwrap();
    }

    #[test]
    fn test_clear_removes_all_keys() {
        let (_dir, store) = store();
        store.set(StoreKey::Users, "[]").unwrap();
        store.set(StoreKey::Chapters, "[]").unwrap();
        store.clear().unwrap();
        assert!(store.get(StoreKey::Users).is_none());
        assert!(store.get(StoreKey::Chapters).is_none());
    }

    #[test]
    fn test_device_id_is_stable() {
        let (_dir, store) = store();
        let first = store.ensure_device_id().unwrap();
        let second = store.ensure_device_id().unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("device-"));
    }
}
