//! Key/value areas backing the browser store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

/// Key/value storage errors.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage area poisoned")]
    Poisoned,
}

pub type KvResult<T> = Result<T, KvError>;

/// Persistent string entries addressed by key, written wholesale.
pub trait KeyValueArea: Send + Sync {
    fn get(&self, key: &str) -> KvResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> KvResult<()>;
    fn remove(&self, key: &str) -> KvResult<()>;
    fn keys(&self) -> KvResult<Vec<String>>;
}

/// In-process area; contents vanish with the process.
#[derive(Default)]
pub struct MemoryArea {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryArea {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueArea for MemoryArea {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> KvResult<()> {
        let mut entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        let mut entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> KvResult<Vec<String>> {
        let entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}

/// One file per key in a directory.
pub struct DirectoryArea {
    dir: PathBuf,
}

impl DirectoryArea {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueArea for DirectoryArea {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> KvResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.entry_path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn keys(&self) -> KvResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(area: &dyn KeyValueArea) {
        assert_eq!(area.get("user_pacientes").unwrap(), None);

        area.set("user_pacientes", "[]").unwrap();
        assert_eq!(area.get("user_pacientes").unwrap(), Some("[]".to_string()));
        assert_eq!(area.keys().unwrap(), vec!["user_pacientes".to_string()]);

        area.remove("user_pacientes").unwrap();
        assert_eq!(area.get("user_pacientes").unwrap(), None);
        // Removing twice is fine
        area.remove("user_pacientes").unwrap();
    }

    #[test]
    fn test_memory_area() {
        exercise(&MemoryArea::new());
    }

    #[test]
    fn test_directory_area() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&DirectoryArea::new(dir.path().join("web-storage")));
    }
}
