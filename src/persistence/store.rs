use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Durable key/value storage for small JSON documents
pub trait StateStore: Send + Sync {
    fn save(&self, key: &str, value: &Value) -> PersistenceResult<()>;

    fn load(&self, key: &str) -> PersistenceResult<Option<Value>>;
}

/// Stores each key as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PersistenceResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.directory.join(format!("{key}.json")))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl StateStore for JsonFileStore {
    /// Write through a temporary file and rename so readers never see a
    /// partial document
    fn save(&self, key: &str, value: &Value) -> PersistenceResult<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.directory).map_err(|e| io_error(&self.directory, e))?;

        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(value)?;
        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
            file.write_all(&bytes).map_err(|e| io_error(&tmp_path, e))?;
            file.sync_all().map_err(|e| io_error(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| io_error(&path, e))?;

        debug!(key = %key, path = %path.display(), "💾 STORE: Saved");
        Ok(())
    }

    fn load(&self, key: &str) -> PersistenceResult<Option<Value>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state"));

        store.save("auto_restart_state", &json!({"reason": "test"})).unwrap();
        let loaded = store.load("auto_restart_state").unwrap().unwrap();
        assert_eq!(loaded["reason"], "test");
        assert!(dir.path().join("state/auto_restart_state.json").exists());
        assert!(!dir.path().join("state/auto_restart_state.json.tmp").exists());
    }

    #[test]
    fn test_missing_key_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("absent").unwrap().is_none());
    }

    #[test]
    fn test_path_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.save("../escape", &json!({})),
            Err(PersistenceError::InvalidKey(_))
        ));
        assert!(store.load("").is_err());
    }
}
