use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use super::KeyValueStore;
use crate::constants::storage;
use crate::error::{Result, TutorError};

/// Stores each key as `<dir>/<encoded key>.json`.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store under the default data directory (~/.local/share/tutorly/chat_store/)
    pub fn new() -> Result<Self> {
        let base_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| {
                TutorError::Configuration("Could not determine data directory".to_string())
            })?
            .join(storage::CONFIG_DIR)
            .join(storage::STORE_DIR);
        Self::with_dir(base_dir)
    }

    /// Create a store with a custom directory (useful for testing)
    pub fn with_dir(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            TutorError::persistence(format!("Failed to create store directory: {}", e))
        })?;

        Ok(Self { base_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.base_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Reversible file-name encoding: ASCII alphanumerics and `-` pass through,
/// every other byte becomes `_XX` (uppercase hex), so distinct keys never
/// share a file. `tutor_chat:lesson:42` becomes `tutor_5Fchat_3Alesson_3A42`.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "_{:02X}", byte);
        }
    }
    encoded
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        fs::read_to_string(&path).map(Some).map_err(|e| {
            TutorError::persistence(format!("Failed to read {}: {}", path.display(), e))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key);
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, value).map_err(|e| {
            TutorError::persistence(format!("Failed to write temporary entry file: {}", e))
        })?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            TutorError::persistence(format!("Failed to rename entry file: {}", e))
        })?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                TutorError::persistence(format!("Failed to delete entry file: {}", e))
            })?;
        }
        Ok(())
    }
}
