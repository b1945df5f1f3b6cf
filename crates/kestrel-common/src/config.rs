//! Configuration structures for KestrelDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the database file.
    pub db_path: PathBuf,
    /// Buffer pool size in number of frames.
    pub buffer_pool_frames: usize,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./kestrel.db"),
            buffer_pool_frames: 1024,
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_frames * crate::page::PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PAGE_SIZE;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./kestrel.db"));
        assert_eq!(config.buffer_pool_frames, 1024);
        assert!(config.fsync_enabled);
    }

    #[test]
    fn test_buffer_pool_size_bytes() {
        let config = StorageConfig::default();
        assert_eq!(
            config.buffer_pool_size_bytes(),
            config.buffer_pool_frames * PAGE_SIZE
        );

        let config = StorageConfig {
            buffer_pool_frames: 16,
            ..Default::default()
        };
        assert_eq!(config.buffer_pool_size_bytes(), 16 * 4096);
    }

    #[test]
    fn test_storage_config_clone() {
        let config1 = StorageConfig::default();
        let config2 = config1.clone();
        assert_eq!(config1.db_path, config2.db_path);
        assert_eq!(config1.buffer_pool_frames, config2.buffer_pool_frames);
    }

    #[test]
    fn test_storage_config_serde_roundtrip() {
        let original = StorageConfig {
            db_path: PathBuf::from("/var/lib/kestrel/data.db"),
            buffer_pool_frames: 4096,
            fsync_enabled: false,
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.db_path, deserialized.db_path);
        assert_eq!(original.buffer_pool_frames, deserialized.buffer_pool_frames);
        assert_eq!(original.fsync_enabled, deserialized.fsync_enabled);
    }
}
