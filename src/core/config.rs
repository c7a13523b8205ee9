//! Builder and reader tuning
//!
//! Both structs deserialize from TOML with every field optional:
//!
//! ```toml
//! leaf_max_bytes = 65536
//! leaf_max_entries = 4096
//! compression = "zstd"
//! ```

use crate::cache::NodeCache;
use crate::compression::CompressionMethod;
use crate::error::{DictError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Default uncompressed size bound for leaves and internal nodes (64 KiB)
pub const DEFAULT_NODE_BYTES: usize = 64 * 1024;

/// Default record count bound per node
pub const DEFAULT_NODE_ENTRIES: usize = 4096;

/// Default number of decoded nodes kept by a reader
pub const DEFAULT_CACHE_NODES: usize = 256;

/// Default bound on decoded node bytes kept by a reader (16 MiB)
pub const DEFAULT_CACHE_BYTES: usize = 16 * 1024 * 1024;

/// Tree packing and output options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// A leaf is closed before its encoded records would exceed this size
    pub leaf_max_bytes: usize,

    /// A leaf is closed once it holds this many entries
    pub leaf_max_entries: usize,

    /// Same bound for internal nodes
    pub internal_max_bytes: usize,

    /// Maximum fan-out of internal nodes (at least 2)
    pub internal_max_entries: usize,

    /// Compression applied to every node
    pub compression: CompressionMethod,

    /// Replace an existing file at the destination
    pub overwrite: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            leaf_max_bytes: DEFAULT_NODE_BYTES,
            leaf_max_entries: DEFAULT_NODE_ENTRIES,
            internal_max_bytes: DEFAULT_NODE_BYTES,
            internal_max_entries: DEFAULT_NODE_ENTRIES,
            compression: CompressionMethod::default(),
            overwrite: false,
        }
    }
}

impl BuildConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: BuildConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    /// Bound leaves by entry count only
    pub fn with_leaf_entries(mut self, entries: usize) -> Self {
        self.leaf_max_entries = entries;
        self
    }

    /// Bound internal nodes by fan-out only
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.internal_max_entries = fan_out;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.leaf_max_bytes == 0 || self.internal_max_bytes == 0 {
            return Err(DictError::InvalidConfig(
                "node byte limits must be positive".to_string(),
            ));
        }
        if self.leaf_max_entries == 0 {
            return Err(DictError::InvalidConfig(
                "leaf_max_entries must be positive".to_string(),
            ));
        }
        if self.internal_max_entries < 2 {
            return Err(DictError::InvalidConfig(format!(
                "internal_max_entries must be at least 2, got {}",
                self.internal_max_entries
            )));
        }
        Ok(())
    }
}

/// Query-side options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Decoded nodes kept in the LRU cache; 0 disables caching
    pub cache_nodes: usize,

    /// Summed decoded size of cached nodes; 0 disables caching
    pub cache_bytes: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            cache_nodes: DEFAULT_CACHE_NODES,
            cache_bytes: DEFAULT_CACHE_BYTES,
        }
    }
}

impl ReaderConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// No caching: every node access goes to the file
    pub fn uncached() -> Self {
        ReaderConfig {
            cache_nodes: 0,
            cache_bytes: 0,
        }
    }

    pub fn with_cache(mut self, nodes: usize, bytes: usize) -> Self {
        self.cache_nodes = nodes;
        self.cache_bytes = bytes;
        self
    }

    /// Cache described by this config; `None` when caching is disabled
    pub fn node_cache(&self) -> Option<Arc<NodeCache>> {
        NodeCache::shared(self.cache_nodes, self.cache_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.leaf_max_bytes, 64 * 1024);
        assert_eq!(config.compression, CompressionMethod::Deflate);
        assert!(!config.overwrite);
        assert!(config.validate().is_ok());
        assert_eq!(ReaderConfig::default().cache_nodes, DEFAULT_CACHE_NODES);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = BuildConfig::from_toml_str(
            r#"
            leaf_max_entries = 16
            compression = "lz4"
            "#,
        )
        .unwrap();
        assert_eq!(config.leaf_max_entries, 16);
        assert_eq!(config.compression, CompressionMethod::Lz4);
        assert_eq!(config.internal_max_bytes, DEFAULT_NODE_BYTES);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(matches!(
            BuildConfig::from_toml_str("internal_max_entries = 1"),
            Err(DictError::InvalidConfig(_))
        ));
        assert!(matches!(
            BuildConfig::from_toml_str("compression = \"brotli\""),
            Err(DictError::Config(_))
        ));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.toml");
        std::fs::write(&path, "leaf_max_bytes = 4096\noverwrite = true\n").unwrap();

        let config = BuildConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.leaf_max_bytes, 4096);
        assert!(config.overwrite);
    }

    #[test]
    fn test_reader_config_toml() {
        assert_eq!(
            ReaderConfig::from_toml_str("cache_nodes = 8").unwrap().cache_nodes,
            8
        );
        assert_eq!(ReaderConfig::uncached().cache_nodes, 0);

        let config = ReaderConfig::from_toml_str("cache_bytes = 4096").unwrap();
        assert_eq!(config.cache_bytes, 4096);
        assert_eq!(config.cache_nodes, DEFAULT_CACHE_NODES);
    }

    #[test]
    fn test_reader_config_builds_cache() {
        let cache = ReaderConfig::default().with_cache(8, 1024).node_cache().unwrap();
        assert_eq!(cache.max_bytes(), 1024);
        assert!(ReaderConfig::uncached().node_cache().is_none());
        assert!(ReaderConfig::default().with_cache(8, 0).node_cache().is_none());
    }
}
