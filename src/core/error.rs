use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DictError {
    #[error("Corrupt data at byte {offset}: {reason}")]
    CorruptData { offset: u64, reason: String },

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u16),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u8),

    #[error("Unsorted input: {key:?} follows {previous:?}")]
    UnsortedInput { previous: Vec<u8>, key: Vec<u8> },

    #[error("Duplicate key: {key:?}")]
    DuplicateKey { key: Vec<u8> },

    #[error("Layout mismatch: {0}")]
    LayoutMismatch(String),

    #[error("Destination exists: {0}")]
    DestinationExists(PathBuf),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Staging store error: {0}")]
    Staging(#[from] rusqlite::Error),
}

impl DictError {
    /// Shorthand for a [`DictError::CorruptData`] at `offset`.
    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        DictError::CorruptData {
            offset,
            reason: reason.into(),
        }
    }

    /// True for errors raised because stored bytes could not be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, DictError::CorruptData { .. })
    }
}

pub type Result<T> = std::result::Result<T, DictError>;
