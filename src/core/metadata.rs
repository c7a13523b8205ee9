//! Descriptive dictionary metadata
//!
//! Stored as a length-prefixed JSON block right after the header. None of
//! these fields take part in queries; `entry_count` is informational only.

use crate::error::{DictError, Result};
use crate::header::SPEC_VERSION;
use semver::Version;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Format version the file was written with (mirrors the header)
    pub spec_version: u16,

    /// Version of the dictionary content itself
    ///
    /// Empty, or a semantic version such as "2.1.0".
    #[serde(default)]
    pub content_version: String,

    /// Number of entries in the entry tree
    #[serde(default)]
    pub entry_count: u64,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub email: String,

    /// Creation timestamp (RFC 3339)
    #[serde(default)]
    pub create_time: String,

    #[serde(default)]
    pub comment: String,
}

impl Metadata {
    /// Create metadata stamped with the current time
    pub fn new() -> Self {
        Metadata {
            spec_version: SPEC_VERSION,
            content_version: String::new(),
            entry_count: 0,
            author: String::new(),
            email: String::new(),
            create_time: chrono::Utc::now().to_rfc3339(),
            comment: String::new(),
        }
    }

    /// Set content version
    pub fn with_content_version(mut self, version: impl Into<String>) -> Self {
        self.content_version = version.into();
        self
    }

    /// Set author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set contact email
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Set comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Parsed content version, if one is set
    pub fn content_semver(&self) -> Result<Option<Version>> {
        if self.content_version.is_empty() {
            return Ok(None);
        }
        Version::parse(&self.content_version)
            .map(Some)
            .map_err(|e| {
                DictError::InvalidMetadata(format!(
                    "content_version {:?}: {}",
                    self.content_version, e
                ))
            })
    }

    /// Validate fields before a container is written
    pub fn validate(&self) -> Result<()> {
        if self.spec_version != SPEC_VERSION {
            return Err(DictError::InvalidMetadata(format!(
                "spec_version {} does not match format version {}",
                self.spec_version, SPEC_VERSION
            )));
        }
        self.content_semver()?;
        if !self.email.is_empty() && !self.email.contains('@') {
            return Err(DictError::InvalidMetadata(format!(
                "email {:?} is not an address",
                self.email
            )));
        }
        Ok(())
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize metadata to its on-disk JSON form
pub fn encode_metadata(meta: &Metadata) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(meta)?)
}

/// Parse metadata; `offset` locates the block for error reports
pub fn decode_metadata(bytes: &[u8], offset: u64) -> Result<Metadata> {
    serde_json::from_slice(bytes)
        .map_err(|e| DictError::corrupt(offset, format!("metadata: {}", e)))
}
