use crate::compression::CompressionMethod;
use crate::error::{DictError, Result};
use serde::{Deserialize, Serialize};

/// Current container format version
pub const SPEC_VERSION: u16 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 4;

/// Size of the metadata length prefix that follows the header
pub const METADATA_LENGTH_SIZE: usize = 4;

/// Size of one serialized root pointer (`offset u64 | length u32`)
pub const ROOT_POINTER_SIZE: usize = 12;

/// Trailer layout of a container
///
/// Both layouts share the same node region, codec, builder and reader; they
/// only differ in how many root pointers sit at the end of the file.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrailerLayout {
    /// One tree: the entry root at `file_size - 12`
    Single = 1,
    /// Two trees: entry root at `file_size - 24`, token root at `file_size - 12`
    #[default]
    Dual = 2,
}

impl TrailerLayout {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(TrailerLayout::Single),
            2 => Some(TrailerLayout::Dual),
            _ => None,
        }
    }

    /// Number of root pointers stored in the trailer
    pub fn root_count(&self) -> usize {
        match self {
            TrailerLayout::Single => 1,
            TrailerLayout::Dual => 2,
        }
    }

    /// Trailer size in bytes
    pub fn trailer_size(&self) -> usize {
        self.root_count() * ROOT_POINTER_SIZE
    }
}

/// Container header (first four bytes of every file)
///
/// ```text
/// ┌──────────────────┬────────────┬─────────────────┐
/// │ spec_version u16 │ layout u8  │ compression u8  │
/// └──────────────────┴────────────┴─────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version, always [`SPEC_VERSION`] for files this crate writes
    pub spec_version: u16,

    /// Number and position of root pointers in the trailer
    pub layout: TrailerLayout,

    /// Compression applied to every node in the node region
    pub compression: CompressionMethod,
}

impl Header {
    pub fn new(layout: TrailerLayout, compression: CompressionMethod) -> Self {
        Header {
            spec_version: SPEC_VERSION,
            layout,
            compression,
        }
    }

    /// Validate the format version
    pub fn validate(&self) -> Result<()> {
        if self.spec_version != SPEC_VERSION {
            return Err(DictError::UnsupportedVersion(self.spec_version));
        }
        Ok(())
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..2].copy_from_slice(&self.spec_version.to_le_bytes());
        bytes[2] = self.layout as u8;
        bytes[3] = self.compression as u8;
        bytes
    }

    /// Deserialize and validate a header
    ///
    /// The version is checked before anything else so files written by a
    /// future format are reported as such rather than as corrupt.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(DictError::corrupt(
                0,
                format!("header needs {} bytes, got {}", HEADER_SIZE, bytes.len()),
            ));
        }

        let spec_version = u16::from_le_bytes([bytes[0], bytes[1]]);
        if spec_version != SPEC_VERSION {
            return Err(DictError::UnsupportedVersion(spec_version));
        }

        let layout = TrailerLayout::from_u8(bytes[2])
            .ok_or_else(|| DictError::corrupt(2, format!("unknown trailer layout {}", bytes[2])))?;

        let compression = CompressionMethod::from_u8(bytes[3])
            .ok_or(DictError::UnsupportedCompression(bytes[3]))?;

        Ok(Header {
            spec_version,
            layout,
            compression,
        })
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(TrailerLayout::default(), CompressionMethod::default())
    }
}
