//! Storage engine internals
//!
//! Leaf-first: [`codec`], [`header`] and [`metadata`] fix the byte layouts,
//! [`compression`] and [`io`] store nodes, [`tree`] builds and queries the
//! B+ tree, and [`container`] ties trees into a single file.

pub mod cache;
pub mod codec;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod header;
pub mod io;
pub mod metadata;
pub mod raw;
pub mod token;
pub mod tree;

pub use cache::{CacheId, CacheStats, NodeCache};
pub use codec::{decode_node, encode_node, Node, NodePtr};
pub use compression::CompressionMethod;
pub use config::{BuildConfig, ReaderConfig};
pub use container::{build_to_vec, Container, ContainerEncoder, ContainerSummary, ContainerWriter};
pub use error::{DictError, Result};
pub use header::{Header, TrailerLayout, SPEC_VERSION};
pub use io::{NodeReader, NodeSource, NodeWriter};
pub use metadata::Metadata;
pub use raw::{RawKind, RawStore};
pub use token::{decode_postings, encode_postings};
pub use tree::{build_tree, Scan, TreeBuilder, TreeReader, TreeStats};
