//! Container files: header, metadata, node region and trailer
//!
//! ```text
//! offset 0     spec_version u16 | layout u8 | compression u8
//! offset 4     metadata_length u32
//! offset 8     metadata JSON
//! ...          node region
//! EOF - 12/24  root pointer(s): entries first, then tokens
//! ```
//!
//! Files are written once into a temporary file beside the destination and
//! renamed into place, so a reader never observes a partial container.

use crate::cache::{CacheId, CacheStats, NodeCache};
use crate::codec::{NodePtr, POINTER_SIZE};
use crate::compression::CompressionMethod;
use crate::config::{BuildConfig, ReaderConfig};
use crate::error::{DictError, Result};
use crate::header::{Header, TrailerLayout, HEADER_SIZE, METADATA_LENGTH_SIZE};
use crate::io::{NodeReader, NodeSource, NodeWriter};
use crate::metadata::{decode_metadata, encode_metadata, Metadata};
use crate::tree::{TreeBuilder, TreeReader, TreeStats};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Outcome of writing a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub layout: TrailerLayout,
    pub compression: CompressionMethod,
    pub entries: TreeStats,
    /// Present for the dual layout only
    pub tokens: Option<TreeStats>,
    /// Nodes in the region, both trees included
    pub nodes: u64,
    pub file_size: u64,
}

/// Writes a container into any sink
///
/// Trees may be written in either order. A tree that is never written is
/// stored as an empty leaf.
pub struct ContainerEncoder<W: Write> {
    header: Header,
    config: BuildConfig,
    region_start: u64,
    writer: NodeWriter<W>,
    entries: Option<(NodePtr, TreeStats)>,
    tokens: Option<(NodePtr, TreeStats)>,
}

impl<W: Write> ContainerEncoder<W> {
    /// Write header and metadata, leaving the sink at the node region
    pub fn new(
        mut sink: W,
        layout: TrailerLayout,
        metadata: &Metadata,
        config: &BuildConfig,
    ) -> Result<Self> {
        config.validate()?;
        metadata.validate()?;

        let header = Header::new(layout, config.compression);
        let meta = encode_metadata(metadata)?;
        let meta_len = u32::try_from(meta.len()).map_err(|_| {
            DictError::InvalidMetadata(format!("metadata of {} bytes exceeds u32", meta.len()))
        })?;

        sink.write_all(&header.to_bytes())?;
        sink.write_all(&meta_len.to_le_bytes())?;
        sink.write_all(&meta)?;

        let region_start = (HEADER_SIZE + METADATA_LENGTH_SIZE + meta.len()) as u64;
        let writer = NodeWriter::new(sink, region_start, config.compression)?;

        Ok(ContainerEncoder {
            header,
            config: config.clone(),
            region_start,
            writer,
            entries: None,
            tokens: None,
        })
    }

    pub fn layout(&self) -> TrailerLayout {
        self.header.layout
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build the entry tree from sorted entries
    pub fn write_entries<I, K, V>(&mut self, entries: I) -> Result<TreeStats>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let mut builder = TreeBuilder::new(&self.config)?;
        for (key, value) in entries {
            builder.push(key, value)?;
        }
        self.write_entry_tree(builder)
    }

    /// Write an entry tree assembled by the caller
    pub fn write_entry_tree(&mut self, builder: TreeBuilder) -> Result<TreeStats> {
        if self.entries.is_some() {
            return Err(DictError::InvalidInput("entry tree already written".to_string()));
        }
        let (root, stats) = builder.finish(&mut self.writer)?;
        debug!("Entry tree root at {} ({} entries)", root.offset, stats.entries);
        self.entries = Some((root, stats));
        Ok(stats)
    }

    /// Build the token tree; the dual layout only
    pub fn write_tokens<I, K, V>(&mut self, tokens: I) -> Result<TreeStats>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        self.require_dual()?;
        let mut builder = TreeBuilder::new(&self.config)?;
        for (key, value) in tokens {
            builder.push(key, value)?;
        }
        self.write_token_tree(builder)
    }

    pub fn write_token_tree(&mut self, builder: TreeBuilder) -> Result<TreeStats> {
        self.require_dual()?;
        if self.tokens.is_some() {
            return Err(DictError::InvalidInput("token tree already written".to_string()));
        }
        let (root, stats) = builder.finish(&mut self.writer)?;
        debug!("Token tree root at {} ({} tokens)", root.offset, stats.entries);
        self.tokens = Some((root, stats));
        Ok(stats)
    }

    fn require_dual(&self) -> Result<()> {
        match self.header.layout {
            TrailerLayout::Dual => Ok(()),
            TrailerLayout::Single => Err(DictError::LayoutMismatch(
                "single-root container has no token tree".to_string(),
            )),
        }
    }

    fn take_or_empty(&mut self, tree: Option<(NodePtr, TreeStats)>) -> Result<(NodePtr, TreeStats)> {
        match tree {
            Some(tree) => Ok(tree),
            None => TreeBuilder::new(&self.config)?.finish(&mut self.writer),
        }
    }

    /// Close the node region and append the trailer
    pub fn finish(mut self) -> Result<(W, ContainerSummary)> {
        let entries = self.entries.take();
        let entries = self.take_or_empty(entries)?;
        let tokens = match self.header.layout {
            TrailerLayout::Dual => {
                let tokens = self.tokens.take();
                Some(self.take_or_empty(tokens)?)
            }
            TrailerLayout::Single => None,
        };

        let nodes = self.writer.nodes_written();
        let (mut sink, region_len) = self.writer.finalize()?;
        sink.write_all(&entries.0.to_bytes())?;
        if let Some((root, _)) = &tokens {
            sink.write_all(&root.to_bytes())?;
        }
        sink.flush()?;

        let summary = ContainerSummary {
            layout: self.header.layout,
            compression: self.header.compression,
            entries: entries.1,
            tokens: tokens.map(|(_, stats)| stats),
            nodes,
            file_size: self.region_start
                + region_len
                + self.header.layout.trailer_size() as u64,
        };
        Ok((sink, summary))
    }
}

/// Build a container holding only entries, in memory
pub fn build_to_vec<I, K, V>(
    layout: TrailerLayout,
    metadata: &Metadata,
    config: &BuildConfig,
    entries: I,
) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    let mut encoder = ContainerEncoder::new(Vec::new(), layout, metadata, config)?;
    encoder.write_entries(entries)?;
    let (bytes, _) = encoder.finish()?;
    Ok(bytes)
}

/// Writes a container file atomically
///
/// Output goes to a temporary file in the destination directory. Nothing is
/// visible at the destination until [`finish`](Self::finish) renames it into
/// place; dropping the writer earlier removes the temporary file.
pub struct ContainerWriter {
    path: PathBuf,
    overwrite: bool,
    encoder: ContainerEncoder<BufWriter<NamedTempFile>>,
}

impl ContainerWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        layout: TrailerLayout,
        metadata: &Metadata,
        config: &BuildConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Creating {:?} container at {:?}", layout, path);

        if !config.overwrite && path.exists() {
            return Err(DictError::DestinationExists(path));
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)?;
        debug!("Staging container in {:?}", temp.path());

        let encoder = ContainerEncoder::new(BufWriter::new(temp), layout, metadata, config)?;
        Ok(ContainerWriter {
            path,
            overwrite: config.overwrite,
            encoder,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> TrailerLayout {
        self.encoder.layout()
    }

    pub fn write_entries<I, K, V>(&mut self, entries: I) -> Result<TreeStats>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        self.encoder.write_entries(entries)
    }

    pub fn write_entry_tree(&mut self, builder: TreeBuilder) -> Result<TreeStats> {
        self.encoder.write_entry_tree(builder)
    }

    pub fn write_tokens<I, K, V>(&mut self, tokens: I) -> Result<TreeStats>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        self.encoder.write_tokens(tokens)
    }

    pub fn write_token_tree(&mut self, builder: TreeBuilder) -> Result<TreeStats> {
        self.encoder.write_token_tree(builder)
    }

    /// Write the trailer, sync, and publish the file
    pub fn finish(self) -> Result<ContainerSummary> {
        let (buffered, summary) = self.encoder.finish()?;
        let temp = buffered
            .into_inner()
            .map_err(|e| DictError::Io(e.into_error()))?;
        temp.as_file().sync_all()?;

        if self.overwrite {
            temp.persist(&self.path).map_err(|e| DictError::Io(e.error))?;
        } else {
            temp.persist_noclobber(&self.path).map_err(|e| {
                if e.error.kind() == io::ErrorKind::AlreadyExists {
                    DictError::DestinationExists(self.path.clone())
                } else {
                    DictError::Io(e.error)
                }
            })?;
        }

        info!(
            "Published {:?} ({} entries, {} nodes, {} bytes)",
            self.path, summary.entries.entries, summary.nodes, summary.file_size
        );
        Ok(summary)
    }
}

/// An opened, read-only container
pub struct Container<S> {
    header: Header,
    metadata: Metadata,
    nodes: NodeReader<S>,
    entries_root: NodePtr,
    tokens_root: Option<NodePtr>,
    file_size: u64,
}

impl<S: NodeSource> fmt::Debug for Container<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("header", &self.header)
            .field("entries_root", &self.entries_root)
            .field("tokens_root", &self.tokens_root)
            .field("region", &self.nodes.region())
            .field("file_size", &self.file_size)
            .finish()
    }
}

fn read_at<S: NodeSource>(source: &S, offset: u64, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    source
        .read_exact_at(&mut buf, offset)
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                DictError::corrupt(offset, format!("{} truncated", what))
            }
            _ => DictError::Io(e),
        })?;
    Ok(buf)
}

impl Container<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ReaderConfig::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Self> {
        info!("Opening container at {:?}", path.as_ref());
        Self::from_source(File::open(path)?, config)
    }

    /// Open a container whose nodes are cached in `cache` under `cache_id`
    pub fn open_shared<P: AsRef<Path>>(
        path: P,
        cache: Option<Arc<NodeCache>>,
        cache_id: CacheId,
    ) -> Result<Self> {
        info!("Opening container at {:?} (cache id {})", path.as_ref(), cache_id);
        Self::from_shared(File::open(path)?, cache, cache_id)
    }
}

impl Container<memmap2::Mmap> {
    /// Open a memory-mapped container
    pub fn open_mmap<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Self> {
        info!("Mapping container at {:?}", path.as_ref());
        let file = File::open(path)?;
        // SAFETY: containers are immutable once published; a file replaced by
        // rename keeps the mapped inode alive.
        let map = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_source(map, config)
    }
}

impl<S: NodeSource> Container<S> {
    /// Parse header, metadata and trailer from any positional source
    pub fn from_source(source: S, config: &ReaderConfig) -> Result<Self> {
        Self::from_shared(source, config.node_cache(), 0)
    }

    /// Same as [`Container::from_source`] with a cache shared among readers
    pub fn from_shared(source: S, cache: Option<Arc<NodeCache>>, cache_id: CacheId) -> Result<Self> {
        let file_size = source.size()?;

        let header = Header::from_bytes(&read_at(
            &source,
            0,
            HEADER_SIZE.min(file_size as usize),
            "header",
        )?)?;

        let meta_len_bytes = read_at(&source, HEADER_SIZE as u64, METADATA_LENGTH_SIZE, "metadata length")?;
        let meta_len = u32::from_le_bytes([
            meta_len_bytes[0],
            meta_len_bytes[1],
            meta_len_bytes[2],
            meta_len_bytes[3],
        ]) as u64;

        let meta_offset = (HEADER_SIZE + METADATA_LENGTH_SIZE) as u64;
        let region_start = meta_offset + meta_len;
        let trailer_size = header.layout.trailer_size() as u64;
        if region_start + trailer_size > file_size {
            return Err(DictError::corrupt(
                HEADER_SIZE as u64,
                format!(
                    "metadata length {} leaves no room for a {}-byte trailer in {} bytes",
                    meta_len, trailer_size, file_size
                ),
            ));
        }

        let metadata = decode_metadata(
            &read_at(&source, meta_offset, meta_len as usize, "metadata")?,
            meta_offset,
        )?;

        let region_end = file_size - trailer_size;
        let trailer = read_at(&source, region_end, trailer_size as usize, "trailer")?;
        let mut roots = trailer.chunks_exact(POINTER_SIZE).map(|chunk| {
            let mut bytes = [0u8; POINTER_SIZE];
            bytes.copy_from_slice(chunk);
            NodePtr::from_bytes(&bytes)
        });
        let entries_root = roots
            .next()
            .ok_or_else(|| DictError::corrupt(region_end, "missing entry root"))?;
        let tokens_root = match header.layout {
            TrailerLayout::Dual => Some(
                roots
                    .next()
                    .ok_or_else(|| DictError::corrupt(region_end, "missing token root"))?,
            ),
            TrailerLayout::Single => None,
        };

        let region: Range<u64> = region_start..region_end;
        let nodes = NodeReader::with_cache(source, header.compression, region, cache, cache_id);
        nodes.check_pointer(entries_root)?;
        if let Some(root) = tokens_root {
            nodes.check_pointer(root)?;
        }

        debug!(
            "Container: {:?} layout, {:?} compression, region {}..{}",
            header.layout, header.compression, region_start, region_end
        );
        Ok(Container {
            header,
            metadata,
            nodes,
            entries_root,
            tokens_root,
            file_size,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn layout(&self) -> TrailerLayout {
        self.header.layout
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Byte range of the node region
    pub fn region(&self) -> Range<u64> {
        self.nodes.region()
    }

    pub fn entries(&self) -> TreeReader<'_, S> {
        TreeReader::new(&self.nodes, self.entries_root)
    }

    /// Token tree; `None` for the single layout
    pub fn tokens(&self) -> Option<TreeReader<'_, S>> {
        self.tokens_root
            .map(|root| TreeReader::new(&self.nodes, root))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.nodes.cache_stats()
    }

    /// Node cache, possibly shared with other containers
    pub fn cache(&self) -> Option<&Arc<NodeCache>> {
        self.nodes.cache()
    }

    pub fn cache_id(&self) -> CacheId {
        self.nodes.cache_id()
    }
}
