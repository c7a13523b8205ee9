//! Node store: append-only node writer and positional node reader

use crate::cache::{CacheId, CacheStats, NodeCache};
use crate::codec::{decode_node, encode_node, Node, NodePtr};
use crate::compression::{compress, decompress, CompressionMethod};
use crate::config::DEFAULT_CACHE_BYTES;
use crate::error::{DictError, Result};
use std::fs::File;
use std::io::{self, Write};
use std::ops::Range;
use std::sync::Arc;
use tracing::trace;

/// Positional read access to container bytes
///
/// Implementations must not depend on a shared cursor, so one source can
/// serve any number of concurrent readers.
pub trait NodeSource {
    /// Fill `buf` with the bytes starting at `offset`
    ///
    /// Must fail with [`io::ErrorKind::UnexpectedEof`] when the range cannot
    /// be satisfied in full.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Total number of bytes available
    fn size(&self) -> io::Result<u64>;
}

#[cfg(unix)]
impl NodeSource for File {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

#[cfg(windows)]
impl NodeSource for File {
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.seek_read(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl NodeSource for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset).ok();
        let range = start
            .and_then(|start| Some(start..start.checked_add(buf.len())?))
            .filter(|range| range.end <= self.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("read of {} bytes at {} past end", buf.len(), offset),
                )
            })?;
        buf.copy_from_slice(&self[range]);
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl NodeSource for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.as_slice().read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl NodeSource for memmap2::Mmap {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<T: NodeSource + ?Sized> NodeSource for &T {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }
}

impl<T: NodeSource + ?Sized> NodeSource for Arc<T> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }
}

/// Append-only writer for the node region
///
/// Each appended node is compressed and written at the current cursor; the
/// returned pointer is the only way to address it later. Consuming the
/// writer with [`finalize`](Self::finalize) closes the region.
pub struct NodeWriter<W: Write> {
    sink: W,
    start: u64,
    position: u64,
    method: CompressionMethod,
    nodes: u64,
}

impl<W: Write> NodeWriter<W> {
    /// Start a region at absolute file offset `start`
    ///
    /// `start` must be positive: offset 0 is reserved for the end-of-chain
    /// sentinel.
    pub fn new(sink: W, start: u64, method: CompressionMethod) -> Result<Self> {
        if start == 0 {
            return Err(DictError::InvalidInput(
                "node region cannot start at offset 0".to_string(),
            ));
        }
        Ok(NodeWriter {
            sink,
            start,
            position: start,
            method,
            nodes: 0,
        })
    }

    /// Compress and write serialized node bytes
    pub fn append(&mut self, serialized: &[u8]) -> Result<NodePtr> {
        let compressed = compress(serialized, self.method)?;
        let length = u32::try_from(compressed.len()).map_err(|_| {
            DictError::InvalidInput(format!(
                "compressed node of {} bytes exceeds u32",
                compressed.len()
            ))
        })?;

        self.sink.write_all(&compressed)?;

        let ptr = NodePtr::new(self.position, length);
        self.position += length as u64;
        self.nodes += 1;

        trace!(
            offset = ptr.offset,
            length = ptr.length,
            raw = serialized.len(),
            "appended node"
        );
        Ok(ptr)
    }

    /// Encode and append a node
    pub fn append_node(&mut self, node: &Node) -> Result<NodePtr> {
        self.append(&encode_node(node)?)
    }

    /// Absolute offset of the next node
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn nodes_written(&self) -> u64 {
        self.nodes
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Flush and close the region, returning the sink and region length
    pub fn finalize(mut self) -> Result<(W, u64)> {
        self.sink.flush()?;
        Ok((self.sink, self.position - self.start))
    }
}

/// Reads nodes by pointer from a [`NodeSource`]
pub struct NodeReader<S> {
    source: S,
    method: CompressionMethod,
    region: Range<u64>,
    cache: Option<Arc<NodeCache>>,
    cache_id: CacheId,
}

impl<S: NodeSource> NodeReader<S> {
    /// `region` bounds every pointer this reader will accept; the reader
    /// owns a cache of up to `cache_nodes` nodes
    pub fn new(source: S, method: CompressionMethod, region: Range<u64>, cache_nodes: usize) -> Self {
        let cache = NodeCache::shared(cache_nodes, DEFAULT_CACHE_BYTES);
        Self::with_cache(source, method, region, cache, 0)
    }

    /// Reader whose nodes live in `cache` under `cache_id`, which must be
    /// unique among the readers sharing that cache
    pub fn with_cache(
        source: S,
        method: CompressionMethod,
        region: Range<u64>,
        cache: Option<Arc<NodeCache>>,
        cache_id: CacheId,
    ) -> Self {
        NodeReader {
            source,
            method,
            region,
            cache,
            cache_id,
        }
    }

    /// Check that `ptr` addresses bytes inside the node region
    pub fn check_pointer(&self, ptr: NodePtr) -> Result<()> {
        let end = ptr.offset.checked_add(ptr.length as u64);
        let inside = ptr.length > 0
            && ptr.offset >= self.region.start
            && end.is_some_and(|end| end <= self.region.end);
        if !inside {
            return Err(DictError::corrupt(
                ptr.offset,
                format!(
                    "node pointer ({}, {}) outside node region [{}, {})",
                    ptr.offset, ptr.length, self.region.start, self.region.end
                ),
            ));
        }
        Ok(())
    }

    /// Read, decompress and decode the node at `ptr`
    pub fn read(&self, ptr: NodePtr) -> Result<Arc<Node>> {
        self.check_pointer(ptr)?;

        if let Some(cache) = &self.cache {
            if let Some(node) = cache.get(self.cache_id, &ptr) {
                return Ok(node);
            }
        }

        let mut compressed = vec![0u8; ptr.length as usize];
        self.source
            .read_exact_at(&mut compressed, ptr.offset)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    DictError::corrupt(ptr.offset, format!("short node read: {}", e))
                }
                _ => DictError::Io(e),
            })?;

        let raw = decompress(&compressed, self.method, ptr.offset)?;
        let node = Arc::new(decode_node(&raw, ptr.offset)?);
        trace!(offset = ptr.offset, length = ptr.length, leaf = node.is_leaf(), "read node");

        if let Some(cache) = &self.cache {
            cache.put(self.cache_id, ptr, Arc::clone(&node));
        }
        Ok(node)
    }

    pub fn region(&self) -> Range<u64> {
        self.region.clone()
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Cache counters; all zero when caching is disabled
    ///
    /// A shared cache reports the counters of every reader using it.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache
            .as_deref()
            .map(NodeCache::stats)
            .unwrap_or_default()
    }

    pub fn cache(&self) -> Option<&Arc<NodeCache>> {
        self.cache.as_ref()
    }

    pub fn cache_id(&self) -> CacheId {
        self.cache_id
    }
}
