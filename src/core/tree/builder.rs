//! Bottom-up bulk loading
//!
//! Entries arrive sorted and are packed into leaf groups as they stream in.
//! Leaves are then written last-to-first so every sibling pointer is known
//! when its leaf is encoded; compressed sizes cannot be predicted, so the
//! chain cannot be patched afterwards. Internal levels are packed from the
//! `(first_key, pointer)` list of the level below until one node remains.

use super::TreeStats;
use crate::codec::{internal_record_len, leaf_record_len, Node, NodePtr};
use crate::config::BuildConfig;
use crate::error::{DictError, Result};
use crate::io::NodeWriter;
use std::cmp::Ordering;
use std::io::Write;
use std::mem;
use tracing::debug;

/// Greedy grouping under a byte and a count bound
struct Packer<T> {
    max_bytes: usize,
    max_entries: usize,
    min_entries: usize,
    groups: Vec<Vec<T>>,
    current: Vec<T>,
    bytes: usize,
}

impl<T> Packer<T> {
    fn new(max_bytes: usize, max_entries: usize, min_entries: usize) -> Self {
        Packer {
            max_bytes,
            max_entries,
            min_entries,
            groups: Vec::new(),
            current: Vec::new(),
            bytes: 0,
        }
    }

    fn push(&mut self, item: T, record_len: usize) {
        let full = self.current.len() == self.max_entries
            || self.bytes + record_len > self.max_bytes;
        if full && self.current.len() >= self.min_entries {
            self.groups.push(mem::take(&mut self.current));
            self.bytes = 0;
        }
        self.current.push(item);
        self.bytes += record_len;
    }

    fn last(&self) -> Option<&T> {
        self.current.last()
    }

    fn finish(mut self) -> Vec<Vec<T>> {
        if !self.current.is_empty() {
            self.groups.push(self.current);
        }
        self.groups
    }
}

/// Streaming tree builder
///
/// ```no_run
/// # use dictree::core::{BuildConfig, CompressionMethod, NodeWriter, TreeBuilder};
/// # fn main() -> dictree::core::Result<()> {
/// let config = BuildConfig::default();
/// let mut builder = TreeBuilder::new(&config)?;
/// builder.push("apple", "fruit")?;
/// builder.push("banana", "fruit")?;
///
/// let mut writer = NodeWriter::new(Vec::new(), 8, CompressionMethod::Deflate)?;
/// let (root, stats) = builder.finish(&mut writer)?;
/// # Ok(())
/// # }
/// ```
pub struct TreeBuilder {
    config: BuildConfig,
    leaves: Packer<(Vec<u8>, Vec<u8>)>,
    entries: u64,
}

impl TreeBuilder {
    pub fn new(config: &BuildConfig) -> Result<Self> {
        config.validate()?;
        Ok(TreeBuilder {
            config: config.clone(),
            leaves: Packer::new(config.leaf_max_bytes, config.leaf_max_entries, 1),
            entries: 0,
        })
    }

    /// Add the next entry; keys must strictly increase
    pub fn push(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        let key = key.into();
        if let Some((previous, _)) = self.leaves.last() {
            match key.as_slice().cmp(previous.as_slice()) {
                Ordering::Greater => {}
                Ordering::Equal => return Err(DictError::DuplicateKey { key }),
                Ordering::Less => {
                    return Err(DictError::UnsortedInput {
                        previous: previous.clone(),
                        key,
                    })
                }
            }
        }

        let value = value.into();
        let record_len = leaf_record_len(&key, &value);
        self.leaves.push((key, value), record_len);
        self.entries += 1;
        Ok(())
    }

    /// Entries accepted so far
    pub fn len(&self) -> u64 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Write every node and return the root pointer
    pub fn finish<W: Write>(self, writer: &mut NodeWriter<W>) -> Result<(NodePtr, TreeStats)> {
        let groups = self.leaves.finish();
        let mut stats = TreeStats {
            entries: self.entries,
            ..TreeStats::default()
        };

        if groups.is_empty() {
            let root = writer.append_node(&Node::empty_leaf())?;
            stats.leaves = 1;
            stats.depth = 1;
            debug!(offset = root.offset, "built empty tree");
            return Ok((root, stats));
        }

        let mut level = Vec::with_capacity(groups.len());
        let mut next = NodePtr::NONE;
        for entries in groups.into_iter().rev() {
            let first_key = entries[0].0.clone();
            next = writer.append_node(&Node::Leaf { entries, next })?;
            level.push((first_key, next));
        }
        level.reverse();
        stats.leaves = level.len() as u64;
        stats.depth = 1;
        debug!(leaves = stats.leaves, entries = stats.entries, "wrote leaf level");

        while level.len() > 1 {
            let mut packer = Packer::new(
                self.config.internal_max_bytes,
                self.config.internal_max_entries,
                2,
            );
            for (key, ptr) in level {
                let record_len = internal_record_len(&key);
                packer.push((key, ptr), record_len);
            }

            let groups = packer.finish();
            level = Vec::with_capacity(groups.len());
            for children in groups {
                let first_key = children[0].0.clone();
                let ptr = writer.append_node(&Node::Internal { children })?;
                level.push((first_key, ptr));
            }
            stats.internal_nodes += level.len() as u64;
            stats.depth += 1;
            debug!(depth = stats.depth, nodes = level.len(), "wrote internal level");
        }

        let root = level[0].1;
        debug!(
            offset = root.offset,
            length = root.length,
            depth = stats.depth,
            "built tree"
        );
        Ok((root, stats))
    }
}

/// Build a tree from a sorted iterator of entries
pub fn build_tree<W, I, K, V>(
    writer: &mut NodeWriter<W>,
    entries: I,
    config: &BuildConfig,
) -> Result<(NodePtr, TreeStats)>
where
    W: Write,
    I: IntoIterator<Item = (K, V)>,
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    let mut builder = TreeBuilder::new(config)?;
    for (key, value) in entries {
        builder.push(key, value)?;
    }
    builder.finish(writer)
}
