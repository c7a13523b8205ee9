//! Byte layout of tree nodes
//!
//! ```text
//! ┌────────────┬───────────┬──────────────────────────────┬─────────────────────────┐
//! │ is_leaf u8 │ count u32 │ count × record               │ leaf only: sibling ptr  │
//! └────────────┴───────────┴──────────────────────────────┴─────────────────────────┘
//!
//! leaf record:     key_len u32 | key | value_len u32 | value
//! internal record: key_len u32 | key | child_offset u64 | child_len u32
//! sibling ptr:     sibling_offset u64 | sibling_len u32   (0/0 = end of chain)
//! ```
//!
//! `is_leaf` is 0 for leaves; any other value marks an internal node. All
//! integers are little-endian.

use crate::error::{DictError, Result};

/// Size of the `is_leaf | count` prefix
pub const NODE_PREFIX_SIZE: usize = 1 + 4;

/// Size of an encoded pointer (`offset u64 | length u32`)
pub const POINTER_SIZE: usize = 8 + 4;

/// Address of a node in the container: absolute offset and compressed length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodePtr {
    pub offset: u64,
    pub length: u32,
}

impl NodePtr {
    /// End-of-chain sentinel
    pub const NONE: NodePtr = NodePtr {
        offset: 0,
        length: 0,
    };

    pub fn new(offset: u64, length: u32) -> Self {
        NodePtr { offset, length }
    }

    pub fn is_none(&self) -> bool {
        self.offset == 0
    }

    /// First byte past the node
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }

    pub fn to_bytes(&self) -> [u8; POINTER_SIZE] {
        let mut bytes = [0u8; POINTER_SIZE];
        bytes[..8].copy_from_slice(&self.offset.to_le_bytes());
        bytes[8..].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; POINTER_SIZE]) -> Self {
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&bytes[..8]);
        let mut length = [0u8; 4];
        length.copy_from_slice(&bytes[8..]);
        NodePtr {
            offset: u64::from_le_bytes(offset),
            length: u32::from_le_bytes(length),
        }
    }
}

/// A decoded tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Ordered key/value records plus the pointer to the next leaf
    Leaf {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        next: NodePtr,
    },
    /// Ordered separator keys, each the first key of its child's subtree
    Internal { children: Vec<(Vec<u8>, NodePtr)> },
}

impl Node {
    pub fn empty_leaf() -> Self {
        Node::Leaf {
            entries: Vec::new(),
            next: NodePtr::NONE,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Number of records
    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries, .. } => entries.len(),
            Node::Internal { children } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First key stored in this node
    pub fn first_key(&self) -> Option<&[u8]> {
        match self {
            Node::Leaf { entries, .. } => entries.first().map(|(k, _)| k.as_slice()),
            Node::Internal { children } => children.first().map(|(k, _)| k.as_slice()),
        }
    }

    /// Exact encoded (uncompressed) size
    pub fn encoded_len(&self) -> usize {
        match self {
            Node::Leaf { entries, .. } => {
                NODE_PREFIX_SIZE
                    + entries
                        .iter()
                        .map(|(k, v)| leaf_record_len(k, v))
                        .sum::<usize>()
                    + POINTER_SIZE
            }
            Node::Internal { children } => {
                NODE_PREFIX_SIZE
                    + children
                        .iter()
                        .map(|(k, _)| internal_record_len(k))
                        .sum::<usize>()
            }
        }
    }
}

/// Encoded size of one leaf record
pub fn leaf_record_len(key: &[u8], value: &[u8]) -> usize {
    4 + key.len() + 4 + value.len()
}

/// Encoded size of one internal record
pub fn internal_record_len(key: &[u8]) -> usize {
    4 + key.len() + POINTER_SIZE
}

fn length_prefix(len: usize, what: &str) -> Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| DictError::InvalidInput(format!("{} of {} bytes exceeds u32", what, len)))
}

/// Serialize a node
pub fn encode_node(node: &Node) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(node.encoded_len());

    match node {
        Node::Leaf { entries, next } => {
            buf.push(0);
            buf.extend_from_slice(&length_prefix(entries.len(), "record count")?);
            for (key, value) in entries {
                buf.extend_from_slice(&length_prefix(key.len(), "key")?);
                buf.extend_from_slice(key);
                buf.extend_from_slice(&length_prefix(value.len(), "value")?);
                buf.extend_from_slice(value);
            }
            buf.extend_from_slice(&next.to_bytes());
        }
        Node::Internal { children } => {
            buf.push(1);
            buf.extend_from_slice(&length_prefix(children.len(), "record count")?);
            for (key, child) in children {
                buf.extend_from_slice(&length_prefix(key.len(), "key")?);
                buf.extend_from_slice(key);
                buf.extend_from_slice(&child.to_bytes());
            }
        }
    }

    Ok(buf)
}

/// Deserialize a node
///
/// `base` is added to positions in error reports; pass the node's file offset
/// so diagnostics point into the container.
pub fn decode_node(bytes: &[u8], base: u64) -> Result<Node> {
    let mut scanner = Scanner::new(bytes, base);

    let is_leaf = scanner.read_u8()? == 0;
    let count = scanner.read_u32()? as usize;

    // Every record needs at least 8 bytes, so a count larger than that is a lie
    if count > scanner.remaining() / 8 {
        return Err(scanner.corrupt(format!(
            "record count {} exceeds remaining {} bytes",
            count,
            scanner.remaining()
        )));
    }

    let node = if is_leaf {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = scanner.read_prefixed()?.to_vec();
            let value = scanner.read_prefixed()?.to_vec();
            entries.push((key, value));
        }
        let next = scanner.read_pointer()?;
        Node::Leaf { entries, next }
    } else {
        let mut children = Vec::with_capacity(count);
        for _ in 0..count {
            let key = scanner.read_prefixed()?.to_vec();
            let child = scanner.read_pointer()?;
            children.push((key, child));
        }
        Node::Internal { children }
    };

    if !scanner.is_end() {
        return Err(scanner.corrupt(format!("{} trailing bytes", scanner.remaining())));
    }

    Ok(node)
}

/// Bounds-checked cursor over a byte slice
pub struct Scanner<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> Scanner<'a> {
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Scanner { data, pos: 0, base }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_end(&self) -> bool {
        self.pos == self.data.len()
    }

    pub fn corrupt(&self, reason: impl Into<String>) -> DictError {
        DictError::corrupt(self.base + self.pos as u64, reason)
    }

    pub fn read(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.corrupt(format!(
                "need {} bytes, {} remaining",
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.read(8)?);
        Ok(u64::from_le_bytes(b))
    }

    /// Read a `u32` length prefix followed by that many bytes
    pub fn read_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read(len)
    }

    pub fn read_pointer(&mut self) -> Result<NodePtr> {
        let offset = self.read_u64()?;
        let length = self.read_u32()?;
        Ok(NodePtr { offset, length })
    }
}
