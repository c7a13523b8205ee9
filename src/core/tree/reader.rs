//! Tree queries: exact lookup, prefix and range scans, full iteration
//!
//! Descent follows the last separator not greater than the target. Scans
//! position on a leaf once and then walk the sibling chain, holding only the
//! current leaf between calls to `next`.

use crate::codec::{Node, NodePtr};
use crate::error::{DictError, Result};
use crate::io::{NodeReader, NodeSource};
use std::sync::Arc;
use tracing::debug;

/// Deepest tree accepted during descent
///
/// A balanced tree over u64 entries with fan-out 2 stays below this; deeper
/// paths only occur when internal pointers form a cycle.
const MAX_DEPTH: usize = 64;

/// Index of the child whose subtree may hold `key`
fn child_index(children: &[(Vec<u8>, NodePtr)], key: &[u8]) -> Option<usize> {
    children
        .partition_point(|(separator, _)| separator.as_slice() <= key)
        .checked_sub(1)
}

/// Read access to one tree in a container
pub struct TreeReader<'r, S> {
    nodes: &'r NodeReader<S>,
    root: NodePtr,
}

impl<'r, S> Clone for TreeReader<'r, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'r, S> Copy for TreeReader<'r, S> {}

impl<'r, S: NodeSource> TreeReader<'r, S> {
    pub fn new(nodes: &'r NodeReader<S>, root: NodePtr) -> Self {
        TreeReader { nodes, root }
    }

    pub fn root(&self) -> NodePtr {
        self.root
    }

    /// Descend to a leaf, choosing a child at each internal node
    ///
    /// `choose` returns `None` to stop without a leaf.
    fn descend<F>(&self, mut choose: F) -> Result<Option<(NodePtr, Arc<Node>)>>
    where
        F: FnMut(&[(Vec<u8>, NodePtr)]) -> Option<usize>,
    {
        let mut ptr = self.root;
        for _ in 0..MAX_DEPTH {
            let node = self.nodes.read(ptr)?;
            let child = match &*node {
                Node::Leaf { .. } => return Ok(Some((ptr, Arc::clone(&node)))),
                Node::Internal { children } if children.is_empty() => {
                    return Err(DictError::corrupt(ptr.offset, "internal node without children"))
                }
                Node::Internal { children } => match choose(children) {
                    Some(index) => children[index].1,
                    None => return Ok(None),
                },
            };
            ptr = child;
        }
        Err(DictError::corrupt(
            ptr.offset,
            format!("tree deeper than {} levels", MAX_DEPTH),
        ))
    }

    /// Value stored under `key`, or `None` when the key is absent
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let leaf = self.descend(|children| child_index(children, key))?;
        let Some((_, leaf)) = leaf else {
            debug!("key below first separator");
            return Ok(None);
        };

        match &*leaf {
            Node::Leaf { entries, .. } => Ok(entries
                .binary_search_by(|(k, _)| k.as_slice().cmp(key))
                .ok()
                .map(|index| entries[index].1.clone())),
            Node::Internal { .. } => Ok(None),
        }
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    /// Position on the first entry with key `>= start`
    fn seek(&self, start: &[u8], bound: Bound) -> Scan<'r, S> {
        let found = self.descend(|children| child_index(children, start).or(Some(0)));
        match found {
            Ok(Some((ptr, leaf))) => {
                let index = match &*leaf {
                    Node::Leaf { entries, .. } => {
                        entries.partition_point(|(k, _)| k.as_slice() < start)
                    }
                    Node::Internal { .. } => 0,
                };
                Scan {
                    nodes: self.nodes,
                    leaf: Some((ptr, leaf)),
                    index,
                    bound,
                    error: None,
                }
            }
            Ok(None) => Scan::finished(self.nodes, bound),
            Err(e) => Scan {
                error: Some(e),
                ..Scan::finished(self.nodes, bound)
            },
        }
    }

    /// Entries whose key starts with `prefix`, in key order
    ///
    /// An empty prefix yields every entry.
    pub fn scan(&self, prefix: &[u8]) -> Scan<'r, S> {
        self.seek(prefix, Bound::Prefix(prefix.to_vec()))
    }

    /// Entries with `start <= key < end`, in key order
    pub fn range(&self, start: &[u8], end: &[u8]) -> Scan<'r, S> {
        if start >= end {
            return Scan::finished(self.nodes, Bound::All);
        }
        self.seek(start, Bound::Before(end.to_vec()))
    }

    /// Every entry in key order
    pub fn iter(&self) -> Scan<'r, S> {
        self.seek(&[], Bound::All)
    }

    /// Alias of [`iter`](Self::iter)
    pub fn iterate_all(&self) -> Scan<'r, S> {
        self.iter()
    }

    /// Nodes on the leftmost root-to-leaf path
    pub fn depth(&self) -> Result<u32> {
        let mut depth = 0u32;
        self.descend(|_| {
            depth += 1;
            Some(0)
        })?;
        Ok(depth + 1)
    }

    /// Walk the sibling chain, returning `(leaves, entries)`
    pub fn leaf_chain_stats(&self) -> Result<(u64, u64)> {
        let Some((mut ptr, mut leaf)) = self.descend(|_| Some(0))? else {
            return Ok((0, 0));
        };

        let mut leaves = 0u64;
        let mut entries = 0u64;
        loop {
            let next = match &*leaf {
                Node::Leaf { entries: records, next } => {
                    leaves += 1;
                    entries += records.len() as u64;
                    *next
                }
                Node::Internal { .. } => {
                    return Err(DictError::corrupt(ptr.offset, "internal node in leaf chain"))
                }
            };
            if next.is_none() {
                return Ok((leaves, entries));
            }
            let following = self.nodes.read(next)?;
            check_link(&leaf, next, &following)?;
            ptr = next;
            leaf = following;
        }
    }
}

/// Verify that `following` continues the chain after `leaf`
///
/// Keys strictly increase along the chain, which also rules out cycles.
fn check_link(leaf: &Node, next: NodePtr, following: &Node) -> Result<()> {
    let (last, first) = match (leaf, following) {
        (Node::Leaf { entries: left, .. }, Node::Leaf { entries: right, .. }) => {
            (left.last(), right.first())
        }
        _ => return Err(DictError::corrupt(next.offset, "internal node in leaf chain")),
    };
    match (last, first) {
        (Some((last, _)), Some((first, _))) if first > last => Ok(()),
        (_, None) => Err(DictError::corrupt(next.offset, "empty leaf in chain")),
        _ => Err(DictError::corrupt(next.offset, "leaf chain keys out of order")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Bound {
    All,
    Prefix(Vec<u8>),
    Before(Vec<u8>),
}

impl Bound {
    fn admits(&self, key: &[u8]) -> bool {
        match self {
            Bound::All => true,
            Bound::Prefix(prefix) => key.starts_with(prefix),
            Bound::Before(end) => key < end.as_slice(),
        }
    }
}

/// Lazy, ordered iterator over tree entries
///
/// Yields `Err` at most once; the iterator is exhausted afterwards.
pub struct Scan<'r, S> {
    nodes: &'r NodeReader<S>,
    leaf: Option<(NodePtr, Arc<Node>)>,
    index: usize,
    bound: Bound,
    error: Option<DictError>,
}

impl<'r, S> Scan<'r, S> {
    fn finished(nodes: &'r NodeReader<S>, bound: Bound) -> Self {
        Scan {
            nodes,
            leaf: None,
            index: 0,
            bound,
            error: None,
        }
    }

    fn fail(&mut self, error: DictError) -> Option<Result<(Vec<u8>, Vec<u8>)>> {
        self.leaf = None;
        Some(Err(error))
    }
}

impl<'r, S: NodeSource> Iterator for Scan<'r, S> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.error.take() {
            return self.fail(error);
        }

        loop {
            let (ptr, leaf) = self.leaf.clone()?;
            let (entries, next) = match &*leaf {
                Node::Leaf { entries, next } => (entries, *next),
                Node::Internal { .. } => {
                    return self.fail(DictError::corrupt(ptr.offset, "internal node in leaf chain"))
                }
            };

            if let Some((key, value)) = entries.get(self.index) {
                if !self.bound.admits(key) {
                    self.leaf = None;
                    return None;
                }
                self.index += 1;
                return Some(Ok((key.clone(), value.clone())));
            }

            if next.is_none() {
                self.leaf = None;
                return None;
            }

            let following = match self.nodes.read(next) {
                Ok(node) => node,
                Err(e) => return self.fail(e),
            };
            if let Err(e) = check_link(&leaf, next, &following) {
                return self.fail(e);
            }
            self.leaf = Some((next, following));
            self.index = 0;
        }
    }
}

impl<'r, S: NodeSource> std::iter::FusedIterator for Scan<'r, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionMethod;
    use crate::config::BuildConfig;
    use crate::io::NodeWriter;
    use crate::tree::build_tree;

    const START: u64 = 8;

    fn build(entries: &[(&str, &str)], config: &BuildConfig) -> (NodeReader<Vec<u8>>, NodePtr) {
        let mut buf = vec![0u8; START as usize];
        let mut writer = NodeWriter::new(&mut buf, START, config.compression).unwrap();
        let (root, _) = build_tree(
            &mut writer,
            entries.iter().map(|(k, v)| (k.as_bytes(), v.as_bytes())),
            config,
        )
        .unwrap();
        writer.finalize().unwrap();
        let end = buf.len() as u64;
        (NodeReader::new(buf, config.compression, START..end, 16), root)
    }

    fn small_nodes() -> BuildConfig {
        BuildConfig::default().with_leaf_entries(2).with_fan_out(2)
    }

    fn keys<S: NodeSource>(scan: Scan<'_, S>) -> Vec<String> {
        scan.map(|r| String::from_utf8(r.unwrap().0).unwrap()).collect()
    }

    const WORDS: &[(&str, &str)] = &[
        ("apple", "fruit"),
        ("apply", "verb"),
        ("banana", "fruit"),
        ("band", "group"),
        ("bandana", "cloth"),
        ("cherry", "fruit"),
        ("date", "fruit"),
    ];

    #[test]
    fn test_lookup_hits_and_misses() {
        for config in [BuildConfig::default(), small_nodes()] {
            let (nodes, root) = build(WORDS, &config);
            let tree = TreeReader::new(&nodes, root);

            for (key, value) in WORDS {
                assert_eq!(tree.lookup(key.as_bytes()).unwrap().unwrap(), value.as_bytes());
            }
            for missing in ["", "a", "appl", "applz", "bane", "zebra"] {
                assert_eq!(tree.lookup(missing.as_bytes()).unwrap(), None, "{}", missing);
            }
        }
    }

    #[test]
    fn test_scan_prefix_crosses_leaves() {
        let (nodes, root) = build(WORDS, &small_nodes());
        let tree = TreeReader::new(&nodes, root);

        assert_eq!(keys(tree.scan(b"ban")), ["banana", "band", "bandana"]);
        assert_eq!(keys(tree.scan(b"band")), ["band", "bandana"]);
        assert_eq!(keys(tree.scan(b"app")), ["apple", "apply"]);
        assert!(keys(tree.scan(b"x")).is_empty());
        assert!(keys(tree.scan(b"0")).is_empty());
        assert_eq!(keys(tree.scan(b"")).len(), WORDS.len());
    }

    #[test]
    fn test_range() {
        let (nodes, root) = build(WORDS, &small_nodes());
        let tree = TreeReader::new(&nodes, root);

        assert_eq!(keys(tree.range(b"b", b"c")), ["banana", "band", "bandana"]);
        assert_eq!(keys(tree.range(b"apply", b"band")), ["apply", "banana"]);
        assert!(keys(tree.range(b"c", b"b")).is_empty());
    }

    #[test]
    fn test_iter_in_order() {
        let (nodes, root) = build(WORDS, &small_nodes());
        let tree = TreeReader::new(&nodes, root);

        let expected: Vec<String> = WORDS.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys(tree.iter()), expected);
        assert_eq!(keys(tree.iterate_all()), expected);
    }

    #[test]
    fn test_empty_tree() {
        let (nodes, root) = build(&[], &BuildConfig::default());
        let tree = TreeReader::new(&nodes, root);

        assert_eq!(tree.lookup(b"anything").unwrap(), None);
        assert_eq!(tree.iter().count(), 0);
        assert_eq!(tree.scan(b"").count(), 0);
        assert_eq!(tree.depth().unwrap(), 1);
        assert_eq!(tree.leaf_chain_stats().unwrap(), (1, 0));
    }

    #[test]
    fn test_depth_and_chain_stats() {
        let (nodes, root) = build(WORDS, &small_nodes());
        let tree = TreeReader::new(&nodes, root);

        // 7 entries -> 4 leaves -> 2 -> 1
        assert_eq!(tree.depth().unwrap(), 3);
        assert_eq!(tree.leaf_chain_stats().unwrap(), (4, 7));
    }

    #[test]
    fn test_bad_root_fuses_scan() {
        let (nodes, _) = build(WORDS, &BuildConfig::default());
        let tree = TreeReader::new(&nodes, NodePtr::new(1, 5));

        assert!(tree.lookup(b"apple").unwrap_err().is_corruption());
        let mut scan = tree.scan(b"a");
        assert!(scan.next().unwrap().is_err());
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_self_referencing_leaf_detected() {
        let mut buf = vec![0u8; START as usize];
        let mut writer = NodeWriter::new(&mut buf, START, CompressionMethod::None).unwrap();
        // The leaf points at itself: offset START, same length
        let sample = Node::Leaf {
            entries: vec![(b"k".to_vec(), b"v".to_vec())],
            next: NodePtr::new(START, 1),
        };
        let length = crate::codec::encode_node(&sample).unwrap().len() as u32;
        let leaf = Node::Leaf {
            entries: vec![(b"k".to_vec(), b"v".to_vec())],
            next: NodePtr::new(START, length),
        };
        let root = writer.append_node(&leaf).unwrap();
        writer.finalize().unwrap();
        let end = buf.len() as u64;
        let nodes = NodeReader::new(buf, CompressionMethod::None, START..end, 0);
        let tree = TreeReader::new(&nodes, root);

        let results: Vec<_> = tree.iter().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_corruption());
        assert!(tree.leaf_chain_stats().unwrap_err().is_corruption());
    }
}
