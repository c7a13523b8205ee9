//! # dictree - Read-Optimized Dictionary Storage
//!
//! `dictree` stores large key/value dictionaries (headwords, resources,
//! full-text tokens) in a single immutable file. Entries live in a
//! bulk-loaded B+ tree whose nodes are compressed one by one and whose
//! leaves are chained for ordered scans.
//!
//! - **Exact lookup** by binary-search descent
//! - **Prefix and range scans** as lazy iterators over the leaf chain
//! - **Dual-root files** holding an entry tree and a token tree
//! - **Atomic publishing** through a temporary file and rename
//! - **Resource files** (`<name>.dres`, `<name>.<id>.dres`) plus `<name>.js`
//!   and `<name>.css` opened alongside `<name>.dict`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dictree::{Dictionary, DictionaryBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let mut builder = DictionaryBuilder::new();
//! builder.insert_entry("apple", "a round fruit");
//! builder.insert_entry("apply", "to put to use");
//! builder.insert_token("fruit", ["apple"]);
//! builder.build("words.dict")?;
//!
//! let dict = Dictionary::open("words.dict")?;
//! assert_eq!(dict.lookup_text("apple")?.as_deref(), Some("a round fruit"));
//! assert_eq!(dict.search("app", 10)?, ["apple", "apply"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Lower Level
//!
//! ```rust,no_run
//! use dictree::core::{BuildConfig, Container, ContainerWriter, Metadata, TrailerLayout};
//!
//! # fn main() -> dictree::Result<()> {
//! let config = BuildConfig::from_toml_str("compression = \"zstd\"")?;
//! let mut writer = ContainerWriter::create("raw.dict", TrailerLayout::Single, &Metadata::new(), &config)?;
//! writer.write_entries([("a", "1"), ("b", "2")])?;
//! writer.finish()?;
//!
//! let container = Container::open("raw.dict")?;
//! for entry in container.entries().scan(b"a") {
//!     let (key, value) = entry?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;

mod bookshelf;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    cache, codec, compression, config, container, error, header, io, metadata, tree,
};

pub use crate::bookshelf::{Bookshelf, ShelfId};
pub use crate::core::{
    compression::CompressionMethod,
    config::{BuildConfig, ReaderConfig},
    container::ContainerSummary,
    error::{DictError, Result},
    header::TrailerLayout,
    metadata::Metadata,
    raw::{RawKind, RawStore},
};

use crate::core::cache::{CacheId, NodeCache};
use crate::core::container::{Container, ContainerWriter};
use crate::core::io::NodeSource;
use crate::core::token::{decode_postings, encode_postings};
use crate::core::tree::{TreeBuilder, TreeReader};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Extension of dictionary (entry) files
pub const EXT_ENTRY: &str = "dict";

/// Extension of resource files opened beside a dictionary
pub const EXT_RESOURCE: &str = "dres";

/// Path of a resource file belonging to the dictionary at `dictionary`
///
/// `None` gives `<stem>.dres`, `Some(id)` gives `<stem>.<id>.dres`, both in
/// the dictionary's directory.
pub fn resource_path<P: AsRef<Path>>(dictionary: P, id: Option<&str>) -> PathBuf {
    let path = dictionary.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match id {
        Some(id) => format!("{}.{}.{}", stem, id, EXT_RESOURCE),
        None => format!("{}.{}", stem, EXT_RESOURCE),
    };
    path.with_file_name(name)
}

/// Resource id encoded in `file_name`, if it is a resource of `stem`
fn resource_id<'a>(stem: &str, file_name: &'a str) -> Option<&'a str> {
    let base = file_name
        .strip_suffix(EXT_RESOURCE)?
        .strip_suffix('.')?
        .strip_prefix(stem)?;
    if base.is_empty() {
        return Some("");
    }
    base.strip_prefix('.').filter(|id| !id.is_empty())
}

/// Resource files beside `path`, ordered by id
fn discover_resources(path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| DictError::InvalidInput(format!("no usable file name in {:?}", path)))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let candidate = entry.path();
        if !candidate.is_file() || candidate == path {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(id) = resource_id(stem, file_name) {
            found.push((id.to_string(), candidate));
        }
    }
    found.sort();
    Ok(found)
}

/// Contents of the `<stem>.<extension>` file beside `path`; empty if absent
fn read_sidecar(path: &Path, extension: &str) -> Result<String> {
    let sidecar = path.with_extension(extension);
    if !sidecar.is_file() {
        return Ok(String::new());
    }
    info!("Loading {:?}", sidecar);
    Ok(fs::read_to_string(&sidecar)?)
}

/// Result of [`DictionaryBuilder::build`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Published file
    pub path: PathBuf,

    #[serde(flatten)]
    pub summary: ContainerSummary,
}

/// An opened dictionary file with its resources
///
/// Queries take `&self`, so one dictionary can be shared between threads
/// behind an `Arc`.
pub struct Dictionary<S = File> {
    container: Container<S>,
    resources: Vec<(String, Container<S>)>,
    js: String,
    css: String,
}

impl<S: NodeSource> std::fmt::Debug for Dictionary<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary")
            .field("container", &self.container)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

impl Dictionary<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ReaderConfig::default())
    }

    /// Open the dictionary at `path` together with its resource files and
    /// its `.js`/`.css` companions; all containers share one node cache
    pub fn open_with<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Self> {
        let mut next_id = 0;
        Self::open_shared(path.as_ref(), config.node_cache(), &mut next_id)
    }

    /// Open with a caller-owned cache; each container takes the next id
    /// from `next_id`
    pub(crate) fn open_shared(
        path: &Path,
        cache: Option<Arc<NodeCache>>,
        next_id: &mut CacheId,
    ) -> Result<Self> {
        let container = Container::open_shared(path, cache.clone(), *next_id)?;
        *next_id = next_id.wrapping_add(1);

        let mut resources = Vec::new();
        for (id, resource) in discover_resources(path)? {
            info!("Loading resource file {:?}", resource);
            resources.push((id, Container::open_shared(&resource, cache.clone(), *next_id)?));
            *next_id = next_id.wrapping_add(1);
        }

        let js = read_sidecar(path, "js")?;
        let css = read_sidecar(path, "css")?;

        info!(
            "Opened dictionary {:?} ({} entries, {} resource files)",
            path,
            container.metadata().entry_count,
            resources.len()
        );
        Ok(Dictionary {
            container,
            resources,
            js,
            css,
        })
    }
}

impl<S: NodeSource> Dictionary<S> {
    pub fn from_container(container: Container<S>) -> Self {
        Dictionary {
            container,
            resources: Vec::new(),
            js: String::new(),
            css: String::new(),
        }
    }

    /// Attach a resource container under `id`
    pub fn with_resource(mut self, id: impl Into<String>, container: Container<S>) -> Self {
        self.resources.push((id.into(), container));
        self
    }

    pub fn container(&self) -> &Container<S> {
        &self.container
    }

    pub fn metadata(&self) -> &Metadata {
        self.container.metadata()
    }

    pub fn layout(&self) -> TrailerLayout {
        self.container.layout()
    }

    /// Raw entry tree
    pub fn entries(&self) -> TreeReader<'_, S> {
        self.container.entries()
    }

    /// Value stored under `name`
    pub fn lookup(&self, name: &str) -> Result<Option<Vec<u8>>> {
        debug!("Looking up {:?}", name);
        self.container.entries().lookup(name.as_bytes())
    }

    /// Value stored under `name`, as text
    pub fn lookup_text(&self, name: &str) -> Result<Option<String>> {
        self.lookup(name)?
            .map(|value| {
                String::from_utf8(value).map_err(|e| {
                    DictError::InvalidInput(format!("value of {:?} is not text: {}", name, e))
                })
            })
            .transpose()
    }

    /// Names starting with `prefix`, in order, at most `limit` of them
    ///
    /// A name that is not UTF-8 is `InvalidInput`.
    pub fn search(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.container.entries().scan(prefix.as_bytes()).take(limit) {
            let (key, _) = entry?;
            let name = String::from_utf8(key).map_err(|e| {
                DictError::InvalidInput(format!("entry name is not text: {}", e))
            })?;
            names.push(name);
        }
        debug!("Prefix {:?} matched {} names", prefix, names.len());
        Ok(names)
    }

    /// Value of `name` in the first resource file holding it, by id order
    pub fn lookup_resource(&self, name: &str) -> Result<Option<Vec<u8>>> {
        for (id, resource) in &self.resources {
            if let Some(value) = resource.entries().lookup(name.as_bytes())? {
                debug!("Resource {:?} found in {:?}", name, id);
                return Ok(Some(value));
            }
        }
        debug!("Resource {:?} not found in {} files", name, self.resources.len());
        Ok(None)
    }

    /// Ids of the attached resource files; the unnamed file has id `""`
    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|(id, _)| id.as_str())
    }

    /// Contents of the companion `.js` file; empty when there is none
    pub fn js(&self) -> &str {
        &self.js
    }

    /// Contents of the companion `.css` file; empty when there is none
    pub fn css(&self) -> &str {
        &self.css
    }

    /// Cache ids of the dictionary's containers
    pub(crate) fn cache_ids(&self) -> Vec<CacheId> {
        std::iter::once(self.container.cache_id())
            .chain(self.resources.iter().map(|(_, c)| c.cache_id()))
            .collect()
    }

    /// Entry names listed under `token`
    ///
    /// `None` when the token is absent; `LayoutMismatch` for files without a
    /// token tree.
    pub fn tokens(&self, token: &str) -> Result<Option<Vec<String>>> {
        let tree = self.container.tokens().ok_or_else(|| {
            DictError::LayoutMismatch("dictionary has no token tree".to_string())
        })?;
        tree.lookup(token.as_bytes())?
            .map(|postings| decode_postings(&postings))
            .transpose()
    }

    /// Prefix matches followed by token matches
    ///
    /// Up to `prefix_limit` names come from the prefix scan; up to
    /// `token_limit` more come from the posting list of `query`, skipping
    /// names already found.
    pub fn suggest(&self, query: &str, prefix_limit: usize, token_limit: usize) -> Result<Vec<String>> {
        let mut names = self.search(query, prefix_limit)?;
        if self.container.tokens().is_none() {
            return Ok(names);
        }

        let postings = self.tokens(query)?.unwrap_or_default();
        let mut added = 0;
        for name in postings {
            if added >= token_limit {
                break;
            }
            if !names.contains(&name) {
                names.push(name);
                added += 1;
            }
        }
        Ok(names)
    }
}

/// Collects entries and tokens in memory and writes a dictionary file
///
/// Entries may be inserted in any order; a repeated name keeps the last
/// value.
pub struct DictionaryBuilder {
    metadata: Metadata,
    config: BuildConfig,
    layout: TrailerLayout,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    tokens: BTreeMap<String, Vec<String>>,
}

impl DictionaryBuilder {
    pub fn new() -> Self {
        DictionaryBuilder {
            metadata: Metadata::new(),
            config: BuildConfig::default(),
            layout: TrailerLayout::default(),
            entries: BTreeMap::new(),
            tokens: BTreeMap::new(),
        }
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    pub fn layout(mut self, layout: TrailerLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn insert_entry(&mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    /// Append entry names to the posting list of `token`
    pub fn insert_token<I, N>(&mut self, token: impl Into<String>, names: I) -> &mut Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.tokens
            .entry(token.into())
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_layout(&self) -> Result<()> {
        if self.layout == TrailerLayout::Single && !self.tokens.is_empty() {
            return Err(DictError::LayoutMismatch(format!(
                "{} tokens given for a single-root dictionary",
                self.tokens.len()
            )));
        }
        Ok(())
    }

    fn encoded_tokens(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.tokens
            .iter()
            .map(|(token, names)| Ok((token.clone().into_bytes(), encode_postings(names)?)))
            .collect()
    }

    fn publish(self, path: &Path, entries: TreeBuilder) -> Result<BuildInfo> {
        self.check_layout()?;
        let tokens = self.encoded_tokens()?;

        let mut metadata = self.metadata;
        metadata.entry_count = entries.len();

        let mut writer = ContainerWriter::create(path, self.layout, &metadata, &self.config)?;
        writer.write_entry_tree(entries)?;
        if self.layout == TrailerLayout::Dual {
            writer.write_tokens(tokens)?;
        }
        let summary = writer.finish()?;

        Ok(BuildInfo {
            path: path.to_path_buf(),
            summary,
        })
    }

    /// Sort, write and publish the dictionary at `path`
    pub fn build<P: AsRef<Path>>(mut self, path: P) -> Result<BuildInfo> {
        info!(
            "Building dictionary {:?} ({} entries, {} tokens)",
            path.as_ref(),
            self.entries.len(),
            self.tokens.len()
        );
        self.check_layout()?;

        let mut tree = TreeBuilder::new(&self.config)?;
        for (name, value) in std::mem::take(&mut self.entries) {
            tree.push(name, value)?;
        }
        self.publish(path.as_ref(), tree)
    }

    /// Publish entries read from a staging store instead of memory
    ///
    /// The store must be free of duplicate names; see
    /// [`RawStore::dedup_keep_latest`].
    pub fn build_from_raw<P: AsRef<Path>>(self, raw: &mut RawStore, path: P) -> Result<BuildInfo> {
        info!("Building dictionary {:?} from staging store", path.as_ref());
        self.check_layout()?;
        let tree = raw.tree_builder(&self.config)?;
        self.publish(path.as_ref(), tree)
    }
}

impl Default for DictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
