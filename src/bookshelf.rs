//! A set of opened dictionaries addressed by id

use crate::core::cache::{CacheId, CacheStats, NodeCache};
use crate::core::config::ReaderConfig;
use crate::core::error::{DictError, Result};
use crate::Dictionary;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Handle returned by [`Bookshelf::add`]; never reused
pub type ShelfId = u32;

struct Shelved {
    path: PathBuf,
    dictionary: Dictionary,
}

/// Registry of open dictionaries
///
/// Ids increase monotonically across the shelf's lifetime, so a removed id
/// never refers to a later dictionary. Every container on the shelf,
/// resource files included, reads through one node cache sized by the
/// shelf's [`ReaderConfig`].
pub struct Bookshelf {
    last_id: ShelfId,
    cache: Option<Arc<NodeCache>>,
    next_cache_id: CacheId,
    dictionaries: BTreeMap<ShelfId, Shelved>,
}

impl Bookshelf {
    pub fn new() -> Self {
        Self::with_config(ReaderConfig::default())
    }

    /// Dictionaries share one node cache sized by `config`
    pub fn with_config(config: ReaderConfig) -> Self {
        Bookshelf {
            last_id: 0,
            cache: config.node_cache(),
            next_cache_id: 0,
            dictionaries: BTreeMap::new(),
        }
    }

    /// Open a dictionary and shelve it
    pub fn add<P: AsRef<Path>>(&mut self, path: P) -> Result<ShelfId> {
        let path = path.as_ref();
        let dictionary = Dictionary::open_shared(path, self.cache.clone(), &mut self.next_cache_id)?;

        self.last_id += 1;
        let id = self.last_id;
        self.dictionaries.insert(
            id,
            Shelved {
                path: path.to_path_buf(),
                dictionary,
            },
        );
        info!("Shelved {:?} as #{}", path, id);
        Ok(id)
    }

    /// Close a dictionary; unknown ids are ignored
    pub fn remove(&mut self, id: ShelfId) -> bool {
        let removed = self.dictionaries.remove(&id);
        if let (Some(shelved), Some(cache)) = (&removed, &self.cache) {
            for cache_id in shelved.dictionary.cache_ids() {
                cache.evict(cache_id);
            }
        }
        debug!("Removed #{} from shelf: {}", id, removed.is_some());
        removed.is_some()
    }

    pub fn clear(&mut self) {
        self.dictionaries.clear();
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }

    /// Shelved ids in insertion order
    pub fn ids(&self) -> Vec<ShelfId> {
        self.dictionaries.keys().copied().collect()
    }

    pub fn get(&self, id: ShelfId) -> Option<&Dictionary> {
        self.dictionaries.get(&id).map(|s| &s.dictionary)
    }

    pub fn path(&self, id: ShelfId) -> Option<&Path> {
        self.dictionaries.get(&id).map(|s| s.path.as_path())
    }

    fn shelved(&self, id: ShelfId) -> Result<&Shelved> {
        self.dictionaries
            .get(&id)
            .ok_or_else(|| DictError::NotFound(format!("dictionary #{}", id)))
    }

    /// Look `name` up in one dictionary
    pub fn search(&self, id: ShelfId, name: &str) -> Result<Option<Vec<u8>>> {
        self.shelved(id)?.dictionary.lookup(name)
    }

    /// Look `name` up in the resource files of one dictionary
    pub fn search_resource(&self, id: ShelfId, name: &str) -> Result<Option<Vec<u8>>> {
        self.shelved(id)?.dictionary.lookup_resource(name)
    }

    /// Counters of the shared node cache
    pub fn cache_stats(&self) -> CacheStats {
        self.cache
            .as_deref()
            .map(NodeCache::stats)
            .unwrap_or_default()
    }

    /// Decoded node bytes currently held by the shared cache
    pub fn cached_bytes(&self) -> usize {
        self.cache.as_deref().map_or(0, NodeCache::bytes)
    }

    /// Look `name` up in every dictionary, in id order
    pub fn lookup_all(&self, name: &str) -> Result<Vec<(ShelfId, Vec<u8>)>> {
        let mut found = Vec::new();
        for (id, shelved) in &self.dictionaries {
            if let Some(value) = shelved.dictionary.lookup(name)? {
                found.push((*id, value));
            }
        }
        Ok(found)
    }
}

impl Default for Bookshelf {
    fn default() -> Self {
        Self::new()
    }
}
