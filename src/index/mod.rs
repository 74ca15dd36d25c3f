//! Routes key insert/remove/lookup/range-scan operations to the per-index
//! ordered trees of a table and keeps the catalog counters in sync.
//!
//! Index discovery goes through the per-table catalog file; the backing
//! sorted structures are reached only through the [`OrderedTree`] contract,
//! so the physical engine is swappable. The per-table metadata lock is held
//! for catalog read-modify-writes and never across an engine call.

pub mod catalog;

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::tree::{FileTree, OrderedTree};

pub use catalog::{Catalog, IndexMeta};

const INDEX_FILE_SUFFIX: &str = ".data";

/// Fraction of an index's entries touched by updates/deletes beyond which
/// it becomes a rebuild candidate.
///
/// Nothing triggers a rebuild automatically; [`IndexStore::rebuild_candidates`]
/// and [`IndexStore::rebuild_index`] are explicit maintenance operations.
pub const INDEX_REBUILD_THRESHOLD: f64 = 0.30;

/// Which indexes of a table an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTarget<'a> {
    /// A single named index.
    Named(&'a str),
    /// Every index of the table (the clustered convention).
    AllForTable,
}

/// Index entry coordinator, generic over the ordered-map engine.
///
/// Tree handles are opened per call and released on every exit path. The
/// only shared in-process state is the per-table metadata lock registry;
/// concurrent writers across processes are unsupported.
pub struct IndexStore<T: OrderedTree = FileTree> {
    config: StoreConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    _engine: PhantomData<fn() -> T>,
}

impl<T: OrderedTree> IndexStore<T> {
    /// Builds a coordinator over the given layout.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
            _engine: PhantomData,
        }
    }

    /// Creates an index for `(table, column)` and registers it in the
    /// table's catalog.
    ///
    /// The index directory, the backing tree file, and the metadata file are
    /// each created if absent. The `clustered` flag has no on-disk
    /// representation; clustered behavior surfaces through
    /// [`IndexTarget::AllForTable`].
    pub fn initialize_index(
        &self,
        table: &str,
        index_name: &str,
        column: &str,
        clustered: bool,
    ) -> Result<()> {
        fs::create_dir_all(self.index_dir(table))?;
        let tree = self.open_tree(table, index_name)?;
        tree.close()?;

        let lock = self.table_lock(table);
        let _guard = lock.lock();
        let catalog = self.catalog(table);
        catalog.create_if_absent()?;
        catalog.append(&IndexMeta::new(index_name, column))?;
        debug!(table, index = index_name, column, clustered, "index initialized");
        Ok(())
    }

    /// Inserts `key -> page_id` into one named index.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if the key is already
    /// present; keys are unique within an index.
    pub fn add_entry_to_index(
        &self,
        table: &str,
        index_name: &str,
        key: &[u8],
        page_id: i32,
    ) -> Result<()> {
        let mut tree = self.open_tree(table, index_name)?;
        if tree.get(key)?.is_some() {
            return Err(StoreError::DuplicateKey(index_name.to_owned()));
        }
        tree.put(key, &encode_page_id(page_id))?;
        tree.close()?;
        trace!(table, index = index_name, page_id, "index entry added");
        Ok(())
    }

    /// Inserts `keys[i]` into the table's `i`-th catalog index and bumps
    /// each entry's key count, rewriting the catalog once at the end.
    ///
    /// `keys` must line up positionally with the catalog order (see
    /// [`IndexStore::indexes_metadata`]); the caller builds that array from
    /// the table's schema.
    pub fn add_entry_to_table_indexes(
        &self,
        table: &str,
        keys: &[impl AsRef<[u8]>],
        page_id: i32,
    ) -> Result<()> {
        let lock = self.table_lock(table);
        let mut entries = {
            let _guard = lock.lock();
            self.catalog(table).read_all()?
        };
        if keys.len() != entries.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} keys supplied for {} catalog indexes",
                keys.len(),
                entries.len()
            )));
        }

        for (meta, key) in entries.iter_mut().zip(keys) {
            self.add_entry_to_index(table, &meta.name, key.as_ref(), page_id)?;
            meta.key_count += 1;
        }

        let _guard = lock.lock();
        self.catalog(table).write_all(&entries)?;
        trace!(table, page_id, indexes = entries.len(), "entry added to table indexes");
        Ok(())
    }

    /// Removes one key from one index, reporting whether it was present.
    pub fn remove_entry_from_index(
        &self,
        table: &str,
        index_name: &str,
        key: &[u8],
    ) -> Result<bool> {
        let mut tree = self.open_tree(table, index_name)?;
        let found = tree.delete(key)?;
        tree.close()?;
        trace!(table, index = index_name, found, "index entry removed");
        Ok(found)
    }

    /// Removes `keys[i]` from the `i`-th catalog index; bumps each entry's
    /// update counter and drops its key count.
    ///
    /// Counters move whether or not the key was present; key counts
    /// saturate at zero.
    pub fn remove_entry_from_table_indexes(
        &self,
        table: &str,
        keys: &[impl AsRef<[u8]>],
    ) -> Result<()> {
        let lock = self.table_lock(table);
        let mut entries = {
            let _guard = lock.lock();
            self.catalog(table).read_all()?
        };
        if keys.len() != entries.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} keys supplied for {} catalog indexes",
                keys.len(),
                entries.len()
            )));
        }

        for (meta, key) in entries.iter_mut().zip(keys) {
            self.remove_entry_from_index(table, &meta.name, key.as_ref())?;
            meta.update_count += 1;
            meta.key_count = meta.key_count.saturating_sub(1);
        }

        let _guard = lock.lock();
        self.catalog(table).write_all(&entries)?;
        trace!(table, indexes = entries.len(), "entry removed from table indexes");
        Ok(())
    }

    /// Point lookup of `key` in the named index.
    pub fn find_entry(&self, table: &str, index_name: &str, key: &[u8]) -> Result<i32> {
        let mut tree = self.open_tree(table, index_name)?;
        let value = tree.get(key)?;
        tree.close()?;
        let value = value.ok_or(StoreError::NotFound("index entry"))?;
        decode_page_id(&value)
    }

    /// Collects page ids for every key in `[start_key, end_key]`, ascending
    /// by key.
    ///
    /// Both bounds must be exactly four bytes and are read as big-endian
    /// u32; every integer in the closed interval is probed individually, so
    /// the scan is only meaningful for indexes keyed by 4-byte integers.
    pub fn scan_range(
        &self,
        table: &str,
        index_name: &str,
        start_key: &[u8],
        end_key: &[u8],
    ) -> Result<Vec<i32>> {
        let start = scan_bound(start_key)?;
        let end = scan_bound(end_key)?;

        let mut tree = self.open_tree(table, index_name)?;
        let mut pages = Vec::new();
        for probe in start..=end {
            if let Some(value) = tree.get(&probe.to_be_bytes())? {
                pages.push(decode_page_id(&value)?);
            }
        }
        tree.close()?;
        trace!(table, index = index_name, hits = pages.len(), "range scan");
        Ok(pages)
    }

    /// Deletes one index or every index of the table: backing files are
    /// removed and the matching catalog entries excised, with the header
    /// count corrected.
    pub fn delete_index(&self, table: &str, target: IndexTarget<'_>) -> Result<()> {
        let lock = self.table_lock(table);
        let _guard = lock.lock();
        let catalog = self.catalog(table);
        let entries = catalog.read_all()?;

        let (doomed, kept): (Vec<_>, Vec<_>) = match target {
            IndexTarget::Named(name) => {
                if !entries.iter().any(|entry| entry.name == name) {
                    return Err(StoreError::NotFound("index"));
                }
                entries.into_iter().partition(|entry| entry.name == name)
            }
            IndexTarget::AllForTable => (entries, Vec::new()),
        };

        for meta in &doomed {
            let path = self.index_path(table, &meta.name);
            fs::remove_file(&path).map_err(|err| match err.kind() {
                ErrorKind::NotFound => StoreError::NotFound("index file"),
                _ => StoreError::Io(err),
            })?;
        }
        catalog.write_all(&kept)?;
        debug!(table, removed = doomed.len(), remaining = kept.len(), "index deleted");
        Ok(())
    }

    /// Lists the table's catalog entries in positional order.
    pub fn indexes_metadata(&self, table: &str) -> Result<Vec<IndexMeta>> {
        let lock = self.table_lock(table);
        let _guard = lock.lock();
        self.catalog(table).read_all()
    }

    /// Overwrites one catalog entry in place.
    pub fn update_index_metadata(
        &self,
        table: &str,
        index_name: &str,
        meta: &IndexMeta,
    ) -> Result<()> {
        let lock = self.table_lock(table);
        let _guard = lock.lock();
        self.catalog(table).update(index_name, meta)
    }

    /// Size in bytes of the index's backing file.
    pub fn index_size(&self, table: &str, index_name: &str) -> Result<u64> {
        let path = self.index_path(table, index_name);
        let metadata = fs::metadata(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound("index file"),
            _ => StoreError::Io(err),
        })?;
        Ok(metadata.len())
    }

    /// Names of indexes whose touched-entry fraction exceeds
    /// [`INDEX_REBUILD_THRESHOLD`].
    pub fn rebuild_candidates(&self, table: &str) -> Result<Vec<String>> {
        let entries = self.indexes_metadata(table)?;
        Ok(entries
            .into_iter()
            .filter(|meta| {
                let touched = f64::from(meta.update_count);
                let total = u64::from(meta.key_count) + u64::from(meta.update_count);
                total > 0 && touched / total as f64 > INDEX_REBUILD_THRESHOLD
            })
            .map(|meta| meta.name)
            .collect())
    }

    /// Recreates the index's backing structure from the supplied live
    /// entries and resets its counters.
    ///
    /// Callers harvest `entries` themselves, typically from a heap scan;
    /// nothing invokes this automatically.
    pub fn rebuild_index(
        &self,
        table: &str,
        index_name: &str,
        entries: &[(Vec<u8>, i32)],
    ) -> Result<()> {
        let lock = self.table_lock(table);
        let mut meta = {
            let _guard = lock.lock();
            self.catalog(table)
                .read_all()?
                .into_iter()
                .find(|entry| entry.name == index_name)
                .ok_or(StoreError::NotFound("index"))?
        };

        let path = self.index_path(table, index_name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let mut tree = self.open_tree(table, index_name)?;
        for (key, page_id) in entries {
            tree.put(key, &encode_page_id(*page_id))?;
        }
        tree.close()?;

        meta.update_count = 0;
        meta.key_count = u32::try_from(entries.len())
            .map_err(|_| StoreError::InvalidArgument("too many rebuild entries".into()))?;
        let _guard = lock.lock();
        self.catalog(table).update(index_name, &meta)?;
        debug!(table, index = index_name, keys = entries.len(), "index rebuilt");
        Ok(())
    }

    fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(table.to_owned()).or_default())
    }

    fn index_dir(&self, table: &str) -> PathBuf {
        self.config.table_index_dir(table)
    }

    fn index_path(&self, table: &str, index_name: &str) -> PathBuf {
        self.index_dir(table)
            .join(format!("{index_name}{INDEX_FILE_SUFFIX}"))
    }

    fn open_tree(&self, table: &str, index_name: &str) -> Result<T> {
        T::open(
            &self.index_path(table, index_name),
            self.config.tree_page_size,
            self.config.tree_order,
        )
    }

    fn catalog(&self, table: &str) -> Catalog {
        Catalog::new(table, &self.index_dir(table))
    }
}

fn encode_page_id(page_id: i32) -> [u8; 4] {
    (page_id as u32).to_be_bytes()
}

fn decode_page_id(value: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = value.try_into().map_err(|_| {
        StoreError::Corruption(format!("index value is {} bytes, expected 4", value.len()))
    })?;
    Ok(i32::from_be_bytes(bytes))
}

fn scan_bound(key: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = key.try_into().map_err(|_| {
        StoreError::InvalidArgument(format!(
            "range scan key must be 4 bytes, got {}",
            key.len()
        ))
    })?;
    Ok(u32::from_be_bytes(bytes))
}
