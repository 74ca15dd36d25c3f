//! Ordered-map engine contract and the default file-backed engine.
//!
//! Each secondary index is physically a durable sorted key-to-value store.
//! The index layer depends only on the [`OrderedTree`] trait, so a B-tree,
//! an LSM structure, or any other durable sorted map can back it. The
//! bundled [`FileTree`] keeps the crate usable and testable standalone.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Durable sorted key-to-value store backing one index.
pub trait OrderedTree: Sized {
    /// Opens the tree file at `path`, creating it if absent.
    fn open(path: &Path, page_size: usize, order: usize) -> Result<Self>;
    /// Point lookup.
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    /// Inserts or replaces `key`.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
    /// Removes `key`, reporting whether it was present.
    fn delete(&mut self, key: &[u8]) -> Result<bool>;
    /// Releases the handle, flushing any buffered state.
    fn close(self) -> Result<()>;
}

const TREE_MAGIC: &[u8; 4] = b"TIDX";
const TREE_VERSION: u16 = 1;
// magic (4) + version (2) + reserved (2) + page size (4) + order (2)
const TREE_HEADER_SIZE: usize = 14;

/// Default ordered-map engine: an in-memory `BTreeMap` image of a single
/// file, loaded fully on open and rewritten with an fsync on every mutation.
#[derive(Debug)]
pub struct FileTree {
    path: PathBuf,
    page_size: u32,
    order: u16,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl OrderedTree for FileTree {
    fn open(path: &Path, page_size: usize, order: usize) -> Result<Self> {
        let page_size = u32::try_from(page_size)
            .map_err(|_| StoreError::InvalidArgument("tree page size exceeds u32".into()))?;
        let order = u16::try_from(order)
            .map_err(|_| StoreError::InvalidArgument("tree order exceeds u16".into()))?;

        match std::fs::read(path) {
            Ok(bytes) if bytes.is_empty() => {
                let tree = Self::fresh(path, page_size, order);
                tree.persist()?;
                Ok(tree)
            }
            Ok(bytes) => Self::decode(path, page_size, order, &bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let tree = Self::fresh(path, page_size, order);
                tree.persist()?;
                Ok(tree)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > u16::MAX as usize {
            return Err(StoreError::InvalidArgument(format!(
                "key of {} bytes exceeds the 65535-byte limit",
                key.len()
            )));
        }
        if value.len() > u16::MAX as usize {
            return Err(StoreError::InvalidArgument(format!(
                "value of {} bytes exceeds the 65535-byte limit",
                value.len()
            )));
        }
        self.entries.insert(key.to_vec(), value.to_vec());
        self.persist()
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let found = self.entries.remove(key).is_some();
        if found {
            self.persist()?;
        }
        Ok(found)
    }

    fn close(self) -> Result<()> {
        // Every mutation already reached disk; nothing is buffered.
        Ok(())
    }
}

impl FileTree {
    fn fresh(path: &Path, page_size: u32, order: u16) -> Self {
        Self {
            path: path.to_path_buf(),
            page_size,
            order,
            entries: BTreeMap::new(),
        }
    }

    fn decode(path: &Path, page_size: u32, order: u16, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TREE_HEADER_SIZE + 8 || &bytes[..TREE_MAGIC.len()] != TREE_MAGIC {
            return Err(StoreError::Corruption("tree file missing magic header".into()));
        }
        let version = read_u16_be(bytes, 4)?;
        if version != TREE_VERSION {
            return Err(StoreError::Corruption(format!(
                "unsupported tree format version {version}"
            )));
        }
        let stored_page_size = read_u32_be(bytes, 8)?;
        let stored_order = read_u16_be(bytes, 12)?;
        if stored_page_size != page_size || stored_order != order {
            return Err(StoreError::InvalidArgument(format!(
                "tree opened with page size {page_size} and order {order}, \
                 file holds {stored_page_size} and {stored_order}"
            )));
        }

        let mut cursor = TREE_HEADER_SIZE;
        let count = read_u64_be(bytes, cursor)?;
        cursor += 8;

        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key_len = read_u16_be(bytes, cursor)? as usize;
            cursor += 2;
            let key = read_slice(bytes, cursor, key_len)?.to_vec();
            cursor += key_len;
            let value_len = read_u16_be(bytes, cursor)? as usize;
            cursor += 2;
            let value = read_slice(bytes, cursor, value_len)?.to_vec();
            cursor += value_len;
            entries.insert(key, value);
        }

        Ok(Self {
            path: path.to_path_buf(),
            page_size,
            order,
            entries,
        })
    }

    fn persist(&self) -> Result<()> {
        let mut buf = Vec::with_capacity(TREE_HEADER_SIZE + 8 + 16 * self.entries.len());
        buf.extend_from_slice(TREE_MAGIC);
        buf.extend_from_slice(&TREE_VERSION.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // reserved
        buf.extend_from_slice(&self.page_size.to_be_bytes());
        buf.extend_from_slice(&self.order.to_be_bytes());
        buf.extend_from_slice(&(self.entries.len() as u64).to_be_bytes());
        for (key, value) in &self.entries {
            buf.extend_from_slice(&(key.len() as u16).to_be_bytes());
            buf.extend_from_slice(key);
            buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
            buf.extend_from_slice(value);
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(())
    }
}

fn read_slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| StoreError::Corruption("tree entry offset overflow".into()))?;
    buf.get(offset..end)
        .ok_or_else(|| StoreError::Corruption("tree file truncated".into()))
}

fn read_u16_be(buf: &[u8], offset: usize) -> Result<u16> {
    let slice = read_slice(buf, offset, 2)?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u32_be(buf: &[u8], offset: usize) -> Result<u32> {
    let slice = read_slice(buf, offset, 4)?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_u64_be(buf: &[u8], offset: usize) -> Result<u64> {
    let slice = read_slice(buf, offset, 8)?;
    let bytes: [u8; 8] = slice.try_into().expect("slice is 8 bytes");
    Ok(u64::from_be_bytes(bytes))
}
