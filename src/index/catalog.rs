//! Per-table index metadata file: a fixed header followed by fixed-size
//! entries, one per index.
//!
//! Layout, big-endian: 24-byte header = table name (20, NUL-padded) +
//! entry count (u32); then one 52-byte record per index = index name (20) |
//! column name (20) | update count (u32) | delete count (u32) | key count
//! (u32). Entries are positional and contiguous, and the header count always
//! matches the number of entries physically present.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// File name of the per-table metadata file.
pub const META_FILE_NAME: &str = "meta.data";
/// Width of the fixed name fields in the header and entries.
pub const NAME_FIELD_LEN: usize = 20;
/// Bytes in the metadata file header.
pub const META_HEADER_SIZE: usize = NAME_FIELD_LEN + 4;
/// Bytes in one catalog entry.
pub const META_ENTRY_SIZE: usize = 2 * NAME_FIELD_LEN + 12;

/// One catalog record: an index, the column it covers, and usage counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Index name, at most 20 bytes.
    pub name: String,
    /// Indexed column name, at most 20 bytes.
    pub column: String,
    /// Entries touched by updates/deletes since creation or last rebuild.
    pub update_count: u32,
    /// Reserved deletion counter carried in the on-disk record.
    pub delete_count: u32,
    /// Live keys currently in the index.
    pub key_count: u32,
}

impl IndexMeta {
    /// Fresh entry for a newly initialized index, all counters zero.
    pub fn new(name: &str, column: &str) -> Self {
        Self {
            name: name.to_owned(),
            column: column.to_owned(),
            update_count: 0,
            delete_count: 0,
            key_count: 0,
        }
    }

    fn encode(&self) -> Result<[u8; META_ENTRY_SIZE]> {
        let mut buf = [0u8; META_ENTRY_SIZE];
        write_name(&mut buf[..NAME_FIELD_LEN], &self.name)?;
        write_name(&mut buf[NAME_FIELD_LEN..2 * NAME_FIELD_LEN], &self.column)?;
        buf[40..44].copy_from_slice(&self.update_count.to_be_bytes());
        buf[44..48].copy_from_slice(&self.delete_count.to_be_bytes());
        buf[48..52].copy_from_slice(&self.key_count.to_be_bytes());
        Ok(buf)
    }

    fn decode(buf: &[u8; META_ENTRY_SIZE]) -> Result<Self> {
        Ok(Self {
            name: read_name(&buf[..NAME_FIELD_LEN])?,
            column: read_name(&buf[NAME_FIELD_LEN..2 * NAME_FIELD_LEN])?,
            update_count: read_u32_be(buf, 40),
            delete_count: read_u32_be(buf, 44),
            key_count: read_u32_be(buf, 48),
        })
    }
}

/// Handle to one table's metadata file.
///
/// The coordinator serializes every use of a `Catalog` behind the owning
/// table's lock; nothing here takes locks of its own.
pub struct Catalog {
    table: String,
    path: PathBuf,
}

impl Catalog {
    /// Binds a catalog handle to `table`'s metadata file inside `dir`.
    pub fn new(table: &str, dir: &Path) -> Self {
        Self {
            table: table.to_owned(),
            path: dir.join(META_FILE_NAME),
        }
    }

    /// Creates the metadata file with a zero-entry header if absent.
    pub fn create_if_absent(&self) -> Result<()> {
        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut header = [0u8; META_HEADER_SIZE];
        write_name(&mut header[..NAME_FIELD_LEN], &self.table)?;
        file.write_all(&header)?;
        file.sync_data()?;
        Ok(())
    }

    /// Reads every entry, in positional order.
    pub fn read_all(&self) -> Result<Vec<IndexMeta>> {
        let mut file = self.open()?;
        let count = self.read_count(&mut file)?;

        let mut entries = Vec::with_capacity(count as usize);
        let mut buf = [0u8; META_ENTRY_SIZE];
        for slot in 0..count {
            file.seek(SeekFrom::Start(entry_offset(slot)))?;
            file.read_exact(&mut buf).map_err(|err| match err.kind() {
                ErrorKind::UnexpectedEof => StoreError::Corruption(format!(
                    "metadata file lists {count} entries but entry {slot} is truncated"
                )),
                _ => StoreError::Io(err),
            })?;
            entries.push(IndexMeta::decode(&buf)?);
        }
        Ok(entries)
    }

    /// Appends one entry and bumps the header count, durably.
    pub fn append(&self, meta: &IndexMeta) -> Result<()> {
        let mut file = self.open()?;
        let count = self.read_count(&mut file)?;

        file.seek(SeekFrom::Start(entry_offset(count)))?;
        file.write_all(&meta.encode()?)?;
        write_count(&mut file, count + 1)?;
        file.sync_data()?;
        Ok(())
    }

    /// Overwrites the named entry in place, durably.
    ///
    /// Fails with [`StoreError::NotFound`] if no entry carries the name.
    pub fn update(&self, index_name: &str, meta: &IndexMeta) -> Result<()> {
        let slot = self
            .read_all()?
            .iter()
            .position(|entry| entry.name == index_name)
            .ok_or(StoreError::NotFound("index"))? as u32;

        let mut file = self.open()?;
        file.seek(SeekFrom::Start(entry_offset(slot)))?;
        file.write_all(&meta.encode()?)?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrites the whole entry region, corrects the header count, and
    /// truncates the tail, durably.
    pub fn write_all(&self, entries: &[IndexMeta]) -> Result<()> {
        let count = u32::try_from(entries.len())
            .map_err(|_| StoreError::InvalidArgument("too many catalog entries".into()))?;

        let mut file = self.open()?;
        file.seek(SeekFrom::Start(META_HEADER_SIZE as u64))?;
        for meta in entries {
            file.write_all(&meta.encode()?)?;
        }
        write_count(&mut file, count)?;
        file.set_len(entry_offset(count))?;
        file.sync_data()?;
        Ok(())
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StoreError::NotFound("index metadata file"),
                _ => StoreError::Io(err),
            })
    }

    fn read_count(&self, file: &mut File) -> Result<u32> {
        let mut header = [0u8; META_HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header).map_err(|err| match err.kind() {
            ErrorKind::UnexpectedEof => {
                StoreError::Corruption("metadata header truncated".into())
            }
            _ => StoreError::Io(err),
        })?;

        let stored_table = read_name(&header[..NAME_FIELD_LEN])?;
        if stored_table != self.table {
            return Err(StoreError::Corruption(format!(
                "metadata file belongs to table {stored_table:?}, expected {:?}",
                self.table
            )));
        }
        Ok(read_u32_be(&header, NAME_FIELD_LEN))
    }
}

fn entry_offset(slot: u32) -> u64 {
    META_HEADER_SIZE as u64 + u64::from(slot) * META_ENTRY_SIZE as u64
}

fn write_count(file: &mut File, count: u32) -> Result<()> {
    file.seek(SeekFrom::Start(NAME_FIELD_LEN as u64))?;
    file.write_all(&count.to_be_bytes())?;
    Ok(())
}

fn write_name(field: &mut [u8], name: &str) -> Result<()> {
    if name.len() > field.len() {
        return Err(StoreError::InvalidArgument(format!(
            "name {name:?} exceeds the {}-byte field",
            field.len()
        )));
    }
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(())
}

fn read_name(field: &[u8]) -> Result<String> {
    let trimmed = field.split(|&b| b == 0).next().unwrap_or(&[]);
    std::str::from_utf8(trimmed)
        .map(str::to_owned)
        .map_err(|_| StoreError::Corruption("name field is not valid UTF-8".into()))
}

fn read_u32_be(buf: &[u8], offset: usize) -> u32 {
    let bytes: [u8; 4] = buf[offset..offset + 4].try_into().expect("slice is 4 bytes");
    u32::from_be_bytes(bytes)
}
