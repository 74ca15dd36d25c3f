use crate::error::{Result, StoreError};

/// Fixed size of every heap page in bytes.
pub const PAGE_SIZE: usize = 8192;
/// Bytes reserved at the front of each page for the header.
pub const PAGE_HEADER_SIZE: usize = 4;
/// Bytes prefixed to every record to carry its payload size.
pub(crate) const RECORD_PREFIX_SIZE: usize = 2;
/// Largest payload that fits in an otherwise empty page.
pub const MAX_ROW_LEN: usize = PAGE_SIZE - PAGE_HEADER_SIZE - RECORD_PREFIX_SIZE;

/// An 8192-byte heap page: a 4-byte header followed by length-prefixed
/// records.
///
/// Header layout, big-endian: bytes 0-1 hold the offset of the first free
/// byte (4 for an empty page), bytes 2-3 hold the record count. Records are
/// `[size: u16][payload]`, packed contiguously from offset 4. There is no
/// slot array and no free list; space comes back only by appending pages.
#[derive(Debug, Clone)]
pub struct RecordPage {
    data: Vec<u8>,
}

impl RecordPage {
    /// Creates a zeroed page with an initialized header.
    pub fn new() -> Self {
        let mut data = vec![0u8; PAGE_SIZE];
        data[0..2].copy_from_slice(&(PAGE_HEADER_SIZE as u16).to_be_bytes());
        Self { data }
    }

    /// Wraps a raw page buffer, rejecting anything that is not exactly
    /// [`PAGE_SIZE`] bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(StoreError::Corruption(format!(
                "page buffer is {} bytes, expected {PAGE_SIZE}",
                data.len()
            )));
        }
        Ok(Self { data })
    }

    /// Offset of the first free byte.
    pub fn free_space_offset(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    /// Number of records stored in the page.
    pub fn record_count(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// Bytes still free at the tail of the page.
    pub fn free_space(&self) -> usize {
        PAGE_SIZE - self.free_space_offset() as usize
    }

    /// Whether a payload of `len` bytes plus its size prefix fits.
    pub fn can_fit(&self, len: usize) -> bool {
        len + RECORD_PREFIX_SIZE <= self.free_space()
    }

    /// Appends one length-prefixed record and bumps both header fields.
    pub fn append_record(&mut self, row: &[u8]) -> Result<()> {
        if !self.can_fit(row.len()) {
            return Err(StoreError::InvalidArgument(format!(
                "record of {} bytes does not fit in {} free bytes",
                row.len(),
                self.free_space()
            )));
        }
        let offset = self.free_space_offset() as usize;
        self.data[offset..offset + RECORD_PREFIX_SIZE]
            .copy_from_slice(&(row.len() as u16).to_be_bytes());
        self.data[offset + RECORD_PREFIX_SIZE..offset + RECORD_PREFIX_SIZE + row.len()]
            .copy_from_slice(row);

        let next_free = (offset + RECORD_PREFIX_SIZE + row.len()) as u16;
        let count = self.record_count() + 1;
        self.data[0..2].copy_from_slice(&next_free.to_be_bytes());
        self.data[2..4].copy_from_slice(&count.to_be_bytes());
        Ok(())
    }

    /// Decodes every record in insertion order.
    ///
    /// Walks from offset 4 reading exactly `record_count` length-prefixed
    /// records; trailing free space is never interpreted.
    pub fn records(&self) -> Result<Vec<Vec<u8>>> {
        let count = self.record_count() as usize;
        let mut records = Vec::with_capacity(count);
        let mut cursor = PAGE_HEADER_SIZE;
        for _ in 0..count {
            let (payload, next) = self.record_at(cursor)?;
            records.push(payload.to_vec());
            cursor = next;
        }
        Ok(records)
    }

    /// Reads the length-prefixed record starting at `cursor`, returning the
    /// payload and the offset of the record that follows it.
    pub(crate) fn record_at(&self, cursor: usize) -> Result<(&[u8], usize)> {
        if cursor + RECORD_PREFIX_SIZE > PAGE_SIZE {
            return Err(StoreError::Corruption(
                "record size prefix extends past page".into(),
            ));
        }
        let size = u16::from_be_bytes([self.data[cursor], self.data[cursor + 1]]) as usize;
        let start = cursor + RECORD_PREFIX_SIZE;
        let end = start + size;
        if end > PAGE_SIZE {
            return Err(StoreError::Corruption(format!(
                "record of {size} bytes at offset {cursor} extends past page"
            )));
        }
        Ok((&self.data[start..end], end))
    }

    /// Raw page bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for RecordPage {
    fn default() -> Self {
        Self::new()
    }
}
