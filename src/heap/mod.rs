//! Append-only, page-organized heap files storing rows as opaque byte
//! records.
//!
//! A heap file is an 8-byte header (`page_count`, `row_count`, big-endian)
//! followed by fixed 8192-byte pages. Rows are only ever appended; there are
//! no updates, deletions, or compaction. Every mutating call flushes with
//! `sync_data` before returning.

pub mod page;

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

pub use page::{RecordPage, MAX_ROW_LEN, PAGE_HEADER_SIZE, PAGE_SIZE};

/// Bytes at the front of a heap file holding the page and row counters.
pub const HEAP_HEADER_SIZE: usize = 8;

/// Decoded heap file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapHeader {
    /// Number of pages in the file; at least 1 once the heap is created.
    pub page_count: u32,
    /// Total records across all pages.
    pub row_count: u32,
}

impl HeapHeader {
    fn decode(buf: &[u8; HEAP_HEADER_SIZE]) -> Self {
        Self {
            page_count: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            row_count: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    fn encode(&self) -> [u8; HEAP_HEADER_SIZE] {
        let mut buf = [0u8; HEAP_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.page_count.to_be_bytes());
        buf[4..8].copy_from_slice(&self.row_count.to_be_bytes());
        buf
    }
}

/// Heap file manager: creates heaps, appends rows, and retrieves them by
/// page index or global row number.
///
/// Files are opened per call and released on every exit path; nothing is
/// cached between calls, so sequential calls against the same heap always
/// observe each other's effects.
#[derive(Debug, Clone)]
pub struct HeapStore {
    config: StoreConfig,
}

impl HeapStore {
    /// Builds a store over the given layout.
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Creates the named heap with an all-zero header and one empty page.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if a heap with this name is
    /// already present.
    pub fn create(&self, name: &str) -> Result<()> {
        fs::create_dir_all(&self.config.data_dir)?;
        let path = self.config.heap_path(name);
        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(format!("heap {name}")));
            }
            Err(err) => return Err(err.into()),
        };

        let mut header = HeapHeader {
            page_count: 0,
            row_count: 0,
        };
        file.write_all(&header.encode())?;
        append_page(&mut file, &mut header, &RecordPage::new())?;
        debug!(heap = name, "heap created");
        Ok(())
    }

    /// Appends `row` as a new record, growing the heap by one page when the
    /// last page cannot fit it.
    ///
    /// Fails with [`StoreError::RowTooLarge`] if the row would not fit even
    /// in an empty page; rows never span pages. The page rewrite and the
    /// header's row-count bump are flushed separately and are not atomic
    /// with each other; a crash between them leaves `row_count` one short of
    /// the records physically present.
    pub fn add_row(&self, name: &str, row: &[u8]) -> Result<()> {
        if row.len() > MAX_ROW_LEN {
            return Err(StoreError::RowTooLarge(row.len()));
        }

        let mut file = self.open_heap(name)?;
        let mut header = read_header(&mut file)?;

        let mut page_index = header.page_count.saturating_sub(1);
        let mut page = read_page(&mut file, page_index)?;
        if !page.can_fit(row.len()) {
            // One bounded retry: a fresh page fits any row that passed the
            // size check above.
            page = RecordPage::new();
            append_page(&mut file, &mut header, &page)?;
            page_index = header.page_count - 1;
            trace!(heap = name, page = page_index, "page appended for overflow row");
        }

        page.append_record(row)?;
        write_page(&mut file, page_index, &page)?;
        file.sync_data()?;

        header.row_count += 1;
        write_header(&mut file, &header)?;
        file.sync_data()?;
        trace!(
            heap = name,
            page = page_index,
            len = row.len(),
            rows = header.row_count,
            "row appended"
        );
        Ok(())
    }

    /// Returns every record of one page, in insertion order.
    pub fn page_rows(&self, name: &str, page_index: usize) -> Result<Vec<Vec<u8>>> {
        let mut file = self.open_heap(name)?;
        let header = read_header(&mut file)?;
        if page_index >= header.page_count as usize {
            return Err(StoreError::OutOfRange {
                what: "page",
                index: page_index,
            });
        }
        read_page(&mut file, page_index as u32)?.records()
    }

    /// Returns the row with the given global row number.
    ///
    /// Walks pages in ascending order, subtracting each page's record count
    /// from the remainder until the containing page is found, then scans
    /// that page linearly to the matching record.
    pub fn row(&self, name: &str, row_index: usize) -> Result<Vec<u8>> {
        let mut file = self.open_heap(name)?;
        let header = read_header(&mut file)?;
        if row_index >= header.row_count as usize {
            return Err(StoreError::OutOfRange {
                what: "row",
                index: row_index,
            });
        }

        let mut remaining = row_index;
        for page_index in 0..header.page_count {
            let page = read_page(&mut file, page_index)?;
            let count = page.record_count() as usize;
            if remaining < count {
                let mut cursor = PAGE_HEADER_SIZE;
                for _ in 0..remaining {
                    let (_, next) = page.record_at(cursor)?;
                    cursor = next;
                }
                let (payload, _) = page.record_at(cursor)?;
                return Ok(payload.to_vec());
            }
            remaining -= count;
        }

        Err(StoreError::Corruption(format!(
            "row {row_index} within header row count but absent from all pages"
        )))
    }

    /// Reads the heap's header counters.
    pub fn header(&self, name: &str) -> Result<HeapHeader> {
        let mut file = self.open_heap(name)?;
        read_header(&mut file)
    }

    fn open_heap(&self, name: &str) -> Result<File> {
        let path = self.config.heap_path(name);
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StoreError::NotFound("heap"),
                _ => StoreError::Io(err),
            })
    }
}

fn page_offset(page_index: u32) -> u64 {
    HEAP_HEADER_SIZE as u64 + u64::from(page_index) * PAGE_SIZE as u64
}

fn read_header(file: &mut File) -> Result<HeapHeader> {
    let mut buf = [0u8; HEAP_HEADER_SIZE];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut buf).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => StoreError::Corruption("heap header truncated".into()),
        _ => StoreError::Io(err),
    })?;
    Ok(HeapHeader::decode(&buf))
}

fn write_header(file: &mut File, header: &HeapHeader) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header.encode())?;
    Ok(())
}

fn read_page(file: &mut File, page_index: u32) -> Result<RecordPage> {
    let mut buf = vec![0u8; PAGE_SIZE];
    file.seek(SeekFrom::Start(page_offset(page_index)))?;
    file.read_exact(&mut buf).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => {
            StoreError::Corruption(format!("page {page_index} truncated"))
        }
        _ => StoreError::Io(err),
    })?;
    RecordPage::from_bytes(buf)
}

fn write_page(file: &mut File, page_index: u32, page: &RecordPage) -> Result<()> {
    file.seek(SeekFrom::Start(page_offset(page_index)))?;
    file.write_all(page.as_bytes())?;
    Ok(())
}

/// Writes `page` after the last existing page, bumps the header's page
/// count, and flushes both.
fn append_page(file: &mut File, header: &mut HeapHeader, page: &RecordPage) -> Result<()> {
    write_page(file, header.page_count, page)?;
    header.page_count += 1;
    write_header(file, header)?;
    file.sync_data()?;
    Ok(())
}
