#![allow(missing_docs)]

use proptest::prelude::*;
use strata::{HeapStore, Result, StoreConfig, StoreError, HEAP_HEADER_SIZE, MAX_ROW_LEN, PAGE_SIZE};
use tempfile::tempdir;

fn heap_store(dir: &std::path::Path) -> HeapStore {
    HeapStore::new(StoreConfig::rooted_at(dir))
}

#[test]
fn create_rejects_existing_heap() -> Result<()> {
    let dir = tempdir()?;
    let heaps = heap_store(dir.path());

    heaps.create("t")?;
    let err = heaps.create("t").expect_err("second create must collide");
    assert!(matches!(err, StoreError::AlreadyExists(_)), "got {err:?}");

    // The first create stays intact: header plus exactly one page.
    let len = std::fs::metadata(dir.path().join("t"))?.len();
    assert_eq!(len, (HEAP_HEADER_SIZE + PAGE_SIZE) as u64);
    Ok(())
}

#[test]
fn two_rows_share_the_first_page() -> Result<()> {
    let dir = tempdir()?;
    let heaps = heap_store(dir.path());
    heaps.create("t")?;

    let first: Vec<u8> = (1..=10).collect();
    let second: Vec<u8> = (11..=20).collect();
    heaps.add_row("t", &first)?;
    heaps.add_row("t", &second)?;

    assert_eq!(heaps.page_rows("t", 0)?, vec![first.clone(), second.clone()]);
    assert_eq!(heaps.row("t", 0)?, first);
    assert_eq!(heaps.row("t", 1)?, second);

    let header = heaps.header("t")?;
    assert_eq!(header.page_count, 1);
    assert_eq!(header.row_count, 2);
    Ok(())
}

#[test]
fn oversized_row_is_rejected_before_any_write() -> Result<()> {
    let dir = tempdir()?;
    let heaps = heap_store(dir.path());
    heaps.create("t")?;

    let err = heaps
        .add_row("t", &vec![0u8; MAX_ROW_LEN + 1])
        .expect_err("row larger than an empty page");
    assert!(matches!(err, StoreError::RowTooLarge(_)), "got {err:?}");

    assert_eq!(heaps.header("t")?.row_count, 0);
    Ok(())
}

#[test]
fn max_size_row_round_trips() -> Result<()> {
    let dir = tempdir()?;
    let heaps = heap_store(dir.path());
    heaps.create("t")?;

    let row = vec![0xAB; MAX_ROW_LEN];
    heaps.add_row("t", &row)?;
    assert_eq!(heaps.row("t", 0)?, row);

    // The first page is now exactly full; the next row must open page 1.
    heaps.add_row("t", b"next")?;
    let header = heaps.header("t")?;
    assert_eq!(header.page_count, 2);
    assert_eq!(heaps.page_rows("t", 1)?, vec![b"next".to_vec()]);
    Ok(())
}

#[test]
fn rows_spill_onto_fresh_pages_in_order() -> Result<()> {
    let dir = tempdir()?;
    let heaps = heap_store(dir.path());
    heaps.create("t")?;

    // Each record occupies 3002 bytes with its prefix, so two fit per page
    // and the third spills.
    let rows: Vec<Vec<u8>> = (0u8..5).map(|tag| vec![tag; 3000]).collect();
    for row in &rows {
        heaps.add_row("t", row)?;
    }

    let header = heaps.header("t")?;
    assert_eq!(header.page_count, 3);
    assert_eq!(header.row_count, 5);

    assert_eq!(heaps.page_rows("t", 0)?, vec![rows[0].clone(), rows[1].clone()]);
    assert_eq!(heaps.page_rows("t", 1)?, vec![rows[2].clone(), rows[3].clone()]);
    assert_eq!(heaps.page_rows("t", 2)?, vec![rows[4].clone()]);

    // Global row numbers are stable across the page boundaries.
    for (index, row) in rows.iter().enumerate() {
        assert_eq!(&heaps.row("t", index)?, row, "row {index}");
    }
    Ok(())
}

#[test]
fn out_of_range_reads_fail() -> Result<()> {
    let dir = tempdir()?;
    let heaps = heap_store(dir.path());
    heaps.create("t")?;
    heaps.add_row("t", b"only row")?;

    let err = heaps.row("t", 1).expect_err("row index == row count");
    assert!(
        matches!(err, StoreError::OutOfRange { what: "row", index: 1 }),
        "got {err:?}"
    );

    let err = heaps.page_rows("t", 1).expect_err("page index == page count");
    assert!(
        matches!(err, StoreError::OutOfRange { what: "page", index: 1 }),
        "got {err:?}"
    );
    Ok(())
}

#[test]
fn reads_against_a_missing_heap_fail() {
    let dir = tempdir().expect("temp dir");
    let heaps = heap_store(dir.path());

    let err = heaps.row("absent", 0).expect_err("no heap file");
    assert!(matches!(err, StoreError::NotFound("heap")), "got {err:?}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_row_round_trips(row in proptest::collection::vec(any::<u8>(), 0..=2048)) {
        let dir = tempdir().expect("temp dir");
        let heaps = heap_store(dir.path());
        heaps.create("t").expect("create heap");
        heaps.add_row("t", &row).expect("add row");
        prop_assert_eq!(heaps.row("t", 0).expect("read row"), row);
    }
}
