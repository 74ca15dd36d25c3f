#![allow(missing_docs)]

use strata::{IndexStore, IndexTarget, Result, StoreConfig, StoreError};
use tempfile::tempdir;

fn index_store(dir: &std::path::Path) -> IndexStore {
    IndexStore::new(StoreConfig::rooted_at(dir))
}

fn key(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

#[test]
fn duplicate_insert_is_rejected_and_counted_once() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;

    indexes.add_entry_to_table_indexes("users", &[&key(7)], 3)?;
    let err = indexes
        .add_entry_to_index("users", "by_id", &key(7), 9)
        .expect_err("second insert of the same key");
    assert!(matches!(err, StoreError::DuplicateKey(_)), "got {err:?}");

    let metas = indexes.indexes_metadata("users")?;
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].key_count, 1, "duplicate must not double count");

    // The surviving entry still maps to the first page id.
    assert_eq!(indexes.find_entry("users", "by_id", &key(7))?, 3);
    Ok(())
}

#[test]
fn find_then_remove_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;

    indexes.add_entry_to_index("users", "by_id", &key(42), -7)?;
    assert_eq!(indexes.find_entry("users", "by_id", &key(42))?, -7);

    assert!(indexes.remove_entry_from_index("users", "by_id", &key(42))?);
    let err = indexes
        .find_entry("users", "by_id", &key(42))
        .expect_err("entry was removed");
    assert!(matches!(err, StoreError::NotFound("index entry")), "got {err:?}");
    Ok(())
}

#[test]
fn range_scan_returns_pages_in_key_order() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;

    // Inserted out of order; the scan must come back ascending by key.
    indexes.add_entry_to_index("users", "by_id", &key(30), 3)?;
    indexes.add_entry_to_index("users", "by_id", &key(10), 1)?;
    indexes.add_entry_to_index("users", "by_id", &key(20), 2)?;

    assert_eq!(indexes.scan_range("users", "by_id", &key(10), &key(30))?, vec![1, 2, 3]);
    assert_eq!(indexes.scan_range("users", "by_id", &key(20), &key(20))?, vec![2]);
    assert_eq!(indexes.scan_range("users", "by_id", &key(11), &key(19))?, Vec::<i32>::new());

    let err = indexes
        .scan_range("users", "by_id", b"xx", &key(30))
        .expect_err("bounds must be 4 bytes");
    assert!(matches!(err, StoreError::InvalidArgument(_)), "got {err:?}");
    Ok(())
}

#[test]
fn table_level_ops_follow_catalog_order() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;
    indexes.initialize_index("users", "by_age", "age", false)?;

    let id_key = key(1001);
    let age_key = key(34);
    indexes.add_entry_to_table_indexes("users", &[&id_key, &age_key], 12)?;

    assert_eq!(indexes.find_entry("users", "by_id", &id_key)?, 12);
    assert_eq!(indexes.find_entry("users", "by_age", &age_key)?, 12);

    let metas = indexes.indexes_metadata("users")?;
    assert_eq!(metas[0].name, "by_id");
    assert_eq!(metas[1].name, "by_age");
    assert!(metas.iter().all(|meta| meta.key_count == 1));

    let err = indexes
        .add_entry_to_table_indexes("users", &[&id_key], 13)
        .expect_err("one key for two indexes");
    assert!(matches!(err, StoreError::InvalidArgument(_)), "got {err:?}");
    Ok(())
}

#[test]
fn removal_bumps_update_counters() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;

    indexes.add_entry_to_table_indexes("users", &[&key(5)], 2)?;
    indexes.remove_entry_from_table_indexes("users", &[&key(5)])?;

    let meta = &indexes.indexes_metadata("users")?[0];
    assert_eq!(meta.update_count, 1);
    assert_eq!(meta.key_count, 0);

    // Removing an absent key still counts as churn, and the key count
    // saturates instead of wrapping.
    indexes.remove_entry_from_table_indexes("users", &[&key(5)])?;
    let meta = &indexes.indexes_metadata("users")?[0];
    assert_eq!(meta.update_count, 2);
    assert_eq!(meta.key_count, 0);
    Ok(())
}

#[test]
fn deleting_a_named_index_excises_it() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;
    indexes.initialize_index("users", "by_age", "age", false)?;

    assert!(indexes.index_size("users", "by_id")? > 0);

    indexes.delete_index("users", IndexTarget::Named("by_id"))?;

    let metas = indexes.indexes_metadata("users")?;
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].name, "by_age");

    let err = indexes.index_size("users", "by_id").expect_err("file removed");
    assert!(matches!(err, StoreError::NotFound("index file")), "got {err:?}");

    let err = indexes
        .delete_index("users", IndexTarget::Named("by_id"))
        .expect_err("already deleted");
    assert!(matches!(err, StoreError::NotFound("index")), "got {err:?}");
    Ok(())
}

#[test]
fn deleting_all_indexes_clears_the_catalog() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", true)?;
    indexes.initialize_index("users", "by_age", "age", false)?;

    indexes.delete_index("users", IndexTarget::AllForTable)?;

    assert!(indexes.indexes_metadata("users")?.is_empty());
    assert!(matches!(
        indexes.index_size("users", "by_id"),
        Err(StoreError::NotFound("index file"))
    ));
    assert!(matches!(
        indexes.index_size("users", "by_age"),
        Err(StoreError::NotFound("index file"))
    ));
    Ok(())
}

#[test]
fn update_metadata_overwrites_in_place() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;

    let mut meta = indexes.indexes_metadata("users")?[0].clone();
    meta.key_count = 99;
    indexes.update_index_metadata("users", "by_id", &meta)?;

    assert_eq!(indexes.indexes_metadata("users")?[0].key_count, 99);

    let err = indexes
        .update_index_metadata("users", "missing", &meta)
        .expect_err("unknown index");
    assert!(matches!(err, StoreError::NotFound("index")), "got {err:?}");
    Ok(())
}

#[test]
fn churned_index_becomes_a_rebuild_candidate() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;

    indexes.add_entry_to_table_indexes("users", &[&key(1)], 1)?;
    indexes.add_entry_to_table_indexes("users", &[&key(2)], 2)?;
    assert!(indexes.rebuild_candidates("users")?.is_empty());

    // One removal out of two entries ever live: 1/2 touched, past 30%.
    indexes.remove_entry_from_table_indexes("users", &[&key(1)])?;
    assert_eq!(indexes.rebuild_candidates("users")?, vec!["by_id".to_owned()]);

    indexes.rebuild_index("users", "by_id", &[(key(2).to_vec(), 2)])?;
    let meta = &indexes.indexes_metadata("users")?[0];
    assert_eq!(meta.update_count, 0);
    assert_eq!(meta.key_count, 1);
    assert!(indexes.rebuild_candidates("users")?.is_empty());

    // Rebuilt contents answer lookups; the churned-away key stays gone.
    assert_eq!(indexes.find_entry("users", "by_id", &key(2))?, 2);
    assert!(matches!(
        indexes.find_entry("users", "by_id", &key(1)),
        Err(StoreError::NotFound("index entry"))
    ));
    Ok(())
}

#[test]
fn index_size_grows_with_entries() -> Result<()> {
    let dir = tempdir()?;
    let indexes = index_store(dir.path());
    indexes.initialize_index("users", "by_id", "id", false)?;

    let empty = indexes.index_size("users", "by_id")?;
    for n in 0..16 {
        indexes.add_entry_to_index("users", "by_id", &key(n), n as i32)?;
    }
    assert!(indexes.index_size("users", "by_id")? > empty);
    Ok(())
}

#[test]
fn metadata_read_on_unindexed_table_fails() {
    let dir = tempdir().expect("temp dir");
    let indexes = index_store(dir.path());

    let err = indexes
        .indexes_metadata("nobody")
        .expect_err("no metadata file yet");
    assert!(
        matches!(err, StoreError::NotFound("index metadata file")),
        "got {err:?}"
    );
}
