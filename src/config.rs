use std::path::{Path, PathBuf};

/// Filesystem layout and ordered-tree tuning for a store.
///
/// Heap files live directly under `data_dir`, one per table. Each table's
/// indexes live in their own directory under `index_root`, next to that
/// table's `meta.data` catalog file.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding heap files.
    pub data_dir: PathBuf,
    /// Root directory for per-table index directories.
    pub index_root: PathBuf,
    /// Page size handed to the ordered-tree engine.
    pub tree_page_size: usize,
    /// Branching order handed to the ordered-tree engine.
    pub tree_order: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            index_root: PathBuf::from("indexes"),
            tree_page_size: 4096,
            tree_order: 128,
        }
    }
}

impl StoreConfig {
    /// Lays out heap files and index directories under a single root.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.to_path_buf(),
            index_root: root.join("indexes"),
            ..Self::default()
        }
    }

    pub(crate) fn heap_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub(crate) fn table_index_dir(&self, table: &str) -> PathBuf {
        self.index_root.join(table)
    }
}
