//! Transaction dataset loading and item encoding.
//!
//! File format: one transaction per line, items separated by a single space,
//! no header, no escaping. Lines are not validated: duplicate items, empty
//! lines and empty items (from doubled spaces) pass through unchanged.

use crate::{BenchError, BenchResult};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Immutable, ordered list of transactions loaded from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDataset {
    path: PathBuf,
    transactions: Vec<Vec<String>>,
}

impl TransactionDataset {
    pub fn from_transactions(path: impl Into<PathBuf>, transactions: Vec<Vec<String>>) -> Self {
        Self {
            path: path.into(),
            transactions,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn transactions(&self) -> &[Vec<String>] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Number of distinct item identifiers across all transactions.
    pub fn distinct_items(&self) -> usize {
        self.transactions
            .iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Read `path` into a dataset. Trailing whitespace is stripped from each line
/// before splitting on `' '`.
pub fn load(path: &Path) -> BenchResult<TransactionDataset> {
    let data_load = |source| BenchError::DataLoad {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(data_load)?;
    let mut transactions = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(data_load)?;
        let items = line.trim_end().split(' ').map(str::to_string).collect();
        transactions.push(items);
    }

    tracing::debug!(
        path = %path.display(),
        transactions = transactions.len(),
        "dataset loaded"
    );
    Ok(TransactionDataset::from_transactions(path, transactions))
}

// ────────────────────────────────────────────────────────────────────────────────
// Encoding
// ────────────────────────────────────────────────────────────────────────────────

/// Column mapping between item names and dense integer ids.
///
/// Ids follow sorted item-name order, the column order of a one-hot encoder,
/// so two backends encoding the same file agree on every id.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl ItemCatalog {
    pub fn build(dataset: &TransactionDataset) -> Self {
        let names: Vec<String> = dataset
            .transactions()
            .iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect();
        let ids = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as u32))
            .collect();
        Self { names, ids }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn id(&self, item: &str) -> Option<u32> {
        self.ids.get(item).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// Encode every transaction as a sorted, de-duplicated id list.
    pub fn encode(&self, dataset: &TransactionDataset) -> Vec<Vec<u32>> {
        dataset
            .transactions()
            .iter()
            .map(|t| {
                let mut row: Vec<u32> = t.iter().filter_map(|item| self.id(item)).collect();
                row.sort_unstable();
                row.dedup();
                row
            })
            .collect()
    }

    /// Render encoded items for a result, sorted for stable output.
    pub fn render(&self, ids: &[u32], use_names: bool) -> Vec<String> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted
            .into_iter()
            .map(|id| match (use_names, self.name(id)) {
                (true, Some(name)) => name.to_string(),
                _ => id.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_load_splits_on_single_space() {
        let f = write_file("a b\na c\na b c\n");
        let ds = load(f.path()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.transactions()[2], vec!["a", "b", "c"]);
        assert_eq!(ds.distinct_items(), 3);
    }

    #[test]
    fn test_load_strips_trailing_whitespace_only() {
        let f = write_file("a b  \r\n x y\n");
        let ds = load(f.path()).unwrap();
        assert_eq!(ds.transactions()[0], vec!["a", "b"]);
        assert_eq!(ds.transactions()[1], vec!["", "x", "y"]);
    }

    #[test]
    fn test_imperfect_lines_pass_through() {
        let f = write_file("a a b\n\nc  d\n");
        let ds = load(f.path()).unwrap();
        assert_eq!(ds.transactions()[0], vec!["a", "a", "b"]);
        assert_eq!(ds.transactions()[1], vec![""]);
        assert_eq!(ds.transactions()[2], vec!["c", "", "d"]);
    }

    #[test]
    fn test_load_is_idempotent() {
        let f = write_file("milk bread\nbread eggs\nmilk eggs bread\n");
        let first = load(f.path()).unwrap();
        let second = load(f.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_file_is_data_load_error() {
        let err = load(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, BenchError::DataLoad { .. }));
    }

    #[test]
    fn test_catalog_sorted_ids_and_dedup() {
        let ds = TransactionDataset::from_transactions(
            "mem",
            vec![
                vec!["c".into(), "a".into(), "c".into()],
                vec!["b".into()],
            ],
        );
        let catalog = ItemCatalog::build(&ds);
        assert_eq!(catalog.id("a"), Some(0));
        assert_eq!(catalog.id("b"), Some(1));
        assert_eq!(catalog.id("c"), Some(2));
        assert_eq!(catalog.encode(&ds), vec![vec![0, 2], vec![1]]);
        assert_eq!(catalog.render(&[2, 0], true), vec!["a", "c"]);
        assert_eq!(catalog.render(&[2, 0], false), vec!["0", "2"]);
    }
}
