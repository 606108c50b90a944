//! Single-machine adapter (via the `fp-growth` crate).
//!
//! Mining is eager: `mine` returns with the full pattern list already
//! computed, so materialization only renders ids back into item names.
//! Encoding runs once in `prepare`; the engine copies its input, so that copy
//! happens in `stage`, outside the timed window.

use crate::adapters::render_itemsets;
use crate::dataset::{ItemCatalog, TransactionDataset};
use crate::{min_count, BenchError, BenchResult, Deadline, FrequentItemset, MiningBackend, MiningHandle};
use fp_growth::algorithm::FPGrowth;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

struct Prepared {
    catalog: Arc<ItemCatalog>,
    encoded: Vec<Vec<u32>>,
}

pub struct LocalAdapter {
    use_colnames: bool,
    prepared: Option<Prepared>,
    /// Engine built for the next `mine` call, keyed by its absolute threshold.
    staged: Option<(usize, FPGrowth<u32>)>,
}

impl LocalAdapter {
    pub fn new(use_colnames: bool) -> Self {
        Self {
            use_colnames,
            prepared: None,
            staged: None,
        }
    }

    fn prepared(&self) -> BenchResult<&Prepared> {
        self.prepared.as_ref().ok_or_else(|| {
            BenchError::BackendUnavailable("local backend used before prepare".into())
        })
    }
}

impl MiningBackend for LocalAdapter {
    fn name(&self) -> &str {
        "local"
    }

    fn is_lazy(&self) -> bool {
        false
    }

    fn prepare(&mut self, dataset: &TransactionDataset) -> BenchResult<()> {
        let catalog = ItemCatalog::build(dataset);
        let encoded = catalog.encode(dataset);
        tracing::debug!(
            transactions = encoded.len(),
            items = catalog.len(),
            "local backend prepared"
        );
        self.prepared = Some(Prepared {
            catalog: Arc::new(catalog),
            encoded,
        });
        self.staged = None;
        Ok(())
    }

    fn stage(&mut self, min_support: f64) -> BenchResult<()> {
        let prepared = self.prepared()?;
        let threshold = min_count(min_support, prepared.encoded.len());
        let engine = FPGrowth::<u32>::new(prepared.encoded.clone(), threshold);
        self.staged = Some((threshold, engine));
        Ok(())
    }

    fn mine(
        &mut self,
        min_support: f64,
        _deadline: Option<Deadline>,
    ) -> BenchResult<Box<dyn MiningHandle>> {
        let staged = self.staged.take();
        let prepared = self.prepared()?;
        let num_transactions = prepared.encoded.len();
        let threshold = min_count(min_support, num_transactions);
        let catalog = prepared.catalog.clone();

        let engine = match staged {
            Some((staged_threshold, engine)) if staged_threshold == threshold => engine,
            _ => FPGrowth::<u32>::new(prepared.encoded.clone(), threshold),
        };

        let patterns = panic::catch_unwind(AssertUnwindSafe(|| {
            let result = engine.find_frequent_patterns();
            let patterns: Vec<(Vec<u32>, usize)> = result
                .frequent_patterns()
                .iter()
                .map(|(items, count)| (items.to_vec(), *count))
                .collect();
            patterns
        }))
        .map_err(|_| BenchError::MiningFailure("fp-growth engine panicked".into()))?;

        Ok(Box::new(LocalHandle {
            patterns,
            catalog,
            use_colnames: self.use_colnames,
            num_transactions,
        }))
    }

    fn teardown(&mut self) -> BenchResult<()> {
        self.staged = None;
        self.prepared = None;
        Ok(())
    }
}

struct LocalHandle {
    patterns: Vec<(Vec<u32>, usize)>,
    catalog: Arc<ItemCatalog>,
    use_colnames: bool,
    num_transactions: usize,
}

impl MiningHandle for LocalHandle {
    fn materialize(self: Box<Self>, _deadline: Option<Deadline>) -> BenchResult<Vec<FrequentItemset>> {
        let LocalHandle {
            patterns,
            catalog,
            use_colnames,
            num_transactions,
        } = *self;
        Ok(render_itemsets(patterns, &catalog, use_colnames, num_transactions))
    }
}
