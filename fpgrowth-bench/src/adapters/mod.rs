//! Mining backend adapters.

pub mod cluster_adapter;
pub mod local_adapter;

use crate::config::{BackendConfig, BackendKind};
use crate::dataset::ItemCatalog;
use crate::session::ClusterSession;
use crate::{BenchError, BenchResult, FrequentItemset, MiningBackend};
use cluster_adapter::ClusterAdapter;
use local_adapter::LocalAdapter;

/// Build the backend named by `config`. The cluster backend needs a running
/// session; without one it is unavailable.
pub fn build_backend(
    config: &BackendConfig,
    session: Option<&ClusterSession>,
) -> BenchResult<Box<dyn MiningBackend>> {
    match config.kind {
        BackendKind::Local => Ok(Box::new(LocalAdapter::new(config.use_colnames))),
        BackendKind::Cluster => {
            let session = session.ok_or_else(|| {
                BenchError::BackendUnavailable("cluster backend requires a session".into())
            })?;
            Ok(Box::new(ClusterAdapter::new(
                session.handle(),
                config.partitions(),
                config.use_colnames,
            )))
        }
    }
}

/// Convert encoded `(items, count)` patterns into the shared result shape,
/// most frequent first, ties by item list.
pub(crate) fn render_itemsets(
    patterns: Vec<(Vec<u32>, usize)>,
    catalog: &ItemCatalog,
    use_names: bool,
    num_transactions: usize,
) -> Vec<FrequentItemset> {
    let n = num_transactions.max(1) as f64;
    let mut out: Vec<FrequentItemset> = patterns
        .into_iter()
        .map(|(ids, count)| FrequentItemset {
            items: catalog.render(&ids, use_names),
            count,
            support: count as f64 / n,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.items.cmp(&b.items)));
    out
}
