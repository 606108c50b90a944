//! Distributed adapter: partitioned parallel FP-Growth over a `ClusterSession`.
//!
//! Layout and job shape follow the usual parallel FP-Growth scheme:
//! 1. `prepare` splits the encoded transactions into `num_partitions`
//!    contiguous partitions (the distributable collection).
//! 2. `mine` counts item frequencies per partition on the executors, ranks the
//!    frequent items and assigns each rank to a group (`rank % groups`). This
//!    pass is eager.
//! 3. The returned handle is lazy. `materialize` runs one job per group: the
//!    job builds the group-dependent shard (for every transaction, the prefix
//!    up to its last item of that group), mines it, and keeps only patterns
//!    whose least frequent item belongs to the group. Every pattern is owned
//!    by exactly one group and its count in that shard is exact.

use crate::adapters::render_itemsets;
use crate::dataset::{ItemCatalog, TransactionDataset};
use crate::session::SessionHandle;
use crate::{min_count, BenchError, BenchResult, Deadline, FrequentItemset, MiningBackend, MiningHandle};
use fp_growth::algorithm::FPGrowth;
use std::sync::Arc;

type Partitions = Arc<Vec<Vec<Vec<u32>>>>;

struct Prepared {
    catalog: Arc<ItemCatalog>,
    partitions: Partitions,
    num_transactions: usize,
}

pub struct ClusterAdapter {
    session: SessionHandle,
    num_partitions: usize,
    use_colnames: bool,
    prepared: Option<Prepared>,
}

impl ClusterAdapter {
    pub fn new(session: SessionHandle, num_partitions: usize, use_colnames: bool) -> Self {
        Self {
            session,
            num_partitions: num_partitions.max(1),
            use_colnames,
            prepared: None,
        }
    }

    fn ensure_session(&self) -> BenchResult<()> {
        if self.session.is_active() {
            Ok(())
        } else {
            Err(BenchError::BackendUnavailable(
                "cluster session is not running".into(),
            ))
        }
    }
}

/// Split rows into `parts` contiguous, near-equal partitions.
fn partition(rows: Vec<Vec<u32>>, parts: usize) -> Vec<Vec<Vec<u32>>> {
    let chunk = rows.len().div_ceil(parts).max(1);
    let mut out: Vec<Vec<Vec<u32>>> = Vec::with_capacity(parts);
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        out.push(rows.by_ref().take(chunk).collect());
    }
    out.resize_with(parts, Vec::new);
    out
}

impl MiningBackend for ClusterAdapter {
    fn name(&self) -> &str {
        "cluster"
    }

    fn is_lazy(&self) -> bool {
        true
    }

    fn prepare(&mut self, dataset: &TransactionDataset) -> BenchResult<()> {
        self.ensure_session()?;
        let catalog = ItemCatalog::build(dataset);
        let encoded = catalog.encode(dataset);
        let num_transactions = encoded.len();
        let partitions = partition(encoded, self.num_partitions);
        tracing::debug!(
            transactions = num_transactions,
            partitions = partitions.len(),
            executors = self.session.executors(),
            "cluster backend prepared"
        );
        self.prepared = Some(Prepared {
            catalog: Arc::new(catalog),
            partitions: Arc::new(partitions),
            num_transactions,
        });
        Ok(())
    }

    /// Let work abandoned by an earlier repetition drain before the timer starts.
    fn stage(&mut self, _min_support: f64) -> BenchResult<()> {
        self.ensure_session()?;
        self.session.wait_idle();
        Ok(())
    }

    fn mine(
        &mut self,
        min_support: f64,
        deadline: Option<Deadline>,
    ) -> BenchResult<Box<dyn MiningHandle>> {
        self.ensure_session()?;
        let prepared = self.prepared.as_ref().ok_or_else(|| {
            BenchError::BackendUnavailable("cluster backend used before prepare".into())
        })?;
        let threshold = min_count(min_support, prepared.num_transactions);
        let num_items = prepared.catalog.len();

        // Pass 1: per-partition item counts.
        let jobs: Vec<_> = (0..prepared.partitions.len())
            .map(|p| {
                let partitions = prepared.partitions.clone();
                move || {
                    let mut counts = vec![0usize; num_items];
                    for row in &partitions[p] {
                        for &id in row {
                            counts[id as usize] += 1;
                        }
                    }
                    Ok(counts)
                }
            })
            .collect();
        let mut totals = vec![0usize; num_items];
        for counts in self.session.run_all(jobs, deadline)? {
            for (total, c) in totals.iter_mut().zip(counts) {
                *total += c;
            }
        }

        // Rank frequent items: most frequent first, ties by id.
        let mut frequent: Vec<u32> = (0..num_items as u32)
            .filter(|&id| totals[id as usize] >= threshold)
            .collect();
        frequent.sort_by(|a, b| {
            totals[*b as usize]
                .cmp(&totals[*a as usize])
                .then_with(|| a.cmp(b))
        });
        let mut rank_of = vec![None; num_items];
        for (rank, &id) in frequent.iter().enumerate() {
            rank_of[id as usize] = Some(rank as u32);
        }

        Ok(Box::new(ClusterHandle {
            session: self.session.clone(),
            partitions: prepared.partitions.clone(),
            plan: Arc::new(ShardPlan {
                rank_of,
                id_of_rank: frequent,
                groups: self.num_partitions as u32,
                threshold,
            }),
            catalog: prepared.catalog.clone(),
            use_colnames: self.use_colnames,
            num_transactions: prepared.num_transactions,
        }))
    }

    fn teardown(&mut self) -> BenchResult<()> {
        self.prepared = None;
        Ok(())
    }
}

/// Frequent-item ranking and group assignment computed by `mine`.
struct ShardPlan {
    rank_of: Vec<Option<u32>>,
    id_of_rank: Vec<u32>,
    groups: u32,
    threshold: usize,
}

impl ShardPlan {
    fn group(&self, rank: u32) -> u32 {
        rank % self.groups
    }

    /// Build the shard of `group` and mine it, returning patterns in item ids.
    fn mine_group(&self, partitions: &[Vec<Vec<u32>>], group: u32) -> Vec<(Vec<u32>, usize)> {
        let mut shard: Vec<Vec<u32>> = Vec::new();
        for row in partitions.iter().flatten() {
            let mut ranks: Vec<u32> = row
                .iter()
                .filter_map(|&id| self.rank_of[id as usize])
                .collect();
            ranks.sort_unstable();
            if let Some(last) = ranks.iter().rposition(|&r| self.group(r) == group) {
                ranks.truncate(last + 1);
                shard.push(ranks);
            }
        }
        if shard.is_empty() {
            return Vec::new();
        }

        let result = FPGrowth::<u32>::new(shard, self.threshold).find_frequent_patterns();
        let patterns: Vec<(Vec<u32>, usize)> = result
            .frequent_patterns()
            .iter()
            .filter(|(ranks, _)| {
                ranks
                    .iter()
                    .max()
                    .map_or(false, |&r| self.group(r) == group)
            })
            .map(|(ranks, count)| {
                let ids = ranks.iter().map(|&r| self.id_of_rank[r as usize]).collect();
                (ids, *count)
            })
            .collect();
        patterns
    }
}

struct ClusterHandle {
    session: SessionHandle,
    partitions: Partitions,
    plan: Arc<ShardPlan>,
    catalog: Arc<ItemCatalog>,
    use_colnames: bool,
    num_transactions: usize,
}

impl MiningHandle for ClusterHandle {
    fn materialize(self: Box<Self>, deadline: Option<Deadline>) -> BenchResult<Vec<FrequentItemset>> {
        let ClusterHandle {
            session,
            partitions,
            plan,
            catalog,
            use_colnames,
            num_transactions,
        } = *self;

        if plan.id_of_rank.is_empty() {
            return Ok(Vec::new());
        }

        let groups = plan.groups.min(plan.id_of_rank.len() as u32);
        let jobs: Vec<_> = (0..groups)
            .map(|g| {
                let partitions = partitions.clone();
                let plan = plan.clone();
                move || Ok(plan.mine_group(&partitions, g))
            })
            .collect();

        let patterns = session
            .run_all(jobs, deadline)?
            .into_iter()
            .flatten()
            .collect();
        Ok(render_itemsets(patterns, &catalog, use_colnames, num_transactions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local_adapter::LocalAdapter;
    use crate::datagen::DataGen;
    use crate::session::{ClusterSession, SessionConfig};

    fn dataset(lines: &[&str]) -> TransactionDataset {
        TransactionDataset::from_transactions(
            "mem",
            lines
                .iter()
                .map(|l| l.split(' ').map(str::to_string).collect())
                .collect(),
        )
    }

    fn collect(backend: &mut dyn MiningBackend, min_support: f64) -> Vec<FrequentItemset> {
        backend.stage(min_support).unwrap();
        backend.mine(min_support, None).unwrap().materialize(None).unwrap()
    }

    #[test]
    fn test_partition_shapes() {
        let rows: Vec<Vec<u32>> = (0..10).map(|i| vec![i]).collect();
        let parts = partition(rows, 3);
        assert_eq!(parts.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);

        let parts = partition(vec![vec![1], vec![2]], 4);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), 2);
    }

    #[test]
    fn test_sample_matches_expected_itemsets() {
        let session = ClusterSession::start(SessionConfig::new("t", 2)).unwrap();
        let mut adapter = ClusterAdapter::new(session.handle(), 3, true);
        adapter.prepare(&dataset(&["a b", "a c", "a b c"])).unwrap();

        let itemsets = collect(&mut adapter, 0.5);
        let names: Vec<Vec<String>> = itemsets.iter().map(|i| i.items.clone()).collect();
        assert_eq!(
            names,
            vec![vec!["a"], vec!["a", "b"], vec!["a", "c"], vec!["b"], vec!["c"]]
        );
    }

    #[test]
    fn test_agrees_with_local_backend() {
        let mut gen = DataGen::new(7);
        let ds = gen.dataset(300, 25, 6.0).unwrap();

        let session = ClusterSession::start(SessionConfig::new("t", 4)).unwrap();
        let mut cluster = ClusterAdapter::new(session.handle(), 5, true);
        let mut local = LocalAdapter::new(true);
        cluster.prepare(&ds).unwrap();
        local.prepare(&ds).unwrap();

        for min_support in [0.3, 0.1, 0.05] {
            assert_eq!(
                collect(&mut cluster, min_support),
                collect(&mut local, min_support),
                "min_support {}",
                min_support
            );
        }
    }

    #[test]
    fn test_stopped_session_is_unavailable() {
        let mut session = ClusterSession::start(SessionConfig::new("t", 1)).unwrap();
        let mut adapter = ClusterAdapter::new(session.handle(), 2, true);
        adapter.prepare(&dataset(&["a b"])).unwrap();
        session.shutdown();
        assert!(matches!(
            adapter.mine(0.5, None),
            Err(BenchError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_nothing_frequent() {
        let session = ClusterSession::start(SessionConfig::new("t", 2)).unwrap();
        let mut adapter = ClusterAdapter::new(session.handle(), 2, true);
        adapter.prepare(&dataset(&["a", "b", "c", "d"])).unwrap();
        assert!(collect(&mut adapter, 0.5).is_empty());
    }
}
