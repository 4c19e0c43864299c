use crate::{BlockFetcher, FetchError, SkipReason, metrics::Metrics};
use std::collections::BTreeMap;
use tm2_indexer_rpc::ChainClient;
use tm2_indexer_types::{Block, Height};
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A fixed set of workers turning heights into blocks.
///
/// Every worker pulls heights from the shared height queue, fetches and transforms the block and
/// pushes it to the block queue. A full block queue blocks the worker, which in turn stops
/// draining the height queue.
#[derive(Debug)]
pub struct WorkerPool<C> {
    fetcher: BlockFetcher<C>,
    size: usize,
}

/// Outcome of a worker, or of the whole pool once merged.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Blocks handed to the writer.
    pub fetched: u64,
    /// Skipped heights, by reason.
    pub skipped: BTreeMap<SkipReason, u64>,
}

impl WorkerReport {
    /// Returns the total number of skipped heights.
    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    /// Folds `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        self.fetched += other.fetched;
        for (reason, count) in other.skipped {
            *self.skipped.entry(reason).or_default() += count;
        }
    }
}

impl<C: ChainClient + 'static> WorkerPool<C> {
    /// Creates a pool of `size` workers sharing `fetcher`.
    pub const fn new(fetcher: BlockFetcher<C>, size: usize) -> Self {
        Self { fetcher, size }
    }

    /// Spawns the workers.
    ///
    /// A worker stops when the height queue is closed and drained, when the block queue is
    /// closed, or after its current height once `cancel` fires.
    pub fn spawn(
        self,
        heights: async_channel::Receiver<Height>,
        blocks: mpsc::Sender<Block>,
        cancel: CancellationToken,
    ) -> JoinSet<WorkerReport> {
        let mut set = JoinSet::new();
        for id in 0..self.size {
            set.spawn(run_worker(
                id,
                self.fetcher.clone(),
                heights.clone(),
                blocks.clone(),
                cancel.clone(),
            ));
        }
        info!(target: "indexer::worker", workers = self.size, "Worker pool started");
        set
    }
}

async fn run_worker<C: ChainClient>(
    id: usize,
    fetcher: BlockFetcher<C>,
    heights: async_channel::Receiver<Height>,
    blocks: mpsc::Sender<Block>,
    cancel: CancellationToken,
) -> WorkerReport {
    let mut report = WorkerReport::default();

    loop {
        let height = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = heights.recv() => match next {
                Ok(height) => height,
                Err(_) => break,
            },
        };

        match fetcher.fetch(height).await {
            Ok(block) => {
                debug!(target: "indexer::worker", worker = id, height, txs = block.transactions.len(), "Fetched block");
                if blocks.send(block).await.is_err() {
                    warn!(target: "indexer::worker", worker = id, height, "Block queue closed, stopping worker");
                    break;
                }
                Metrics::record_fetched();
                report.fetched += 1;
            }
            Err(err) => {
                log_skip(id, &err);
                Metrics::record_skipped(err.reason());
                *report.skipped.entry(err.reason()).or_default() += 1;
            }
        }
    }

    debug!(target: "indexer::worker", worker = id, fetched = report.fetched, "Worker stopped");
    report
}

fn log_skip(id: usize, err: &FetchError) {
    let height = err.height();
    match err.reason() {
        SkipReason::Rpc => {
            warn!(target: "indexer::worker", worker = id, height, %err, "Skipping height after node error");
        }
        reason => {
            error!(target: "indexer::worker", worker = id, height, %reason, %err, "Skipping inconsistent block");
        }
    }
}
