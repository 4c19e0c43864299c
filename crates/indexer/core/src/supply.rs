//! The height supply: decides which heights the workers fetch, and in which order.
//!
//! Heights come from three sources. Gaps are heights below the highest stored block that have no
//! stored block. Catch-up covers the range between the highest stored block and the chain tip
//! observed at startup. The tail then follows the chain as it grows. The supply also owns the
//! batch size policy of the writer, since it is the one observing the height backlog.

use crate::metrics::Metrics;
use std::{collections::BTreeSet, fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tm2_indexer_rpc::ChainClient;
use tm2_indexer_storage::{BlockStorage, StorageError};
use tm2_indexer_types::Height;
use tokio::{
    sync::watch,
    task::JoinError,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tuning of the [`HeightSupply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyConfig {
    /// Batch size applied by the writer while the backlog is high.
    pub batch_size: usize,
    /// Backlog under which the writer flushes every block on its own.
    pub low_water_mark: usize,
    /// Delay between two tail polls of the chain tip.
    pub poll_interval: Duration,
    /// Number of non-blocking send attempts per catch-up height.
    pub catch_up_attempts: u32,
    /// Delay between two catch-up send attempts.
    pub catch_up_retry_delay: Duration,
    /// Interval between two gap scans while tailing, `None` to disable them.
    pub gap_rescan_interval: Option<Duration>,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            low_water_mark: 10,
            poll_interval: Duration::from_secs(2),
            catch_up_attempts: 3,
            catch_up_retry_delay: Duration::from_secs(1),
            gap_rescan_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// Origin of an enqueued height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeightSource {
    /// A hole below the highest stored block.
    Gap,
    /// The range between the stored and the chain tip at startup.
    CatchUp,
    /// A new block observed while following the chain.
    Tail,
    /// A catch-up height re-offered by the tail.
    Deferred,
}

impl HeightSource {
    /// Every source, in declaration order.
    pub const ALL: [Self; 4] = [Self::Gap, Self::CatchUp, Self::Tail, Self::Deferred];

    /// Returns the metric label of the source.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gap => "gap",
            Self::CatchUp => "catch_up",
            Self::Tail => "tail",
            Self::Deferred => "deferred",
        }
    }
}

impl fmt::Display for HeightSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that stop the [`HeightSupply`].
#[derive(Debug, Error)]
pub enum SupplyError {
    /// Reading the stored heights failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Every worker is gone, nobody reads the height queue anymore.
    #[error("height queue closed")]
    QueueClosed,

    /// A blocking storage call panicked.
    #[error("storage task failed: {0}")]
    Join(#[from] JoinError),
}

/// Producer of the height queue.
#[derive(Debug)]
pub struct HeightSupply<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    heights: async_channel::Sender<Height>,
    batch_size: watch::Sender<usize>,
    config: SupplyConfig,
    cancel: CancellationToken,
    deferred: BTreeSet<Height>,
}

impl<C, S> HeightSupply<C, S>
where
    C: ChainClient,
    S: BlockStorage + 'static,
{
    /// Creates a supply feeding `heights` and publishing the effective batch size on
    /// `batch_size`.
    pub fn new(
        client: Arc<C>,
        store: Arc<S>,
        heights: async_channel::Sender<Height>,
        batch_size: watch::Sender<usize>,
        config: SupplyConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self { client, store, heights, batch_size, config, cancel, deferred: BTreeSet::new() }
    }

    /// Returns the catch-up heights waiting to be re-offered by the tail.
    pub const fn deferred(&self) -> &BTreeSet<Height> {
        &self.deferred
    }

    /// Enqueues every missing height below the highest stored block, in ascending order.
    ///
    /// Blocks while the height queue is full. Returns the number of enqueued heights.
    pub async fn enqueue_gaps(&mut self) -> Result<usize, SupplyError> {
        let store = Arc::clone(&self.store);
        let missing = tokio::task::spawn_blocking(move || store.missing_heights()).await??;
        if missing.is_empty() {
            debug!(target: "indexer::supply", "No gap in stored heights");
            return Ok(0);
        }

        info!(
            target: "indexer::supply",
            count = missing.len(),
            first = missing.first().copied().unwrap_or_default(),
            "Enqueuing missing heights"
        );
        let mut enqueued = 0;
        for height in missing {
            if !self.send(height, HeightSource::Gap).await? {
                break;
            }
            enqueued += 1;
        }
        Ok(enqueued)
    }

    /// Enqueues every height of `from..=to`.
    ///
    /// Sends never block: a height is offered up to `catch_up_attempts` times, with
    /// `catch_up_retry_delay` between two attempts. A height that still does not fit is deferred
    /// and re-offered, blocking, by the next tail poll or by
    /// [`redeliver_deferred`](Self::redeliver_deferred). Returns the number of enqueued heights.
    pub async fn enqueue_catch_up(&mut self, from: Height, to: Height) -> Result<usize, SupplyError> {
        if from > to {
            return Ok(0);
        }
        info!(target: "indexer::supply", from, to, "Catching up with the chain");

        let attempts = self.config.catch_up_attempts.max(1);
        let mut enqueued = 0;
        'heights: for height in from..=to {
            if self.cancel.is_cancelled() {
                break;
            }
            for attempt in 1..=attempts {
                match self.heights.try_send(height) {
                    Ok(()) => {
                        Metrics::record_enqueued(HeightSource::CatchUp);
                        enqueued += 1;
                        continue 'heights;
                    }
                    Err(async_channel::TrySendError::Closed(_)) => {
                        return Err(SupplyError::QueueClosed);
                    }
                    Err(async_channel::TrySendError::Full(_)) if attempt < attempts => {
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return Ok(enqueued),
                            _ = tokio::time::sleep(self.config.catch_up_retry_delay) => {}
                        }
                    }
                    Err(async_channel::TrySendError::Full(_)) => {}
                }
            }

            warn!(target: "indexer::supply", height, attempts, "Height queue full, deferring height");
            Metrics::record_deferred();
            self.deferred.insert(height);
        }

        Ok(enqueued)
    }

    /// Enqueues the deferred catch-up heights, blocking while the queue is full.
    ///
    /// Returns `false` if cancellation interrupted the delivery.
    pub async fn redeliver_deferred(&mut self) -> Result<bool, SupplyError> {
        if self.deferred.is_empty() {
            return Ok(true);
        }
        info!(target: "indexer::supply", count = self.deferred.len(), "Re-offering deferred heights");

        while let Some(height) = self.deferred.first().copied() {
            if !self.send(height, HeightSource::Deferred).await? {
                return Ok(false);
            }
            self.deferred.remove(&height);
        }
        Ok(true)
    }

    /// Follows the chain from `start` until cancelled.
    ///
    /// Every poll re-offers the deferred heights, enqueues every height up to the current tip
    /// and updates the batch size policy. While the backlog is low, missing heights are looked
    /// up again every `gap_rescan_interval`. Node errors are logged and retried on the next poll.
    pub async fn follow(&mut self, start: Height) -> Result<(), SupplyError> {
        info!(target: "indexer::supply", start, "Following the chain");

        let mut next = start;
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_rescan = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(target: "indexer::supply", next, "Stopping height supply");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if !self.redeliver_deferred().await? {
                return Ok(());
            }

            match self.client.latest_height().await {
                Ok(tip) => {
                    Metrics::record_chain_tip(tip);
                    while next <= tip {
                        if !self.send(next, HeightSource::Tail).await? {
                            return Ok(());
                        }
                        next += 1;
                    }
                }
                Err(err) => {
                    warn!(target: "indexer::supply", %err, "Failed to poll the chain tip");
                }
            }

            let backlog = self.publish_batch_size();

            if let Some(interval) = self.config.gap_rescan_interval {
                if backlog < self.config.low_water_mark && last_rescan.elapsed() >= interval {
                    last_rescan = Instant::now();
                    match self.enqueue_gaps().await {
                        Ok(_) => {}
                        Err(SupplyError::Storage(err)) => {
                            warn!(target: "indexer::supply", %err, "Gap scan failed");
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Recomputes the effective batch size from the current backlog and publishes it.
    ///
    /// The writer batches `batch_size` blocks while the backlog is at or above the low water
    /// mark, and writes every block on its own below it. Returns the backlog.
    pub fn publish_batch_size(&self) -> usize {
        let backlog = self.heights.len();
        let effective =
            if backlog < self.config.low_water_mark { 1 } else { self.config.batch_size };

        self.batch_size.send_if_modified(|current| {
            if *current == effective {
                return false;
            }
            debug!(target: "indexer::supply", backlog, from = *current, to = effective, "Batch size changed");
            *current = effective;
            true
        });
        Metrics::record_backlog(backlog, effective);
        backlog
    }

    /// Sends `height`, waiting for room in the queue. Returns `false` if cancelled first.
    async fn send(&self, height: Height, source: HeightSource) -> Result<bool, SupplyError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(false),
            sent = self.heights.send(height) => {
                sent.map_err(|_| SupplyError::QueueClosed)?;
                Metrics::record_enqueued(source);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedChain, memory_store};
    use tm2_indexer_storage::MockBlockStorage;

    fn supply<S: BlockStorage + 'static>(
        store: S,
        queue: usize,
        config: SupplyConfig,
    ) -> (HeightSupply<ScriptedChain, S>, async_channel::Receiver<Height>, watch::Receiver<usize>) {
        let (heights_tx, heights_rx) = async_channel::bounded(queue);
        let (batch_tx, batch_rx) = watch::channel(config.batch_size);
        let chain = ScriptedChain::new(10, &["g1alice"]);
        let supply = HeightSupply::new(
            Arc::new(chain),
            Arc::new(store),
            heights_tx,
            batch_tx,
            config,
            CancellationToken::new(),
        );
        (supply, heights_rx, batch_rx)
    }

    fn drain(rx: &async_channel::Receiver<Height>) -> Vec<Height> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_enqueue_gaps_in_order() {
        let mut store = MockBlockStorage::new();
        store.expect_missing_heights().returning(|| Ok(vec![2, 3, 7]));
        let (mut supply, rx, _) = supply(store, 16, SupplyConfig::default());

        assert_eq!(supply.enqueue_gaps().await.unwrap(), 3);
        assert_eq!(drain(&rx), vec![2, 3, 7]);
    }

    #[tokio::test]
    async fn test_enqueue_gaps_storage_failure() {
        let mut store = MockBlockStorage::new();
        store
            .expect_missing_heights()
            .returning(|| Err(StorageError::CorruptRow("boom".to_string())));
        let (mut supply, _rx, _) = supply(store, 16, SupplyConfig::default());

        assert!(matches!(supply.enqueue_gaps().await, Err(SupplyError::Storage(_))));
    }

    #[tokio::test]
    async fn test_catch_up_is_inclusive() {
        let (mut supply, rx, _) = supply(memory_store().unwrap(), 16, SupplyConfig::default());

        assert_eq!(supply.enqueue_catch_up(4, 8).await.unwrap(), 5);
        assert_eq!(drain(&rx), vec![4, 5, 6, 7, 8]);
        assert!(supply.deferred().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_up_defers_when_queue_stays_full() {
        let config = SupplyConfig { catch_up_attempts: 3, ..Default::default() };
        let (mut supply, rx, _) = supply(memory_store().unwrap(), 2, config);

        let started = tokio::time::Instant::now();
        assert_eq!(supply.enqueue_catch_up(1, 5).await.unwrap(), 2);
        // Two retry delays for each of the three deferred heights.
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_eq!(supply.deferred().iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(drain(&rx), vec![1, 2]);

        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push(rx.recv().await.unwrap());
            }
            seen
        });
        assert!(supply.redeliver_deferred().await.unwrap());
        assert!(supply.deferred().is_empty());
        assert_eq!(collector.await.unwrap(), vec![3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_up_retry_succeeds_once_queue_drains() {
        let (mut supply, rx, _) = supply(memory_store().unwrap(), 1, SupplyConfig::default());

        let consumer = tokio::spawn({
            let rx = rx.clone();
            async move {
                let mut seen = Vec::new();
                for _ in 0..3 {
                    tokio::time::sleep(Duration::from_millis(1200)).await;
                    seen.push(rx.recv().await.unwrap());
                }
                seen
            }
        });

        assert_eq!(supply.enqueue_catch_up(1, 3).await.unwrap(), 3);
        assert!(supply.deferred().is_empty());
        let mut seen = consumer.await.unwrap();
        seen.extend(drain(&rx));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_catch_up_closed_queue() {
        let (mut supply, rx, _) = supply(memory_store().unwrap(), 4, SupplyConfig::default());
        drop(rx);
        assert!(matches!(supply.enqueue_catch_up(1, 2).await, Err(SupplyError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_batch_size_follows_backlog() {
        let config = SupplyConfig { batch_size: 50, low_water_mark: 3, ..Default::default() };
        let (supply, rx, mut batch_rx) = supply(memory_store().unwrap(), 16, config);

        assert_eq!(supply.publish_batch_size(), 0);
        assert!(batch_rx.has_changed().unwrap());
        assert_eq!(*batch_rx.borrow_and_update(), 1);

        for height in 1..=3 {
            supply.heights.try_send(height).unwrap();
        }
        assert_eq!(supply.publish_batch_size(), 3);
        assert_eq!(*batch_rx.borrow_and_update(), 50);

        // Unchanged policy does not wake the writer.
        supply.publish_batch_size();
        assert!(!batch_rx.has_changed().unwrap());

        drain(&rx);
        supply.publish_batch_size();
        assert_eq!(*batch_rx.borrow_and_update(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_enqueues_new_heights_until_cancelled() {
        let config = SupplyConfig { gap_rescan_interval: None, ..Default::default() };
        let (mut supply, rx, _) = supply(memory_store().unwrap(), 64, config);
        let chain = Arc::clone(&supply.client);
        let cancel = supply.cancel.clone();

        let handle = tokio::spawn(async move {
            supply.follow(11).await.unwrap();
            supply
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(drain(&rx).is_empty());

        chain.set_tip(13);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(drain(&rx), vec![11, 12, 13]);

        chain.set_tip(14);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(drain(&rx), vec![14]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_offers_deferred_heights_first() {
        let config = SupplyConfig { gap_rescan_interval: None, ..Default::default() };
        let (mut supply, rx, _) = supply(memory_store().unwrap(), 64, config);
        supply.deferred.extend([4, 5]);
        supply.client.set_tip(11);
        let cancel = supply.cancel.clone();

        let handle = tokio::spawn(async move { supply.follow(11).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(drain(&rx), vec![4, 5, 11]);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_rescans_gaps_when_idle() {
        let mut store = MockBlockStorage::new();
        store.expect_missing_heights().returning(|| Ok(vec![3]));
        let config = SupplyConfig {
            gap_rescan_interval: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let (mut supply, rx, _) = supply(store, 64, config);
        let cancel = supply.cancel.clone();

        let handle = tokio::spawn(async move { supply.follow(11).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(drain(&rx).is_empty());

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(drain(&rx), vec![3]);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_blocked_send() {
        let mut store = MockBlockStorage::new();
        store.expect_missing_heights().returning(|| Ok((1..=10).collect()));
        let (mut supply, rx, _) = supply(store, 2, SupplyConfig::default());
        let cancel = supply.cancel.clone();

        let handle = tokio::spawn(async move { supply.enqueue_gaps().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap().unwrap(), 2);
        assert_eq!(drain(&rx), vec![1, 2]);
    }
}
