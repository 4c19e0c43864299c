use crate::metrics::Metrics;
use std::{mem, sync::Arc, time::Instant};
use tm2_indexer_storage::BlockStorage;
use tm2_indexer_types::Block;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Single consumer of the block queue, persisting blocks in batches.
///
/// Blocks are buffered until the buffer reaches the effective batch size published by the
/// height supply. When the size drops below the buffer length, the buffer is flushed right away.
/// A batch that fails to persist is logged and dropped; its heights show up as gaps on the next
/// scan.
#[derive(Debug)]
pub struct BatchWriter<S> {
    store: Arc<S>,
    blocks: mpsc::Receiver<Block>,
    batch_size: watch::Receiver<usize>,
    buffer: Vec<Block>,
    report: WriterReport,
}

/// Summary of a writer run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterReport {
    /// Blocks persisted.
    pub blocks_written: u64,
    /// Batches committed.
    pub batches_written: u64,
    /// Batches dropped after a storage failure.
    pub batches_failed: u64,
    /// Blocks lost with the failed batches.
    pub blocks_dropped: u64,
}

impl<S: BlockStorage + 'static> BatchWriter<S> {
    /// Creates a writer draining `blocks` into `store`.
    pub fn new(
        store: Arc<S>,
        blocks: mpsc::Receiver<Block>,
        batch_size: watch::Receiver<usize>,
    ) -> Self {
        Self { store, blocks, batch_size, buffer: Vec::new(), report: WriterReport::default() }
    }

    /// Runs until the block queue is closed and drained, then flushes the remaining blocks.
    pub async fn run(mut self) -> WriterReport {
        let mut policy_open = true;

        loop {
            tokio::select! {
                next = self.blocks.recv() => match next {
                    Some(block) => {
                        self.buffer.push(block);
                        if self.buffer.len() >= self.effective_batch_size() {
                            self.flush().await;
                        }
                    }
                    None => break,
                },
                changed = self.batch_size.changed(), if policy_open => match changed {
                    Ok(()) => {
                        if !self.buffer.is_empty() && self.buffer.len() >= self.effective_batch_size() {
                            self.flush().await;
                        }
                    }
                    Err(_) => policy_open = false,
                },
            }
        }

        self.flush().await;
        info!(
            target: "indexer::writer",
            written = self.report.blocks_written,
            batches = self.report.batches_written,
            failed = self.report.batches_failed,
            dropped = self.report.blocks_dropped,
            "Block writer stopped"
        );
        self.report
    }

    fn effective_batch_size(&self) -> usize {
        (*self.batch_size.borrow()).max(1)
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = mem::take(&mut self.buffer);
        let count = batch.len();
        let first = batch.iter().map(|b| b.height).min().unwrap_or_default();
        let last = batch.iter().map(|b| b.height).max().unwrap_or_default();
        let txs: usize = batch.iter().map(|b| b.transactions.len()).sum();
        let messages: usize = batch.iter().map(Block::message_count).sum();

        let start = Instant::now();
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || store.upsert_block_batch(&batch)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(())) => {
                debug!(
                    target: "indexer::writer",
                    blocks = count,
                    first,
                    last,
                    txs,
                    messages,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Flushed block batch"
                );
                Metrics::record_flush(count, elapsed, true);
                self.report.blocks_written += count as u64;
                self.report.batches_written += 1;
            }
            Ok(Err(err)) => {
                error!(target: "indexer::writer", blocks = count, first, last, %err, "Failed to write block batch, dropping it");
                self.record_failure(count, elapsed);
            }
            Err(err) => {
                error!(target: "indexer::writer", blocks = count, first, last, %err, "Block batch write task failed, dropping it");
                self.record_failure(count, elapsed);
            }
        }
    }

    fn record_failure(&mut self, count: usize, elapsed: std::time::Duration) {
        Metrics::record_flush(count, elapsed, false);
        self.report.batches_failed += 1;
        self.report.blocks_dropped += count as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{memory_store, raw_block};
    use crate::{ValidatorRegistry, transform_block};
    use std::time::Duration;
    use tm2_indexer_storage::{MockBlockStorage, StorageError};
    use tm2_indexer_types::{Height, Validator};

    fn block(height: Height) -> Block {
        let registry: ValidatorRegistry = [Validator::new("g1alice", "alice")].into_iter().collect();
        let precommits: &[Option<&str>] = if height == 1 { &[] } else { &[Some("g1alice")] };
        transform_block(&raw_block(height, "g1alice", precommits, vec![]), &registry).unwrap()
    }

    #[tokio::test]
    async fn test_flushes_full_batches_and_remainder() {
        let store = Arc::new(memory_store().unwrap());
        let (tx, rx) = mpsc::channel(16);
        let (_batch_tx, batch_rx) = watch::channel(4);
        let writer = tokio::spawn(BatchWriter::new(Arc::clone(&store), rx, batch_rx).run());

        for height in 1..=10 {
            tx.send(block(height)).await.unwrap();
        }
        drop(tx);

        let report = writer.await.unwrap();
        assert_eq!(
            report,
            WriterReport { blocks_written: 10, batches_written: 3, ..Default::default() }
        );
        assert_eq!(store.latest_stored_height().unwrap(), 10);
        assert!(store.missing_heights().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lowered_batch_size_flushes_buffer() {
        let store = Arc::new(memory_store().unwrap());
        let (tx, rx) = mpsc::channel(16);
        let (batch_tx, batch_rx) = watch::channel(100);
        let writer = tokio::spawn(BatchWriter::new(Arc::clone(&store), rx, batch_rx).run());

        for height in 1..=3 {
            tx.send(block(height)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.row_counts().unwrap().blocks, 0);

        batch_tx.send(1).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.row_counts().unwrap().blocks, 3);

        // Each following block is written on its own.
        tx.send(block(4)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.latest_stored_height().unwrap(), 4);

        drop(tx);
        let report = writer.await.unwrap();
        assert_eq!(report.batches_written, 2);
        assert_eq!(report.blocks_written, 4);
    }

    #[tokio::test]
    async fn test_closed_policy_channel_keeps_last_size() {
        let store = Arc::new(memory_store().unwrap());
        let (tx, rx) = mpsc::channel(16);
        let (batch_tx, batch_rx) = watch::channel(2);
        drop(batch_tx);
        let writer = tokio::spawn(BatchWriter::new(Arc::clone(&store), rx, batch_rx).run());

        for height in 1..=5 {
            tx.send(block(height)).await.unwrap();
        }
        drop(tx);

        let report = writer.await.unwrap();
        assert_eq!(report.batches_written, 3);
        assert_eq!(report.blocks_written, 5);
    }

    #[tokio::test]
    async fn test_failed_batch_is_dropped() {
        let mut store = MockBlockStorage::new();
        let mut calls = 0;
        store.expect_upsert_block_batch().times(2).returning(move |blocks| {
            calls += 1;
            if calls == 1 {
                Err(StorageError::CorruptRow(format!("{} blocks", blocks.len())))
            } else {
                Ok(())
            }
        });

        let (tx, rx) = mpsc::channel(16);
        let (_batch_tx, batch_rx) = watch::channel(2);
        let writer = tokio::spawn(BatchWriter::new(Arc::new(store), rx, batch_rx).run());

        for height in 1..=4 {
            tx.send(block(height)).await.unwrap();
        }
        drop(tx);

        assert_eq!(
            writer.await.unwrap(),
            WriterReport {
                blocks_written: 2,
                batches_written: 1,
                batches_failed: 1,
                blocks_dropped: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_empty_run() {
        let store = MockBlockStorage::new();
        let (tx, rx) = mpsc::channel::<Block>(1);
        let (_batch_tx, batch_rx) = watch::channel(10);
        drop(tx);

        let report = BatchWriter::new(Arc::new(store), rx, batch_rx).run().await;
        assert_eq!(report, WriterReport::default());
    }
}
