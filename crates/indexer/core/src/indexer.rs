use crate::{
    BatchWriter, BlockFetcher, HeightSupply, InvalidPipelineConfig, PipelineConfig, RegistryError,
    SupplyError, ValidatorRegistry, WorkerPool, WorkerReport, WriterReport, metrics::Metrics,
};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tm2_indexer_rpc::{ChainClient, ChainClientError};
use tm2_indexer_storage::{BlockStorage, StorageError};
use tm2_indexer_types::Height;
use tokio::{
    sync::{mpsc, watch},
    task::JoinError,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wires the height supply, the worker pool and the batch writer together.
#[derive(Debug)]
pub struct Indexer<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    validator_names: BTreeMap<String, String>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

/// Errors that abort an [`Indexer`] run.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The pipeline configuration is unusable.
    #[error(transparent)]
    Config(#[from] InvalidPipelineConfig),

    /// The node could not be queried at startup.
    #[error("chain client error: {0}")]
    Chain(#[from] ChainClientError),

    /// The store could not be initialized or queried at startup.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The validator registry could not be resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The height supply stopped on an error.
    #[error(transparent)]
    Supply(#[from] SupplyError),

    /// A pipeline task panicked.
    #[error("pipeline task failed: {0}")]
    Join(#[from] JoinError),
}

/// Summary of an [`Indexer`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexerReport {
    /// Chain tip observed at startup.
    pub chain_tip: Height,
    /// Highest stored height at startup.
    pub stored_height: Height,
    /// Number of validators in the registry.
    pub validators: usize,
    /// Missing heights enqueued at startup.
    pub gaps: usize,
    /// Catch-up heights enqueued without deferral.
    pub catch_up: usize,
    /// Outcome of the workers.
    pub workers: WorkerReport,
    /// Outcome of the writer.
    pub writer: WriterReport,
}

impl<C, S> Indexer<C, S>
where
    C: ChainClient + 'static,
    S: BlockStorage + 'static,
{
    /// Creates an indexer.
    ///
    /// `validator_names` maps configured validator names to their address.
    pub const fn new(
        client: Arc<C>,
        store: Arc<S>,
        validator_names: BTreeMap<String, String>,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self { client, store, validator_names, config, cancel }
    }

    /// Runs the pipeline.
    ///
    /// In follow mode the run lasts until the cancellation token fires. Otherwise it ends once
    /// the gaps and the catch-up range are processed. Either way, every fetched block is written
    /// before returning.
    pub async fn run(self) -> Result<IndexerReport, IndexerError> {
        self.config.validate()?;
        Metrics::init();

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.init_schema()).await??;

        let chain_tip = self.client.latest_height().await?;
        Metrics::record_chain_tip(chain_tip);
        let store = Arc::clone(&self.store);
        let stored_height =
            tokio::task::spawn_blocking(move || store.latest_stored_height()).await??;
        info!(target: "indexer", chain_tip, stored_height, "Starting indexer");

        let registry = Arc::new(self.load_registry(stored_height, chain_tip).await?);

        let (heights_tx, heights_rx) = async_channel::bounded(self.config.height_queue);
        let (blocks_tx, blocks_rx) = mpsc::channel(self.config.block_queue);
        let (batch_tx, batch_rx) = watch::channel(self.config.batch_write);

        let writer =
            tokio::spawn(BatchWriter::new(Arc::clone(&self.store), blocks_rx, batch_rx).run());
        let mut workers = WorkerPool::new(
            BlockFetcher::new(Arc::clone(&self.client), Arc::clone(&registry)),
            self.config.workers,
        )
        .spawn(heights_rx, blocks_tx, self.cancel.clone());

        let mut supply = HeightSupply::new(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            heights_tx,
            batch_tx,
            self.config.supply_config(),
            self.cancel.clone(),
        );
        let supplied = self.feed(&mut supply, stored_height, chain_tip).await;
        // Closes the height queue: workers drain it and stop.
        drop(supply);

        let mut worker_report = WorkerReport::default();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(report) => worker_report.merge(report),
                Err(err) => error!(target: "indexer", %err, "Worker task failed"),
            }
        }
        let writer_report = writer.await?;

        let (gaps, catch_up) = supplied?;
        info!(
            target: "indexer",
            fetched = worker_report.fetched,
            skipped = worker_report.skipped_total(),
            written = writer_report.blocks_written,
            "Indexer stopped"
        );
        Ok(IndexerReport {
            chain_tip,
            stored_height,
            validators: registry.len(),
            gaps,
            catch_up,
            workers: worker_report,
            writer: writer_report,
        })
    }

    /// Resolves the registry against the validator set near the stored tip, and persists it.
    async fn load_registry(
        &self,
        stored_height: Height,
        chain_tip: Height,
    ) -> Result<ValidatorRegistry, IndexerError> {
        let at = (stored_height + self.config.batch_write as Height).min(chain_tip).max(1);
        let active_set = self.client.validator_set_at(at).await?;
        let registry = ValidatorRegistry::resolve(&self.validator_names, &active_set)?;

        let validators = registry.validators();
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.upsert_validators(&validators)).await??;
        info!(target: "indexer", height = at, validators = registry.len(), "Loaded validator registry");
        Ok(registry)
    }

    /// Runs the height supply: gaps, then catch-up, then the tail or the deferred heights.
    async fn feed(
        &self,
        supply: &mut HeightSupply<C, S>,
        stored_height: Height,
        chain_tip: Height,
    ) -> Result<(usize, usize), SupplyError> {
        let gaps = supply.enqueue_gaps().await?;
        let catch_up = supply.enqueue_catch_up(stored_height, chain_tip).await?;
        if self.config.follow {
            supply.follow(chain_tip + 1).await?;
        } else {
            supply.redeliver_deferred().await?;
        }
        Ok((gaps, catch_up))
    }
}
