use crate::{HeightSource, SkipReason};
use std::time::Duration;
use tm2_indexer_types::Height;

/// Container for the metrics of the ingestion pipeline.
#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    pub(crate) const HEIGHTS_ENQUEUED_TOTAL: &'static str = "tm2_indexer_heights_enqueued_total";
    pub(crate) const HEIGHTS_DEFERRED_TOTAL: &'static str = "tm2_indexer_heights_deferred_total";
    pub(crate) const BLOCKS_FETCHED_TOTAL: &'static str = "tm2_indexer_blocks_fetched_total";
    pub(crate) const BLOCKS_SKIPPED_TOTAL: &'static str = "tm2_indexer_blocks_skipped_total";
    pub(crate) const BLOCKS_WRITTEN_TOTAL: &'static str = "tm2_indexer_blocks_written_total";
    pub(crate) const BATCH_FLUSH_SUCCESS_TOTAL: &'static str =
        "tm2_indexer_batch_flush_success_total";
    pub(crate) const BATCH_FLUSH_ERROR_TOTAL: &'static str = "tm2_indexer_batch_flush_error_total";
    pub(crate) const BATCH_FLUSH_DURATION_SECONDS: &'static str =
        "tm2_indexer_batch_flush_duration_seconds";
    pub(crate) const HEIGHT_BACKLOG: &'static str = "tm2_indexer_height_backlog";
    pub(crate) const EFFECTIVE_BATCH_SIZE: &'static str = "tm2_indexer_effective_batch_size";
    pub(crate) const CHAIN_TIP: &'static str = "tm2_indexer_chain_tip";

    /// Describes and zeroes every pipeline metric.
    pub(crate) fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::HEIGHTS_ENQUEUED_TOTAL,
            metrics::Unit::Count,
            "Heights handed to the workers, by source",
        );
        metrics::describe_counter!(
            Self::HEIGHTS_DEFERRED_TOTAL,
            metrics::Unit::Count,
            "Catch-up heights deferred to the tail because the height queue stayed full",
        );
        metrics::describe_counter!(
            Self::BLOCKS_FETCHED_TOTAL,
            metrics::Unit::Count,
            "Blocks fetched and transformed by the workers",
        );
        metrics::describe_counter!(
            Self::BLOCKS_SKIPPED_TOTAL,
            metrics::Unit::Count,
            "Heights skipped by the workers, by reason",
        );
        metrics::describe_counter!(
            Self::BLOCKS_WRITTEN_TOTAL,
            metrics::Unit::Count,
            "Blocks persisted by the writer",
        );
        metrics::describe_counter!(
            Self::BATCH_FLUSH_SUCCESS_TOTAL,
            metrics::Unit::Count,
            "Batches committed to storage",
        );
        metrics::describe_counter!(
            Self::BATCH_FLUSH_ERROR_TOTAL,
            metrics::Unit::Count,
            "Batches dropped after a storage failure",
        );
        metrics::describe_histogram!(
            Self::BATCH_FLUSH_DURATION_SECONDS,
            metrics::Unit::Seconds,
            "Latency of a batch write",
        );
        metrics::describe_gauge!(
            Self::HEIGHT_BACKLOG,
            metrics::Unit::Count,
            "Heights waiting in the height queue",
        );
        metrics::describe_gauge!(
            Self::EFFECTIVE_BATCH_SIZE,
            metrics::Unit::Count,
            "Batch size currently applied by the writer",
        );
        metrics::describe_gauge!(
            Self::CHAIN_TIP,
            metrics::Unit::Count,
            "Latest height reported by the node",
        );
    }

    fn zero() {
        for source in HeightSource::ALL {
            metrics::counter!(Self::HEIGHTS_ENQUEUED_TOTAL, "source" => source.as_str())
                .increment(0);
        }
        for reason in SkipReason::ALL {
            metrics::counter!(Self::BLOCKS_SKIPPED_TOTAL, "reason" => reason.as_str()).increment(0);
        }
        metrics::counter!(Self::HEIGHTS_DEFERRED_TOTAL).increment(0);
        metrics::counter!(Self::BLOCKS_FETCHED_TOTAL).increment(0);
        metrics::counter!(Self::BLOCKS_WRITTEN_TOTAL).increment(0);
        metrics::counter!(Self::BATCH_FLUSH_SUCCESS_TOTAL).increment(0);
        metrics::counter!(Self::BATCH_FLUSH_ERROR_TOTAL).increment(0);
        metrics::histogram!(Self::BATCH_FLUSH_DURATION_SECONDS).record(0.0);
        metrics::gauge!(Self::HEIGHT_BACKLOG).set(0.0);
        metrics::gauge!(Self::EFFECTIVE_BATCH_SIZE).set(0.0);
        metrics::gauge!(Self::CHAIN_TIP).set(0.0);
    }

    pub(crate) fn record_enqueued(source: HeightSource) {
        metrics::counter!(Self::HEIGHTS_ENQUEUED_TOTAL, "source" => source.as_str()).increment(1);
    }

    pub(crate) fn record_deferred() {
        metrics::counter!(Self::HEIGHTS_DEFERRED_TOTAL).increment(1);
    }

    pub(crate) fn record_fetched() {
        metrics::counter!(Self::BLOCKS_FETCHED_TOTAL).increment(1);
    }

    pub(crate) fn record_skipped(reason: SkipReason) {
        metrics::counter!(Self::BLOCKS_SKIPPED_TOTAL, "reason" => reason.as_str()).increment(1);
    }

    pub(crate) fn record_flush(blocks: usize, elapsed: Duration, success: bool) {
        metrics::histogram!(Self::BATCH_FLUSH_DURATION_SECONDS).record(elapsed.as_secs_f64());
        if success {
            metrics::counter!(Self::BATCH_FLUSH_SUCCESS_TOTAL).increment(1);
            metrics::counter!(Self::BLOCKS_WRITTEN_TOTAL).increment(blocks as u64);
        } else {
            metrics::counter!(Self::BATCH_FLUSH_ERROR_TOTAL).increment(1);
        }
    }

    pub(crate) fn record_backlog(backlog: usize, batch_size: usize) {
        metrics::gauge!(Self::HEIGHT_BACKLOG).set(backlog as f64);
        metrics::gauge!(Self::EFFECTIVE_BATCH_SIZE).set(batch_size as f64);
    }

    pub(crate) fn record_chain_tip(tip: Height) {
        metrics::gauge!(Self::CHAIN_TIP).set(tip as f64);
    }
}
