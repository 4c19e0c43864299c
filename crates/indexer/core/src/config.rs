use crate::SupplyConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Tuning of the ingestion pipeline, read from the `[pipeline]` section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Maximum number of blocks per storage transaction.
    pub batch_write: usize,
    /// Number of concurrent block fetchers.
    #[serde(alias = "goro_block_parser")]
    pub workers: usize,
    /// Capacity of the height queue.
    #[serde(alias = "buffer_chan_heights")]
    pub height_queue: usize,
    /// Capacity of the block queue.
    #[serde(alias = "buffer_chan_blocks")]
    pub block_queue: usize,
    /// Height backlog under which every block is written on its own.
    pub low_water_mark: usize,
    /// Delay between two polls of the chain tip, in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of non-blocking enqueue attempts per catch-up height.
    pub catch_up_attempts: u32,
    /// Delay between two catch-up enqueue attempts, in milliseconds.
    pub catch_up_retry_delay_ms: u64,
    /// Interval between two gap scans while following the chain, in seconds. `0` disables them.
    pub gap_rescan_interval_secs: u64,
    /// Whether to keep following the chain once caught up.
    pub follow: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_write: 100,
            workers: 8,
            height_queue: 1000,
            block_queue: 1000,
            low_water_mark: 10,
            poll_interval_ms: 2000,
            catch_up_attempts: 3,
            catch_up_retry_delay_ms: 1000,
            gap_rescan_interval_secs: 60,
            follow: true,
        }
    }
}

/// A [`PipelineConfig`] value that cannot work.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("pipeline.{field} must be at least 1")]
pub struct InvalidPipelineConfig {
    /// Name of the offending field.
    pub field: &'static str,
}

impl PipelineConfig {
    /// Checks that every size and delay is usable.
    pub fn validate(&self) -> Result<(), InvalidPipelineConfig> {
        let checks = [
            ("batch_write", self.batch_write as u64),
            ("workers", self.workers as u64),
            ("height_queue", self.height_queue as u64),
            ("block_queue", self.block_queue as u64),
            ("poll_interval_ms", self.poll_interval_ms),
            ("catch_up_attempts", u64::from(self.catch_up_attempts)),
        ];
        match checks.into_iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(InvalidPipelineConfig { field }),
            None => Ok(()),
        }
    }

    /// Returns the part of the configuration used by the height supply.
    pub fn supply_config(&self) -> SupplyConfig {
        SupplyConfig {
            batch_size: self.batch_write,
            low_water_mark: self.low_water_mark,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            catch_up_attempts: self.catch_up_attempts,
            catch_up_retry_delay: Duration::from_millis(self.catch_up_retry_delay_ms),
            gap_rescan_interval: (self.gap_rescan_interval_secs > 0)
                .then(|| Duration::from_secs(self.gap_rescan_interval_secs)),
        }
    }
}
