use serde::Deserialize;
use std::path::Path;

use crate::error::Result;

/// Scan defaults shared by every format adapter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Number of batches a generator may prefetch ahead of its consumer.
    #[serde(default = "default_batch_readahead")]
    pub batch_readahead: usize,
    /// Merge nearby reads into larger ranged reads.
    #[serde(default)]
    pub coalesce: bool,
    /// Largest gap, in bytes, two reads may have and still be merged.
    #[serde(default = "default_hole_size_limit")]
    pub hole_size_limit: u64,
    /// Upper bound, in bytes, on a single merged read.
    #[serde(default = "default_range_size_limit")]
    pub range_size_limit: u64,
}

fn default_batch_readahead() -> usize {
    16
}

fn default_hole_size_limit() -> u64 {
    8192
}

fn default_range_size_limit() -> u64 {
    32 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_readahead: default_batch_readahead(),
            coalesce: false,
            hole_size_limit: default_hole_size_limit(),
            range_size_limit: default_range_size_limit(),
        }
    }
}

impl Settings {
    /// Loads settings from `IGLOO_SCAN_CONFIG_PATH` (optional) overlaid with
    /// `IGLOO_SCAN__*` environment variables.
    pub fn new() -> Result<Self> {
        let config_file_path = std::env::var("IGLOO_SCAN_CONFIG_PATH")
            .unwrap_or_else(|_| "config/scan.toml".to_string());

        let s = config::Config::builder()
            .add_source(config::File::with_name(&config_file_path).required(false))
            .add_source(config::Environment::with_prefix("IGLOO_SCAN").separator("__"))
            .build()?;
        Ok(s.try_deserialize()?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let s = config::Config::builder().add_source(config::File::from(path)).build()?;
        Ok(s.try_deserialize()?)
    }
}
