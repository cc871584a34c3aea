use serde::Serialize;

use crate::error::{Result, ScanError};
use crate::io::SECTOR_SIZE;

/// Tuning knobs for one scan. Validated once before any I/O happens.
#[derive(Debug, Clone, Serialize)]
pub struct ScanConfig {
    /// Bytes per analysis block. Must be a positive multiple of the sector size.
    pub block_size: usize,
    /// Normalized entropy ([0,1]) above which a block seeds a candidate run.
    pub entropy_threshold: f64,
    /// Number of consecutive low-entropy, hit-free blocks tolerated inside a
    /// candidate region before it is closed.
    pub gap_tolerance: u32,
    /// Minimum classifier confidence for a region to receive a known format
    /// label. Regions below the floor are labeled Unknown but retained.
    pub confidence_floor: f64,
    /// Rolling window (in blocks) for entropy smoothing at the merge stage.
    pub smoothing_window: usize,
    /// Upper bound on concurrently analyzed blocks. 0 means one per core.
    pub max_workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            entropy_threshold: 0.85,
            gap_tolerance: 4,
            confidence_floor: 0.45,
            smoothing_window: 4,
            max_workers: 0,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size % SECTOR_SIZE != 0 {
            return Err(ScanError::InvalidConfig(format!(
                "block size {} is not a positive multiple of {}",
                self.block_size, SECTOR_SIZE
            )));
        }
        if !(0.0..=1.0).contains(&self.entropy_threshold) {
            return Err(ScanError::InvalidConfig(format!(
                "entropy threshold {} outside [0,1]",
                self.entropy_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ScanError::InvalidConfig(format!(
                "confidence floor {} outside [0,1]",
                self.confidence_floor
            )));
        }
        if self.smoothing_window == 0 {
            return Err(ScanError::InvalidConfig(
                "smoothing window must be at least one block".into(),
            ));
        }
        Ok(())
    }

    pub fn effective_workers(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get()
        } else {
            self.max_workers
        }
    }
}
