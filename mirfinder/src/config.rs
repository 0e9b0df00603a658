use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MirnaError, Result};
use crate::precursor::CandidateWindows;

/// Knobs consumed by the discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Max gap (bp) between two reads of one cluster.
    pub cluster_distance: i64,
    /// Max gap (bp) between two clusters of one mature/star pair.
    pub pair_distance: i64,
    pub min_cluster_size: usize,
    pub step: usize,
    pub offset_start: usize,
    pub offset_end: usize,
    pub loop_span: i64,
    pub score_cutoff: f64,
    pub min_read_length: usize,
    pub max_read_length: usize,
    /// Minimum summed reads for a cluster to be considered, 0 disables it.
    pub read_cutoff: u64,
    /// Drop records whose mature could not be placed in the fold.
    pub strict: bool,
    pub mature_seed: u64,
    pub pad5: i64,
    pub pad3: i64,
    pub species: String,
    pub threads: Option<usize>,
    /// Training tables for the default classifier; `None` uses the bundled reference tables.
    pub training_positives: Option<PathBuf>,
    pub training_negatives: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cluster_distance: 10,
            pair_distance: 120,
            min_cluster_size: 2,
            step: 7,
            offset_start: 1,
            offset_end: 45,
            loop_span: 15,
            score_cutoff: 0.9,
            min_read_length: 18,
            max_read_length: 25,
            read_cutoff: 0,
            strict: false,
            mature_seed: 42,
            pad5: 3,
            pad3: 5,
            species: "novel".to_string(),
            threads: None,
            training_positives: None,
            training_negatives: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn from_json(path: &Path) -> Result<Self> {
        info!("Reading configuration from {}", path.display());
        let json = fs::read_to_string(path)?;
        let config: DiscoveryConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(MirnaError::Config("step must be at least 1".into()));
        }
        if self.offset_start >= self.offset_end {
            return Err(MirnaError::Config(format!(
                "empty offset range {}..{}",
                self.offset_start, self.offset_end
            )));
        }
        if self.min_read_length > self.max_read_length {
            return Err(MirnaError::Config(format!(
                "min_read_length {} exceeds max_read_length {}",
                self.min_read_length, self.max_read_length
            )));
        }
        if self.cluster_distance < 0 || self.pair_distance < 0 {
            return Err(MirnaError::Config("distances must be non-negative".into()));
        }
        Ok(())
    }

    pub fn windows(&self) -> CandidateWindows {
        CandidateWindows {
            step: self.step,
            offset_start: self.offset_start,
            offset_end: self.offset_end,
            loop_span: self.loop_span,
        }
    }
}

/// Write the default configuration unless the file already exists.
pub fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    fs::write(path, serde_json::to_string_pretty(&DiscoveryConfig::default())?)?;
    info!("Wrote config file {}", path.display());
    Ok(true)
}
