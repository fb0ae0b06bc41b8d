//! Analysis configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Threshold used when the caller does not pick one.
pub const DEFAULT_RARITY_THRESHOLD: f32 = 0.00005;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Words strictly below this frequency are candidates.
    /// 1e-6 keeps only very rare words, 1e-4 lets fairly common ones through.
    pub rarity_threshold: f32,
    /// Tokens shorter than this (in chars) are never candidates.
    pub min_word_chars: usize,
    /// Example sentences kept per hard word.
    pub max_contexts: usize,
    pub correction: CorrectionConfig,
    pub ner: NerConfig,
    /// Buffered progress events per job before new ones are dropped.
    pub progress_capacity: usize,
    /// Jobs allowed to run at once; the rest wait in FIFO order.
    pub max_concurrent_jobs: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rarity_threshold: DEFAULT_RARITY_THRESHOLD,
            min_word_chars: 3,
            max_contexts: 5,
            correction: CorrectionConfig::default(),
            ner: NerConfig::default(),
            progress_capacity: 64,
            max_concurrent_jobs: 1,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Acceptance rules for repairing concatenated tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Edit budget per segment handed to the segmenter.
    pub max_edit_distance: i64,
    /// Shorter unknown tokens are kept as-is.
    pub min_word_chars: usize,
    pub min_segment_chars: usize,
    /// Mean log10 frequency the segments must reach; each edit costs 1.0.
    pub min_mean_log_frequency: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: 2,
            min_word_chars: 6,
            min_segment_chars: 2,
            min_mean_log_frequency: -6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NerConfig {
    pub labels: Vec<String>,
    pub batch_size: usize,
    /// Sentences longer than this are split at whitespace before inference.
    pub max_chunk_bytes: usize,
    pub threads: usize,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            labels: ["person", "location", "organization", "country", "city"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            batch_size: 64,
            max_chunk_bytes: 512,
            threads: 8,
        }
    }
}
