//! Serializable analysis configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning for the batch correlation analysis.
///
/// All fields have defaults, so a TOML file only needs the overrides:
///
/// ```toml
/// threshold = 0.6
/// group_size = 3
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Pairwise correlation above this disqualifies a pair (inclusive pass).
    pub threshold: f64,

    /// Minimum common defined dates for a pair to carry evidence.
    pub min_overlap: usize,

    /// Trailing window applied to every series, in years.
    pub window_years: u32,

    /// Members per combinatorial group.
    pub group_size: usize,

    /// Worker threads for the group analysis pool.
    pub workers: usize,

    /// Groups per work chunk.
    pub chunk_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            min_overlap: 10,
            window_years: 4,
            group_size: 1,
            workers: default_workers(),
            chunk_size: 500,
        }
    }
}

/// All cores but one, at least one.
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

impl AnalysisConfig {
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading analysis config {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("parsing analysis config {}", path.display()))
    }
}
