//! Self-correlation checker — the entry point submission workflows call.
//!
//! Owns an authenticated platform source and a corpus store, both injected at
//! construction. A candidate is scored against the non-power-pool corpus view
//! restricted to the candidate's own region.

use crate::correlation::{correlations_with, Reduction, DEFAULT_MIN_OVERLAP};
use crate::corpus::{CorpusError, CorpusStore, PoolFilter, RefreshSummary};
use crate::domain::{PnlSeries, SignalId};
use crate::platform::{FetchProgress, PlatformError, SignalMeta, SignalSource};
use crate::returns::series_returns;
use thiserror::Error;

/// Errors surfaced by a self-correlation check.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

/// Tuning knobs for the checker.
#[derive(Debug, Clone, Copy)]
pub struct CheckerConfig {
    /// Minimum common defined dates for a pair to count.
    pub min_overlap: usize,
    /// How per-member correlations reduce to the reported score.
    pub reduction: Reduction,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            min_overlap: DEFAULT_MIN_OVERLAP,
            reduction: Reduction::default(),
        }
    }
}

/// Full result of one candidate check.
#[derive(Debug)]
pub struct CheckReport {
    pub candidate: SignalMeta,
    /// The reduced self-correlation score (0.0 when no pair qualified).
    pub value: f64,
    /// Signed per-member correlations, sorted descending.
    pub ranked: Vec<(SignalId, f64)>,
}

/// Self-correlation façade over the platform source and the corpus store.
pub struct CorrelationChecker {
    source: Box<dyn SignalSource>,
    store: CorpusStore,
    config: CheckerConfig,
}

impl CorrelationChecker {
    pub fn new(source: Box<dyn SignalSource>, store: CorpusStore) -> Self {
        Self {
            source,
            store,
            config: CheckerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CheckerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &CorpusStore {
        &self.store
    }

    pub fn source(&self) -> &dyn SignalSource {
        self.source.as_ref()
    }

    /// Bring the corpus up to date. Call after every submission so the next
    /// check compares against the signal that was just accepted.
    pub fn refresh_corpus(
        &self,
        incremental: bool,
        progress: &dyn FetchProgress,
    ) -> Result<RefreshSummary, CorpusError> {
        self.store.refresh(self.source.as_ref(), incremental, progress)
    }

    /// Maximum correlation of one candidate against the comparison corpus.
    pub fn self_correlation(&self, id: &SignalId) -> Result<f64, CheckError> {
        self.check(id, None).map(|report| report.value)
    }

    /// Detailed check, optionally reusing an already-fetched PnL series.
    pub fn check(
        &self,
        id: &SignalId,
        prefetched_pnl: Option<PnlSeries>,
    ) -> Result<CheckReport, CheckError> {
        let candidate = self.source.locate_signal(id)?;
        let view = self.store.load(PoolFilter::ExcludePowerPool)?;

        let pnl = match prefetched_pnl {
            Some(series) if !series.is_empty() => series,
            _ => self.source.fetch_pnl(id)?,
        };
        let candidate_rets = series_returns(&pnl, self.store.window_years());

        let region_table = view.region_returns(&candidate.region);
        let ranked = correlations_with(&candidate_rets, &region_table, self.config.min_overlap);

        let signed: Vec<f64> = ranked.iter().map(|(_, c)| *c).collect();
        let value = match self.config.reduction.reduce(&signed) {
            Some(v) => v,
            None => {
                eprintln!(
                    "WARNING: no qualifying comparison for {id} in region {} ({} corpus members); reporting 0",
                    candidate.region,
                    region_table.num_signals()
                );
                0.0
            }
        };

        Ok(CheckReport {
            candidate,
            value,
            ranked,
        })
    }

    /// Keep the candidates whose self-correlation is at or below `threshold`,
    /// preserving input order.
    ///
    /// A candidate that fails to score (fetch error, missing metadata) is
    /// logged and dropped from the result — it neither passes nor aborts the
    /// batch. An unreadable corpus is a real error and propagates.
    pub fn filter_by_correlation(
        &self,
        candidates: &[SignalMeta],
        threshold: f64,
    ) -> Result<Vec<SignalMeta>, CorpusError> {
        let view = self.store.load(PoolFilter::ExcludePowerPool)?;

        let mut kept = Vec::new();
        for candidate in candidates {
            let value = match self.score_against(&view, candidate) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("WARNING: skipping {}: {e}", candidate.id);
                    continue;
                }
            };
            if value <= threshold {
                kept.push(candidate.clone());
            }
        }
        Ok(kept)
    }

    fn score_against(
        &self,
        view: &crate::corpus::CorpusView,
        candidate: &SignalMeta,
    ) -> Result<f64, PlatformError> {
        let pnl = self.source.fetch_pnl(&candidate.id)?;
        let rets = series_returns(&pnl, self.store.window_years());
        let region_table = view.region_returns(&candidate.region);
        let ranked = correlations_with(&rets, &region_table, self.config.min_overlap);
        let signed: Vec<f64> = ranked.iter().map(|(_, c)| *c).collect();
        Ok(self.config.reduction.reduce(&signed).unwrap_or(0.0))
    }
}
