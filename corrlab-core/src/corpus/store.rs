//! Corpus store: incremental refresh against the platform and filtered,
//! return-transformed views for the correlation engine.
//!
//! Refresh is not internally locked; callers serialize refreshes. The
//! persisted snapshot is the single source of truth between runs.

use super::loader::{fetch_pnl_batch, DEFAULT_FETCH_WORKERS};
use super::snapshot::{load_snapshot, save_snapshot, Snapshot, SnapshotState};
use super::CorpusError;
use crate::domain::{RegionIndex, SignalId, WideTable};
use crate::platform::{list_os_signals, FetchProgress, PlatformError, SignalMeta, SignalSource};
use crate::returns::{table_returns, DEFAULT_WINDOW_YEARS};
use std::path::{Path, PathBuf};

/// Page size for the historical-signal listing.
const LISTING_PAGE_SIZE: usize = 100;

/// Which classification view of the corpus to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolFilter {
    #[default]
    All,
    /// Only power-pool signals.
    PowerPoolOnly,
    /// Everything except power-pool signals — the self-correlation
    /// comparison view.
    ExcludePowerPool,
}

/// A filtered, return-transformed view of the corpus.
#[derive(Debug)]
pub struct CorpusView {
    pub index: RegionIndex,
    /// Daily returns (not PnL levels), windowed at the table's max date.
    pub returns: WideTable,
}

impl CorpusView {
    /// Return columns for one region.
    pub fn region_returns(&self, region: &crate::domain::Region) -> WideTable {
        self.returns.select(self.index.ids_in(region))
    }
}

/// Outcome of one refresh.
#[derive(Debug)]
pub struct RefreshSummary {
    /// Signals in the listing that were not yet known.
    pub new_signals: usize,
    /// Newly fetched and merged.
    pub fetched: usize,
    /// Fetch failures, excluded from index and table.
    pub failed: Vec<(SignalId, PlatformError)>,
    /// Corpus size after the refresh.
    pub total_signals: usize,
}

/// Persistent corpus of historical signal PnL.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    data_dir: PathBuf,
    fetch_workers: usize,
    window_years: u32,
}

impl CorpusStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            fetch_workers: DEFAULT_FETCH_WORKERS,
            window_years: DEFAULT_WINDOW_YEARS,
        }
    }

    pub fn with_fetch_workers(mut self, workers: usize) -> Self {
        self.fetch_workers = workers;
        self
    }

    pub fn with_window_years(mut self, years: u32) -> Self {
        self.window_years = years;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn window_years(&self) -> u32 {
        self.window_years
    }

    /// Raw persisted state, without transformation.
    pub fn load_state(&self) -> SnapshotState {
        load_snapshot(&self.data_dir)
    }

    /// Bring the corpus up to date with the platform listing.
    ///
    /// Incremental mode reloads the persisted snapshot and queries only the
    /// first listing page; new signals surface at the head of the ordering.
    /// A missing snapshot silently falls back to a full rebuild; a corrupted
    /// one is reported to stderr first. Signals whose PnL fetch fails are left
    /// out of both the index and the table, never recorded half-way.
    pub fn refresh(
        &self,
        source: &dyn SignalSource,
        incremental: bool,
        progress: &dyn FetchProgress,
    ) -> Result<RefreshSummary, CorpusError> {
        let (mut snapshot, have_snapshot) = if incremental {
            match self.load_state() {
                SnapshotState::Loaded(s) => (s, true),
                SnapshotState::Missing => (Snapshot::empty(), false),
                SnapshotState::Corrupted(reason) => {
                    eprintln!(
                        "WARNING: corpus snapshot at {} is corrupted ({reason}); rebuilding from scratch",
                        self.data_dir.display()
                    );
                    (Snapshot::empty(), false)
                }
            }
        } else {
            (Snapshot::empty(), false)
        };

        let known = snapshot.index.all_ids();
        let listed = list_os_signals(source, LISTING_PAGE_SIZE, have_snapshot)?;
        let new_signals: Vec<SignalMeta> = listed
            .into_iter()
            .filter(|meta| !known.contains(&meta.id))
            .collect();

        let outcome = fetch_pnl_batch(
            source,
            &new_signals,
            &mut snapshot.table,
            self.fetch_workers,
            progress,
        );

        for meta in &outcome.fetched {
            snapshot.index.insert(meta.region.clone(), meta.id.clone());
            if meta.power_pool {
                snapshot.power_pool.insert(meta.id.clone());
            }
        }

        save_snapshot(&self.data_dir, &snapshot)?;

        Ok(RefreshSummary {
            new_signals: new_signals.len(),
            fetched: outcome.fetched.len(),
            failed: outcome.failures,
            total_signals: snapshot.table.num_signals(),
        })
    }

    /// Load a filtered view with the return transform applied.
    pub fn load(&self, filter: PoolFilter) -> Result<CorpusView, CorpusError> {
        let snapshot = match self.load_state() {
            SnapshotState::Loaded(s) => s,
            SnapshotState::Missing => {
                return Err(CorpusError::SnapshotMissing {
                    path: self.data_dir.display().to_string(),
                })
            }
            SnapshotState::Corrupted(reason) => {
                return Err(CorpusError::SnapshotCorrupted(reason))
            }
        };

        let pool = &snapshot.power_pool;
        let index = match filter {
            PoolFilter::All => snapshot.index.clone(),
            PoolFilter::PowerPoolOnly => snapshot.index.filtered(|id| pool.contains(id)),
            PoolFilter::ExcludePowerPool => snapshot.index.filtered(|id| !pool.contains(id)),
        };

        let ids: Vec<SignalId> = index.all_ids().into_iter().collect();
        let selected = snapshot.table.select(&ids);
        let returns = table_returns(&selected, self.window_years);

        Ok(CorpusView { index, returns })
    }
}
