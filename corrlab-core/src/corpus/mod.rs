//! Corpus of historical signal PnL: bulk loading, snapshot persistence, store.

pub mod loader;
pub mod snapshot;
pub mod store;

pub use loader::{fetch_pnl_batch, BatchOutcome, DEFAULT_FETCH_WORKERS};
pub use snapshot::{Snapshot, SnapshotMeta, SnapshotState};
pub use store::{CorpusStore, CorpusView, PoolFilter, RefreshSummary};

use crate::platform::PlatformError;
use thiserror::Error;

/// Structured error types for corpus operations.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("snapshot I/O error: {0}")]
    Io(String),

    #[error("snapshot serialization error: {0}")]
    Serde(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("no corpus snapshot at '{path}' — run a refresh first")]
    SnapshotMissing { path: String },

    #[error("corpus snapshot corrupted: {0}")]
    SnapshotCorrupted(String),

    #[error("corpus inconsistent: {0}")]
    Inconsistent(String),
}
