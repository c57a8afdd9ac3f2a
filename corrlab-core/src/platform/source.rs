//! Signal source trait and structured error types.
//!
//! The SignalSource trait abstracts over the remote research platform so the
//! corpus store can be driven by a mock in tests. The authenticated HTTP
//! implementation lives in [`super::client`].

use crate::domain::{PnlSeries, Region, SignalId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification tag the platform attaches to power-pool signals.
///
/// Signals carrying this tag are excluded from the ordinary self-correlation
/// comparison corpus.
pub const POWER_POOL_CLASSIFICATION: &str = "Power Pool";

/// Listing row for one historical signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMeta {
    pub id: SignalId,
    pub region: Region,
    /// True when the platform classifies the signal into the power pool.
    #[serde(default)]
    pub power_pool: bool,
}

/// One page of the platform's historical-signal listing.
#[derive(Debug, Clone)]
pub struct SignalPage {
    /// Total number of signals across all pages.
    pub count: usize,
    pub results: Vec<SignalMeta>,
}

/// Structured error types for platform operations.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limit retry budget exhausted after waiting {waited_secs}s")]
    RateLimitExceeded { waited_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("signal not found: {id}")]
    SignalNotFound { id: String },
}

/// Read access to the remote platform.
///
/// Implementations carry their own authenticated session, injected at
/// construction — there is no ambient global client.
pub trait SignalSource: Send + Sync {
    /// One page of the user's OS-stage signal listing.
    fn list_signals(&self, limit: usize, offset: usize) -> Result<SignalPage, PlatformError>;

    /// Daily cumulative PnL recordset for one signal.
    fn fetch_pnl(&self, id: &SignalId) -> Result<PnlSeries, PlatformError>;

    /// Identifying metadata for one signal.
    fn locate_signal(&self, id: &SignalId) -> Result<SignalMeta, PlatformError>;
}

/// Walk the paginated listing.
///
/// With `first_page_only` the incremental refresh bounds its cost to a single
/// request: new signals appear at the head of the `-dateSubmitted` ordering.
pub fn list_os_signals(
    source: &dyn SignalSource,
    limit: usize,
    first_page_only: bool,
) -> Result<Vec<SignalMeta>, PlatformError> {
    let mut fetched: Vec<SignalMeta> = Vec::new();
    let mut offset = 0usize;
    let mut total: Option<usize> = None;

    loop {
        let page = source.list_signals(limit, offset)?;
        if total.is_none() {
            total = Some(page.count);
        }
        let batch_len = page.results.len();
        fetched.extend(page.results);

        let done = first_page_only
            || batch_len == 0
            || batch_len < limit
            || total.is_some_and(|t| fetched.len() >= t);
        if done {
            break;
        }
        offset += limit;
    }

    if let Some(t) = total {
        fetched.truncate(t);
    }
    Ok(fetched)
}

/// Progress callback for multi-signal fetch operations.
pub trait FetchProgress: Send + Sync {
    fn on_start(&self, id: &SignalId, index: usize, total: usize);
    fn on_complete(&self, id: &SignalId, index: usize, total: usize, result: Result<(), &PlatformError>);
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl FetchProgress for StdoutProgress {
    fn on_start(&self, id: &SignalId, index: usize, total: usize) {
        println!("[{}/{}] Fetching PnL for {id}...", index + 1, total);
    }

    fn on_complete(
        &self,
        id: &SignalId,
        _index: usize,
        _total: usize,
        result: Result<(), &PlatformError>,
    ) {
        match result {
            Ok(()) => println!("  OK: {id}"),
            Err(e) => println!("  FAIL: {id}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("\nFetch complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// No-op progress reporter for library callers and tests.
pub struct SilentProgress;

impl FetchProgress for SilentProgress {
    fn on_start(&self, _id: &SignalId, _index: usize, _total: usize) {}
    fn on_complete(
        &self,
        _id: &SignalId,
        _index: usize,
        _total: usize,
        _result: Result<(), &PlatformError>,
    ) {
    }
    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct PagedSource {
        signals: Vec<SignalMeta>,
        calls: Mutex<usize>,
    }

    impl PagedSource {
        fn new(n: usize) -> Self {
            let signals = (0..n)
                .map(|i| SignalMeta {
                    id: SignalId::new(format!("sig{i:03}")),
                    region: Region::from("USA"),
                    power_pool: false,
                })
                .collect();
            Self {
                signals,
                calls: Mutex::new(0),
            }
        }
    }

    impl SignalSource for PagedSource {
        fn list_signals(&self, limit: usize, offset: usize) -> Result<SignalPage, PlatformError> {
            *self.calls.lock().unwrap() += 1;
            let end = (offset + limit).min(self.signals.len());
            let results = self.signals[offset.min(end)..end].to_vec();
            Ok(SignalPage {
                count: self.signals.len(),
                results,
            })
        }

        fn fetch_pnl(&self, id: &SignalId) -> Result<PnlSeries, PlatformError> {
            Err(PlatformError::SignalNotFound { id: id.to_string() })
        }

        fn locate_signal(&self, id: &SignalId) -> Result<SignalMeta, PlatformError> {
            Err(PlatformError::SignalNotFound { id: id.to_string() })
        }
    }

    #[test]
    fn full_listing_walks_every_page() {
        let source = PagedSource::new(25);
        let all = list_os_signals(&source, 10, false).unwrap();
        assert_eq!(all.len(), 25);
        assert_eq!(*source.calls.lock().unwrap(), 3);
    }

    #[test]
    fn first_page_only_makes_one_request() {
        let source = PagedSource::new(25);
        let head = list_os_signals(&source, 10, true).unwrap();
        assert_eq!(head.len(), 10);
        assert_eq!(*source.calls.lock().unwrap(), 1);
    }

    #[test]
    fn listing_shorter_than_one_page_terminates() {
        let source = PagedSource::new(3);
        let all = list_os_signals(&source, 10, false).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(*source.calls.lock().unwrap(), 1);
    }
}
