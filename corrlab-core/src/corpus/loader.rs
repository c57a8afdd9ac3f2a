//! Bulk PnL loader — fans a descriptor list out over a fixed worker pool and
//! merges the results into the wide table in one pass.
//!
//! Fetching is I/O bound, so workers are plain scoped threads pulling indices
//! off a shared cursor. The merge runs strictly after every worker has joined;
//! no partially merged table is ever observable.

use crate::domain::{PnlSeries, SignalId, WideTable};
use crate::platform::{FetchProgress, PlatformError, SignalMeta, SignalSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Concurrent fetch operations per batch.
pub const DEFAULT_FETCH_WORKERS: usize = 10;

/// Result of one batch fetch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Descriptors whose PnL was fetched and merged.
    pub fetched: Vec<SignalMeta>,
    /// Descriptors that failed, with the reason. Not merged, not indexed.
    pub failures: Vec<(SignalId, PlatformError)>,
    /// Descriptors skipped because their column already existed.
    pub skipped: usize,
}

/// Fetch PnL for every descriptor not already present as a column and merge
/// the new columns into `table`.
///
/// Idempotent: descriptors whose id is already a column are skipped, so
/// re-invoking with the same populated table is a no-op. A failed fetch is
/// recorded in the outcome and excluded from the merge; it never aborts the
/// batch.
pub fn fetch_pnl_batch(
    source: &dyn SignalSource,
    signals: &[SignalMeta],
    table: &mut WideTable,
    workers: usize,
    progress: &dyn FetchProgress,
) -> BatchOutcome {
    let to_fetch: Vec<&SignalMeta> = signals.iter().filter(|m| !table.contains(&m.id)).collect();
    let skipped = signals.len() - to_fetch.len();
    let total = to_fetch.len();

    if to_fetch.is_empty() {
        progress.on_batch_complete(0, 0, 0);
        return BatchOutcome {
            fetched: Vec::new(),
            failures: Vec::new(),
            skipped,
        };
    }

    let cursor = AtomicUsize::new(0);
    let results: Mutex<Vec<(usize, Result<PnlSeries, PlatformError>)>> =
        Mutex::new(Vec::with_capacity(total));

    std::thread::scope(|scope| {
        for _ in 0..workers.clamp(1, total) {
            scope.spawn(|| loop {
                let i = cursor.fetch_add(1, Ordering::Relaxed);
                if i >= total {
                    break;
                }
                let meta = to_fetch[i];
                progress.on_start(&meta.id, i, total);
                let result = source.fetch_pnl(&meta.id);
                progress.on_complete(&meta.id, i, total, result.as_ref().map(|_| ()));
                results.lock().unwrap().push((i, result));
            });
        }
    });

    let mut results = results.into_inner().unwrap();
    results.sort_by_key(|(i, _)| *i);

    let mut fetched = Vec::new();
    let mut merged: Vec<(SignalId, PnlSeries)> = Vec::new();
    let mut failures = Vec::new();
    for (i, result) in results {
        let meta = to_fetch[i];
        match result {
            Ok(series) if series.is_empty() => {
                failures.push((
                    meta.id.clone(),
                    PlatformError::ResponseFormat("empty pnl recordset".into()),
                ));
            }
            Ok(series) => {
                fetched.push(meta.clone());
                merged.push((meta.id.clone(), series));
            }
            Err(e) => failures.push((meta.id.clone(), e)),
        }
    }

    table.merge_many(merged);
    progress.on_batch_complete(fetched.len(), failures.len(), total);

    BatchOutcome {
        fetched,
        failures,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Region;
    use crate::platform::{SignalPage, SilentProgress};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedSource {
        series: BTreeMap<SignalId, PnlSeries>,
        fetch_calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(series: BTreeMap<SignalId, PnlSeries>) -> Self {
            Self {
                series,
                fetch_calls: AtomicUsize::new(0),
            }
        }
    }

    impl SignalSource for ScriptedSource {
        fn list_signals(&self, _limit: usize, _offset: usize) -> Result<SignalPage, PlatformError> {
            Ok(SignalPage {
                count: 0,
                results: Vec::new(),
            })
        }

        fn fetch_pnl(&self, id: &SignalId) -> Result<PnlSeries, PlatformError> {
            self.fetch_calls.fetch_add(1, Ordering::Relaxed);
            self.series
                .get(id)
                .cloned()
                .ok_or_else(|| PlatformError::SignalNotFound { id: id.to_string() })
        }

        fn locate_signal(&self, id: &SignalId) -> Result<SignalMeta, PlatformError> {
            Err(PlatformError::SignalNotFound { id: id.to_string() })
        }
    }

    fn meta(id: &str) -> SignalMeta {
        SignalMeta {
            id: SignalId::from(id),
            region: Region::from("USA"),
            power_pool: false,
        }
    }

    fn pnl(days: &[(u32, f64)]) -> PnlSeries {
        PnlSeries::from_points(
            days.iter()
                .map(|(day, v)| (NaiveDate::from_ymd_opt(2024, 1, *day).unwrap(), *v))
                .collect(),
        )
    }

    #[test]
    fn fetches_and_merges_all_descriptors() {
        let mut series = BTreeMap::new();
        series.insert(SignalId::from("A"), pnl(&[(2, 100.0), (3, 101.0)]));
        series.insert(SignalId::from("B"), pnl(&[(2, 200.0), (4, 202.0)]));
        let source = ScriptedSource::new(series);

        let mut table = WideTable::new();
        let outcome =
            fetch_pnl_batch(&source, &[meta("A"), meta("B")], &mut table, 4, &SilentProgress);

        assert_eq!(outcome.fetched.len(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(table.num_signals(), 2);
        assert_eq!(table.num_dates(), 3);
    }

    #[test]
    fn already_present_columns_are_skipped() {
        let mut series = BTreeMap::new();
        series.insert(SignalId::from("A"), pnl(&[(2, 100.0)]));
        let source = ScriptedSource::new(series);

        let mut table = WideTable::new();
        table.merge_series(SignalId::from("A"), &pnl(&[(2, 100.0)]));

        let outcome = fetch_pnl_batch(&source, &[meta("A")], &mut table, 4, &SilentProgress);

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.fetched.len(), 0);
        assert_eq!(source.fetch_calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn one_failure_does_not_abort_the_batch() {
        let mut series = BTreeMap::new();
        series.insert(SignalId::from("A"), pnl(&[(2, 100.0)]));
        // "B" is unknown to the source and will fail.
        let source = ScriptedSource::new(series);

        let mut table = WideTable::new();
        let outcome =
            fetch_pnl_batch(&source, &[meta("A"), meta("B")], &mut table, 4, &SilentProgress);

        assert_eq!(outcome.fetched.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, SignalId::from("B"));
        assert!(table.contains(&SignalId::from("A")));
        assert!(!table.contains(&SignalId::from("B")));
    }

    #[test]
    fn empty_series_counts_as_failure() {
        let mut series = BTreeMap::new();
        series.insert(SignalId::from("A"), PnlSeries::empty());
        let source = ScriptedSource::new(series);

        let mut table = WideTable::new();
        let outcome = fetch_pnl_batch(&source, &[meta("A")], &mut table, 4, &SilentProgress);

        assert_eq!(outcome.fetched.len(), 0);
        assert_eq!(outcome.failures.len(), 1);
        assert!(table.is_empty());
    }
}
