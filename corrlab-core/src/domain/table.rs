//! Wide PnL table: date-union matrix of all known signals.
//!
//! Rows are the union of every member's trading dates; a signal that has no
//! observation on a given date holds NaN there. Columns are keyed by signal id
//! in a BTreeMap so iteration order — and therefore everything derived from it,
//! including persisted snapshots — is deterministic.

use super::ids::SignalId;
use super::series::PnlSeries;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Wide date × signal matrix of cumulative PnL values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WideTable {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<SignalId, Vec<f64>>,
}

impl WideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from parts. Every column must have one value per date.
    pub fn from_parts(dates: Vec<NaiveDate>, columns: BTreeMap<SignalId, Vec<f64>>) -> Self {
        debug_assert!(columns.values().all(|c| c.len() == dates.len()));
        Self { dates, columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn num_signals(&self) -> usize {
        self.columns.len()
    }

    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn contains(&self, id: &SignalId) -> bool {
        self.columns.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &SignalId> {
        self.columns.keys()
    }

    pub fn id_set(&self) -> BTreeSet<SignalId> {
        self.columns.keys().cloned().collect()
    }

    pub fn column(&self, id: &SignalId) -> Option<&[f64]> {
        self.columns.get(id).map(|c| c.as_slice())
    }

    pub fn iter_columns(&self) -> impl Iterator<Item = (&SignalId, &[f64])> {
        self.columns.iter().map(|(id, c)| (id, c.as_slice()))
    }

    /// Merge one new series in as a column. Replaces the column if the id is
    /// already present.
    pub fn merge_series(&mut self, id: SignalId, series: &PnlSeries) {
        self.merge_many(vec![(id, series.clone())]);
    }

    /// Merge a batch of series, re-aligning every column to the union of the
    /// existing dates and all incoming dates in a single pass.
    pub fn merge_many(&mut self, incoming: Vec<(SignalId, PnlSeries)>) {
        if incoming.is_empty() {
            return;
        }

        let mut all_dates: BTreeSet<NaiveDate> = self.dates.iter().copied().collect();
        for (_, series) in &incoming {
            all_dates.extend(series.dates().iter().copied());
        }
        let new_dates: Vec<NaiveDate> = all_dates.into_iter().collect();

        // Existing columns: pad with NaN at dates they did not previously have.
        if new_dates.len() != self.dates.len() {
            let position: BTreeMap<NaiveDate, usize> = new_dates
                .iter()
                .enumerate()
                .map(|(i, d)| (*d, i))
                .collect();
            for column in self.columns.values_mut() {
                let mut realigned = vec![f64::NAN; new_dates.len()];
                for (old_idx, date) in self.dates.iter().enumerate() {
                    realigned[position[date]] = column[old_idx];
                }
                *column = realigned;
            }
        }
        self.dates = new_dates;

        for (id, series) in incoming {
            let mut column = vec![f64::NAN; self.dates.len()];
            let mut cursor = 0usize;
            for (date, value) in series.iter() {
                // Both axes are sorted ascending, so a forward scan suffices.
                while self.dates[cursor] < date {
                    cursor += 1;
                }
                column[cursor] = value;
            }
            self.columns.insert(id, column);
        }
    }

    /// Project onto a subset of columns, keeping the full date axis.
    ///
    /// Ids not present in the table are silently dropped; callers that care
    /// enforce the index/column completeness invariant before getting here.
    pub fn select(&self, ids: &[SignalId]) -> WideTable {
        let columns: BTreeMap<SignalId, Vec<f64>> = ids
            .iter()
            .filter_map(|id| self.columns.get(id).map(|c| (id.clone(), c.clone())))
            .collect();
        WideTable {
            dates: self.dates.clone(),
            columns,
        }
    }

    /// Drop every column whose id is not in `keep`.
    pub fn retain(&mut self, keep: &BTreeSet<SignalId>) {
        self.columns.retain(|id, _| keep.contains(id));
    }
}
