//! Return transformer: cumulative PnL levels → daily returns.
//!
//! Pipeline: forward-fill gaps, first-difference, then keep only the trailing
//! window. Differencing after the forward-fill means a missing trading day
//! contributes a zero return instead of poisoning its neighbors with NaN; the
//! first row of any series has no predecessor and stays undefined.
//!
//! Windowing is asymmetric on purpose: a standalone candidate series is cut
//! relative to its OWN latest date, while the corpus table is cut once at the
//! table's overall latest date. A stale candidate is therefore judged over its
//! own trailing history, not the wall clock.

use crate::domain::{PnlSeries, ReturnSeries, WideTable};
use chrono::{Months, NaiveDate};
use std::collections::BTreeMap;

/// Trailing comparison window, in years.
pub const DEFAULT_WINDOW_YEARS: u32 = 4;

/// Propagate the last defined value forward into NaN gaps.
fn forward_fill(values: &[f64]) -> Vec<f64> {
    let mut filled = Vec::with_capacity(values.len());
    let mut last = f64::NAN;
    for &v in values {
        if v.is_finite() {
            last = v;
        }
        filled.push(last);
    }
    filled
}

/// First difference of the forward-filled values. Index 0 is NaN.
fn diff_filled(values: &[f64]) -> Vec<f64> {
    let filled = forward_fill(values);
    let mut out = vec![f64::NAN; filled.len()];
    for t in 1..filled.len() {
        out[t] = filled[t] - filled[t - 1];
    }
    out
}

/// Dates strictly after `max_date - years` survive the window.
fn window_cutoff(max_date: NaiveDate, years: u32) -> NaiveDate {
    max_date
        .checked_sub_months(Months::new(12 * years))
        .unwrap_or(NaiveDate::MIN)
}

/// Transform one signal's PnL into windowed daily returns.
///
/// The window is anchored at this series' own latest date.
pub fn series_returns(pnl: &PnlSeries, window_years: u32) -> ReturnSeries {
    let Some(max_date) = pnl.max_date() else {
        return ReturnSeries::empty();
    };
    let cutoff = window_cutoff(max_date, window_years);
    let returns = diff_filled(pnl.values());

    let mut dates = Vec::new();
    let mut values = Vec::new();
    for (i, &date) in pnl.dates().iter().enumerate() {
        if date > cutoff {
            dates.push(date);
            values.push(returns[i]);
        }
    }
    ReturnSeries::from_parts(dates, values)
}

/// Transform every column of a wide PnL table into windowed daily returns.
///
/// All columns are differenced in lockstep over the shared date axis and cut
/// at one global boundary anchored at the table's overall latest date.
pub fn table_returns(table: &WideTable, window_years: u32) -> WideTable {
    let Some(max_date) = table.max_date() else {
        return WideTable::new();
    };
    let cutoff = window_cutoff(max_date, window_years);

    let keep: Vec<usize> = table
        .dates()
        .iter()
        .enumerate()
        .filter(|(_, d)| **d > cutoff)
        .map(|(i, _)| i)
        .collect();
    let dates: Vec<NaiveDate> = keep.iter().map(|&i| table.dates()[i]).collect();

    let mut columns = BTreeMap::new();
    for (id, column) in table.iter_columns() {
        let returns = diff_filled(column);
        let windowed: Vec<f64> = keep.iter().map(|&i| returns[i]).collect();
        columns.insert(id.clone(), windowed);
    }
    WideTable::from_parts(dates, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalId;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn series(points: &[(&str, f64)]) -> PnlSeries {
        PnlSeries::from_points(points.iter().map(|(s, v)| (d(s), *v)).collect())
    }

    #[test]
    fn gap_is_filled_before_differencing() {
        let pnl = PnlSeries::from_points(vec![
            (d("2024-01-01"), 100.0),
            (d("2024-01-02"), f64::NAN),
            (d("2024-01-03"), f64::NAN),
            (d("2024-01-04"), 103.0),
        ]);
        let rets = series_returns(&pnl, DEFAULT_WINDOW_YEARS);
        assert_eq!(rets.len(), 4);
        assert!(rets.values()[0].is_nan());
        assert_eq!(rets.values()[1], 0.0);
        assert_eq!(rets.values()[2], 0.0);
        assert_eq!(rets.values()[3], 3.0);
    }

    #[test]
    fn leading_gap_stays_undefined() {
        let pnl = PnlSeries::from_points(vec![
            (d("2024-01-01"), f64::NAN),
            (d("2024-01-02"), 50.0),
            (d("2024-01-03"), 52.0),
        ]);
        let rets = series_returns(&pnl, DEFAULT_WINDOW_YEARS);
        assert!(rets.values()[0].is_nan());
        assert!(rets.values()[1].is_nan());
        assert_eq!(rets.values()[2], 2.0);
    }

    #[test]
    fn window_is_anchored_at_own_max_date() {
        // Six years of one observation per year; a 4-year window keeps only
        // dates strictly after 2025-06-01 - 4y = 2021-06-01.
        let pnl = series(&[
            ("2019-06-01", 1.0),
            ("2020-06-01", 2.0),
            ("2021-06-01", 3.0),
            ("2022-06-01", 4.0),
            ("2023-06-01", 5.0),
            ("2024-06-01", 6.0),
            ("2025-06-01", 7.0),
        ]);
        let rets = series_returns(&pnl, 4);
        assert_eq!(rets.dates().first(), Some(&d("2022-06-01")));
        assert_eq!(rets.len(), 4);
        let cutoff = d("2025-06-01").checked_sub_months(Months::new(48)).unwrap();
        assert!(rets.dates().iter().all(|&date| date > cutoff));
    }

    #[test]
    fn table_window_uses_global_max_date() {
        let mut table = WideTable::new();
        // "old" stops trading in 2021; "fresh" runs through 2025.
        table.merge_series(
            SignalId::from("old"),
            &series(&[("2020-01-02", 1.0), ("2021-01-04", 2.0)]),
        );
        table.merge_series(
            SignalId::from("fresh"),
            &series(&[("2024-01-02", 1.0), ("2025-01-02", 2.0)]),
        );

        let rets = table_returns(&table, 4);
        // Global cutoff is 2021-01-02; the old signal's 2021-01-04 row survives
        // even though its own history ended years ago.
        assert!(rets.dates().contains(&d("2021-01-04")));
        assert!(!rets.dates().contains(&d("2020-01-02")));
        assert_eq!(rets.num_signals(), 2);
    }

    #[test]
    fn empty_inputs_produce_empty_outputs() {
        assert!(series_returns(&PnlSeries::empty(), 4).is_empty());
        assert!(table_returns(&WideTable::new(), 4).is_empty());
    }
}
