//! Pairwise Pearson correlation over ragged daily return series.
//!
//! Every comparison aligns the two operands on their common dates first
//! (inner join), skipping positions where either side is undefined. Two corpus
//! members may therefore overlap the candidate on different date sets.

use crate::domain::{ReturnSeries, SignalId, WideTable};
use chrono::NaiveDate;

/// Pairs below this many common defined dates carry no correlation evidence.
pub const DEFAULT_MIN_OVERLAP: usize = 10;

/// How per-member correlations reduce to one reported number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// Maximum of absolute correlations — a strongly negative match is as
    /// redundant as a strongly positive one. The documented behavior.
    #[default]
    Absolute,
    /// Maximum of signed correlations. Kept only for compatibility with
    /// historical filtering decisions; opt in explicitly.
    SignedMax,
}

impl Reduction {
    pub fn reduce(self, correlations: &[f64]) -> Option<f64> {
        match self {
            Reduction::Absolute => correlations
                .iter()
                .map(|c| c.abs())
                .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c)))),
            Reduction::SignedMax => correlations
                .iter()
                .copied()
                .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c)))),
        }
    }
}

/// Pearson correlation over the pairs where both sides are defined.
///
/// Returns None when fewer than `min_overlap` common defined dates exist or
/// when either side has zero variance over the overlap.
pub fn pairwise_correlation(
    a: &ReturnSeries,
    b: &ReturnSeries,
    min_overlap: usize,
) -> Option<f64> {
    correlation_indexed(a.dates(), a.values(), b.dates(), b.values(), min_overlap)
}

/// Merge-join correlation over two (dates, values) slices, both date-ascending.
fn correlation_indexed(
    dates_a: &[NaiveDate],
    values_a: &[f64],
    dates_b: &[NaiveDate],
    values_b: &[f64],
    min_overlap: usize,
) -> Option<f64> {
    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();

    let (mut i, mut j) = (0usize, 0usize);
    while i < dates_a.len() && j < dates_b.len() {
        match dates_a[i].cmp(&dates_b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let (x, y) = (values_a[i], values_b[j]);
                if x.is_finite() && y.is_finite() {
                    xs.push(x);
                    ys.push(y);
                }
                i += 1;
                j += 1;
            }
        }
    }

    if xs.len() < min_overlap {
        return None;
    }
    pearson(&xs, &ys)
}

/// Pearson r over paired samples. None on zero variance.
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    Some((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
}

/// Signed correlation of a candidate against every column of a return table,
/// sorted descending. Pairs without enough evidence are omitted.
pub fn correlations_with(
    candidate: &ReturnSeries,
    table: &WideTable,
    min_overlap: usize,
) -> Vec<(SignalId, f64)> {
    let mut out: Vec<(SignalId, f64)> = table
        .iter_columns()
        .filter_map(|(id, column)| {
            correlation_indexed(
                candidate.dates(),
                candidate.values(),
                table.dates(),
                column,
                min_overlap,
            )
            .map(|c| (id.clone(), c))
        })
        .collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    out
}

/// Reduce a candidate's per-member correlations to one score.
///
/// An empty corpus or an all-skipped comparison reduces to 0.0 — "no detected
/// correlation" rather than an error, so data-poor candidates are not blocked.
/// Callers log when this fail-open path triggers.
pub fn max_correlation(
    candidate: &ReturnSeries,
    table: &WideTable,
    reduction: Reduction,
    min_overlap: usize,
) -> f64 {
    let signed: Vec<f64> = correlations_with(candidate, table, min_overlap)
        .into_iter()
        .map(|(_, c)| c)
        .collect();
    reduction.reduce(&signed).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalId;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rets(start: &str, values: &[f64]) -> ReturnSeries {
        let first = d(start);
        let dates: Vec<NaiveDate> = (0..values.len())
            .map(|i| first + chrono::Duration::days(i as i64))
            .collect();
        ReturnSeries::from_parts(dates, values.to_vec())
    }

    #[test]
    fn perfectly_correlated_series_score_one() {
        let a = rets("2024-01-01", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let b = rets("2024-01-01", &[2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0]);
        let c = pairwise_correlation(&a, &b, 10).unwrap();
        assert!((c - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_is_symmetric() {
        let a = rets("2024-01-01", &[1.0, -2.0, 3.0, 0.5, -1.5, 2.5, 0.0, 1.0, -0.5, 4.0]);
        let b = rets("2024-01-01", &[0.3, 1.2, -0.7, 2.0, 0.1, -1.1, 0.9, 0.4, 1.5, -2.0]);
        let ab = pairwise_correlation(&a, &b, 10).unwrap();
        let ba = pairwise_correlation(&b, &a, 10).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn below_min_overlap_is_excluded() {
        // Only 5 common dates when 10 are required.
        let a = rets("2024-01-01", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = rets("2024-01-01", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(pairwise_correlation(&a, &b, 10), None);
        assert!(pairwise_correlation(&a, &b, 5).is_some());
    }

    #[test]
    fn nan_positions_do_not_count_toward_overlap() {
        let mut values_a = vec![1.0; 12];
        values_a[0] = f64::NAN;
        values_a[1] = f64::NAN;
        values_a[2] = f64::NAN;
        let a = rets("2024-01-01", &values_a);
        let b = rets("2024-01-01", &[2.0; 12]);
        // 9 defined common dates < 10.
        assert_eq!(pairwise_correlation(&a, &b, 10), None);
    }

    #[test]
    fn zero_variance_side_yields_none() {
        let a = rets("2024-01-01", &[1.0; 10]);
        let b = rets("2024-01-01", &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        assert_eq!(pairwise_correlation(&a, &b, 10), None);
    }

    #[test]
    fn absolute_reduction_flags_strong_negative() {
        let candidate = rets("2024-01-01", &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 1.0, -1.0, 2.0, -2.0]);
        let inverse: Vec<f64> = candidate.values().iter().map(|v| -v).collect();

        let mut table = WideTable::new();
        table.merge_series(
            SignalId::from("inv"),
            &crate::domain::PnlSeries::from_points(
                candidate.dates().iter().copied().zip(inverse).collect(),
            ),
        );
        // The table already holds return-like values; compare directly.
        let absolute = max_correlation(&candidate, &table, Reduction::Absolute, 10);
        let signed = max_correlation(&candidate, &table, Reduction::SignedMax, 10);
        assert!((absolute - 1.0).abs() < 1e-9);
        assert!((signed + 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_corpus_scores_zero() {
        let candidate = rets("2024-01-01", &[1.0; 10]);
        let empty = WideTable::new();
        assert_eq!(
            max_correlation(&candidate, &empty, Reduction::Absolute, 10),
            0.0
        );
    }

    #[test]
    fn correlations_are_sorted_descending() {
        let candidate = rets("2024-01-01", &[1.0, 2.0, 1.5, 3.0, 2.5, 4.0, 3.5, 5.0, 4.5, 6.0]);
        let mut table = WideTable::new();
        let aligned = candidate.values().to_vec();
        let noisy: Vec<f64> = candidate
            .values()
            .iter()
            .enumerate()
            .map(|(i, v)| if i % 2 == 0 { v + 2.0 } else { v - 2.0 })
            .collect();
        for (name, values) in [("twin", aligned), ("noisy", noisy)] {
            table.merge_series(
                SignalId::from(name),
                &crate::domain::PnlSeries::from_points(
                    candidate.dates().iter().copied().zip(values).collect(),
                ),
            );
        }
        let ranked = correlations_with(&candidate, &table, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, SignalId::from("twin"));
        assert!(ranked[0].1 >= ranked[1].1);
    }
}
