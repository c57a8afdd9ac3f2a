//! Date-indexed daily series: cumulative PnL levels and derived returns.

use chrono::NaiveDate;

/// Cumulative daily PnL for one signal, date-ascending.
///
/// Dates are the signal's own trading calendar — different signals list on
/// different days and skip different holidays, so two series rarely share an
/// identical date axis.
#[derive(Debug, Clone, PartialEq)]
pub struct PnlSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl PnlSeries {
    /// Build a series from (date, value) observations.
    ///
    /// Observations are sorted by date; on duplicate dates the last one wins.
    pub fn from_points(mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.sort_by_key(|(date, _)| *date);
        let mut dates = Vec::with_capacity(points.len());
        let mut values = Vec::with_capacity(points.len());
        for (date, value) in points {
            if dates.last() == Some(&date) {
                *values.last_mut().unwrap() = value;
            } else {
                dates.push(date);
                values.push(value);
            }
        }
        Self { dates, values }
    }

    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Latest observed date, if any.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }
}

/// First-differenced daily returns for one signal.
///
/// Derived from a [`PnlSeries`] by the return transformer; NaN marks positions
/// where the difference is undefined (the first observation, or a leading gap
/// forward-fill could not reach). Never persisted — recomputed on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    /// Assemble from already-aligned parallel vectors.
    ///
    /// Callers must pass dates sorted ascending with no duplicates.
    pub fn from_parts(dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        debug_assert_eq!(dates.len(), values.len());
        debug_assert!(dates.windows(2).all(|w| w[0] < w[1]));
        Self { dates, values }
    }

    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Count of defined (non-NaN) observations.
    pub fn defined_len(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }
}
