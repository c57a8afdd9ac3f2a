//! Batch correlation screening.
//!
//! Two stages over a set of candidate return series:
//! 1. Screen — every candidate against every already-submitted series; one
//!    over-threshold pair disqualifies the candidate.
//! 2. Group analysis — enumerate C(n, k) groups of surviving candidates and
//!    keep the groups whose members are pairwise below the threshold.
//!
//! Stage 2 is CPU-bound and combinatorially large, so chunks of groups run on
//! a private rayon pool and the valid/violation sets merge only after every
//! chunk completes.

use crate::config::AnalysisConfig;
use anyhow::{Context, Result};
use corrlab_core::correlation::pairwise_correlation;
use corrlab_core::domain::{ReturnSeries, SignalId};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// One over-threshold pair inside a group or against the submitted set.
#[derive(Debug, Clone, Serialize)]
pub struct PairViolation {
    pub pair: (SignalId, SignalId),
    pub correlation: f64,
    pub overlap_days: usize,
}

/// Analysis of one candidate group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupAnalysis {
    pub members: Vec<SignalId>,
    pub valid: bool,
    /// Largest absolute pairwise correlation seen before an early exit.
    pub max_correlation: f64,
    pub invalid_pairs: Vec<PairViolation>,
    pub checked_pairs: usize,
}

/// Stage-1 screen result.
#[derive(Debug)]
pub struct ScreenOutcome {
    /// Survivors with their largest absolute correlation against the
    /// submitted set (0.0 when nothing qualified), input order preserved.
    pub passed: Vec<(SignalId, f64)>,
    /// candidate id → the violations that disqualified it.
    pub violations: BTreeMap<SignalId, Vec<PairViolation>>,
}

/// Stage-2 outcome after all chunks merged.
#[derive(Debug)]
pub struct GroupOutcome {
    pub valid: Vec<GroupAnalysis>,
    /// Sorted pair key → violations accumulated across groups.
    pub violations: BTreeMap<(SignalId, SignalId), Vec<PairViolation>>,
    pub total_groups: usize,
}

impl GroupOutcome {
    pub fn max_correlation(&self) -> f64 {
        self.valid
            .iter()
            .map(|g| g.max_correlation)
            .fold(0.0, f64::max)
    }

    pub fn min_correlation(&self) -> f64 {
        if self.valid.is_empty() {
            return 0.0;
        }
        self.valid
            .iter()
            .map(|g| g.max_correlation)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn avg_correlation(&self) -> f64 {
        if self.valid.is_empty() {
            return 0.0;
        }
        self.valid.iter().map(|g| g.max_correlation).sum::<f64>() / self.valid.len() as f64
    }

    /// Valid groups ranked by ascending max correlation — the least redundant
    /// combinations first.
    pub fn ranked(&self) -> Vec<&GroupAnalysis> {
        let mut ranked: Vec<&GroupAnalysis> = self.valid.iter().collect();
        ranked.sort_by(|a, b| {
            a.max_correlation
                .partial_cmp(&b.max_correlation)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}

fn sorted_pair(a: &SignalId, b: &SignalId) -> (SignalId, SignalId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

fn overlap_days(a: &ReturnSeries, b: &ReturnSeries) -> usize {
    let (mut i, mut j, mut n) = (0usize, 0usize, 0usize);
    let (da, db) = (a.dates(), b.dates());
    while i < da.len() && j < db.len() {
        match da[i].cmp(&db[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                if a.values()[i].is_finite() && b.values()[j].is_finite() {
                    n += 1;
                }
                i += 1;
                j += 1;
            }
        }
    }
    n
}

/// Stage 1: drop every candidate that correlates above the threshold with any
/// member of the submitted set.
pub fn screen_candidates(
    candidates: &[(SignalId, ReturnSeries)],
    submitted: &BTreeMap<SignalId, ReturnSeries>,
    config: &AnalysisConfig,
) -> ScreenOutcome {
    let mut passed = Vec::new();
    let mut violations: BTreeMap<SignalId, Vec<PairViolation>> = BTreeMap::new();

    'candidates: for (id, series) in candidates {
        let mut best = 0.0f64;
        for (submitted_id, submitted_series) in submitted {
            let Some(corr) = pairwise_correlation(series, submitted_series, config.min_overlap)
            else {
                continue;
            };
            if corr.abs() > config.threshold {
                violations.entry(id.clone()).or_default().push(PairViolation {
                    pair: sorted_pair(id, submitted_id),
                    correlation: corr,
                    overlap_days: overlap_days(series, submitted_series),
                });
                continue 'candidates;
            }
            best = best.max(corr.abs());
        }
        passed.push((id.clone(), best));
    }

    ScreenOutcome { passed, violations }
}

/// All k-combinations of 0..n, lexicographic.
///
/// Materializes every combination: C(n, k) grows fast, and callers are
/// expected to keep n modest (screened survivors, not the raw candidate set).
pub fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k == 0 || k > n {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut current: Vec<usize> = (0..k).collect();
    loop {
        out.push(current.clone());
        // Advance the rightmost index that can still move.
        let mut i = k;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if current[i] != i + n - k {
                break;
            }
        }
        current[i] += 1;
        for j in (i + 1)..k {
            current[j] = current[j - 1] + 1;
        }
    }
}

fn analyze_group(
    members: &[usize],
    candidates: &[(SignalId, ReturnSeries)],
    config: &AnalysisConfig,
) -> GroupAnalysis {
    let mut analysis = GroupAnalysis {
        members: members.iter().map(|&i| candidates[i].0.clone()).collect(),
        valid: true,
        max_correlation: 0.0,
        invalid_pairs: Vec::new(),
        checked_pairs: 0,
    };
    analysis.members.sort();

    'pairs: for (a_pos, &a) in members.iter().enumerate() {
        for &b in &members[a_pos + 1..] {
            let (id_a, series_a) = &candidates[a];
            let (id_b, series_b) = &candidates[b];
            analysis.checked_pairs += 1;

            let Some(corr) = pairwise_correlation(series_a, series_b, config.min_overlap) else {
                continue;
            };
            let abs = corr.abs();
            analysis.max_correlation = analysis.max_correlation.max(abs);

            if abs > config.threshold {
                analysis.valid = false;
                analysis.invalid_pairs.push(PairViolation {
                    pair: sorted_pair(id_a, id_b),
                    correlation: corr,
                    overlap_days: overlap_days(series_a, series_b),
                });
                // One bad pair sinks the group; skip the rest.
                break 'pairs;
            }
        }
    }
    analysis
}

/// Stage 2: enumerate and analyze every group of `config.group_size`
/// candidates in parallel chunks.
pub fn analyze_groups(
    candidates: &[(SignalId, ReturnSeries)],
    config: &AnalysisConfig,
) -> Result<GroupOutcome> {
    let groups = combinations(candidates.len(), config.group_size);
    let total_groups = groups.len();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build()
        .context("building group-analysis thread pool")?;

    let chunk_results: Vec<Vec<GroupAnalysis>> = pool.install(|| {
        groups
            .chunks(config.chunk_size.max(1))
            .collect::<Vec<_>>()
            .par_iter()
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|members| analyze_group(members, candidates, config))
                    .collect()
            })
            .collect()
    });

    // Merge only after every chunk has finished.
    let mut valid = Vec::new();
    let mut violations: BTreeMap<(SignalId, SignalId), Vec<PairViolation>> = BTreeMap::new();
    for analysis in chunk_results.into_iter().flatten() {
        if analysis.valid {
            valid.push(analysis);
        } else {
            for violation in &analysis.invalid_pairs {
                violations
                    .entry(violation.pair.clone())
                    .or_default()
                    .push(violation.clone());
            }
        }
    }

    Ok(GroupOutcome {
        valid,
        violations,
        total_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;

    fn rets(values: &[f64]) -> ReturnSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..values.len())
            .map(|i| start + Duration::days(i as i64))
            .collect();
        ReturnSeries::from_parts(dates, values.to_vec())
    }

    fn base_values() -> Vec<f64> {
        (0..40).map(|i| ((i * 37 + 11) % 17) as f64 - 8.0).collect()
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            workers: 2,
            chunk_size: 3,
            group_size: 2,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn screen_drops_near_duplicates_of_submitted() {
        let base = base_values();
        let shifted: Vec<f64> = base.iter().map(|v| v * 1.5 + 0.1).collect();
        let independent: Vec<f64> =
            (0..40).map(|i| ((i * 53 + 29) % 23) as f64 - 11.0).collect();

        let mut submitted = BTreeMap::new();
        submitted.insert(SignalId::from("sub"), rets(&base));

        let candidates = vec![
            (SignalId::from("dup"), rets(&shifted)),
            (SignalId::from("novel"), rets(&independent)),
        ];

        let outcome = screen_candidates(&candidates, &submitted, &config());
        assert_eq!(outcome.passed.len(), 1);
        assert_eq!(outcome.passed[0].0, SignalId::from("novel"));
        assert!(outcome.violations.contains_key(&SignalId::from("dup")));
    }

    #[test]
    fn group_with_internal_duplicate_is_invalid() {
        let base = base_values();
        let twin: Vec<f64> = base.iter().map(|v| v * 2.0).collect();
        let independent: Vec<f64> =
            (0..40).map(|i| ((i * 53 + 29) % 23) as f64 - 11.0).collect();

        let candidates = vec![
            (SignalId::from("a"), rets(&base)),
            (SignalId::from("b"), rets(&twin)),
            (SignalId::from("c"), rets(&independent)),
        ];

        let outcome = analyze_groups(&candidates, &config()).unwrap();
        assert_eq!(outcome.total_groups, 3);

        let valid_members: Vec<Vec<String>> = outcome
            .valid
            .iter()
            .map(|g| g.members.iter().map(|id| id.to_string()).collect())
            .collect();
        // {a, b} is sunk by the internal twin; the other two pairs survive.
        assert_eq!(outcome.valid.len(), 2);
        assert!(!valid_members.contains(&vec!["a".to_string(), "b".to_string()]));
        assert_eq!(outcome.violations.len(), 1);
        assert!(outcome
            .violations
            .contains_key(&(SignalId::from("a"), SignalId::from("b"))));
    }

    #[test]
    fn group_size_one_never_violates() {
        let candidates = vec![
            (SignalId::from("a"), rets(&base_values())),
            (SignalId::from("b"), rets(&base_values())),
        ];
        let outcome = analyze_groups(
            &candidates,
            &AnalysisConfig {
                group_size: 1,
                workers: 1,
                ..AnalysisConfig::default()
            },
        )
        .unwrap();
        assert_eq!(outcome.total_groups, 2);
        assert_eq!(outcome.valid.len(), 2);
    }

    #[test]
    fn combinations_enumerate_lexicographically() {
        assert_eq!(
            combinations(4, 2),
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert!(combinations(3, 0).is_empty());
        assert!(combinations(2, 3).is_empty());
    }

    fn binomial(n: u64, k: u64) -> u64 {
        if k > n {
            return 0;
        }
        let k = k.min(n - k);
        let mut acc = 1u64;
        for i in 0..k {
            acc = acc * (n - i) / (i + 1);
        }
        acc
    }

    proptest! {
        /// Enumeration is complete: |combinations(n, k)| == C(n, k).
        #[test]
        fn combination_count_matches_binomial(n in 0usize..12, k in 0usize..6) {
            let expected = if k == 0 { 0 } else { binomial(n as u64, k as u64) };
            prop_assert_eq!(combinations(n, k).len() as u64, expected);
        }
    }
}
