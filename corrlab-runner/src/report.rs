//! Artifact export for batch analyses.
//!
//! - `valid_groups.json` — surviving groups with summary statistics
//! - `violations.json` — screen and in-group violations, keyed by pair
//! - per-candidate correlation CSV, sorted most-correlated first

use crate::config::AnalysisConfig;
use crate::groups::{GroupOutcome, PairViolation, ScreenOutcome};
use anyhow::{Context, Result};
use corrlab_core::domain::SignalId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ValidGroupsReport<'a> {
    metadata: ReportMetadata,
    groups: Vec<GroupRow<'a>>,
}

#[derive(Debug, Serialize)]
struct ReportMetadata {
    analysis_date: String,
    group_size: usize,
    total_groups: usize,
    valid_groups: usize,
    max_correlation: f64,
    min_correlation: f64,
    avg_correlation: f64,
    threshold: f64,
}

#[derive(Debug, Serialize)]
struct GroupRow<'a> {
    members: &'a [SignalId],
    max_correlation: f64,
    checked_pairs: usize,
}

/// Write the surviving groups ranked least-correlated first.
pub fn write_valid_groups_json(
    path: &Path,
    outcome: &GroupOutcome,
    config: &AnalysisConfig,
) -> Result<()> {
    let report = ValidGroupsReport {
        metadata: ReportMetadata {
            analysis_date: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
            group_size: config.group_size,
            total_groups: outcome.total_groups,
            valid_groups: outcome.valid.len(),
            max_correlation: round4(outcome.max_correlation()),
            min_correlation: round4(outcome.min_correlation()),
            avg_correlation: round4(outcome.avg_correlation()),
            threshold: config.threshold,
        },
        groups: outcome
            .ranked()
            .into_iter()
            .map(|g| GroupRow {
                members: &g.members,
                max_correlation: round4(g.max_correlation),
                checked_pairs: g.checked_pairs,
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

#[derive(Debug, Serialize)]
struct ViolationsReport<'a> {
    /// Candidate-vs-submitted violations from the screen stage.
    cross: &'a BTreeMap<SignalId, Vec<PairViolation>>,
    /// In-group violations, keyed "a-b".
    internal: BTreeMap<String, &'a Vec<PairViolation>>,
}

/// Write every recorded violation from both stages.
pub fn write_violations_json(
    path: &Path,
    screen: &ScreenOutcome,
    groups: &GroupOutcome,
) -> Result<()> {
    let internal: BTreeMap<String, &Vec<PairViolation>> = groups
        .violations
        .iter()
        .map(|((a, b), v)| (format!("{a}-{b}"), v))
        .collect();

    let report = ViolationsReport {
        cross: &screen.violations,
        internal,
    };
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

/// Write a candidate's per-corpus-member correlations, most correlated first.
pub fn write_correlation_csv(path: &Path, ranked: &[(SignalId, f64)]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["signal_id", "correlation"])?;
    for (id, correlation) in ranked {
        writer.write_record([id.as_str(), format!("{correlation:.4}").as_str()])?;
    }
    writer.flush().context("flushing correlation csv")?;
    Ok(())
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
