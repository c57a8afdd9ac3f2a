//! CorrLab Runner — batch orchestration over the core correlation primitive.
//!
//! - Serializable analysis configuration (TOML-loadable)
//! - Stage-1 screen: candidates against the submitted corpus
//! - Stage-2 combinatorial group analysis on a private rayon pool
//! - JSON/CSV artifact export

pub mod config;
pub mod groups;
pub mod report;

pub use config::AnalysisConfig;
pub use groups::{
    analyze_groups, combinations, screen_candidates, GroupAnalysis, GroupOutcome, PairViolation,
    ScreenOutcome,
};
pub use report::{write_correlation_csv, write_valid_groups_json, write_violations_json};
