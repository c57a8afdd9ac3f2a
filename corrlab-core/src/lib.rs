//! CorrLab Core — corpus management and self-correlation scoring.
//!
//! This crate contains the heart of the tool:
//! - Domain types (signal ids, PnL/return series, the wide table, region index)
//! - Platform client with bounded Retry-After handling
//! - Bulk PnL loader over a fixed worker pool
//! - Corpus store with atomic three-artifact snapshots and incremental refresh
//! - Return transformer (forward-fill, first difference, trailing window)
//! - Correlation engine (pairwise inner-join Pearson, max-abs reduction)

pub mod checker;
pub mod correlation;
pub mod corpus;
pub mod domain;
pub mod platform;
pub mod returns;
