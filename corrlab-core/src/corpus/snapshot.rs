//! Snapshot persistence for the corpus.
//!
//! One snapshot is three co-located artifacts plus a metadata sidecar:
//! - `region_index.json` — region → signal-id lists
//! - `pnl_wide.parquet` — the wide date × signal PnL table
//! - `power_pool_ids.json` — ids carrying the power-pool classification
//! - `meta.json` — counts and a blake3 content hash (no timestamps; two
//!   identical snapshots serialize to identical bytes)
//!
//! Writes are atomic as a set: every artifact is fully written to a `.tmp`
//! sibling before the first rename happens, so a crashed run leaves either the
//! previous complete snapshot or a complete new one — never a mix.

use super::CorpusError;
use crate::domain::{RegionIndex, SignalId, WideTable};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "region_index.json";
pub const TABLE_FILE: &str = "pnl_wide.parquet";
pub const POOL_FILE: &str = "power_pool_ids.json";
pub const META_FILE: &str = "meta.json";

/// In-memory corpus state: index, wide PnL table, power-pool id list.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub index: RegionIndex,
    pub table: WideTable,
    pub power_pool: BTreeSet<SignalId>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Completeness invariant: index ids and table columns are the same set.
    pub fn validate(&self) -> Result<(), String> {
        let indexed = self.index.all_ids();
        let columns = self.table.id_set();
        if indexed == columns {
            return Ok(());
        }
        let orphan_ids: Vec<&SignalId> = indexed.difference(&columns).collect();
        let orphan_cols: Vec<&SignalId> = columns.difference(&indexed).collect();
        Err(format!(
            "{} indexed id(s) without a column, {} column(s) without an index entry",
            orphan_ids.len(),
            orphan_cols.len()
        ))
    }
}

/// Metadata sidecar for a persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub signal_count: usize,
    pub date_count: usize,
    pub content_hash: String,
}

impl SnapshotMeta {
    pub fn describe(snapshot: &Snapshot) -> Self {
        Self {
            signal_count: snapshot.table.num_signals(),
            date_count: snapshot.table.num_dates(),
            content_hash: content_hash(snapshot),
        }
    }
}

/// Outcome of loading a persisted snapshot.
///
/// `Missing` is the normal first-run state; `Corrupted` means artifacts exist
/// but cannot be trusted, which callers should surface before rebuilding —
/// silently discarding years of cached corpus hides real bugs.
#[derive(Debug)]
pub enum SnapshotState {
    Loaded(Snapshot),
    Missing,
    Corrupted(String),
}

/// Deterministic blake3 hash over the full snapshot content.
pub fn content_hash(snapshot: &Snapshot) -> String {
    let mut hasher = blake3::Hasher::new();
    let index_json = serde_json::to_vec(&snapshot.index).expect("region index serializes");
    let pool_json = serde_json::to_vec(&snapshot.power_pool).expect("pool id list serializes");
    hasher.update(&index_json);
    hasher.update(&pool_json);
    for date in snapshot.table.dates() {
        hasher.update(&days_since_epoch(*date).to_le_bytes());
    }
    for (id, column) in snapshot.table.iter_columns() {
        hasher.update(id.as_str().as_bytes());
        hasher.update(&[0]);
        for value in column {
            hasher.update(&value.to_bits().to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Persist all artifacts as one atomic set.
pub fn save_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<(), CorpusError> {
    snapshot
        .validate()
        .map_err(CorpusError::Inconsistent)?;

    fs::create_dir_all(dir).map_err(|e| CorpusError::Io(format!("create snapshot dir: {e}")))?;

    let index_json = serde_json::to_string_pretty(&snapshot.index)
        .map_err(|e| CorpusError::Serde(format!("region index: {e}")))?;
    let pool_json = serde_json::to_string_pretty(&snapshot.power_pool)
        .map_err(|e| CorpusError::Serde(format!("pool id list: {e}")))?;
    let meta_json = serde_json::to_string_pretty(&SnapshotMeta::describe(snapshot))
        .map_err(|e| CorpusError::Serde(format!("meta: {e}")))?;

    let targets: [(&str, PathBuf); 4] = [
        (INDEX_FILE, dir.join(INDEX_FILE)),
        (POOL_FILE, dir.join(POOL_FILE)),
        (META_FILE, dir.join(META_FILE)),
        (TABLE_FILE, dir.join(TABLE_FILE)),
    ];
    let tmp_paths: Vec<PathBuf> = targets.iter().map(|(_, p)| tmp_path(p)).collect();

    let cleanup = |paths: &[PathBuf]| {
        for p in paths {
            let _ = fs::remove_file(p);
        }
    };

    // Stage every artifact before the first rename.
    let staged = (|| -> Result<(), CorpusError> {
        fs::write(&tmp_paths[0], &index_json)
            .map_err(|e| CorpusError::Io(format!("write {INDEX_FILE}: {e}")))?;
        fs::write(&tmp_paths[1], &pool_json)
            .map_err(|e| CorpusError::Io(format!("write {POOL_FILE}: {e}")))?;
        fs::write(&tmp_paths[2], &meta_json)
            .map_err(|e| CorpusError::Io(format!("write {META_FILE}: {e}")))?;
        let df = table_to_dataframe(&snapshot.table)?;
        write_parquet(&df, &tmp_paths[3])?;
        Ok(())
    })();
    if let Err(e) = staged {
        cleanup(&tmp_paths);
        return Err(e);
    }

    for (tmp, (name, target)) in tmp_paths.iter().zip(&targets) {
        if let Err(e) = fs::rename(tmp, target) {
            cleanup(&tmp_paths);
            return Err(CorpusError::Io(format!("atomic rename of {name}: {e}")));
        }
    }
    Ok(())
}

/// Load the persisted snapshot, distinguishing "nothing there yet" from
/// "there, but unreadable".
pub fn load_snapshot(dir: &Path) -> SnapshotState {
    let index_path = dir.join(INDEX_FILE);
    let table_path = dir.join(TABLE_FILE);
    let pool_path = dir.join(POOL_FILE);

    let artifacts = [&index_path, &table_path, &pool_path];
    let present = artifacts.iter().filter(|p| p.exists()).count();
    if present == 0 {
        return SnapshotState::Missing;
    }
    if present < artifacts.len() {
        let missing: Vec<String> = artifacts
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        return SnapshotState::Corrupted(format!("artifact(s) missing: {}", missing.join(", ")));
    }

    let snapshot = match read_artifacts(&index_path, &table_path, &pool_path) {
        Ok(s) => s,
        Err(e) => return SnapshotState::Corrupted(e.to_string()),
    };

    if let Err(reason) = snapshot.validate() {
        return SnapshotState::Corrupted(reason);
    }

    // The sidecar is advisory, but a mismatching hash means some artifact was
    // replaced out from under the others.
    let meta_path = dir.join(META_FILE);
    if meta_path.exists() {
        let meta: Result<SnapshotMeta, _> = fs::read_to_string(&meta_path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()));
        match meta {
            Ok(meta) if meta.content_hash != content_hash(&snapshot) => {
                return SnapshotState::Corrupted("content hash mismatch".into());
            }
            Ok(_) => {}
            Err(e) => return SnapshotState::Corrupted(format!("meta sidecar unreadable: {e}")),
        }
    }

    SnapshotState::Loaded(snapshot)
}

fn read_artifacts(
    index_path: &Path,
    table_path: &Path,
    pool_path: &Path,
) -> Result<Snapshot, CorpusError> {
    let index: RegionIndex = serde_json::from_str(
        &fs::read_to_string(index_path).map_err(|e| CorpusError::Io(format!("{INDEX_FILE}: {e}")))?,
    )
    .map_err(|e| CorpusError::Serde(format!("{INDEX_FILE}: {e}")))?;

    let power_pool: BTreeSet<SignalId> = serde_json::from_str(
        &fs::read_to_string(pool_path).map_err(|e| CorpusError::Io(format!("{POOL_FILE}: {e}")))?,
    )
    .map_err(|e| CorpusError::Serde(format!("{POOL_FILE}: {e}")))?;

    let table = read_parquet_table(table_path)?;

    Ok(Snapshot {
        index,
        table,
        power_pool,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

/// Convert the wide table to a Polars DataFrame: one Date column plus one
/// Float64 column per signal.
fn table_to_dataframe(table: &WideTable) -> Result<DataFrame, CorpusError> {
    let dates: Vec<i32> = table.dates().iter().map(|d| days_since_epoch(*d)).collect();

    let mut columns = Vec::with_capacity(table.num_signals() + 1);
    columns.push(
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| CorpusError::Parquet(format!("date cast: {e}")))?,
    );
    for (id, values) in table.iter_columns() {
        columns.push(Column::new(id.as_str().into(), values.to_vec()));
    }

    DataFrame::new(columns).map_err(|e| CorpusError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), CorpusError> {
    let file =
        fs::File::create(path).map_err(|e| CorpusError::Io(format!("create {TABLE_FILE}: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| CorpusError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_parquet_table(path: &Path) -> Result<WideTable, CorpusError> {
    let file = fs::File::open(path).map_err(|e| CorpusError::Io(format!("{TABLE_FILE}: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| CorpusError::Parquet(format!("read parquet: {e}")))?;

    let date_col = df
        .column("date")
        .map_err(|e| CorpusError::Parquet(format!("missing date column: {e}")))?;
    let date_ca = date_col
        .date()
        .map_err(|e| CorpusError::Parquet(format!("date column type: {e}")))?;

    let n = df.height();
    let mut dates = Vec::with_capacity(n);
    for i in 0..n {
        let days = date_ca
            .get(i)
            .ok_or_else(|| CorpusError::Parquet(format!("null date at row {i}")))?;
        dates.push(epoch() + chrono::Duration::days(days as i64));
    }

    let mut columns: BTreeMap<SignalId, Vec<f64>> = BTreeMap::new();
    for col in df.get_columns() {
        if col.name().as_str() == "date" {
            continue;
        }
        let ca = col
            .f64()
            .map_err(|e| CorpusError::Parquet(format!("column '{}' type: {e}", col.name())))?;
        let values: Vec<f64> = (0..n).map(|i| ca.get(i).unwrap_or(f64::NAN)).collect();
        columns.insert(SignalId::new(col.name().as_str()), values);
    }

    Ok(WideTable::from_parts(dates, columns))
}
