//! CorrLab CLI — corpus refresh, candidate checks, batch filtering, and
//! combinatorial group analysis.
//!
//! Commands:
//! - `refresh` — bring the corpus snapshot up to date (incremental by default)
//! - `check` — self-correlation of one signal against the corpus
//! - `filter` — keep the candidates at or below a correlation threshold
//! - `groups` — screen candidate PnL files and analyze group combinations
//! - `snapshot status` — artifact presence and corpus dimensions
//!
//! Platform credentials come from `CORRLAB_BASE_URL` and `CORRLAB_AUTH_TOKEN`
//! (a `.env` file is honored).

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use corrlab_core::checker::{CheckerConfig, CorrelationChecker};
use corrlab_core::correlation::Reduction;
use corrlab_core::corpus::{CorpusStore, SnapshotState};
use corrlab_core::domain::{PnlSeries, ReturnSeries, SignalId};
use corrlab_core::platform::{PlatformClient, SignalMeta, StdoutProgress};
use corrlab_core::returns::series_returns;
use corrlab_runner::{
    analyze_groups, screen_candidates, write_correlation_csv, write_valid_groups_json,
    write_violations_json, AnalysisConfig,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "corrlab", about = "CorrLab — signal self-correlation toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the corpus snapshot up to date with the platform listing.
    Refresh {
        /// Rebuild from scratch instead of refreshing incrementally.
        #[arg(long, default_value_t = false)]
        full: bool,

        /// Snapshot directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Compute one signal's self-correlation against the comparison corpus.
    Check {
        /// Signal id to check.
        signal_id: String,

        /// Report the maximum signed correlation instead of maximum absolute.
        #[arg(long, default_value_t = false)]
        signed: bool,

        /// Write the per-member correlation table to this CSV file.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Snapshot directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Filter a candidate list file by self-correlation threshold.
    Filter {
        /// JSON array of candidates: [{"id": ..., "region": ...}, ...].
        #[arg(long)]
        input: PathBuf,

        /// Inclusive pass threshold.
        #[arg(long, default_value_t = 0.7)]
        threshold: f64,

        /// Write survivors to this JSON file (stdout otherwise).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Snapshot directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Screen candidate PnL files and analyze group combinations.
    Groups {
        /// JSON map of candidate id → [[date, pnl], ...].
        #[arg(long)]
        input: PathBuf,

        /// JSON map of already-submitted id → [[date, pnl], ...].
        #[arg(long)]
        submitted: Option<PathBuf>,

        /// TOML analysis config; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for valid_groups.json and violations.json.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Snapshot management commands.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Report artifact presence and corpus dimensions.
    Status {
        /// Snapshot directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Refresh { full, data_dir } => run_refresh(full, data_dir),
        Commands::Check {
            signal_id,
            signed,
            report,
            data_dir,
        } => run_check(signal_id, signed, report, data_dir),
        Commands::Filter {
            input,
            threshold,
            output,
            data_dir,
        } => run_filter(input, threshold, output, data_dir),
        Commands::Groups {
            input,
            submitted,
            config,
            output_dir,
        } => run_groups(input, submitted, config, output_dir),
        Commands::Snapshot { action } => match action {
            SnapshotAction::Status { data_dir } => run_snapshot_status(data_dir),
        },
    }
}

fn platform_client() -> Result<PlatformClient> {
    let base_url = std::env::var("CORRLAB_BASE_URL")
        .context("CORRLAB_BASE_URL is not set (put it in .env or the environment)")?;
    let token = std::env::var("CORRLAB_AUTH_TOKEN")
        .context("CORRLAB_AUTH_TOKEN is not set (put it in .env or the environment)")?;
    PlatformClient::new(base_url, &token).context("building platform client")
}

fn checker(data_dir: PathBuf, reduction: Reduction) -> Result<CorrelationChecker> {
    let client = platform_client()?;
    let store = CorpusStore::new(data_dir);
    Ok(CorrelationChecker::new(Box::new(client), store).with_config(CheckerConfig {
        reduction,
        ..CheckerConfig::default()
    }))
}

fn run_refresh(full: bool, data_dir: PathBuf) -> Result<()> {
    let checker = checker(data_dir, Reduction::default())?;
    let summary = checker.refresh_corpus(!full, &StdoutProgress)?;

    println!(
        "Newly listed: {}, fetched: {}, corpus total: {}",
        summary.new_signals, summary.fetched, summary.total_signals
    );
    for (id, error) in &summary.failed {
        println!("  failed: {id}: {error}");
    }
    Ok(())
}

fn run_check(
    signal_id: String,
    signed: bool,
    report: Option<PathBuf>,
    data_dir: PathBuf,
) -> Result<()> {
    let reduction = if signed {
        Reduction::SignedMax
    } else {
        Reduction::Absolute
    };
    let checker = checker(data_dir, reduction)?;
    let check = checker.check(&SignalId::new(signal_id), None)?;

    println!(
        "{} [{}]: self-correlation {:.4}",
        check.candidate.id, check.candidate.region, check.value
    );
    for (id, correlation) in check.ranked.iter().take(10) {
        println!("  {id}: {correlation:.4}");
    }

    if let Some(path) = report {
        write_correlation_csv(&path, &check.ranked)?;
        println!("Correlation table written to {}", path.display());
    }
    Ok(())
}

fn run_filter(
    input: PathBuf,
    threshold: f64,
    output: Option<PathBuf>,
    data_dir: PathBuf,
) -> Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("reading candidate list {}", input.display()))?;
    let candidates: Vec<SignalMeta> =
        serde_json::from_str(&text).context("candidate list must be a JSON array of signals")?;

    let checker = checker(data_dir, Reduction::default())?;
    let kept = checker.filter_by_correlation(&candidates, threshold)?;

    println!(
        "Filtering at threshold {threshold}: {}/{} candidates pass",
        kept.len(),
        candidates.len()
    );
    let json = serde_json::to_string_pretty(&kept)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("writing survivors to {}", path.display()))?;
            println!("Survivors written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_groups(
    input: PathBuf,
    submitted: Option<PathBuf>,
    config: Option<PathBuf>,
    output_dir: PathBuf,
) -> Result<()> {
    let cfg = match config {
        Some(path) => AnalysisConfig::from_toml_path(&path)?,
        None => AnalysisConfig::default(),
    };

    let candidates = load_return_series(&input, cfg.window_years)?;
    let submitted: BTreeMap<SignalId, ReturnSeries> = match submitted {
        Some(path) => load_return_series(&path, cfg.window_years)?.into_iter().collect(),
        None => BTreeMap::new(),
    };
    println!(
        "Loaded {} candidate and {} submitted series",
        candidates.len(),
        submitted.len()
    );

    let screen = screen_candidates(&candidates, &submitted, &cfg);
    println!(
        "Screen: {}/{} candidates pass",
        screen.passed.len(),
        candidates.len()
    );

    let survivors: Vec<(SignalId, ReturnSeries)> = {
        let passed: Vec<&SignalId> = screen.passed.iter().map(|(id, _)| id).collect();
        candidates
            .into_iter()
            .filter(|(id, _)| passed.contains(&id))
            .collect()
    };

    if survivors.len() < cfg.group_size {
        bail!(
            "only {} survivors, cannot form groups of {}",
            survivors.len(),
            cfg.group_size
        );
    }

    let outcome = analyze_groups(&survivors, &cfg)?;
    println!(
        "Groups: {}/{} valid (max {:.4}, min {:.4}, avg {:.4})",
        outcome.valid.len(),
        outcome.total_groups,
        outcome.max_correlation(),
        outcome.min_correlation(),
        outcome.avg_correlation()
    );

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    write_valid_groups_json(&output_dir.join("valid_groups.json"), &outcome, &cfg)?;
    write_violations_json(&output_dir.join("violations.json"), &screen, &outcome)?;
    println!("Artifacts written to {}", output_dir.display());
    Ok(())
}

fn run_snapshot_status(data_dir: PathBuf) -> Result<()> {
    let store = CorpusStore::new(&data_dir);
    match store.load_state() {
        SnapshotState::Missing => {
            println!("No snapshot at {} (run `corrlab refresh`)", data_dir.display());
        }
        SnapshotState::Corrupted(reason) => {
            println!("Snapshot at {} is CORRUPTED: {reason}", data_dir.display());
            println!("A full refresh will rebuild it.");
        }
        SnapshotState::Loaded(snapshot) => {
            println!("Snapshot at {}", data_dir.display());
            println!("  signals: {}", snapshot.table.num_signals());
            println!("  trading dates: {}", snapshot.table.num_dates());
            println!("  regions: {}", snapshot.index.regions().count());
            println!("  power-pool signals: {}", snapshot.power_pool.len());
            if let (Some(first), Some(last)) =
                (snapshot.table.dates().first(), snapshot.table.max_date())
            {
                println!("  date range: {first} .. {last}");
            }
        }
    }
    Ok(())
}

/// Load a JSON map of id → [[date, pnl], ...] and transform to returns.
fn load_return_series(path: &Path, window_years: u32) -> Result<Vec<(SignalId, ReturnSeries)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading series file {}", path.display()))?;
    let raw: BTreeMap<String, Vec<(String, f64)>> =
        serde_json::from_str(&text).context("series file must map ids to [date, pnl] pairs")?;

    let mut out = Vec::with_capacity(raw.len());
    for (id, rows) in raw {
        let mut points = Vec::with_capacity(rows.len());
        for (date, value) in rows {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("bad date '{date}' in series {id}"))?;
            points.push((date, value));
        }
        let series = series_returns(&PnlSeries::from_points(points), window_years);
        if series.is_empty() {
            eprintln!("WARNING: series {id} is empty after windowing; skipped");
            continue;
        }
        out.push((SignalId::new(id), series));
    }
    Ok(out)
}
