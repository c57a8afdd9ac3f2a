//! Benchmark: one candidate against a thousand-member region corpus.

use chrono::{Duration, NaiveDate};
use corrlab_core::correlation::{max_correlation, Reduction};
use corrlab_core::domain::{PnlSeries, ReturnSeries, SignalId, WideTable};
use corrlab_core::returns::table_returns;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn build_corpus(members: usize, days: usize, rng: &mut StdRng) -> WideTable {
    let start = NaiveDate::from_ymd_opt(2020, 1, 6).unwrap();
    let mut table = WideTable::new();
    let mut batch = Vec::with_capacity(members);
    for m in 0..members {
        let mut level = 1000.0;
        let points: Vec<(NaiveDate, f64)> = (0..days)
            .map(|i| {
                level += rng.gen_range(-10.0..10.0);
                (start + Duration::days(i as i64), level)
            })
            .collect();
        batch.push((SignalId::new(format!("m{m:04}")), PnlSeries::from_points(points)));
    }
    table.merge_many(batch);
    table
}

fn candidate_returns(days: usize, rng: &mut StdRng) -> ReturnSeries {
    let start = NaiveDate::from_ymd_opt(2020, 1, 6).unwrap();
    let dates: Vec<NaiveDate> = (0..days).map(|i| start + Duration::days(i as i64)).collect();
    let values: Vec<f64> = (0..days).map(|_| rng.gen_range(-10.0..10.0)).collect();
    ReturnSeries::from_parts(dates, values)
}

fn bench_max_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_correlation");
    for members in [100usize, 500, 1000] {
        let mut rng = StdRng::seed_from_u64(7);
        let corpus = table_returns(&build_corpus(members, 1000, &mut rng), 4);
        let candidate = candidate_returns(1000, &mut rng);

        group.bench_with_input(BenchmarkId::from_parameter(members), &members, |b, _| {
            b.iter(|| max_correlation(&candidate, &corpus, Reduction::Absolute, 10))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_max_correlation);
criterion_main!(benches);
