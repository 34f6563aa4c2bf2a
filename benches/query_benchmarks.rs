//! Query performance benchmarks: scan, join, and transitive closure.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use ted::{ColumnSpec, DataType, EngineConfig, IndexMode, Program, TablePredicateHandle, Term};

fn scan_setup(size: u32) -> (Program, TablePredicateHandle) {
    let mut program = Program::new(EngineConfig::default());
    let node = program
        .declare_table("node", vec![ColumnSpec::new("id", DataType::Int, IndexMode::None)], false)
        .unwrap();
    for i in 1..=size {
        program.add_row(&node, vec![i.into()]).unwrap();
    }
    (program, node)
}

fn bench_simple_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("simple_scan");
    for size in [100u32, 1_000, 10_000] {
        let (program, node) = scan_setup(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| program.rows(&node).len());
        });
    }
    group.finish();
}

fn join_setup(size: u32) -> (Program, TablePredicateHandle) {
    let mut program = Program::new(EngineConfig::default());
    let edge = program
        .declare_table(
            "edge",
            vec![
                ColumnSpec::new("from", DataType::Int, IndexMode::NonKey),
                ColumnSpec::new("to", DataType::Int, IndexMode::None),
            ],
            false,
        )
        .unwrap();
    let active = program
        .declare_table("active", vec![ColumnSpec::new("id", DataType::Int, IndexMode::Key)], true)
        .unwrap();
    for i in 1..size {
        program.add_row(&edge, vec![i.into(), (i + 1).into()]).unwrap();
    }
    for i in 1..=size {
        program.add_row(&active, vec![i.into()]).unwrap();
    }

    let result = program
        .declare_table(
            "reachable_active",
            vec![
                ColumnSpec::new("from", DataType::Int, IndexMode::None),
                ColumnSpec::new("to", DataType::Int, IndexMode::None),
            ],
            false,
        )
        .unwrap();
    program
        .rule(
            &result,
            vec![Term::var("x"), Term::var("y")],
            vec![
                edge.apply(vec![Term::var("x"), Term::var("y")]),
                active.apply(vec![Term::var("x")]),
            ],
        )
        .unwrap();
    (program, result)
}

fn bench_two_way_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_way_join");
    for size in [100u32, 1_000] {
        let (mut program, result) = join_setup(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                program.tick_blocking().unwrap();
                program.rows(&result).len()
            });
        });
    }
    group.finish();
}

fn closure_setup(size: u32) -> (Program, TablePredicateHandle) {
    let mut program = Program::new(EngineConfig::default());
    let edge = program
        .declare_table(
            "edge",
            vec![
                ColumnSpec::new("from", DataType::Int, IndexMode::NonKey),
                ColumnSpec::new("to", DataType::Int, IndexMode::None),
            ],
            false,
        )
        .unwrap();
    for i in 1..size {
        program.add_row(&edge, vec![i.into(), (i + 1).into()]).unwrap();
    }

    let reach = program
        .declare_table(
            "reach",
            vec![
                ColumnSpec::new("from", DataType::Int, IndexMode::None),
                ColumnSpec::new("to", DataType::Int, IndexMode::None),
            ],
            false,
        )
        .unwrap();
    program
        .rule(&reach, vec![Term::var("x"), Term::var("y")], vec![edge.apply(vec![Term::var("x"), Term::var("y")])])
        .unwrap();
    program
        .rule(
            &reach,
            vec![Term::var("x"), Term::var("z")],
            vec![reach.apply(vec![Term::var("x"), Term::var("y")]), edge.apply(vec![Term::var("y"), Term::var("z")])],
        )
        .unwrap();
    (program, reach)
}

fn bench_transitive_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_closure");
    // Naive single-pass-per-tick evaluation needs one tick per chain hop to
    // fully converge, so keep sizes modest to bound the benchmark's runtime.
    for size in [50u32, 200] {
        let (mut program, reach) = closure_setup(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                for _ in 0..size {
                    program.tick_blocking().unwrap();
                }
                program.rows(&reach).len()
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_simple_scan, bench_two_way_join, bench_transitive_closure
}
criterion_main!(benches);
