#![allow(unused_must_use)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use srcgrep::{search, SearchConfig};
use std::{fs::File, io::Write};
use tempfile::tempdir;

fn create_test_files(
    dir: &tempfile::TempDir,
    file_count: usize,
    lines_per_file: usize,
) -> std::io::Result<()> {
    for i in 0..file_count {
        let file_path = dir.path().join(format!("test_{}.c", i));
        let mut file = File::create(file_path)?;
        for j in 0..lines_per_file {
            writeln!(
                file,
                "line {} TODO: fix bug {} FIXME: optimize line {} NOTE: task {}",
                j, j, j, j
            )?;
        }
    }
    Ok(())
}

fn bench_pattern_shapes(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir().unwrap();
    create_test_files(&dir, 10, 200)?;

    let patterns = vec![
        "TODO",
        r"TODO:.*\d+",
        r"FIXME:.*bug.*line \d+",
        r"NOTE:.*task \d+",
    ];

    let mut group = c.benchmark_group("Pattern Shapes");
    for (i, pattern) in patterns.iter().enumerate() {
        let config = SearchConfig::new(*pattern, dir.path()).with_jobs(1);
        group.bench_function(format!("pattern_{}", i), |b| {
            b.iter(|| black_box(search(&config).unwrap()));
        });
    }
    group.finish();
    Ok(())
}

fn bench_file_scaling(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir().unwrap();
    let file_counts = vec![1, 10, 100];

    let mut group = c.benchmark_group("File Scaling");
    for &count in &file_counts {
        create_test_files(&dir, count, 50)?;
        let config = SearchConfig::new("TODO", dir.path());

        group.bench_function(format!("files_{}", count), |b| {
            b.iter(|| black_box(search(&config).unwrap()));
        });
    }
    group.finish();
    Ok(())
}

fn bench_worker_scaling(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir().unwrap();
    create_test_files(&dir, 200, 100)?;

    let mut group = c.benchmark_group("Worker Scaling");
    for jobs in [1usize, 2, 4, 8] {
        let config = SearchConfig::new("TODO", dir.path()).with_jobs(jobs);
        group.bench_function(format!("jobs_{}", jobs), |b| {
            b.iter(|| black_box(search(&config).unwrap()));
        });
    }
    group.finish();
    Ok(())
}

fn bench_literal_vs_regex(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir().unwrap();
    create_test_files(&dir, 50, 200)?;

    let mut group = c.benchmark_group("Literal Fast Path");

    let literal = SearchConfig::new("optimize", dir.path()).with_jobs(2);
    group.bench_function("literal_bypass", |b| {
        b.iter(|| black_box(search(&literal).unwrap()));
    });

    // Same language, forced through the regex engine.
    let regex = SearchConfig::new("optimiz[e]", dir.path()).with_jobs(2);
    group.bench_function("regex_engine", |b| {
        b.iter(|| black_box(search(&regex).unwrap()));
    });

    group.finish();
    Ok(())
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_pattern_shapes, bench_file_scaling,
              bench_worker_scaling, bench_literal_vs_regex
}

#[test]
fn ensure_benchmarks_valid() {
    benches();
}

criterion_main!(benches);
