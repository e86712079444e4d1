//! Benchmarks for storage operations
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serialscope_rs::config::StorageConfig;
use serialscope_rs::storage::remote::{flux, line_protocol};
use serialscope_rs::{DataPoint, QueryRange, StorageEngine};

fn sample_point(i: i64) -> DataPoint {
    DataPoint::new("temperature")
        .with_tag("room", "lab 1")
        .with_tag("sensor", format!("s{}", i % 8))
        .with_field("value", 20.0 + (i % 100) as f64 / 10.0)
        .with_field("raw", i)
        .with_field("ok", i % 3 != 0)
        .with_timestamp(Utc.timestamp_opt(1_700_000_000 + i, 0).single().unwrap_or_default())
}

fn bench_line_protocol(c: &mut Criterion) {
    let points: Vec<DataPoint> = (0..1000).map(sample_point).collect();

    let mut group = c.benchmark_group("line_protocol");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("encode_1000", |b| {
        b.iter(|| {
            for point in &points {
                black_box(line_protocol::encode_point(black_box(point)).ok());
            }
        })
    });
    group.finish();
}

fn bench_annotated_csv(c: &mut Criterion) {
    let mut body = String::from(
        "#datatype,string,long,dateTime:RFC3339,double,string,string,string\r\n\
,result,table,_time,_value,_field,_measurement,room\r\n",
    );
    for i in 0..1000 {
        let time = Utc
            .timestamp_opt(1_700_000_000 + i, 0)
            .single()
            .unwrap_or_default()
            .to_rfc3339();
        body.push_str(&format!(",_result,0,{},{}.5,value,temperature,lab\r\n", time, i));
    }

    let mut group = c.benchmark_group("annotated_csv");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("parse_and_group_1000", |b| {
        b.iter(|| {
            let rows = flux::parse_annotated_csv(black_box(&body)).unwrap_or_default();
            black_box(flux::rows_to_points(rows))
        })
    });
    group.finish();
}

fn bench_local_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_query");
    group.sample_size(20);

    for size in [100i64, 1000] {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let Ok(engine) = StorageEngine::from_config(StorageConfig::local(dir.path())) else {
            return;
        };
        for i in 0..size {
            let _ = engine.persist(sample_point(i));
        }
        let range = QueryRange::new(
            Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
            Utc.timestamp_opt(1_700_000_000 + size / 2, 0).single().unwrap_or_default(),
        );

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("scan", size), &range, |b, range| {
            b.iter(|| black_box(engine.query("temperature", range).map(|p| p.len()).ok()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_line_protocol,
    bench_annotated_csv,
    bench_local_query
);
criterion_main!(benches);
