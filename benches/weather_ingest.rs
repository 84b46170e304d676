use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polars::prelude::*;
use weather_ingest::{build_key, clean_frame, Granularity, RAW_COLUMNS};

fn raw_frame(n: usize) -> DataFrame {
    let cities = ["hanoi", " Hanoi ", "danang", "HUE"];
    let row = |i: usize| -> [String; 14] {
        [
            format!("2024-01-01 {:02}:{:02}:00", (i / 60) % 24, i % 60),
            cities[i % cities.len()].to_string(),
            "20.5".into(),
            "80".into(),
            "Clouds".into(),
            "1.5".into(),
            "2".into(),
            "230.3".into(),
            "0.1".into(),
            "N/A".into(),
            "70".into(),
            "3.3".into(),
            "12".into(),
            "18.5".into(),
        ]
    };
    let rows: Vec<[String; 14]> = (0..n).map(row).collect();
    let columns = RAW_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells: Vec<&str> = rows.iter().map(|r| r[i].as_str()).collect();
            Column::new((*name).into(), cells)
        })
        .collect();
    DataFrame::new(columns).unwrap()
}

fn bench_ingest(c: &mut Criterion) {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 42).unwrap();
    c.bench_function("build_key", |b| {
        b.iter(|| build_key(black_box(" ho chi minh "), black_box(at), Granularity::Minute))
    });

    let raw = raw_frame(10_000);
    c.bench_function("clean_frame_10k", |b| {
        b.iter(|| clean_frame(black_box(raw.clone())).unwrap())
    });
}

criterion_group!(benches, bench_ingest);
criterion_main!(benches);
