//! Secure storage benchmark: insert and read encrypted request logs.

use api_sentinel::storage::{LogStore, SecureStore};
use api_sentinel::RequestRecord;
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::tempdir;

fn make_record(i: usize) -> RequestRecord {
    let base = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
    RequestRecord {
        request_id: format!("req-{}", i),
        client_id: "bench-client".to_string(),
        ip: "10.0.0.1".to_string(),
        api_id: "bench".to_string(),
        path: "/api/items".to_string(),
        method: "GET".to_string(),
        status: 200,
        timestamp: base + Duration::seconds(i as i64),
    }
}

fn bench_insert_log(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SecureStore::open(&dir.path().join("store.db"), b"bench-secret").unwrap();
    let record = make_record(0);

    c.bench_function("storage_insert_log", |b| {
        b.iter(|| black_box(store.insert_log(black_box(&record))).unwrap())
    });
}

fn bench_window_read(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SecureStore::open(&dir.path().join("store.db"), b"bench-secret").unwrap();
    let records: Vec<RequestRecord> = (0..1_000).map(make_record).collect();
    store.insert_logs(&records).unwrap();

    c.bench_function("storage_get_1000_logs", |b| {
        b.iter(|| black_box(store.get(Some("bench"), None, None)).unwrap())
    });
    c.bench_function("storage_find_log", |b| {
        b.iter(|| black_box(store.find("req-500")).unwrap())
    });
}

criterion_group!(benches, bench_insert_log, bench_window_read);
criterion_main!(benches);
