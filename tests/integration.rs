//! Integration tests for the listing store.

use chrono::NaiveDate;
use listing_tracker::{
    export, normalize_batch, ExportFormat, HistoryStore, ListingStatus, RawRecord, ScrapeContext,
    StoreConfig, Timestamp,
};
use serde_json::{json, Value};
use std::fs::File;
use tempfile::TempDir;

fn test_store(dir: &TempDir) -> HistoryStore {
    HistoryStore::open(StoreConfig {
        data_dir: dir.path().join("data"),
        ..Default::default()
    })
    .unwrap()
}

fn listing(model: &str, id: &str, price: u64) -> RawRecord {
    raw(json!({
        "id": id,
        "title": format!("Lexus LC 500 #{id}"),
        "price": price,
        "year": 2021,
        "mileage": 15000,
        "url": format!("https://example.com/oferta/{id}"),
        "model": model
    }))
}

fn raw(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn run(date: &str) -> ScrapeContext {
    ScrapeContext::on(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap())
}

// --- Realistic Workflow Tests ---

#[test]
fn test_two_scrape_runs() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let batch1 = vec![
        listing("lexus-lc", "t1", 450_000),
        listing("lexus-lc", "t2", 520_000),
        listing("lexus-lc", "t3", 420_000),
    ];
    let report = store
        .merge_batch("lexus-lc", &batch1, Some(&run("2025-05-31")))
        .unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(report.total_listings, 3);

    let loaded = store.load("lexus-lc").unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(loaded.listings.values().all(|l| l.price_readings.len() == 1));

    let batch2 = vec![
        listing("lexus-lc", "t1", 445_000),
        listing("lexus-lc", "t2", 525_000),
        listing("lexus-lc", "t3", 420_000),
        listing("lexus-lc", "t4", 580_000),
    ];
    let report = store
        .merge_batch("lexus-lc", &batch2, Some(&run("2025-06-01")))
        .unwrap();
    assert_eq!(report.updated, 2);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.disappeared, 0);
    assert_eq!(report.total_listings, 4);

    let loaded = store.load("lexus-lc").unwrap();
    assert_eq!(loaded.metadata.total_listings, 4);
    assert_eq!(loaded.get("t1").unwrap().price_readings.len(), 2);
    assert_eq!(loaded.get("t2").unwrap().price_readings.len(), 2);
    assert_eq!(loaded.get("t3").unwrap().price_readings.len(), 1);
    assert_eq!(loaded.get("t4").unwrap().price_readings.len(), 1);
    assert_eq!(loaded.get("t1").unwrap().current_price(), Some(445_000));
    assert_eq!(
        loaded.get("t3").unwrap().last_seen,
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    );
}

#[test]
fn test_repeat_batch_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let batch = vec![listing("bmw-i8", "a", 300_000), listing("bmw-i8", "b", 310_000)];

    store.merge_batch("bmw-i8", &batch, Some(&run("2025-06-01"))).unwrap();
    let first = store.load("bmw-i8").unwrap();

    let report = store.merge_batch("bmw-i8", &batch, Some(&run("2025-06-01"))).unwrap();
    assert_eq!(report.unchanged, 2);
    let second = store.load("bmw-i8").unwrap();

    assert_eq!(
        serde_json::to_vec(&first.listings).unwrap(),
        serde_json::to_vec(&second.listings).unwrap()
    );
}

#[test]
fn test_price_change_detection() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.merge_batch("bmw-i8", &[listing("bmw-i8", "x", 100)], Some(&run("2025-06-01"))).unwrap();
    store.merge_batch("bmw-i8", &[listing("bmw-i8", "x", 100)], Some(&run("2025-06-02"))).unwrap();
    assert_eq!(store.load("bmw-i8").unwrap().get("x").unwrap().price_readings.len(), 1);

    store.merge_batch("bmw-i8", &[listing("bmw-i8", "x", 95)], Some(&run("2025-06-03"))).unwrap();
    let x = store.load("bmw-i8").unwrap().get("x").unwrap().clone();
    assert_eq!(x.price_readings.len(), 2);
    assert_eq!(x.price_readings[1].price, 95);
}

#[test]
fn test_disappearance_and_return() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store
        .merge_batch(
            "bmw-i8",
            &[listing("bmw-i8", "a", 100), listing("bmw-i8", "b", 200)],
            Some(&run("2025-06-01")),
        )
        .unwrap();

    let report = store
        .merge_batch("bmw-i8", &[listing("bmw-i8", "b", 200)], Some(&run("2025-06-02")))
        .unwrap();
    assert_eq!(report.disappeared, 1);
    let a = store.load("bmw-i8").unwrap().get("a").unwrap().clone();
    assert_eq!(a.status, ListingStatus::Disappeared);
    assert_eq!(a.price_readings.len(), 1);
    assert_eq!(a.last_seen, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());

    let report = store
        .merge_batch("bmw-i8", &[listing("bmw-i8", "a", 90)], Some(&run("2025-06-05")))
        .unwrap();
    assert_eq!(report.reappeared, 1);
    assert_eq!(report.updated, 1);
    let loaded = store.load("bmw-i8").unwrap();
    let a = loaded.get("a").unwrap();
    assert_eq!(a.status, ListingStatus::Active);
    assert_eq!(a.price_readings.len(), 2);
    assert_eq!(loaded.get("b").unwrap().status, ListingStatus::Disappeared);
}

#[test]
fn test_empty_batch_changes_no_status() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.merge_batch("bmw-i8", &[listing("bmw-i8", "a", 100)], Some(&run("2025-06-01"))).unwrap();
    let before = std::fs::read(store.model_path("bmw-i8").unwrap()).unwrap();

    let report = store.merge_batch("bmw-i8", &[], Some(&run("2025-06-02"))).unwrap();
    assert_eq!(report.disappeared, 0);

    let after = std::fs::read(store.model_path("bmw-i8").unwrap()).unwrap();
    assert_eq!(before, after);
    assert!(store.load("bmw-i8").unwrap().get("a").unwrap().is_active());
}

#[test]
fn test_malformed_record_does_not_abort() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let batch = vec![
        listing("bmw-i8", "a", 100),
        raw(json!({"id": "broken", "title": "no price", "model": "bmw-i8"})),
        listing("bmw-i8", "c", 300),
    ];
    let report = store.merge_batch("bmw-i8", &batch, Some(&run("2025-06-01"))).unwrap();
    assert_eq!(report.merged(), 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.rejections[0].id.as_deref(), Some("broken"));
    assert_eq!(store.load("bmw-i8").unwrap().len(), 2);
}

#[test]
fn test_batch_of_only_bad_records_is_noop() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.merge_batch("bmw-i8", &[listing("bmw-i8", "a", 100)], Some(&run("2025-06-01"))).unwrap();
    let report = store
        .merge_batch(
            "bmw-i8",
            &[raw(json!({"id": "z", "model": "bmw-i8"}))],
            Some(&run("2025-06-02")),
        )
        .unwrap();
    assert_eq!(report.rejected, 1);
    assert_eq!(report.disappeared, 0);
    assert!(store.load("bmw-i8").unwrap().get("a").unwrap().is_active());
}

#[test]
fn test_backdated_record_never_corrupts_store() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.merge_batch("bmw-i8", &[listing("bmw-i8", "a", 100)], Some(&run("2025-06-05"))).unwrap();

    // The record carries an older date of its own while the run supplies a
    // later timestamp.
    let mut backdated = listing("bmw-i8", "a", 90);
    backdated.insert("scrape_date".into(), json!("2025-06-01"));
    let context = ScrapeContext::new(
        NaiveDate::from_ymd_opt(2025, 6, 6).unwrap(),
        Timestamp(1_749_200_000),
    );
    let report = store.merge_batch("bmw-i8", &[backdated], Some(&context)).unwrap();
    assert_eq!(report.unchanged, 1);

    let loaded = store.load("bmw-i8").unwrap();
    let a = loaded.get("a").unwrap();
    assert_eq!(a.price_readings.len(), 1);
    assert_eq!(a.current_price(), Some(100));
    assert!(loaded.validate().is_ok());

    let report = store.merge_batch("bmw-i8", &[listing("bmw-i8", "a", 95)], Some(&run("2025-06-07"))).unwrap();
    assert_eq!(report.updated, 1);
}

#[test]
fn test_snapshots_for_another_model_are_refused() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.merge_batch("bmw-i8", &[listing("bmw-i8", "a", 100)], Some(&run("2025-06-01"))).unwrap();
    let before = std::fs::read(store.model_path("bmw-i8").unwrap()).unwrap();

    let batch = normalize_batch(&[listing("lexus-lc", "x", 500)], "lexus-lc", Some(&run("2025-06-02")));
    assert!(store.merge_snapshots("bmw-i8", &batch.snapshots).is_err());

    let after = std::fs::read(store.model_path("bmw-i8").unwrap()).unwrap();
    assert_eq!(before, after);
    assert!(!store.model_path("lexus-lc").unwrap().exists());
}

// --- Query & Export ---

#[test]
fn test_historical_rows() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store.merge_batch("lexus-lc", &[listing("lexus-lc", "t1", 450_000)], Some(&run("2025-05-31"))).unwrap();
    store.merge_batch("lexus-lc", &[listing("lexus-lc", "t1", 445_000)], Some(&run("2025-06-01"))).unwrap();

    let data = store.get_historical_data("lexus-lc").unwrap();
    let rows: Vec<_> = data.rows().collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].price, 450_000);
    assert_eq!(rows[1].price, 445_000);
    assert_eq!(rows[1].price_change, -5_000);
    assert!(rows[0].scrape_timestamp < rows[1].scrape_timestamp);

    // Restartable
    assert_eq!(data.rows().count(), 2);
}

#[test]
fn test_export_reads_back() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store
        .merge_batch(
            "lexus-lc",
            &[listing("lexus-lc", "t1", 450_000), listing("lexus-lc", "t2", 520_000)],
            Some(&run("2025-05-31")),
        )
        .unwrap();
    store
        .merge_batch(
            "lexus-lc",
            &[listing("lexus-lc", "t1", 440_000)],
            Some(&run("2025-06-01")),
        )
        .unwrap();

    let expected: Vec<_> = store.get_historical_data("lexus-lc").unwrap().rows().collect();
    assert_eq!(expected.len(), 3);

    for format in [ExportFormat::Csv, ExportFormat::Json] {
        let path = dir.path().join("out").join(format!("lexus-lc.{}", format.extension()));
        let count = store.export("lexus-lc", format, &path).unwrap();
        assert_eq!(count, 3);

        let rows = export::read_rows(format, File::open(&path).unwrap()).unwrap();
        assert_eq!(rows, expected);
    }
}

#[test]
fn test_status_and_stats() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    store
        .merge_batch(
            "lexus-lc",
            &[listing("lexus-lc", "t1", 450_000), listing("lexus-lc", "t2", 520_000)],
            Some(&run("2025-05-31")),
        )
        .unwrap();
    store
        .merge_batch("bmw/i8", &[listing("bmw/i8", "b1", 300_000)], Some(&run("2025-05-31")))
        .unwrap();
    store
        .merge_batch("lexus-lc", &[listing("lexus-lc", "t1", 440_000)], Some(&run("2025-06-01")))
        .unwrap();

    let statuses = store.data_status().unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].model, "bmw/i8");
    assert_eq!(statuses[1].model, "lexus-lc");
    assert_eq!(statuses[1].listing_count, 2);
    assert_eq!(statuses[1].reading_count, 3);
    assert!(statuses[1].last_updated.is_some());

    let stats = store.summary_stats("lexus-lc").unwrap();
    assert_eq!(stats.active_listings, 1);
    assert_eq!(stats.disappeared_listings, 1);
    assert_eq!(stats.listings_with_price_changes, 1);

    let years = store.year_analysis("lexus-lc").unwrap();
    assert_eq!(years.len(), 1);
    assert_eq!(years[0].year, 2021);
    assert_eq!(years[0].count, 2);
}
