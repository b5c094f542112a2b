//! End-to-end ingestion against a real SQLite file and a mocked Socrata API.

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use poolwatch::config::Config;
use poolwatch::dedup::{process_record, RecordOutcome};
use poolwatch::ingest::run_ingestion;
use poolwatch::registry::Registry;
use poolwatch::retry::RetryPolicy;
use poolwatch::sources::sync_config;
use poolwatch::sqlite_store::SqliteStore;
use poolwatch::{db, migrate};
use poolwatch_core::models::{
    CanonicalFacility, CanonicalInspection, CanonicalRecord, IngestionOptions, SyncCounts,
    SyncLogFinal, SyncStatus, SyncType,
};
use poolwatch_core::store::Store;

async fn sqlite_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("data/poolwatch.sqlite"))
        .await
        .unwrap();
    migrate::apply(&pool).await.unwrap();
    // Idempotent.
    migrate::apply(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn config(endpoint: &str, batch_size: u32) -> Config {
    let cfg: Config = toml::from_str(&format!(
        r#"
        [db]
        path = "unused.sqlite"

        [[jurisdictions]]
        slug = "austin-tx"
        name = "Austin"
        state = "TX"

        [[sources]]
        id = "austin-pools"
        jurisdiction = "austin-tx"
        name = "Austin pools"
        adapter_type = "SOCRATA"
        endpoint = "{endpoint}"
        requests_per_minute = 60000
        config = {{ batchSize = {batch_size}, retryAttempts = 1 }}
        "#
    ))
    .unwrap();
    cfg.validate().unwrap();
    cfg
}

fn austin_row(i: u32, result: &str) -> Value {
    json!({
        "facility_id": format!("F{i}"),
        "facility_name": format!("Oak Pool {i}"),
        "street_address": format!("{i} Barton Springs Rd"),
        "inspection_date": "2024-06-03T00:00:00.000",
        "inspection_type": "Routine",
        "inspection_result": result
    })
}

async fn mount_page(server: &MockServer, offset: u32, body: Value) {
    Mock::given(method("GET"))
        .and(query_param("$offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn options(sync_type: SyncType) -> IngestionOptions {
    IngestionOptions {
        source_id: "austin-pools".into(),
        sync_type,
        max_records: None,
    }
}

fn registry() -> Registry {
    Registry::with_builtins(RetryPolicy::default().with_attempts(1))
}

#[tokio::test]
async fn test_replay_is_all_skipped() {
    let server = MockServer::start().await;
    mount_page(&server, 0, json!([austin_row(1, "Pass"), austin_row(2, "Fail")])).await;
    mount_page(&server, 2, json!([austin_row(3, "Pass")])).await;

    let (_tmp, store) = sqlite_store().await;
    sync_config(&store, &config(&server.uri(), 2)).await.unwrap();

    let first = run_ingestion(&store, &registry(), &options(SyncType::Backfill)).await.unwrap();
    assert!(first.success);
    assert_eq!(first.records_fetched, 3);
    assert_eq!(first.records_created, 3);

    let second = run_ingestion(&store, &registry(), &options(SyncType::Backfill)).await.unwrap();
    assert_eq!(second.records_fetched, 3);
    assert_eq!(second.records_skipped, 3);
    assert_eq!(second.records_created + second.records_updated, 0);

    let logs = store.list_sync_logs("austin-pools", 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].id, second.sync_log_id.unwrap());
    assert_eq!(logs[0].status, SyncStatus::Success);
    assert_eq!(logs[0].counts.skipped, 3);

    let source = store.get_source("austin-pools").await.unwrap().unwrap();
    assert_eq!(source.last_record_count, Some(3));
    assert_eq!(source.last_sync_status, Some(SyncStatus::Success));
}

#[tokio::test]
async fn test_changed_payload_updates_same_inspection() {
    let (_tmp, store) = sqlite_store().await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([austin_row(1, "Pass")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([austin_row(1, "Closed")])))
        .mount(&server)
        .await;
    sync_config(&store, &config(&server.uri(), 10)).await.unwrap();

    run_ingestion(&store, &registry(), &options(SyncType::Backfill)).await.unwrap();
    let raw = store
        .find_raw_record("austin-pools", "F1_2024-06-03T00:00:00.000")
        .await
        .unwrap()
        .unwrap();
    let before = store.get_inspection_by_raw_record(&raw.id).await.unwrap().unwrap();

    let second = run_ingestion(&store, &registry(), &options(SyncType::Backfill)).await.unwrap();
    assert_eq!(second.records_updated, 1);

    let raw_after = store
        .find_raw_record("austin-pools", "F1_2024-06-03T00:00:00.000")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw_after.id, raw.id);
    assert_ne!(raw_after.payload_hash, raw.payload_hash);

    let after = store.get_inspection_by_raw_record(&raw.id).await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert!(after.is_closure);
    assert_eq!(store.list_inspections(&after.facility_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bad_record_counted_and_next_batch_runs() {
    let server = MockServer::start().await;
    let mut page: Vec<Value> = (1..=10).map(|i| austin_row(i, "Pass")).collect();
    page[4]
        .as_object_mut()
        .unwrap()
        .remove("inspection_date");
    mount_page(&server, 0, Value::Array(page)).await;
    mount_page(&server, 10, json!([austin_row(11, "Pass")])).await;

    let (_tmp, store) = sqlite_store().await;
    sync_config(&store, &config(&server.uri(), 10)).await.unwrap();

    let result = run_ingestion(&store, &registry(), &options(SyncType::Backfill)).await.unwrap();
    assert!(result.success);
    assert_eq!(result.records_fetched, 11);
    assert_eq!(result.records_failed, 1);
    assert_eq!(
        result.records_created + result.records_updated + result.records_skipped + result.records_failed,
        11
    );

    let log = store
        .get_sync_log(result.sync_log_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.status, SyncStatus::Partial);
}

#[tokio::test]
async fn test_failed_fetch_resumes_from_saved_cursor() {
    let server = MockServer::start().await;
    mount_page(&server, 0, json!([austin_row(1, "Pass"), austin_row(2, "Pass")])).await;
    Mock::given(method("GET"))
        .and(query_param("$offset", "2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, 2, json!([austin_row(3, "Pass")])).await;

    let (_tmp, store) = sqlite_store().await;
    sync_config(&store, &config(&server.uri(), 2)).await.unwrap();

    let failed = run_ingestion(&store, &registry(), &options(SyncType::Backfill)).await.unwrap();
    assert!(!failed.success);
    assert_eq!(failed.records_created, 2);
    let source = store.get_source("austin-pools").await.unwrap().unwrap();
    assert_eq!(source.last_sync_status, Some(SyncStatus::Failed));
    assert!(source.last_sync_error.unwrap().contains("503"));

    let resumed = run_ingestion(&store, &registry(), &options(SyncType::Resume)).await.unwrap();
    assert!(resumed.success);
    assert_eq!(resumed.records_fetched, 1);
    assert_eq!(resumed.records_created, 1);
}

// ── Store-level properties ──────────────────────────────────────────────

fn record(external_id: &str, name: &str, address: &str, date: (i32, u32, u32)) -> CanonicalRecord {
    CanonicalRecord {
        external_id: external_id.into(),
        facility: CanonicalFacility {
            raw_name: name.into(),
            raw_address: address.into(),
            raw_city: Some("Austin".into()),
            raw_state: Some("TX".into()),
            ..Default::default()
        },
        inspection: CanonicalInspection {
            inspection_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            raw_inspection_type: Some("Routine".into()),
            raw_result: Some(format!("Pass {}", external_id)),
            raw_score: None,
            demerits: None,
            source_url: None,
            report_url: None,
        },
        raw_payload: json!({"id": external_id, "name": name, "address": address}),
    }
}

async fn seeded_store() -> (TempDir, SqliteStore, poolwatch_core::models::Source) {
    let (tmp, store) = sqlite_store().await;
    sync_config(&store, &config("http://unused", 10)).await.unwrap();
    let source = store.get_source("austin-pools").await.unwrap().unwrap();
    (tmp, store, source)
}

#[tokio::test]
async fn test_spelling_variants_share_one_facility() {
    let (_tmp, store, source) = seeded_store().await;
    let a = record("1", "City Pool", "100 Main St.", (2024, 1, 1));
    let b = record("2", "CITY POOL", "100 MAIN ST", (2024, 2, 1));
    assert_eq!(process_record(&store, &source, &a).await.unwrap(), RecordOutcome::Created);
    assert_eq!(process_record(&store, &source, &b).await.unwrap(), RecordOutcome::Created);

    let facilities = store.list_facilities("austin-tx").await.unwrap();
    assert_eq!(facilities.len(), 1);
    assert_eq!(facilities[0].total_inspections, 2);
}

#[tokio::test]
async fn test_identical_base_slugs_stay_distinct_and_stable() {
    let (_tmp, store, source) = seeded_store().await;
    process_record(&store, &source, &record("1", "Oak Pool", "1 Oak St", (2024, 1, 1))).await.unwrap();
    process_record(&store, &source, &record("2", "Oak Pool", "2 Elm St", (2024, 1, 1))).await.unwrap();

    let mut slugs: Vec<String> = store
        .list_facilities("austin-tx")
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.slug)
        .collect();
    slugs.sort();
    assert_eq!(slugs, vec!["oak-pool-austin-tx", "oak-pool-austin-tx-1"]);

    // New inspections for the same sites never move the slugs.
    process_record(&store, &source, &record("3", "OAK POOL", "2 ELM ST", (2024, 3, 1))).await.unwrap();
    let again: Vec<String> = store
        .list_facilities("austin-tx")
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.slug)
        .collect();
    assert_eq!(again.len(), 2);
    assert!(again.contains(&"oak-pool-austin-tx-1".to_string()));
}

#[tokio::test]
async fn test_stats_recomputed_for_out_of_order_dates() {
    let (_tmp, store, source) = seeded_store().await;
    process_record(&store, &source, &record("new", "Oak Pool", "1 Oak St", (2024, 5, 1))).await.unwrap();
    process_record(&store, &source, &record("old", "Oak Pool", "1 Oak St", (2023, 1, 1))).await.unwrap();

    let f = &store.list_facilities("austin-tx").await.unwrap()[0];
    assert_eq!(f.total_inspections, 2);
    assert_eq!(f.last_inspection_date, NaiveDate::from_ymd_opt(2024, 5, 1));
    assert_eq!(f.last_inspection_result.as_deref(), Some("Pass new"));
}

#[tokio::test]
async fn test_sync_log_finalized_once() {
    let (_tmp, store, source) = seeded_store().await;
    let log = store
        .create_sync_log(&source.id, SyncType::Incremental, None, Utc::now())
        .await
        .unwrap();
    assert_eq!(log.status, SyncStatus::Running);

    let fin = SyncLogFinal {
        status: SyncStatus::Success,
        completed_at: Utc::now(),
        counts: SyncCounts {
            fetched: 4,
            skipped: 4,
            ..Default::default()
        },
        cursor_after: None,
        error_message: None,
    };
    assert!(store.finalize_sync_log(&log.id, &fin).await.unwrap());

    let overwrite = SyncLogFinal {
        status: SyncStatus::Failed,
        ..fin.clone()
    };
    assert!(!store.finalize_sync_log(&log.id, &overwrite).await.unwrap());
    let stored = store.get_sync_log(&log.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Success);
    assert_eq!(stored.counts.fetched, 4);
}
