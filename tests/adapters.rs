//! Adapter behavior against mocked upstreams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use poolwatch::adapters::scraper::{Browser, BrowserSession};
use poolwatch::adapters::{Adapter, ArcgisAdapter, HoustonScraper, SocrataAdapter};
use poolwatch::error::AdapterError;
use poolwatch::retry::RetryPolicy;
use poolwatch_core::cursor::{CursorKind, CursorState};
use poolwatch_core::models::{AdapterType, Jurisdiction, Source};

fn source(adapter_type: AdapterType, endpoint: String, config: Value) -> Source {
    Source {
        id: "src".into(),
        jurisdiction: Jurisdiction {
            id: "austin-tx".into(),
            slug: "austin-tx".into(),
            name: "Austin".into(),
            state: "TX".into(),
        },
        name: "src".into(),
        adapter_type,
        endpoint,
        config,
        requests_per_minute: 60,
        is_active: true,
        cursor: None,
        last_sync_at: None,
        last_sync_status: None,
        last_sync_error: None,
        last_record_count: None,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        initial_delay: Duration::from_millis(1),
        multiplier: 2.0,
        max_delay: Duration::from_millis(5),
    }
}

fn rows(from: u32, n: u32) -> Value {
    Value::Array(
        (from..from + n)
            .map(|i| json!({"facility_id": format!("F{i}"), "inspection_date": "2024-01-02T00:00:00.000"}))
            .collect(),
    )
}

// ── Socrata ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_socrata_offset_cursor_advances_by_batch_size() {
    let server = MockServer::start().await;
    for (offset, body) in [("0", rows(0, 2)), ("2", rows(2, 2)), ("4", rows(4, 1))] {
        Mock::given(method("GET"))
            .and(path("/resource/pools.json"))
            .and(query_param("$offset", offset))
            .and(query_param("$limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let src = source(
        AdapterType::Socrata,
        format!("{}/resource/pools.json", server.uri()),
        json!({"batchSize": 2}),
    );
    let adapter = SocrataAdapter::new(&src, &fast_retry()).unwrap();

    let mut cursor = Some(adapter.initial_cursor());
    let mut seen = Vec::new();
    loop {
        let batch = adapter.fetch(cursor.as_ref()).await.unwrap();
        seen.extend(batch.records.iter().map(|r| r.external_id.clone()));
        if batch.has_more {
            let next = batch.next_cursor.clone().unwrap();
            let prev = cursor.as_ref().and_then(CursorState::as_u64).unwrap();
            assert_eq!(next.as_u64(), Some(prev + 2));
            cursor = Some(next);
        } else {
            assert!(batch.next_cursor.is_none());
            break;
        }
    }
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[0], "F0_2024-01-02T00:00:00.000");
}

#[tokio::test]
async fn test_socrata_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows(0, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(AdapterType::Socrata, server.uri(), json!({}));
    let adapter = SocrataAdapter::new(&src, &fast_retry()).unwrap();
    let batch = adapter.fetch(None).await.unwrap();
    assert_eq!(batch.records.len(), 1);
    assert!(!batch.has_more);
}

#[tokio::test]
async fn test_socrata_client_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(AdapterType::Socrata, server.uri(), json!({}));
    let adapter = SocrataAdapter::new(&src, &fast_retry()).unwrap();
    let err = adapter.fetch(None).await.unwrap_err();
    assert!(matches!(err, AdapterError::Protocol(_)), "{err}");
}

#[tokio::test]
async fn test_socrata_sends_app_token_and_watermark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("X-App-Token", "tok"))
        .and(query_param("$where", ":updated_at > '2024-03-01T00:00:00.000Z'"))
        .and(query_param("$order", ":updated_at"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows(0, 2)))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(AdapterType::Socrata, server.uri(), json!({"batchSize": 2}));
    let adapter = SocrataAdapter::new(&src, &fast_retry())
        .unwrap()
        .with_app_token("tok");
    let start = CursorState::timestamp("2024-03-01T00:00:00.000Z", ":updated_at");
    let batch = adapter.fetch(Some(&start)).await.unwrap();

    let next = batch.next_cursor.unwrap();
    assert_eq!(next.kind, CursorKind::Timestamp);
    assert_eq!(next.as_str(), Some("2024-03-01T00:00:00.000Z"));
    assert_eq!(next.offset, Some(2));
}

#[tokio::test]
async fn test_socrata_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("$limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let ok = SocrataAdapter::new(&source(AdapterType::Socrata, server.uri(), json!({})), &fast_retry())
        .unwrap();
    assert!(ok.health_check().await);

    let down = SocrataAdapter::new(
        &source(AdapterType::Socrata, "http://127.0.0.1:9/x.json".into(), json!({})),
        &fast_retry(),
    )
    .unwrap();
    assert!(!down.health_check().await);
}

// ── ArcGIS ──────────────────────────────────────────────────────────────

fn features(ids: &[i64]) -> Vec<Value> {
    ids.iter()
        .map(|id| {
            json!({
                "attributes": {"OBJECTID": id, "FacilityName": format!("Pool {id}")},
                "geometry": {"x": -97.1, "y": 32.7}
            })
        })
        .collect()
}

#[tokio::test]
async fn test_arcgis_pages_by_object_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/FeatureServer/0/query"))
        .and(query_param("where", "(Type = 'Pool') AND OBJECTID > 0"))
        .and(query_param("orderByFields", "OBJECTID"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": features(&[1, 2]),
            "exceededTransferLimit": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/FeatureServer/0/query"))
        .and(query_param("where", "(Type = 'Pool') AND OBJECTID > 2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": features(&[3])
        })))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(
        AdapterType::Arcgis,
        format!("{}/FeatureServer/0", server.uri()),
        json!({"whereClause": "Type = 'Pool'"}),
    );
    let adapter = ArcgisAdapter::new(&src, &fast_retry()).unwrap();

    let first = adapter.fetch(Some(&adapter.initial_cursor())).await.unwrap();
    assert!(first.has_more);
    assert_eq!(first.next_cursor, Some(CursorState::object_id(2)));
    assert_eq!(first.records[0].data["_geometry_y"], json!(32.7));

    let second = adapter.fetch(first.next_cursor.as_ref()).await.unwrap();
    assert!(!second.has_more);
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].external_id, "3");
}

#[tokio::test]
async fn test_arcgis_error_payload_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 400, "message": "Invalid query"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(AdapterType::Arcgis, format!("{}/FeatureServer/0", server.uri()), json!({}));
    let adapter = ArcgisAdapter::new(&src, &fast_retry()).unwrap();
    match adapter.fetch(None).await {
        Err(AdapterError::Protocol(msg)) => assert!(msg.contains("Invalid query")),
        other => panic!("expected protocol error, got {:?}", other.map(|r| r.records.len())),
    }
}

#[tokio::test]
async fn test_arcgis_incremental_rescans() {
    let src = source(AdapterType::Arcgis, "http://unused/FeatureServer/0".into(), json!({}));
    let adapter = ArcgisAdapter::new(&src, &fast_retry()).unwrap();
    assert_eq!(adapter.incremental_cursor(Some(chrono::Utc::now())), CursorState::object_id(0));
}

// ── Houston scraper ─────────────────────────────────────────────────────

const BASE: &str = "https://portal.test/houston";

/// Browser serving canned pages and counting session lifecycle calls.
#[derive(Default)]
struct FakeBrowser {
    pages: HashMap<String, String>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    visited: Arc<Mutex<Vec<String>>>,
}

struct FakeSession {
    pages: HashMap<String, String>,
    closed: Arc<AtomicUsize>,
    visited: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, AdapterError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            pages: self.pages.clone(),
            closed: self.closed.clone(),
            visited: self.visited.clone(),
        }))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<String, AdapterError> {
        self.visited.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AdapterError::Protocol(format!("404 {}", url)))
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn search_page(ids: &[&str]) -> String {
    let links: String = ids
        .iter()
        .map(|id| format!(r#"<a href="estab.cfm?facilityID={id}">POOL {id}</a>"#))
        .collect();
    format!("<html><body>{links}</body></html>")
}

fn facility_page(id: &str) -> String {
    format!(
        r#"<html><body>
          <div id="demographic">
            POOL {id}
            {id} MAIN ST
            HOUSTON, TX 77002
          </div>
          <div>Date: 05/14/2024
            <a href="inspection.cfm?inspectionID=I-{id}">View Full Inspection Report</a>
          </div>
        </body></html>"#
    )
}

fn houston_browser(ids: &[&str]) -> Arc<FakeBrowser> {
    let mut pages = HashMap::new();
    pages.insert(
        format!("{BASE}/search.cfm?start=1&1=1&facType=Pool"),
        search_page(ids),
    );
    for id in ids {
        pages.insert(format!("{BASE}/estab.cfm?facilityID={id}"), facility_page(id));
    }
    Arc::new(FakeBrowser {
        pages,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_houston_resumes_mid_page() {
    let browser = houston_browser(&["A", "B", "C"]);
    let src = source(
        AdapterType::Scraper,
        BASE.into(),
        json!({"batchSize": 2, "facilityDelayMs": 0}),
    );
    let adapter = HoustonScraper::new(&src, &fast_retry(), browser.clone()).unwrap();

    let first = adapter.fetch(Some(&adapter.initial_cursor())).await.unwrap();
    assert_eq!(first.records.len(), 2);
    assert!(first.has_more);
    let resume: Value = first.next_cursor.as_ref().unwrap().decode().unwrap();
    assert_eq!(resume, json!({"start": 1, "facilityIndex": 2}));

    let second = adapter.fetch(first.next_cursor.as_ref()).await.unwrap();
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].data["facilityId"], "C");
    assert!(!second.has_more);

    assert_eq!(browser.opened.load(Ordering::SeqCst), 2);
    assert_eq!(browser.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_houston_closes_session_on_failure() {
    let mut browser = houston_browser(&["A", "B"]);
    Arc::get_mut(&mut browser)
        .unwrap()
        .pages
        .remove(&format!("{BASE}/estab.cfm?facilityID=B"));
    let src = source(AdapterType::Scraper, BASE.into(), json!({"facilityDelayMs": 0}));
    let adapter = HoustonScraper::new(&src, &fast_retry(), browser.clone()).unwrap();

    assert!(adapter.fetch(None).await.is_err());
    assert_eq!(browser.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_houston_zero_batch_size_rejected() {
    let browser = houston_browser(&["A"]);
    let src = source(AdapterType::Scraper, BASE.into(), json!({"batchSize": 0}));

    let err = HoustonScraper::new(&src, &fast_retry(), browser.clone()).err();
    assert!(
        matches!(&err, Some(AdapterError::Config(msg)) if msg.contains("batchSize")),
        "{err:?}"
    );
    assert_eq!(browser.opened.load(Ordering::SeqCst), 0);
}
