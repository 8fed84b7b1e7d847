// Time-series backend tests against in-process fake InfluxDB servers

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use ntwk_datastore::storage::{
    InfluxV1Backend, InfluxV1Destination, InfluxV2Backend, InfluxV2Destination, StorageBackend,
};
use ntwk_datastore::{Destination, FieldMap, Record, Window};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Params = HashMap<String, String>;

#[derive(Default)]
struct Captured {
    databases: Vec<String>,
    writes: Vec<(Params, String)>,
    queries: Vec<Params>,
    authorization: Vec<String>,
    query_bodies: Vec<serde_json::Value>,
}

type Shared = Arc<Mutex<Captured>>;

const BASE_NS: i64 = 1_704_067_200_000_000_000;
const SECOND_NS: i64 = 1_000_000_000;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

// InfluxDB 1.x

async fn v1_query(State(state): State<Shared>, Query(params): Query<Params>) -> Json<serde_json::Value> {
    let mut state = state.lock().unwrap();
    let q = params.get("q").cloned().unwrap_or_default();
    state.queries.push(params);

    if q == "SHOW DATABASES" {
        let values: Vec<_> = state.databases.iter().map(|db| json!([db])).collect();
        return Json(json!({
            "results": [{
                "statement_id": 0,
                "series": [{"name": "databases", "columns": ["name"], "values": values}]
            }]
        }));
    }

    // Newest first, the way a DESC LIMIT hands the tail back
    Json(json!({
        "results": [{
            "statement_id": 0,
            "series": [{
                "name": "speed",
                "columns": ["time", "location", "ping"],
                "values": [
                    [BASE_NS + 3 * SECOND_NS, "lab", 13.5],
                    [BASE_NS + 2 * SECOND_NS, "lab", 12],
                ]
            }]
        }]
    }))
}

async fn v1_write(State(state): State<Shared>, Query(params): Query<Params>, body: String) -> StatusCode {
    state.lock().unwrap().writes.push((params, body));
    StatusCode::NO_CONTENT
}

async fn v1_server(databases: &[&str]) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(Captured {
        databases: databases.iter().map(|db| db.to_string()).collect(),
        ..Captured::default()
    }));
    let app = Router::new()
        .route("/query", get(v1_query))
        .route("/write", post(v1_write))
        .with_state(state.clone());
    (spawn(app).await, state)
}

fn v1_fields() -> FieldMap {
    FieldMap::parse([("timestamp", "timestamp"), ("location", "tag"), ("ping", "field")]).unwrap()
}

#[tokio::test]
async fn test_v1_save_writes_line_protocol() {
    let (url, state) = v1_server(&["_internal", "speedtest"]).await;
    let mut dest = InfluxV1Destination::new(&url, "speedtest", "speed");
    dest.retention_policy = Some("autogen".to_string());
    dest.username = Some("ntwk".to_string());
    dest.password = Some("pw".to_string());

    let records = vec![
        Record::new()
            .with("timestamp", "2024-01-01T00:00:00Z")
            .with("location", "lab north")
            .with("ping", 12.5),
        Record::new()
            .with("timestamp", "2024-01-01T00:00:01Z")
            .with("location", "lab north")
            .with("ping", 11.25),
    ];

    InfluxV1Backend::new()
        .save(&records, &Destination::InfluxV1(dest), &v1_fields())
        .await
        .unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.writes.len(), 1);
    let (params, body) = &state.writes[0];
    assert_eq!(params.get("db").unwrap(), "speedtest");
    assert_eq!(params.get("rp").unwrap(), "autogen");
    assert_eq!(params.get("precision").unwrap(), "ns");
    assert_eq!(params.get("u").unwrap(), "ntwk");
    assert_eq!(params.get("p").unwrap(), "pw");
    assert_eq!(
        body,
        "speed,location=lab\\ north ping=12.5 1704067200000000000\n\
         speed,location=lab\\ north ping=11.25 1704067201000000000"
    );
}

#[tokio::test]
async fn test_v1_missing_database_is_schema_error() {
    let (url, state) = v1_server(&["_internal"]).await;
    let dest = InfluxV1Destination::new(&url, "speedtest", "speed");
    let record = Record::new()
        .with("timestamp", "2024-01-01T00:00:00Z")
        .with("location", "lab")
        .with("ping", 12.5);

    let err = InfluxV1Backend::new()
        .save(&[record], &Destination::InfluxV1(dest), &v1_fields())
        .await
        .unwrap_err();

    assert!(err.is_schema());
    assert!(state.lock().unwrap().writes.is_empty());
}

#[tokio::test]
async fn test_v1_save_drops_unmapped_keys() {
    let (url, state) = v1_server(&["speedtest"]).await;
    let dest = InfluxV1Destination::new(&url, "speedtest", "speed");
    let record = Record::new()
        .with("timestamp", "2024-01-01T00:00:00Z")
        .with("location", "lab")
        .with("ping", 12)
        .with("server", "speedtest.example.net");

    InfluxV1Backend::new()
        .save(&[record], &Destination::InfluxV1(dest), &v1_fields())
        .await
        .unwrap();

    let state = state.lock().unwrap();
    let (_, body) = &state.writes[0];
    assert!(!body.contains("server"));
    assert_eq!(body, "speed,location=lab ping=12.0 1704067200000000000");
}

#[tokio::test]
async fn test_v1_last_window_is_ascending() {
    let (url, state) = v1_server(&["speedtest"]).await;
    let dest = InfluxV1Destination::new(&url, "speedtest", "speed");

    let records = InfluxV1Backend::new()
        .get(&Destination::InfluxV1(dest), &v1_fields(), Window::Last(2))
        .await
        .unwrap();

    assert_eq!(
        records,
        vec![
            Record::new()
                .with("timestamp", "2024-01-01T00:00:02Z")
                .with("location", "lab")
                .with("ping", 12.0),
            Record::new()
                .with("timestamp", "2024-01-01T00:00:03Z")
                .with("location", "lab")
                .with("ping", 13.5),
        ]
    );

    let state = state.lock().unwrap();
    let select = state.queries.last().unwrap();
    assert_eq!(select.get("epoch").unwrap(), "ns");
    assert_eq!(select.get("db").unwrap(), "speedtest");
    let q = select.get("q").unwrap();
    assert!(q.contains("FROM \"speedtest\"..\"speed\" ORDER BY time DESC LIMIT 2"));
    assert!(q.ends_with("ORDER BY time ASC"));
}

#[tokio::test]
async fn test_v1_unreachable_server_is_connection_error() {
    let dest = InfluxV1Destination::new(closed_port_url().await, "speedtest", "speed");

    let err = InfluxV1Backend::new()
        .get(&Destination::InfluxV1(dest), &v1_fields(), Window::Last(1))
        .await
        .unwrap_err();
    assert!(err.is_connection());
}

// InfluxDB 2.x

const FLUX_CSV: &str = "\
,result,table,_start,_stop,_time,_value,_field,_measurement,location\r
,_result,0,2024-01-01T00:00:00Z,2024-01-01T06:00:00Z,2024-01-01T02:00:00Z,51.5,download,speed,lab\r
,_result,0,2024-01-01T00:00:00Z,2024-01-01T06:00:00Z,2024-01-01T02:00:00Z,9,ping,speed,lab\r
\r
,result,table,_start,_stop,_time,_value,_field,_measurement,location\r
,_result,1,2024-01-01T00:00:00Z,2024-01-01T06:00:00Z,2024-01-01T01:00:00Z,12.5,ping,speed,lab\r
,_result,1,2024-01-01T00:00:00Z,2024-01-01T06:00:00Z,2024-01-01T01:00:00Z,48,download,speed,lab\r
";

fn authorization(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn v2_write(
    State(state): State<Shared>,
    Query(params): Query<Params>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let token = authorization(&headers);
    let mut state = state.lock().unwrap();
    state.authorization.push(token.clone());
    if token != "Token s3cr3t" {
        return StatusCode::UNAUTHORIZED;
    }
    state.writes.push((params, body));
    StatusCode::NO_CONTENT
}

async fn v2_query(
    State(state): State<Shared>,
    Query(params): Query<Params>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ([(header::HeaderName, &'static str); 1], &'static str) {
    let mut state = state.lock().unwrap();
    state.authorization.push(authorization(&headers));
    state.queries.push(params);
    state.query_bodies.push(body);
    ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], FLUX_CSV)
}

async fn v2_server() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(Captured::default()));
    let app = Router::new()
        .route("/api/v2/write", post(v2_write))
        .route("/api/v2/query", post(v2_query))
        .with_state(state.clone());
    (spawn(app).await, state)
}

fn v2_fields() -> FieldMap {
    FieldMap::parse([
        ("timestamp", "timestamp"),
        ("location", "tag"),
        ("ping", "field"),
        ("download", "field"),
    ])
    .unwrap()
}

fn v2_destination(url: &str, token: &str) -> Destination {
    Destination::InfluxV2(InfluxV2Destination::new(url, "home", "speedtest", token, "speed"))
}

#[tokio::test]
async fn test_v2_save_drops_unmapped_keys() {
    let (url, state) = v2_server().await;
    let record = Record::new()
        .with("timestamp", "2024-01-01T00:00:00Z")
        .with("location", "lab")
        .with("ping", 12.5)
        .with("download", 48)
        .with("server", "speedtest.example.net")
        .with("isp", "Example Fiber");

    InfluxV2Backend::new()
        .save(&[record], &v2_destination(&url, "s3cr3t"), &v2_fields())
        .await
        .unwrap();

    let state = state.lock().unwrap();
    let (_, body) = &state.writes[0];
    assert!(!body.contains("server"));
    assert!(!body.contains("isp"));
    assert_eq!(
        body,
        "speed,location=lab ping=12.5,download=48.0 1704067200000000000"
    );
}

#[tokio::test]
async fn test_v2_save_sends_token_and_bucket() {
    let (url, state) = v2_server().await;
    let record = Record::new()
        .with("timestamp", "2024-01-01T00:00:00Z")
        .with("location", "lab")
        .with("ping", 12.5)
        .with("download", 48.25);

    InfluxV2Backend::new()
        .save(&[record], &v2_destination(&url, "s3cr3t"), &v2_fields())
        .await
        .unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.authorization, vec!["Token s3cr3t".to_string()]);
    let (params, body) = &state.writes[0];
    assert_eq!(params.get("org").unwrap(), "home");
    assert_eq!(params.get("bucket").unwrap(), "speedtest");
    assert_eq!(params.get("precision").unwrap(), "ns");
    assert_eq!(
        body,
        "speed,location=lab ping=12.5,download=48.25 1704067200000000000"
    );
}

#[tokio::test]
async fn test_v2_rejected_token_is_configuration_error() {
    let (url, state) = v2_server().await;
    let record = Record::new()
        .with("timestamp", "2024-01-01T00:00:00Z")
        .with("location", "lab")
        .with("ping", 12.5)
        .with("download", 48.25);

    let err = InfluxV2Backend::new()
        .save(&[record], &v2_destination(&url, "wrong"), &v2_fields())
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(state.lock().unwrap().writes.is_empty());
}

#[tokio::test]
async fn test_v2_get_hours_window() {
    let (url, state) = v2_server().await;

    let records = InfluxV2Backend::new()
        .get(&v2_destination(&url, "s3cr3t"), &v2_fields(), Window::LastHours(6))
        .await
        .unwrap();

    assert_eq!(
        records,
        vec![
            Record::new()
                .with("timestamp", "2024-01-01T01:00:00Z")
                .with("location", "lab")
                .with("ping", 12.5)
                .with("download", 48.0),
            Record::new()
                .with("timestamp", "2024-01-01T02:00:00Z")
                .with("location", "lab")
                .with("ping", 9.0)
                .with("download", 51.5),
        ]
    );

    let state = state.lock().unwrap();
    assert_eq!(state.authorization, vec!["Token s3cr3t".to_string()]);
    assert_eq!(state.queries[0].get("org").unwrap(), "home");
    let body = &state.query_bodies[0];
    assert_eq!(body["type"], "flux");
    let flux = body["query"].as_str().unwrap();
    assert!(flux.contains("from(bucket: \"speedtest\")"));
    assert!(flux.contains("range(start: -6h)"));
}

#[tokio::test]
async fn test_v2_record_window_is_configuration_error() {
    let (url, state) = v2_server().await;

    let err = InfluxV2Backend::new()
        .get(&v2_destination(&url, "s3cr3t"), &v2_fields(), Window::First(6))
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(state.lock().unwrap().queries.is_empty());
}

#[tokio::test]
async fn test_v2_missing_token_is_configuration_error() {
    let err = InfluxV2Backend::new()
        .get(
            &v2_destination(&closed_port_url().await, ""),
            &v2_fields(),
            Window::LastHours(1),
        )
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}
