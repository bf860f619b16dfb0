//! End-to-end tests of the query builder and journal stores against a mock
//! journal API.
//!
//! The mock (axum, random port) keeps tables in memory and speaks the same
//! `{data, error}` protocol as the real backend: `GET /api/{table}` with
//! equality filters plus `order`/`limit`, `POST`, `PUT /{id}`, `DELETE /{id}`,
//! `/api/health` and `/api/users/stats/{telegram_id}`. All routes are
//! parameterised so static and dynamic segments never overlap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{get, put};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};

use tradejournal::config::ClientConfig;
use tradejournal::db::{ClientState, DataClient, RetryPolicy, SortDirection};
use tradejournal::journal::{
    AnalysisSession, AnalysisStore, Answer, EventTracker, Field, NewStrategy, Rating, RowId, SessionUser,
    StrategyStore, UserDirectory,
};

// ---------------------------------------------------------------------------
// Mock journal API
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct MockApi {
    tables: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    next_id: Arc<AtomicI64>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockApi {
    fn record(&self, method: &Method, uri: &Uri) {
        self.requests.lock().unwrap().push(format!("{method} {uri}"));
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.requests().iter().filter(|r| r.starts_with(prefix)).count()
    }

    fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    fn assign(&self, mut row: Map<String, Value>) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        row.insert("id".into(), json!(id));
        row.insert("created_at".into(), json!(format!("2024-01-01T00:{:02}:{:02}Z", id / 60, id % 60)));
        Value::Object(row)
    }
}

fn field_eq(row: &Value, column: &str, expected: &str) -> bool {
    match &row[column] {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        _ => false,
    }
}

fn ok(data: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({"data": data, "error": null})))
}

fn fail(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"data": null, "error": message})))
}

fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({"status": "healthy", "database": "connected", "timestamp": "2024-01-01T00:00:00Z"})),
    )
}

async fn list_rows(
    State(api): State<MockApi>,
    method: Method,
    uri: Uri,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if table == "health" {
        return health();
    }
    api.record(&method, &uri);
    let mut rows: Vec<Value> = api
        .rows(&table)
        .into_iter()
        .filter(|row| {
            params.iter().all(|(key, value)| match key.as_str() {
                "select" | "order" | "limit" => true,
                "telegram_user_id" if table == "users" => field_eq(row, "telegram_id", value),
                column => field_eq(row, column, value),
            })
        })
        .collect();

    if let Some((column, direction)) = params.get("order").and_then(|o| o.split_once('.')) {
        rows.sort_by(|a, b| a[column].as_str().cmp(&b[column].as_str()));
        if direction == "desc" {
            rows.reverse();
        }
    }
    if let Some(limit) = params.get("limit") {
        rows.truncate(limit.parse().unwrap());
    }
    ok(Value::Array(rows))
}

async fn insert_row(
    State(api): State<MockApi>,
    method: Method,
    uri: Uri,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    api.record(&method, &uri);
    let Value::Object(fields) = body else {
        return fail(StatusCode::BAD_REQUEST, "expected an object");
    };
    if table == "strategies" && fields.get("name").and_then(Value::as_str).is_none() {
        return fail(StatusCode::BAD_REQUEST, "name is required");
    }
    if table == "users" {
        let telegram_id = fields
            .get("telegram_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(existing) = api
            .rows("users")
            .into_iter()
            .find(|u| field_eq(u, "telegram_id", &telegram_id))
        {
            return ok(existing);
        }
    }
    let row = api.assign(fields);
    api.tables
        .lock()
        .unwrap()
        .entry(table)
        .or_default()
        .push(row.clone());
    ok(row)
}

async fn update_row(
    State(api): State<MockApi>,
    method: Method,
    uri: Uri,
    Path((table, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    api.record(&method, &uri);
    let mut tables = api.tables.lock().unwrap();
    let Some(row) = tables
        .get_mut(&table)
        .and_then(|rows| rows.iter_mut().find(|r| field_eq(r, "id", &id)))
    else {
        return fail(StatusCode::NOT_FOUND, "row not found");
    };
    if let (Value::Object(target), Value::Object(changes)) = (row, body) {
        target.extend(changes);
        return ok(Value::Object(target.clone()));
    }
    fail(StatusCode::BAD_REQUEST, "expected an object")
}

async fn delete_row(
    State(api): State<MockApi>,
    method: Method,
    uri: Uri,
    Path((table, id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    api.record(&method, &uri);
    if let Some(rows) = api.tables.lock().unwrap().get_mut(&table) {
        rows.retain(|r| !field_eq(r, "id", &id));
    }
    ok(Value::Null)
}

async fn user_stats(
    State(api): State<MockApi>,
    Path((table, kind, telegram_id)): Path<(String, String, String)>,
) -> (StatusCode, Json<Value>) {
    if (table.as_str(), kind.as_str()) != ("users", "stats") {
        return fail(StatusCode::NOT_FOUND, "unknown route");
    }
    let count = |table: &str| {
        api.rows(table)
            .iter()
            .filter(|r| field_eq(r, "telegram_user_id", &telegram_id))
            .count()
    };
    ok(json!({"strategies": count("strategies"), "analyses": count("analysis_results")}))
}

async fn start_mock_api(api: MockApi) -> String {
    let router = Router::new()
        .route("/api/{table}", get(list_rows).post(insert_row))
        .route("/api/{table}/{id}", put(update_row).delete(delete_row))
        .route("/api/{table}/{id}/{telegram_id}", get(user_stats))
        .with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/api")
}

async fn connect(base: &str, telegram_id: Option<&str>) -> (DataClient, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ClientConfig::new(vec![base.to_string()]);
    config.endpoint_cache_path = dir.path().join("endpoint.json");
    config.probe_timeout = Duration::from_secs(2);
    config.retry = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    };
    config.telegram_id = telegram_id.map(str::to_string);
    let client = DataClient::connect(&config).await.expect("mock API should be reachable");
    (client, dir)
}

fn without_server_fields(mut row: Value) -> Value {
    let fields = row.as_object_mut().unwrap();
    fields.remove("id");
    fields.remove("created_at");
    row
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_binds_to_the_mock() {
    let base = start_mock_api(MockApi::default()).await;
    let (client, _dir) = connect(&base, None).await;
    assert_eq!(client.state(), ClientState::Ready(base.clone()));
    assert_eq!(client.transport_name(), "rest");
}

#[tokio::test]
async fn insert_then_read_back_round_trips() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, None).await;

    let strategy = json!({
        "name": "Breakout",
        "description": "Range break with volume",
        "fields": [{"name": "Volume", "description": "", "inputs": [{"type": "number", "label": "Ratio", "required": true}]}]
    });

    let created = client
        .from("strategies")
        .insert(strategy.clone())
        .select("*")
        .single()
        .await;
    assert_eq!(created.error, None);
    let created = created.data.unwrap();
    let id = created["id"].as_i64().unwrap();
    assert!(created["created_at"].is_string());

    let fetched = client.from("strategies").eq("id", id).single().await;
    assert_eq!(fetched.error, None);
    let fetched = fetched.data.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(without_server_fields(fetched), strategy);
}

#[tokio::test]
async fn awaiting_directly_and_after_single_give_the_same_shape() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, None).await;

    let plain = client
        .from("strategies")
        .insert(json!({"name": "A"}))
        .select("*")
        .await;
    let single = client
        .from("strategies")
        .insert(json!({"name": "A"}))
        .select("*")
        .single()
        .await;

    assert_eq!(plain.error, None);
    assert_eq!(single.error, None);
    assert_eq!(
        without_server_fields(plain.data.unwrap()),
        without_server_fields(single.data.unwrap())
    );
}

#[tokio::test]
async fn filtered_ordered_limited_read() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, None).await;

    for i in 0..7 {
        let env = client
            .from("strategies")
            .insert(json!({"name": format!("s{i}"), "user_id": "u1"}))
            .await;
        assert!(env.is_ok());
    }
    for i in 0..2 {
        client
            .from("strategies")
            .insert(json!({"name": format!("other{i}"), "user_id": "u2"}))
            .await;
    }

    let env = client
        .from("strategies")
        .select("*")
        .eq("user_id", "u1")
        .order("created_at", SortDirection::Descending)
        .limit(5)
        .await;
    assert_eq!(env.error, None);
    let rows = env.data.unwrap().as_array().unwrap().clone();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r["user_id"] == "u1"));
    let stamps: Vec<&str> = rows.iter().map(|r| r["created_at"].as_str().unwrap()).collect();
    let mut sorted = stamps.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(stamps, sorted);
    assert_eq!(rows[0]["name"], "s6");

    let last = api.requests().into_iter().last().unwrap();
    assert_eq!(last, "GET /api/strategies?user_id=u1&order=created_at.desc&limit=5");
}

#[tokio::test]
async fn executing_twice_makes_one_request() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, None).await;

    let mut query = client.from("strategies").insert(json!({"name": "once"})).select("*");
    let first = query.execute().await;
    let second = query.execute().await;
    assert_eq!(first, second);
    assert_eq!(api.count("POST /api/strategies"), 1);

    // Consuming the builder still reads the memoized value.
    let third = query.single().await;
    assert_eq!(third, first);
    assert_eq!(api.count("POST /api/strategies"), 1);
    assert_eq!(api.rows("strategies").len(), 1);
}

#[tokio::test]
async fn backend_validation_error_is_folded() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, None).await;

    let env = client.from("strategies").insert(json!({"description": "no name"})).await;
    assert_eq!(env.data, None);
    assert_eq!(env.error.as_deref(), Some("HTTP 400: name is required"));
    // 4xx is not retried.
    assert_eq!(api.count("POST /api/strategies"), 1);
}

#[tokio::test]
async fn strategy_store_crud() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, Some("777")).await;
    let store = StrategyStore::new(client.clone());

    let created = store
        .create(NewStrategy::new("  Trend follow ").field(Field::new("Trend")).field(Field::new(" ")))
        .await
        .unwrap();
    assert_eq!(created.name, "Trend follow");
    assert_eq!(created.fields.len(), 1);
    assert_eq!(api.rows("strategies")[0]["telegram_user_id"], "777");

    assert!(store.exists(&created.id).await.unwrap());
    let fetched = store.get(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched, created);

    let updated = store
        .update(&created.id, NewStrategy::new("Renamed"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "Renamed");

    let listed = store.list(Some(10)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(api.requests().iter().any(|r| r.contains("telegram_user_id=777")));

    store.delete(&created.id).await.unwrap();
    assert!(!store.exists(&created.id).await.unwrap());
    assert!(store.get(&RowId::Int(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_strategy_never_reaches_the_network() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, None).await;

    let err = StrategyStore::new(client).create(NewStrategy::new("   ")).await.unwrap_err();
    assert!(err.to_string().contains("Strategy name is required"));
    assert_eq!(api.count("POST"), 0);
}

#[tokio::test]
async fn session_user_id_is_resolved_once() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, Some("555")).await;
    let directory = UserDirectory::new(client);

    let user = SessionUser::new("555").with_names(Some("trader".into()), Some("Ann".into()), None);
    let first = directory.ensure(&user).await.unwrap();
    let second = directory.ensure(&user).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(user.id(), Some(&first));
    assert_eq!(api.count("POST /api/users"), 1);
    assert_eq!(api.count("GET /api/users"), 1);

    // A new session for the same person finds the existing row.
    let again = SessionUser::new("555");
    assert_eq!(directory.ensure(&again).await.unwrap(), first);
    assert_eq!(api.count("POST /api/users"), 1);

    let found = directory.find("555").await.unwrap().unwrap();
    assert_eq!(found.username.as_deref(), Some("trader"));
}

#[tokio::test]
async fn events_are_shaped_before_sending() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, Some("321")).await;

    assert!(EventTracker::new(client.clone()).track("app_open", json!({"tab": "home"})).await);
    client
        .from("user_events")
        .insert(json!({"event_name": "legacy", "properties": {"x": 1}}))
        .await;

    let events = api.rows("user_events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["telegram_user_id"], "321");
    assert_eq!(events[0]["event_type"], "app_open");
    assert_eq!(events[0]["event_data"], json!({"tab": "home"}));
    assert_eq!(events[1]["event_type"], "legacy");
    assert_eq!(events[1]["event_data"], json!({"x": 1}));
}

#[tokio::test]
async fn analysis_is_scored_saved_and_counted() {
    let api = MockApi::default();
    let base = start_mock_api(api.clone()).await;
    let (client, _dir) = connect(&base, Some("42")).await;

    let strategy = StrategyStore::new(client.clone())
        .create(
            NewStrategy::new("Swing")
                .field(Field::new("Support"))
                .field(Field::new("Volume"))
                .field(Field::new("News")),
        )
        .await
        .unwrap();

    let mut session = AnalysisSession::new(&strategy);
    session.answer(vec![Answer::new("Level", "100")], Rating::Positive);
    session.answer(vec![], Rating::Positive);
    session.answer(vec![], Rating::Neutral);
    let record = session.finish("sol").unwrap();
    assert_eq!(record.percentage, 100);

    let store = AnalysisStore::new(client.clone());
    let saved = store.create(record).await.unwrap();
    assert_eq!(saved.coin(), "SOL");
    assert_eq!(saved.results.positive_factors.len(), 2);

    let listed = store.list(Some(5)).await.unwrap();
    assert_eq!(listed.len(), 1);

    let stats = client.user_stats("42").await;
    assert_eq!(stats.error, None);
    let stats = stats.data.unwrap();
    assert_eq!((stats.strategies, stats.analyses), (1, 1));

    store.delete(&saved.id).await.unwrap();
    assert!(store.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn health_and_table_checks() {
    let base = start_mock_api(MockApi::default()).await;
    let (client, _dir) = connect(&base, None).await;

    let health = client.health_check().await;
    assert!(health.is_healthy());
    assert_eq!(health.database.as_deref(), Some("connected"));

    let checks = client.check_tables().await;
    let tables: Vec<&str> = checks.iter().map(|c| c.table.as_str()).collect();
    assert_eq!(tables, vec!["strategies", "users", "analysis_results"]);
    assert!(checks.iter().all(|c| c.reachable), "{checks:?}");
}
