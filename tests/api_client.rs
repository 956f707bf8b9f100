//! `HttpApiClient` against an in-process axum server.
//!
//! The mock records every request (method, path, query, bearer, body) and
//! answers from a per-test responder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use indexer_console::client::{HttpApiClient, IndexerApi};
use indexer_console::config::ApiConfig;
use indexer_console::error::ApiError;
use indexer_console_core::jobs::{JobListFilter, StartJobForm};
use indexer_console_core::query::build_search_request;
use indexer_console_core::{
    FilterChange, IndexerStatus, IndexerType, PageSize, ProgressStage, SearchFilterState,
};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    bearer: Option<String>,
    body: Option<Value>,
}

type Responder = Arc<dyn Fn(&Recorded) -> (StatusCode, Value) + Send + Sync>;

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<Recorded>>>,
    responder: Responder,
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = uri
        .query()
        .map(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.replace("%3A", ":").replace('+', " ")))
                .collect()
        })
        .unwrap_or_default();
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let recorded = Recorded {
        method,
        path: uri.path().to_string(),
        query,
        bearer,
        body: serde_json::from_slice(&body).ok(),
    };
    let (status, value) = (state.responder)(&recorded);
    state.requests.lock().unwrap().push(recorded);
    (status, Json(value)).into_response()
}

struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    async fn start(
        responder: impl Fn(&Recorded) -> (StatusCode, Value) + Send + Sync + 'static,
    ) -> MockServer {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            requests: requests.clone(),
            responder: Arc::new(responder),
        };
        let app = Router::new().fallback(record).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MockServer {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    fn client(&self, token: Option<&str>) -> HttpApiClient {
        let config = ApiConfig {
            base_url: format!("{}/", self.base_url),
            timeout_secs: Some(5),
        };
        HttpApiClient::new(&config, token).unwrap()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn only_request(&self) -> Recorded {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests[0].clone()
    }
}

fn job_json(id: u64, status: &str) -> Value {
    json!({
        "id": id,
        "type": "sync-since",
        "status": status,
        "params": { "since": "2024-01-15 10:00:00" },
        "started_at": "2024-01-15T10:00:05",
        "completed_at": null,
        "progress": { "current": 250, "total": 1000, "indexed": 240, "failed": 10 },
        "error_message": null
    })
}

#[tokio::test]
async fn test_list_jobs_sends_filters_and_bearer() {
    let server = MockServer::start(|_| (StatusCode::OK, json!([job_json(1, "running")]))).await;
    let client = server.client(Some("tok-123"));

    let filter = JobListFilter {
        status: Some(IndexerStatus::Running),
        kind: Some(IndexerType::IndexBulk),
    };
    let jobs = client.list_jobs(&filter).await.unwrap();

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, IndexerStatus::Running);
    let progress = jobs[0].progress.as_ref().unwrap();
    assert_eq!(progress.percent(), Some(25.0));
    assert!(matches!(progress.stage, ProgressStage::Bounded { .. }));

    let req = server.only_request();
    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/api/indexers");
    assert_eq!(req.query.get("status").map(String::as_str), Some("running"));
    assert_eq!(req.query.get("type").map(String::as_str), Some("index-bulk"));
    assert_eq!(req.bearer.as_deref(), Some("tok-123"));
}

#[tokio::test]
async fn test_list_jobs_without_filters_sends_no_query() {
    let server = MockServer::start(|_| (StatusCode::OK, json!([]))).await;
    let client = server.client(None);

    let jobs = client.list_jobs(&JobListFilter::default()).await.unwrap();

    assert!(jobs.is_empty());
    let req = server.only_request();
    assert!(req.query.is_empty());
    assert_eq!(req.bearer, None);
}

#[tokio::test]
async fn test_get_job_status_mapping() {
    let server = MockServer::start(|req| match req.path.as_str() {
        "/api/indexers/1" => (StatusCode::OK, job_json(1, "completed")),
        "/api/indexers/2" => (
            StatusCode::NOT_FOUND,
            json!({ "detail": "Indexer process not found" }),
        ),
        "/api/indexers/3" => (StatusCode::UNAUTHORIZED, json!({ "detail": "expired" })),
        _ => (
            StatusCode::BAD_GATEWAY,
            json!({ "detail": "upstream timeout" }),
        ),
    })
    .await;
    let client = server.client(Some("tok"));

    let job = client.get_job(1).await.unwrap();
    assert_eq!(job.status, IndexerStatus::Completed);
    assert!(job.is_terminal());

    assert!(matches!(client.get_job(2).await, Err(ApiError::NotFound)));
    assert!(matches!(
        client.get_job(3).await,
        Err(ApiError::Unauthorized { .. })
    ));
    match client.get_job(4).await {
        Err(e @ ApiError::Server { status: 502, .. }) => {
            assert!(e.is_transient());
            assert_eq!(e.user_message(), "upstream timeout");
        }
        other => panic!("unexpected result: {:?}", other.map(|j| j.id)),
    }
}

#[tokio::test]
async fn test_tail_logs_passes_cursor() {
    let server = MockServer::start(|req| {
        let logs = if req.query.contains_key("since") {
            json!([])
        } else {
            json!([
                { "timestamp": "2024-01-15T10:00:01", "level": "INFO", "message": "start" },
                { "timestamp": "2024-01-15T10:00:02", "level": "ERROR", "message": "boom" }
            ])
        };
        (
            StatusCode::OK,
            json!({ "logs": logs, "last_timestamp": "2024-01-15T10:00:02" }),
        )
    })
    .await;
    let client = server.client(Some("tok"));

    let first = client.tail_logs(42, None).await.unwrap();
    assert_eq!(first.logs.len(), 2);
    assert_eq!(first.last_timestamp.as_deref(), Some("2024-01-15T10:00:02"));

    let second = client
        .tail_logs(42, Some("2024-01-15T10:00:02"))
        .await
        .unwrap();
    assert!(second.logs.is_empty());

    let requests = server.requests();
    assert_eq!(requests[0].path, "/api/indexers/42/logs");
    assert!(!requests[0].query.contains_key("since"));
    assert_eq!(
        requests[1].query.get("since").map(String::as_str),
        Some("2024-01-15T10:00:02")
    );
}

#[tokio::test]
async fn test_start_and_stop_job() {
    let server = MockServer::start(|req| match req.path.as_str() {
        "/api/indexers/start" => (StatusCode::OK, json!({ "id": 77 })),
        "/api/indexers/77/stop" => (StatusCode::OK, json!({ "message": "stopping" })),
        _ => (
            StatusCode::CONFLICT,
            json!({ "detail": "Process is not running" }),
        ),
    })
    .await;
    let client = server.client(Some("tok"));

    let mut form = StartJobForm::new(IndexerType::IndexScraperPublications);
    form.scraper_id = Some(" 12 ".to_string());
    form.since = Some("2024-01-15 08:30".to_string());
    let request = form.into_request().unwrap();
    let started = client.start_job(&request).await.unwrap();
    assert_eq!(started.id, 77);

    client.stop_job(77).await.unwrap();
    let err = client.stop_job(78).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { status: 409, .. }));
    assert_eq!(err.user_message(), "Process is not running");

    let requests = server.requests();
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(
        requests[0].body,
        Some(json!({
            "type": "index-scraper-publications",
            "params": { "scraper_id": 12, "since": "2024-01-15 08:30:00" }
        }))
    );
    assert_eq!(requests[1].path, "/api/indexers/77/stop");
    assert_eq!(requests[1].method, Method::POST);
}

#[tokio::test]
async fn test_search_body_uses_wire_format() {
    let server = MockServer::start(|_| {
        (
            StatusCode::OK,
            json!({
                "publicaciones": [{
                    "id": 9,
                    "objeto": "Puente sobre arroyo",
                    "agencia": "Vialidad",
                    "pais": "Argentina",
                    "tags": [{ "id": 3, "descripcion": "obras" }],
                    "apertura": "2024-02-01",
                    "vigente": true,
                    "presupuesto": 1500000
                }],
                "total": 1,
                "pagina": 1,
                "paginas": 1
            }),
        )
    })
    .await;
    let client = server.client(Some("tok"));

    let filters = SearchFilterState::new(PageSize::Fifty)
        .apply(FilterChange::Search("  puente ".into()))
        .apply(FilterChange::Pais("all".into()))
        .apply(FilterChange::AperturaFrom("2024-01-01".into()))
        .apply(FilterChange::AperturaTo("2024-03-31".into()))
        .apply(FilterChange::UserTagIds(vec![3, 5]));
    let page = client.search(&build_search_request(&filters)).await.unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.publicaciones[0].tags[0].descripcion, "obras");
    assert!(page.publicaciones[0].extra.contains_key("presupuesto"));

    let req = server.only_request();
    assert_eq!(req.path, "/api/search-licitaciones");
    assert_eq!(
        req.body,
        Some(json!({
            "page": 1,
            "page_size": 50,
            "search": "puente",
            "incluirVencidos": "0",
            "apertura_fr": "01/01/2024",
            "apertura_to": "31/03/2024",
            "user_tag_ids": [3, 5]
        }))
    );
}

#[tokio::test]
async fn test_validation_detail_list_is_kept() {
    let server = MockServer::start(|_| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "detail": [{ "loc": ["body", "page_size"], "msg": "invalid" }] }),
        )
    })
    .await;
    let client = server.client(Some("tok"));

    let request = build_search_request(&SearchFilterState::default());
    let err = client.search(&request).await.unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert!(err.search_message().contains("page_size"));
}

#[tokio::test]
async fn test_login_sends_credentials_without_bearer() {
    let server = MockServer::start(|req| match &req.body {
        Some(body) if body["password"] == "secret" => (
            StatusCode::OK,
            json!({
                "access_token": "header.payload.sig",
                "token_type": "bearer",
                "user": { "id": 4, "username": "ana", "email": null, "role": "admin" }
            }),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            json!({ "detail": "Incorrect username or password" }),
        ),
    })
    .await;
    let client = server.client(Some("stale-token"));

    let response = client.login("ana", "secret").await.unwrap();
    assert_eq!(response.access_token, "header.payload.sig");
    assert_eq!(response.user.username, "ana");
    assert_eq!(response.user.role, "admin");

    let err = client.login("ana", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.user_message(), "Incorrect username or password");

    let requests = server.requests();
    assert_eq!(requests[0].path, "/api/auth/login");
    assert_eq!(requests[0].bearer, None);
    assert_eq!(
        requests[0].body,
        Some(json!({ "username": "ana", "password": "secret" }))
    );
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ApiConfig {
        base_url: format!("http://{}", addr),
        timeout_secs: Some(2),
    };
    let client = HttpApiClient::new(&config, None).unwrap();

    let err = client.get_job(1).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    assert!(err.is_transient());
}
