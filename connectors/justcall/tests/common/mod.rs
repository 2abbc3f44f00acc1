#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use justcall_connector::config::{FetcherConfig, ProbePolicy};
use justcall_connector::strategy::ConnectionStrategy;
use justcall_connector::{Credentials, FetchRequest, TranscriptFetcher};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use url::Url;

pub const API_KEY: &str = "key";
pub const API_SECRET: &str = "secret";

/// Port nothing listens on, for unreachable-upstream cases.
pub const UNREACHABLE_API_URL: &str = "http://127.0.0.1:9/v2.1/calls";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub route: String,
    pub params: HashMap<String, String>,
    pub authorization: Option<String>,
}

impl RecordedRequest {
    pub fn page(&self) -> Option<u32> {
        self.params.get("page").and_then(|p| p.parse().ok())
    }

    pub fn per_page(&self) -> Option<u32> {
        self.params.get("per_page").and_then(|p| p.parse().ok())
    }
}

#[derive(Debug, Clone, Default)]
struct Behaviour {
    total_records: usize,
    wrap_in_data: bool,
    direct_status: Option<StatusCode>,
    relay_status: Option<StatusCode>,
    failing_page: Option<(u32, StatusCode)>,
}

#[derive(Clone)]
struct MockState {
    behaviour: Arc<Mutex<Behaviour>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// In-process stand-in for the JustCall calls endpoint (`/v2.1/calls`), a
/// header-stripping relay (`/relay?url=`) and a relay that answers with HTML
/// (`/broken-relay?url=`).
pub struct MockJustCall {
    pub base_url: String,
    behaviour: Arc<Mutex<Behaviour>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    _server_handle: tokio::task::JoinHandle<()>,
}

impl MockJustCall {
    pub async fn start() -> anyhow::Result<Self> {
        let behaviour = Arc::new(Mutex::new(Behaviour {
            wrap_in_data: true,
            ..Default::default()
        }));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = MockState {
            behaviour: behaviour.clone(),
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/v2.1/calls", get(handle_direct))
            .route("/relay", get(handle_relay))
            .route("/broken-relay", get(handle_broken_relay))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        sleep(Duration::from_millis(50)).await;

        Ok(Self {
            base_url: format!("http://127.0.0.1:{}", port),
            behaviour,
            requests,
            _server_handle: server_handle,
        })
    }

    pub fn api_url(&self) -> String {
        format!("{}/v2.1/calls", self.base_url)
    }

    pub fn relay_template(&self) -> String {
        format!("{}/relay?url={{url}}", self.base_url)
    }

    pub fn broken_relay_template(&self) -> String {
        format!("{}/broken-relay?url={{url}}", self.base_url)
    }

    pub fn set_total_records(&self, total: usize) {
        self.behaviour.lock().unwrap().total_records = total;
    }

    pub fn set_wrap_in_data(&self, wrap: bool) {
        self.behaviour.lock().unwrap().wrap_in_data = wrap;
    }

    pub fn set_direct_status(&self, status: StatusCode) {
        self.behaviour.lock().unwrap().direct_status = Some(status);
    }

    pub fn set_relay_status(&self, status: StatusCode) {
        self.behaviour.lock().unwrap().relay_status = Some(status);
    }

    pub fn fail_page(&self, page: u32, status: StatusCode) {
        self.behaviour.lock().unwrap().failing_page = Some((page, status));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, route: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.route == route)
            .collect()
    }

    /// Fetcher trying direct first, then the mock relay.
    pub fn fetcher(&self) -> TranscriptFetcher {
        self.fetcher_with(
            &self.api_url(),
            vec![
                ConnectionStrategy::direct(),
                ConnectionStrategy::public_relay(0, &self.relay_template()),
            ],
            ProbePolicy::EveryFetch,
        )
    }

    pub fn fetcher_with(
        &self,
        api_url: &str,
        strategies: Vec<ConnectionStrategy>,
        probe_policy: ProbePolicy,
    ) -> TranscriptFetcher {
        let config = FetcherConfig {
            api_url: api_url.to_string(),
            strategies,
            page_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            probe_policy,
            transcript_flag: Some("fetch_transcription".to_string()),
        };
        TranscriptFetcher::new(config).unwrap()
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(API_KEY, API_SECRET)
}

pub fn fetch_request(start: &str, end: &str) -> FetchRequest {
    FetchRequest {
        credentials: credentials(),
        start_date: start.to_string(),
        end_date: end.to_string(),
    }
}

pub fn mock_call(index: usize) -> JsonValue {
    json!({
        "id": index,
        "datetime": format!("2024-01-01 10:{:02}:00", index % 60),
        "from": "+15550001",
        "to": "+15550002",
        "duration": 30 + index,
        "direction": if index % 2 == 0 { "Incoming" } else { "Outgoing" },
        "iq_transcript": format!("Transcript for call {}", index),
        "recording_url": format!("https://rec.example/{}.mp3", index),
    })
}

fn record(state: &MockState, route: &str, params: HashMap<String, String>, headers: &HeaderMap) {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    state.requests.lock().unwrap().push(RecordedRequest {
        route: route.to_string(),
        params,
        authorization,
    });
}

fn serve_page(behaviour: &Behaviour, params: &HashMap<String, String>) -> Response {
    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: usize = params
        .get("per_page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(50);

    if let Some((failing, status)) = behaviour.failing_page {
        // Probes also ask for page 1, so only fail full-size page requests.
        if failing as usize == page && per_page > 1 {
            return (status, Json(json!({ "status": "error", "message": "mock failure" })))
                .into_response();
        }
    }

    let start = (page - 1) * per_page;
    let end = (start + per_page).min(behaviour.total_records);
    let calls: Vec<JsonValue> = (start..end).map(|i| mock_call(i + 1)).collect();

    if behaviour.wrap_in_data {
        Json(json!({ "status": "success", "count": calls.len(), "data": calls })).into_response()
    } else {
        Json(JsonValue::Array(calls)).into_response()
    }
}

async fn handle_direct(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    record(&state, "direct", params.clone(), &headers);
    let behaviour = state.behaviour.lock().unwrap().clone();

    if let Some(status) = behaviour.direct_status {
        return (status, "direct unavailable").into_response();
    }

    let expected = format!("{}:{}", API_KEY, API_SECRET);
    let header_ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);
    if !header_ok {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "status": "error", "message": "Invalid credentials" })),
        )
            .into_response();
    }

    serve_page(&behaviour, &params)
}

async fn handle_relay(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(outer): Query<HashMap<String, String>>,
) -> Response {
    let Some(params) = outer
        .get("url")
        .and_then(|u| Url::parse(u).ok())
        .map(|u| u.query_pairs().into_owned().collect::<HashMap<String, String>>())
    else {
        return (StatusCode::BAD_REQUEST, "missing url").into_response();
    };

    record(&state, "relay", params.clone(), &headers);
    let behaviour = state.behaviour.lock().unwrap().clone();

    if let Some(status) = behaviour.relay_status {
        return (status, "relay failure").into_response();
    }

    let query_ok = params.get("api_key").map(String::as_str) == Some(API_KEY)
        && params.get("api_secret").map(String::as_str) == Some(API_SECRET);
    if !query_ok {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "status": "error", "message": "Invalid credentials" })),
        )
            .into_response();
    }

    serve_page(&behaviour, &params)
}

async fn handle_broken_relay(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(outer): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    record(&state, "broken-relay", outer, &headers);
    (
        [("content-type", "text/html")],
        "<html><body>Relay is sleeping</body></html>",
    )
}
