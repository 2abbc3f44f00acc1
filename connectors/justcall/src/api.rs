use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::utils::generate_ulid;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::export::to_csv;
use crate::models::{Credentials, FetchOutcome, FetchRequest, TranscriptRecord};
use crate::sync::TranscriptFetcher;

#[derive(Clone)]
pub struct ApiState {
    pub fetcher: Arc<TranscriptFetcher>,
    pub jobs: Arc<DashMap<String, FetchJob>>,
}

impl ApiState {
    pub fn new(fetcher: TranscriptFetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Drops jobs that finished at least `ttl` ago. Running jobs are kept.
    pub fn evict_finished_jobs(&self, ttl: Duration) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| match job.finished_at {
            Some(finished_at) => finished_at.elapsed() < ttl,
            None => true,
        });
        before.saturating_sub(self.jobs.len())
    }
}

/// Periodically evicts finished jobs so their records only outlive the fetch
/// by `ttl`.
pub fn spawn_job_sweeper(state: ApiState, ttl: Duration) -> JoinHandle<()> {
    let period = ttl.clamp(Duration::from_secs(1), Duration::from_secs(60));
    info!("Job sweeper started, evicting finished fetches after {:?}", ttl);

    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let evicted = state.evict_finished_jobs(ttl);
            if evicted > 0 {
                debug!("Evicted {} finished fetch job(s)", evicted);
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    NoData,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub category: String,
    pub message: String,
}

impl ErrorBody {
    fn from_error(err: &FetchError) -> Self {
        Self {
            status: "error".to_string(),
            category: err.category().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchJob {
    pub status: JobStatus,
    pub count: usize,
    pub start_date: String,
    pub end_date: String,
    pub records: Vec<TranscriptRecord>,
    pub error: Option<ErrorBody>,
    pub finished_at: Option<Instant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorManifest {
    pub name: String,
    pub version: String,
    pub operations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResponse {
    pub status: String,
    pub strategy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchStarted {
    pub status: String,
    pub fetch_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchStatusResponse {
    pub fetch_id: String,
    pub status: JobStatus,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/manifest", get(manifest))
        .route("/test", post(test_connection))
        .route("/fetch", post(start_fetch))
        .route("/fetch/:id", get(fetch_status))
        .route("/fetch/:id/records", get(fetch_records))
        .route("/fetch/:id/export", get(export_csv))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn error_status(err: &FetchError) -> StatusCode {
    match err {
        FetchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        FetchError::AuthRejected => StatusCode::UNAUTHORIZED,
        FetchError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        FetchError::TransportUnavailable(_)
        | FetchError::Upstream { .. }
        | FetchError::ConnectionFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn not_found(fetch_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "status": "error",
            "category": "not_found",
            "message": format!("Unknown fetch {}", fetch_id),
        })),
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "justcall-connector"
    }))
}

async fn manifest() -> impl IntoResponse {
    Json(ConnectorManifest {
        name: "justcall".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        operations: vec!["test".to_string(), "fetch".to_string(), "export".to_string()],
    })
}

async fn test_connection(
    State(state): State<ApiState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<TestResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.fetcher.test_connection(&credentials).await {
        Ok(strategy) => Ok(Json(TestResponse {
            status: "ok".to_string(),
            strategy: strategy.name,
        })),
        Err(e) => {
            warn!("Connection test failed: {}", e);
            Err((error_status(&e), Json(ErrorBody::from_error(&e))))
        }
    }
}

async fn start_fetch(
    State(state): State<ApiState>,
    Json(request): Json<FetchRequest>,
) -> Result<Json<FetchStarted>, (StatusCode, Json<ErrorBody>)> {
    // Reject bad input up front rather than through a failed job.
    if let Err(e) = request
        .credentials
        .sanitized()
        .and_then(|_| request.date_range())
    {
        return Err((error_status(&e), Json(ErrorBody::from_error(&e))));
    }

    if state
        .jobs
        .iter()
        .any(|job| job.status == JobStatus::Running)
    {
        warn!("Starting a fetch while another is still running; upstream pacing is not shared");
    }

    let fetch_id = generate_ulid();
    state.jobs.insert(
        fetch_id.clone(),
        FetchJob {
            status: JobStatus::Running,
            count: 0,
            start_date: request.start_date.trim().to_string(),
            end_date: request.end_date.trim().to_string(),
            records: Vec::new(),
            error: None,
            finished_at: None,
        },
    );

    info!(
        "Fetch {} started for {}..{}",
        fetch_id, request.start_date, request.end_date
    );

    let fetcher = Arc::clone(&state.fetcher);
    let jobs = Arc::clone(&state.jobs);
    let id = fetch_id.clone();

    tokio::spawn(async move {
        let progress_jobs = Arc::clone(&jobs);
        let progress_id = id.clone();
        let result = fetcher
            .fetch_transcripts(&request, move |count| {
                if let Some(mut job) = progress_jobs.get_mut(&progress_id) {
                    job.count = count;
                }
            })
            .await;

        let Some(mut job) = jobs.get_mut(&id) else {
            return;
        };
        match result {
            Ok(FetchOutcome::Records(records)) => {
                info!("Fetch {} completed with {} records", id, records.len());
                job.count = records.len();
                job.records = records;
                job.status = JobStatus::Completed;
            }
            Ok(FetchOutcome::NoDataInRange) => {
                info!("Fetch {} found no calls in range", id);
                job.count = 0;
                job.status = JobStatus::NoData;
            }
            Err(e) => {
                error!("Fetch {} failed: {}", id, e);
                job.records.clear();
                job.error = Some(ErrorBody::from_error(&e));
                job.status = JobStatus::Failed;
            }
        }
        job.finished_at = Some(Instant::now());
    });

    Ok(Json(FetchStarted {
        status: "started".to_string(),
        fetch_id,
    }))
}

async fn fetch_status(State(state): State<ApiState>, Path(fetch_id): Path<String>) -> Response {
    let Some(job) = state.jobs.get(&fetch_id) else {
        return not_found(&fetch_id);
    };

    let message = (job.status == JobStatus::NoData).then(|| {
        "No calls found in this date range. Try a wider range.".to_string()
    });

    Json(FetchStatusResponse {
        fetch_id: fetch_id.clone(),
        status: job.status,
        count: job.count,
        message,
        error: job.error.clone(),
    })
    .into_response()
}

async fn fetch_records(State(state): State<ApiState>, Path(fetch_id): Path<String>) -> Response {
    let Some(job) = state.jobs.get(&fetch_id) else {
        return not_found(&fetch_id);
    };

    match job.status {
        JobStatus::Completed | JobStatus::NoData => Json(job.records.clone()).into_response(),
        JobStatus::Running => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "running", "count": job.count })),
        )
            .into_response(),
        JobStatus::Failed => (StatusCode::BAD_GATEWAY, Json(job.error.clone())).into_response(),
    }
}

async fn export_csv(State(state): State<ApiState>, Path(fetch_id): Path<String>) -> Response {
    let Some(job) = state.jobs.get(&fetch_id) else {
        return not_found(&fetch_id);
    };

    if job.status != JobStatus::Completed {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "error",
                "category": "not_exportable",
                "message": format!("Fetch {} has no records to export", fetch_id),
            })),
        )
            .into_response();
    }

    let filename = format!(
        "justcall_transcripts_{}_{}.csv",
        job.start_date, job.end_date
    );

    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        to_csv(&job.records),
    )
        .into_response()
}
