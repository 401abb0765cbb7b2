//! phrasebook-api - HTTP API server for phrasebook

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use phrasebook_api::{CategorizationHandler, PhraseService, SettingsService, SettingsView, StatsService};
use phrasebook_core::{
    defaults, ActivityHeatmap, CreatePhraseRequest, Error, GeneratedPhrase, JobRepository,
    ListPhrasesRequest, ModelOption, Phrase, QueueStats, SettingsPatch, UpdatePhraseRequest,
    WeeklyDay,
};
use phrasebook_db::{log_pool_metrics, Database, PoolConfig};
use phrasebook_inference::OpenAIBackend;
use phrasebook_jobs::{WorkerBuilder, WorkerConfig};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    phrases: PhraseService,
    settings: SettingsService,
    stats: StatsService,
    jobs: Arc<dyn JobRepository>,
}

fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:5173,http://localhost:3000".to_string());

    if origins_str.trim().is_empty() {
        return vec![
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://localhost:3000"),
        ];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

/// Install the global subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "phrasebook_api=debug,phrasebook_jobs=info,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("phrasebook-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless asked for
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _file_guard = init_tracing();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/phrasebook".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| defaults::SERVER_HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);

    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");
    log_pool_metrics(db.pool());

    let notify = db.job_notify();
    let Database {
        phrases,
        settings,
        jobs,
        ..
    } = db;
    let phrases = Arc::new(phrases);
    let settings = Arc::new(settings);
    let jobs: Arc<dyn JobRepository> = Arc::new(jobs);

    let backend = Arc::new(OpenAIBackend::from_env()?);
    info!(
        base_url = %backend.config().base_url,
        "Inference backend initialized"
    );

    let phrase_service = PhraseService::new(
        phrases.clone(),
        settings.clone(),
        jobs.clone(),
        backend,
    );

    let worker = WorkerBuilder::new(jobs.clone())
        .with_config(WorkerConfig::from_env())
        .with_notify(notify)
        .with_handler(CategorizationHandler::new(phrase_service.clone()))
        .build()
        .await;
    let worker_handle = worker.start();

    let state = AppState {
        phrases: phrase_service,
        settings: SettingsService::new(settings),
        stats: StatsService::new(phrases),
        jobs,
    };
    let app = build_router(state, parse_allowed_origins());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker_handle.shutdown().await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn build_router(state: AppState, allowed_origins: Vec<HeaderValue>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Phrases
        .route("/api/v1/phrases", get(list_phrases).post(create_phrase))
        .route("/api/v1/phrases/random", get(random_phrase))
        .route("/api/v1/phrases/generate", post(generate_phrase))
        .route(
            "/api/v1/phrases/:id",
            get(get_phrase).put(update_phrase).delete(delete_phrase),
        )
        // Stats
        .route("/api/v1/stats/categories", get(category_stats))
        .route("/api/v1/stats/weekly-count", get(weekly_count))
        .route("/api/v1/stats/weekly", get(weekly_stats))
        .route("/api/v1/stats/activity", get(activity_stats))
        // Settings
        .route("/api/v1/settings", get(get_settings).put(update_settings))
        .route("/api/v1/models", get(list_models))
        // Jobs
        .route("/api/v1/jobs/stats", get(job_stats))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http().make_span_with(
                    |request: &axum::http::Request<axum::body::Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id,
                        )
                    },
                ))
                .layer(
                    CorsLayer::new()
                        .allow_origin(AllowOrigin::list(allowed_origins))
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                        .max_age(std::time::Duration::from_secs(3600)),
                ),
        )
        // Outermost, so CORS sees the plain body type.
        .layer(RequestBodyLimitLayer::new(defaults::REQUEST_BODY_LIMIT))
        .with_state(state)
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// PHRASE HANDLERS
// =============================================================================

#[derive(Debug, Serialize)]
struct CreatedResponse {
    id: Uuid,
}

async fn list_phrases(
    State(state): State<AppState>,
    Query(query): Query<ListPhrasesRequest>,
) -> Result<Json<Vec<Phrase>>, ApiError> {
    Ok(Json(state.phrases.list(&query).await?))
}

async fn create_phrase(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreatePhraseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state.phrases.submit(body).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn random_phrase(State(state): State<AppState>) -> Result<Json<Option<Phrase>>, ApiError> {
    Ok(Json(state.stats.random_phrase().await?))
}

async fn generate_phrase(
    State(state): State<AppState>,
) -> Result<Json<GeneratedPhrase>, ApiError> {
    Ok(Json(state.phrases.generate_suggestion().await?))
}

async fn get_phrase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Phrase>, ApiError> {
    Ok(Json(state.phrases.get(id).await?))
}

async fn update_phrase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<UpdatePhraseRequest>,
) -> Result<Json<Phrase>, ApiError> {
    Ok(Json(state.phrases.update(id, body).await?))
}

async fn delete_phrase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.phrases.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// STATS HANDLERS
// =============================================================================

#[derive(Debug, Serialize)]
struct CountResponse {
    count: i64,
}

async fn category_stats(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, i64>>, ApiError> {
    Ok(Json(state.stats.category_histogram().await?))
}

async fn weekly_count(State(state): State<AppState>) -> Result<Json<CountResponse>, ApiError> {
    let count = state.stats.weekly_count().await?;
    Ok(Json(CountResponse { count }))
}

async fn weekly_stats(State(state): State<AppState>) -> Result<Json<Vec<WeeklyDay>>, ApiError> {
    Ok(Json(state.stats.weekly_series().await?))
}

async fn activity_stats(
    State(state): State<AppState>,
) -> Result<Json<ActivityHeatmap>, ApiError> {
    Ok(Json(state.stats.activity_heatmap().await?))
}

// =============================================================================
// SETTINGS HANDLERS
// =============================================================================

async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsView>, ApiError> {
    let settings = state.settings.get().await?;
    Ok(Json(SettingsView::from(&settings)))
}

async fn update_settings(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SettingsPatch>,
) -> Result<Json<SettingsView>, ApiError> {
    let settings = state.settings.update(body).await?;
    Ok(Json(SettingsView::from(&settings)))
}

async fn list_models(State(state): State<AppState>) -> Json<&'static [ModelOption]> {
    Json(state.settings.available_models())
}

// =============================================================================
// JOB HANDLERS
// =============================================================================

async fn job_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.jobs.queue_stats().await?))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

/// `Json` whose rejections use the `{"error": ...}` body with status 400.
struct ApiJson<T>(T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug)]
enum ApiError {
    Internal(Error),
    NotFound(String),
    BadRequest(String),
    BadGateway(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) | Error::PhraseNotFound(_) => ApiError::NotFound(err.to_string()),
            Error::InvalidInput(msg) | Error::Config(msg) => ApiError::BadRequest(msg),
            Error::Inference(msg) => ApiError::BadGateway(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                tracing::error!(subsystem = "api", error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use phrasebook_core::{Category, JobStatus, PhraseRepository};
    use phrasebook_db::{InMemoryJobRepository, InMemoryPhraseRepository, InMemorySettingsRepository};
    use phrasebook_inference::mock::MockGenerationBackend;
    use phrasebook_jobs::WorkerHandle;
    use serde_json::{json, Value};

    struct TestServer {
        base_url: String,
        client: reqwest::Client,
        phrases: Arc<InMemoryPhraseRepository>,
        jobs: Arc<InMemoryJobRepository>,
        backend: MockGenerationBackend,
        _worker: Option<WorkerHandle>,
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn spawn_test_server(
        backend: MockGenerationBackend,
        api_key: Option<&str>,
        with_worker: bool,
    ) -> TestServer {
        let phrases = Arc::new(InMemoryPhraseRepository::new());
        let settings = Arc::new(match api_key {
            Some(key) => InMemorySettingsRepository::with_api_key(key),
            None => InMemorySettingsRepository::new(),
        });
        let jobs = Arc::new(InMemoryJobRepository::new());

        let phrase_service = PhraseService::new(
            phrases.clone(),
            settings.clone(),
            jobs.clone(),
            Arc::new(backend.clone()),
        );

        let worker = if with_worker {
            let worker = WorkerBuilder::new(jobs.clone())
                .with_config(WorkerConfig::default().with_poll_interval(50))
                .with_notify(jobs.job_notify())
                .with_handler(CategorizationHandler::new(phrase_service.clone()))
                .build()
                .await;
            Some(worker.start())
        } else {
            None
        };

        let state = AppState {
            phrases: phrase_service,
            settings: SettingsService::new(settings),
            stats: StatsService::new(phrases.clone()),
            jobs: jobs.clone(),
        };
        let router = build_router(state, vec![HeaderValue::from_static("http://localhost:5173")]);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        TestServer {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            phrases,
            jobs,
            backend,
            _worker: worker,
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let resp = server.client.get(server.url("/health")).send().await.unwrap();

        assert_eq!(resp.status(), 200);
        assert!(resp.headers().contains_key("x-request-id"));
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_submit_returns_processing_phrase_and_queues_job() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;

        let resp = server
            .client
            .post(server.url("/api/v1/phrases"))
            .json(&json!({ "text": "  Measure twice, cut once  ", "source": "" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

        let phrase: Value = server
            .client
            .get(server.url(&format!("/api/v1/phrases/{}", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(phrase["text"], "Measure twice, cut once");
        assert_eq!(phrase["category"], "Processing…");
        assert_eq!(phrase["is_processing"], true);
        assert!(phrase["source"].is_null());

        let jobs = server.jobs.all().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].phrase_id, Some(id));
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_submit_blank_text_is_bad_request() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let resp = server
            .client
            .post(server.url("/api/v1/phrases"))
            .json(&json!({ "text": "   " }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("empty"));
        assert!(server.phrases.is_empty().await);
    }

    #[tokio::test]
    async fn test_submitted_phrase_is_settled_by_worker() {
        let backend = MockGenerationBackend::new().with_fixed_response("Technical");
        let server = spawn_test_server(backend, Some("sk-or-test"), true).await;

        let body: Value = server
            .client
            .post(server.url("/api/v1/phrases"))
            .json(&json!({ "text": "Premature optimization is the root of all evil" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = body["id"].as_str().unwrap().to_string();

        let phrase = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let phrase: Value = server
                    .client
                    .get(server.url(&format!("/api/v1/phrases/{}", id)))
                    .send()
                    .await
                    .unwrap()
                    .json()
                    .await
                    .unwrap();
                if phrase["is_processing"] == false {
                    return phrase;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("phrase was never settled");

        assert_eq!(phrase["category"], "Technical");
        assert_eq!(server.backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_get_update_delete_unknown_phrase_is_not_found() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let url = server.url(&format!("/api/v1/phrases/{}", Uuid::now_v7()));

        let resp = server.client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 404);

        let resp = server
            .client
            .put(&url)
            .json(&json!({ "text": "edited" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = server.client.delete(&url).send().await.unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_update_with_category_settles_phrase() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let body: Value = server
            .client
            .post(server.url("/api/v1/phrases"))
            .json(&json!({ "text": "Ship it" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let url = server.url(&format!("/api/v1/phrases/{}", body["id"].as_str().unwrap()));

        let phrase: Value = server
            .client
            .put(&url)
            .json(&json!({ "text": "Ship it today", "category": "Life Wisdom", "source": "Team" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(phrase["text"], "Ship it today");
        assert_eq!(phrase["category"], "Life Wisdom");
        assert_eq!(phrase["is_processing"], false);
        assert_eq!(phrase["source"], "Team");
    }

    #[tokio::test]
    async fn test_update_with_unknown_category_is_rejected() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let id = server
            .phrases
            .insert_settled_at("Stay humble", Category::Philosophical, Utc::now())
            .await;

        let resp = server
            .client
            .put(server.url(&format!("/api/v1/phrases/{}", id)))
            .json(&json!({ "text": "Stay humble", "category": "life wisdom" }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());

        let stored = PhraseRepository::get(server.phrases.as_ref(), id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state.category(), Some(Category::Philosophical));
    }

    #[tokio::test]
    async fn test_submit_without_text_is_json_bad_request() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let resp = server
            .client
            .post(server.url("/api/v1/phrases"))
            .json(&json!({ "source": "Nobody" }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("text"));
        assert!(server.phrases.is_empty().await);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let text = "a".repeat(defaults::REQUEST_BODY_LIMIT + 1);
        let resp = server
            .client
            .post(server.url("/api/v1/phrases"))
            .header("origin", "http://localhost:5173")
            .json(&json!({ "text": text }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 413);
        assert!(server.phrases.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_filters_by_category_and_search() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let now = Utc::now();
        server
            .phrases
            .insert_settled_at("Wisdom begins in wonder", Category::Philosophical, now)
            .await;
        server
            .phrases
            .insert_settled_at("Code is read more than written", Category::Technical, now)
            .await;
        server
            .phrases
            .insert_settled_at("Wisdom of the crowd", Category::Technical, now)
            .await;

        let all: Vec<Value> = server
            .client
            .get(server.url("/api/v1/phrases"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let technical: Vec<Value> = server
            .client
            .get(server.url("/api/v1/phrases?category=Technical"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(technical.len(), 2);

        let search: Vec<Value> = server
            .client
            .get(server.url("/api/v1/phrases?search=wisdom&category=Technical"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(search.len(), 1);
        assert_eq!(search[0]["text"], "Wisdom of the crowd");
    }

    #[tokio::test]
    async fn test_generate_without_key_is_bad_request() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let resp = server
            .client
            .post(server.url("/api/v1/phrases/generate"))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        assert_eq!(server.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_returns_suggestion() {
        let backend = MockGenerationBackend::new()
            .with_scripted_response(r#"{"text": "Begin anywhere.", "source": "John Cage"}"#);
        let server = spawn_test_server(backend, Some("sk-or-test"), false).await;

        let resp = server
            .client
            .post(server.url("/api/v1/phrases/generate"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "text": "Begin anywhere.", "source": "John Cage" }));
        assert!(server.phrases.is_empty().await);
    }

    #[tokio::test]
    async fn test_generate_provider_failure_is_bad_gateway() {
        let backend = MockGenerationBackend::new().with_scripted_failure("upstream 503");
        let server = spawn_test_server(backend, Some("sk-or-test"), false).await;

        let resp = server
            .client
            .post(server.url("/api/v1/phrases/generate"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 502);
    }

    #[tokio::test]
    async fn test_settings_round_trip_redacts_key() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;

        let before: Value = server
            .client
            .get(server.url("/api/v1/settings"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(before["has_api_key"], false);
        assert_eq!(before["effective_model"], defaults::DEFAULT_MODEL);

        let saved = server
            .client
            .put(server.url("/api/v1/settings"))
            .json(&json!({ "api_key": "sk-or-secret" }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(!saved.contains("sk-or-secret"));

        let after: Value = server
            .client
            .put(server.url("/api/v1/settings"))
            .json(&json!({ "preferred_model": "z-ai/glm-4.5-air:free" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(after["has_api_key"], true);
        assert_eq!(after["preferred_model"], "z-ai/glm-4.5-air:free");
    }

    #[tokio::test]
    async fn test_stats_endpoints() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let now = Utc::now();
        server
            .phrases
            .insert_settled_at("a", Category::Humorous, now)
            .await;
        server
            .phrases
            .insert_settled_at("b", Category::Humorous, now)
            .await;
        server
            .phrases
            .insert_settled_at("c", Category::Creative, now - chrono::Duration::days(30))
            .await;

        let histogram: Value = server
            .client
            .get(server.url("/api/v1/stats/categories"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(histogram, json!({ "Humorous": 2, "Creative": 1 }));

        let weekly: Value = server
            .client
            .get(server.url("/api/v1/stats/weekly-count"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(weekly["count"], 2);

        let series: Vec<Value> = server
            .client
            .get(server.url("/api/v1/stats/weekly"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(series.len(), 7);

        let activity: Value = server
            .client
            .get(server.url("/api/v1/stats/activity"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(activity["weeks"].as_array().unwrap().len(), 53);
        assert_eq!(activity["total"], 3);
    }

    #[tokio::test]
    async fn test_random_phrase_null_when_empty() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;
        let body: Value = server
            .client
            .get(server.url("/api/v1/phrases/random"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_models_and_job_stats() {
        let server = spawn_test_server(MockGenerationBackend::new(), None, false).await;

        let models: Vec<Value> = server
            .client
            .get(server.url("/api/v1/models"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(models.len(), 3);
        assert_eq!(models[0]["id"], defaults::DEFAULT_MODEL);

        server
            .client
            .post(server.url("/api/v1/phrases"))
            .json(&json!({ "text": "Queue me" }))
            .send()
            .await
            .unwrap();

        let stats: Value = server
            .client
            .get(server.url("/api/v1/jobs/stats"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["pending"], 1);
        assert_eq!(stats["total"], 1);
    }
}
