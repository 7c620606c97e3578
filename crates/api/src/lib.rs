mod rate_limit;

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Json, Path as AxumPath, Query, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use midc_agents::RateAgent;
use midc_core::{ChatInput, RateType};
use midc_dataset::RateTable;
use midc_observability::AppMetrics;
use midc_storage::Store;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::rate_limit::IpRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<RateAgent<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: midc_observability::MetricsSnapshot,
    dataset: DatasetSummary,
}

#[derive(Debug, Serialize)]
struct DatasetSummary {
    records_loaded: usize,
    locations_indexed: usize,
    districts: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatRequest {
    session_id: Option<String>,
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ResetRequest {
    session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ResolveRequest {
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RateRequest {
    district: String,
    taluka: String,
    location: String,
    rate_type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LocationsQuery {
    district: String,
    taluka: String,
}

pub async fn build_app(data_path: impl AsRef<Path>) -> Result<Router> {
    let metrics = AppMetrics::shared();

    let table = Arc::new(
        RateTable::load(data_path.as_ref()).with_context(|| {
            format!("failed loading rate dataset from {}", data_path.as_ref().display())
        })?,
    );

    let store = if let Ok(database_url) = env::var("MIDC_DATABASE_URL") {
        Store::sqlite(&database_url).await?
    } else {
        Store::memory()
    };

    let agent = Arc::new(RateAgent::new(table, Arc::new(store), metrics.clone()));

    let api_key = env::var("MIDC_API_KEY").unwrap_or_else(|_| "dev-midc-key".to_string());
    let rate_limit_window = Duration::from_secs(
        env::var("MIDC_API_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(60),
    );
    let rate_limit_max = env::var("MIDC_API_RATE_LIMIT_MAX")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(80);

    let state = ApiState {
        agent,
        metrics,
        api_key,
        limiter: IpRateLimiter::new(rate_limit_window, rate_limit_max),
        allowed_origins: Arc::new(parse_allowed_origins()),
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/v1/reset", post(reset))
        .route("/v1/resolve", post(resolve))
        .route("/v1/rate", post(rate))
        .route("/v1/districts", get(districts))
        .route("/v1/districts/:district/talukas", get(talukas))
        .route("/v1/locations", get(locations))
        .route("/v1/rate_types", get(rate_types))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(16 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.agent.dataset_stats();
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        dataset: DatasetSummary {
            records_loaded: stats.records_loaded,
            locations_indexed: stats.locations_indexed,
            districts: stats.districts,
        },
    };
    (StatusCode::OK, Json(payload))
}

async fn chat(State(state): State<ApiState>, Json(input): Json<ChatRequest>) -> Response {
    match state
        .agent
        .handle_chat(ChatInput {
            session_id: input.session_id,
            text: input.text,
        })
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(error) => internal_error(error),
    }
}

async fn reset(State(state): State<ApiState>, Json(input): Json<ResetRequest>) -> Response {
    match state.agent.reset(&input.session_id).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(error) => internal_error(error),
    }
}

async fn resolve(State(state): State<ApiState>, Json(input): Json<ResolveRequest>) -> Response {
    let resolved = state.agent.resolve(&input.text);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "query": input.text,
            "resolved": resolved,
        })),
    )
        .into_response()
}

async fn rate(State(state): State<ApiState>, Json(input): Json<RateRequest>) -> Response {
    let rate_type = match RateType::parse(&input.rate_type) {
        Ok(value) => value,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_rate_type",
                    "message": error.to_string(),
                })),
            )
                .into_response();
        }
    };

    let rate = state
        .agent
        .rate(&input.district, &input.taluka, &input.location, rate_type);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "district": input.district,
            "taluka": input.taluka,
            "location": input.location,
            "rate_type": rate_type,
            "available": rate.is_some(),
            "rate": rate,
        })),
    )
        .into_response()
}

async fn districts(State(state): State<ApiState>) -> impl IntoResponse {
    Json(serde_json::json!({ "districts": state.agent.districts() }))
}

async fn talukas(
    State(state): State<ApiState>,
    AxumPath(district): AxumPath<String>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "district": district,
        "talukas": state.agent.talukas(&district),
    }))
}

async fn locations(
    State(state): State<ApiState>,
    Query(query): Query<LocationsQuery>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "district": query.district,
        "taluka": query.taluka,
        "locations": state.agent.locations(&query.district, &query.taluka),
    }))
}

async fn rate_types() -> impl IntoResponse {
    let types = RateType::ALL
        .iter()
        .map(|rate_type| {
            serde_json::json!({
                "code": rate_type.as_code(),
                "label": rate_type.label(),
            })
        })
        .collect::<Vec<_>>();
    Json(serde_json::json!({ "rate_types": types }))
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "missing or invalid x-api-key"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}

fn parse_allowed_origins() -> Vec<String> {
    let default_origins = ["http://localhost:3000", "http://127.0.0.1:3000"];

    env::var("MIDC_ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| {
            default_origins
                .iter()
                .map(|value| value.to_string())
                .collect()
        })
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:3000")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

fn internal_error(error: anyhow::Error) -> Response {
    tracing::error!(error = %error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "internal_error",
            "message": "request could not be processed"
        })),
    )
        .into_response()
}
