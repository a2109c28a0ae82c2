//! HTTP server hosting the offline cache worker
//!
//! `/__offline/health` reports the registration; every other request is
//! dispatched to the worker as a fetch event.

use crate::types::{ErrorResponse, HealthResponse};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use offline_cache_worker::network::is_hop_by_hop;
use offline_cache_worker::{
    CacheStorage, FetchOutcome, FetchRequest, FetchResponse, Network, Registration, RequestMode,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const HEALTH_PATH: &str = "/__offline/health";

/// Response header naming where the response came from
pub const OUTCOME_HEADER: &str = "x-offline-cache";

const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

pub type ProxyRegistration = Registration<dyn CacheStorage, dyn Network>;

/// Shared state for the HTTP server
pub struct ServerState {
    pub registration: ProxyRegistration,
    /// Cache generation this proxy is configured for
    pub cache_name: String,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(registration: ProxyRegistration, cache_name: impl Into<String>) -> Self {
        Self {
            registration,
            cache_name: cache_name.into(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(handle_fetch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let registration = state.registration.status().await;
    let cache = state.registration.storage().stats().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: uptime_secs(state.started_at, Utc::now()),
        cache_name: state.cache_name.clone(),
        active_version: registration.active.map(|w| w.cache_name),
        waiting_version: registration.waiting.map(|w| w.cache_name),
        cache,
    })
}

/// Whole seconds since start; zero if the clock has stepped backwards
fn uptime_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - started_at).num_seconds().max(0) as u64
}

/// Dispatch a request to the worker and translate the outcome
async fn handle_fetch(State(state): State<SharedState>, request: Request) -> Response {
    let request = match into_fetch_request(request).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.registration.fetch(&request).await {
        FetchOutcome::Passthrough => passthrough(&state, &request).await,
        FetchOutcome::Network(response) => build_response(response, "NETWORK"),
        FetchOutcome::Cache(response) => build_response(response, "HIT"),
        FetchOutcome::OfflinePage(response) => build_response(response, "OFFLINE"),
        FetchOutcome::NoResponse => {
            warn!(url = %request.url, "Offline with nothing cached");
            (StatusCode::GATEWAY_TIMEOUT, [(OUTCOME_HEADER, "MISS")]).into_response()
        }
    }
}

/// Default network handling for requests the worker does not intercept
async fn passthrough(state: &ServerState, request: &FetchRequest) -> Response {
    match state.registration.network().fetch(request).await {
        Ok(response) => build_response(response, "BYPASS"),
        Err(e) => {
            warn!(method = %request.method, url = %request.url, error = %e, "Origin unreachable");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "Origin unreachable".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn into_fetch_request(request: Request) -> Result<FetchRequest, Response> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_REQUEST_BODY).await.map_err(|e| {
        warn!(error = %e, "Failed to read request body");
        StatusCode::PAYLOAD_TOO_LARGE.into_response()
    })?;

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Ok(FetchRequest {
        mode: request_mode(&parts.method, &parts.headers),
        method: parts.method,
        url,
        headers,
        body: body.to_vec(),
    })
}

/// `Sec-Fetch-Mode` when the client sends it; otherwise a GET accepting
/// HTML is taken to be a navigation.
fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    if let Some(mode) = headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_header)
    {
        return mode;
    }

    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false);

    if method == Method::GET && accepts_html {
        RequestMode::Navigate
    } else {
        RequestMode::NoCors
    }
}

fn build_response(response: FetchResponse, source: &'static str) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);

    for (name, value) in &response.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .header(OUTCOME_HEADER, source)
        .body(Body::from(response.body))
        .unwrap_or_else(|e| {
            error!(url = %response.url, error = %e, "Failed to build response");
            StatusCode::BAD_GATEWAY.into_response()
        })
}
