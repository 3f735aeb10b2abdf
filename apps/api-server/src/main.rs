//! api-server — HTTP API for the link shortener workspace.
//!
//! Wires the domain service to a synced repository (memory or SQLite slot
//! store) and forwards structured log events to an optional remote collector
//! with bounded retries.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # with a remote log collector and file-backed storage
//! LOG_ENDPOINT=https://collector.example/logs \
//! STORAGE_PROVIDER=sqlite \
//!   cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;
mod repo;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::http::HeaderValue;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use domain::codegen::RandomCodeGenerator;
use domain::service::ShortenerService;
use domain::{ClickData, Clock, CoreError, NewShortUrl, ShortCode, ShortUrl};
use log_dispatch::{Category, DispatchConfig, Dispatcher, HttpTransport, Level, LogEvent, Origin};
use repo::SyncedRepo;
use serde::{Deserialize, Serialize};
use state_sync::{ChangeHub, MemorySlotStore, SlotStore};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Svc = ShortenerService<SyncedRepo, RandomCodeGenerator, StdClock>;

#[derive(Clone)]
struct AppState {
    svc: Arc<Svc>,
    dispatcher: Arc<Dispatcher<HttpTransport>>,
}

#[derive(Clone)]
struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_degraded();

    let store = build_store(&cfg);
    let repo = match SyncedRepo::new(store, ChangeHub::new()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("failed to bind url collection slot: {e}");
            std::process::exit(1);
        }
    };

    let base_url = cfg
        .shortlink_domain
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", cfg.port));
    let svc = Arc::new(ShortenerService::new(
        repo,
        RandomCodeGenerator::default(),
        StdClock,
        base_url,
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        cfg.log_endpoint.clone().map(HttpTransport::new),
        DispatchConfig {
            max_attempts: cfg.log_max_attempts,
            base_delay: cfg.log_base_delay,
            mirror: cfg.log_mirror,
        },
    ));

    let state = AppState { svc, dispatcher };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = Router::new()
        .route("/:code", get(resolve_code))
        .route("/api/links", post(create_link).get(list_links))
        .route("/api/links/batch", post(create_links_batch))
        .route("/api/links/:code", delete(delete_link))
        .route("/api/links/:code/stats", get(link_stats))
        .route("/api/stats", get(overall_stats))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
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
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind port");
    axum::serve(listener, app).await.expect("server error");
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a slot store based on config and feature flags.
fn build_store(cfg: &config::Config) -> Arc<dyn SlotStore> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => match sqlite_store::SqliteSlotStore::from_env() {
            Ok(s) => Arc::new(s),
            Err(e) => {
                eprintln!("failed to init SqliteSlotStore from env: {e}");
                Arc::new(MemorySlotStore::new())
            }
        },
        _ => Arc::new(MemorySlotStore::new()),
    }
}

#[derive(Deserialize)]
struct CreateLinkReq {
    original_url: String,
    #[serde(default)]
    custom_code: Option<String>,
    #[serde(default)]
    validity_minutes: Option<u64>,
}

impl From<CreateLinkReq> for NewShortUrl {
    fn from(req: CreateLinkReq) -> Self {
        NewShortUrl {
            original_url: req.original_url,
            custom_code: req.custom_code,
            validity_minutes: req.validity_minutes,
        }
    }
}

#[derive(Deserialize)]
struct BatchCreateReq {
    links: Vec<CreateLinkReq>,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LinkOut {
    id: String,
    code: String,
    short_url: String,
    original_url: String,
    validity_minutes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_code: Option<String>,
    created_at: String,
    expires_at: String,
    click_count: u64,
}

#[derive(Serialize)]
struct ListOut {
    links: Vec<LinkOut>,
    total: usize,
}

#[derive(Serialize)]
struct BatchItemOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<LinkOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct BatchOut {
    results: Vec<BatchItemOut>,
}

#[derive(Serialize)]
struct SourceCount {
    source: String,
    clicks: u64,
}

#[derive(Serialize)]
struct LinkStatsOut {
    code: String,
    total_clicks: u64,
    clicks_by_source: Vec<SourceCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_click_at: Option<String>,
}

#[derive(Serialize)]
struct OverallStatsOut {
    total_links: usize,
    active_links: usize,
    expired_links: usize,
    total_clicks: u64,
}

fn link_to_out(link: ShortUrl) -> LinkOut {
    LinkOut {
        id: link.id,
        code: link.short_code.as_str().to_string(),
        short_url: link.short_url,
        original_url: link.original_url,
        validity_minutes: link.validity_minutes,
        custom_code: link.custom_code,
        created_at: system_time_to_rfc3339(link.created_at),
        expires_at: system_time_to_rfc3339(link.expires_at),
        click_count: link.click_count,
    }
}

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Map a domain error to a status code and structured body. Validation
/// errors carry the full reason list.
fn error_response(e: &CoreError) -> (StatusCode, Json<serde_json::Value>) {
    let (status, code, reasons) = match e {
        CoreError::InvalidUrl(issues) => (
            StatusCode::BAD_REQUEST,
            "invalid_url",
            Some(issues.iter().map(|i| i.to_string()).collect::<Vec<_>>()),
        ),
        CoreError::InvalidCode(issues) => (
            StatusCode::BAD_REQUEST,
            "invalid_code",
            Some(issues.iter().map(|i| i.to_string()).collect::<Vec<_>>()),
        ),
        CoreError::AlreadyExists => (StatusCode::CONFLICT, "conflict", None),
        CoreError::NotFound => (StatusCode::NOT_FOUND, "not_found", None),
        CoreError::Expired => (StatusCode::GONE, "gone", None),
        CoreError::GenerationExhausted { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "generation_exhausted", None)
        }
        CoreError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", None),
    };
    let mut body = serde_json::json!({
        "error": { "code": code, "message": e.to_string() }
    });
    if let Some(reasons) = reasons {
        body["error"]["reasons"] = serde_json::json!(reasons);
    }
    (status, Json(body))
}

/// Emit a log event through the dispatcher without blocking the request.
fn dispatch_event(state: &AppState, level: Level, message: String, code: Option<String>) {
    let mut event = LogEvent::new(Origin::Backend, level, Category::Api, message)
        .with_timestamp(Utc::now());
    if let Some(code) = code {
        let mut ctx = serde_json::Map::new();
        ctx.insert("code".to_string(), serde_json::Value::String(code));
        event = event.with_context(ctx);
    }
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let _ = dispatcher.submit(event).await;
    });
}

/// Derive click attribution from request headers.
fn click_from_headers(headers: &HeaderMap, now: SystemTime) -> ClickData {
    let source = if headers.contains_key(header::REFERER) {
        "referral"
    } else {
        "direct"
    };
    let location = headers
        .get("x-geo-country")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());
    ClickData::new(now, source.to_string(), location, user_agent, ip)
}

async fn resolve_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let code = match ShortCode::new(code) {
        Ok(c) => c,
        Err(e) => {
            warn!("bad code in path");
            return error_response(&e).into_response();
        }
    };

    match state.svc.resolve(&code) {
        Ok(url) => {
            let click = click_from_headers(&headers, SystemTime::now());
            if let Err(e) = state.svc.record_click(&code, click) {
                warn!(code = %code.as_str(), err = ?e, "click recording failed");
            }
            dispatch_event(
                &state,
                Level::Debug,
                "short url visited".to_string(),
                Some(code.as_str().to_string()),
            );
            info!(code = %code.as_str(), redirect_to = %url, "resolve ok");
            Redirect::temporary(&url).into_response()
        }
        Err(e @ CoreError::Expired) => {
            warn!(code = %code.as_str(), "resolve gone");
            error_response(&e).into_response()
        }
        Err(e @ CoreError::NotFound) => {
            warn!(code = %code.as_str(), "resolve 404");
            error_response(&e).into_response()
        }
        Err(e) => {
            tracing::error!(code = %code.as_str(), err = ?e, "resolve error");
            error_response(&e).into_response()
        }
    }
}

async fn create_link(
    State(state): State<AppState>,
    Json(body): Json<CreateLinkReq>,
) -> impl IntoResponse {
    match state.svc.create(body.into()) {
        Ok(link) => {
            dispatch_event(
                &state,
                Level::Info,
                "short url created".to_string(),
                Some(link.short_code.as_str().to_string()),
            );
            (StatusCode::CREATED, Json(link_to_out(link))).into_response()
        }
        Err(e) => {
            dispatch_event(&state, Level::Warn, format!("create failed: {e}"), None);
            error_response(&e).into_response()
        }
    }
}

async fn create_links_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchCreateReq>,
) -> impl IntoResponse {
    let inputs: Vec<NewShortUrl> = body.links.into_iter().map(Into::into).collect();
    let count = inputs.len();
    // Per-item outcomes come back in request order regardless of failures
    let results: Vec<BatchItemOut> = state
        .svc
        .create_many(inputs)
        .into_iter()
        .map(|r| match r {
            Ok(link) => BatchItemOut {
                link: Some(link_to_out(link)),
                error: None,
            },
            Err(e) => {
                let (_, Json(body)) = error_response(&e);
                BatchItemOut {
                    link: None,
                    error: Some(body),
                }
            }
        })
        .collect();
    dispatch_event(
        &state,
        Level::Info,
        format!("batch create processed {count} items"),
        None,
    );
    Json(BatchOut { results })
}

async fn list_links(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    match state.svc.list_active(limit) {
        Ok(links) => {
            let links: Vec<LinkOut> = links.into_iter().map(link_to_out).collect();
            let total = links.len();
            Json(ListOut { links, total }).into_response()
        }
        Err(e) => {
            tracing::error!(err = ?e, "list error");
            error_response(&e).into_response()
        }
    }
}

async fn link_stats(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    let code = match ShortCode::new(code) {
        Ok(c) => c,
        Err(e) => return error_response(&e).into_response(),
    };
    match state.svc.stats(&code) {
        Ok(stats) => Json(LinkStatsOut {
            code: stats.code,
            total_clicks: stats.total_clicks,
            clicks_by_source: stats
                .clicks_by_source
                .into_iter()
                .map(|(source, clicks)| SourceCount { source, clicks })
                .collect(),
            last_click_at: stats.last_click_at.map(system_time_to_rfc3339),
        })
        .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

async fn overall_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.svc.overall_stats() {
        Ok(stats) => Json(OverallStatsOut {
            total_links: stats.total_links,
            active_links: stats.active_links,
            expired_links: stats.expired_links,
            total_clicks: stats.total_clicks,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(err = ?e, "stats error");
            error_response(&e).into_response()
        }
    }
}

async fn delete_link(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    let code = match ShortCode::new(code) {
        Ok(c) => c,
        Err(e) => return error_response(&e).into_response(),
    };
    match state.svc.delete(&code) {
        Ok(()) => {
            dispatch_event(
                &state,
                Level::Info,
                "short url deleted".to_string(),
                Some(code.as_str().to_string()),
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_attribution_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("test-agent"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        let click = click_from_headers(&headers, SystemTime::UNIX_EPOCH);
        assert_eq!(click.source, "direct");
        assert_eq!(click.location, "unknown");
        assert_eq!(click.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(click.ip.as_deref(), Some("10.0.0.1"));

        headers.insert(header::REFERER, HeaderValue::from_static("https://elsewhere.example"));
        let click = click_from_headers(&headers, SystemTime::UNIX_EPOCH);
        assert_eq!(click.source, "referral");
    }

    #[test]
    fn validation_errors_carry_all_reasons() {
        let err = CoreError::InvalidCode(domain::validate::validate_code("app"));
        let (status, Json(body)) = error_response(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let reasons = body["error"]["reasons"].as_array().expect("reasons array");
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn expired_links_answer_gone() {
        let (status, _) = error_response(&CoreError::Expired);
        assert_eq!(status, StatusCode::GONE);
    }
}
