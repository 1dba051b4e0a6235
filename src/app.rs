use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::ServerConfig;
use crate::error::ReportError;
use crate::report::{GeneratedReport, ReportService};
use crate::template::DOCX_CONTENT_TYPE;

pub struct AppState {
    pub reports: ReportService,
}

#[derive(Deserialize)]
struct ReportQuery {
    code: Option<String>,
}

/// Body sent by the dashboard's "generate" buttons.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(default)]
    code: String,
    #[serde(default)]
    report_type: Option<String>,
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let reports = config.source.report_service()?;
    let state = Arc::new(AppState { reports });

    let app = router(
        state,
        &config.allowed_origins,
        config.static_dir.as_deref(),
    );

    let listener = TcpListener::bind(config.addr()).await?;
    log::info!("Server is running on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<AppState>, allowed_origins: &[String], static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/ping", get(ping))
        .route("/report", get(report_by_query))
        .route("/api/report", get(report_by_query))
        .route("/api/generate-report", post(report_by_body))
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(cors(allowed_origins))
        .layer(middleware::from_fn(log_requests))
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    log::info!(
        "{} {} -> {} ({:.1} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64() * 1000.0
    );
    response
}

async fn ping() -> &'static str {
    "pong"
}

async fn report_by_query(
    Query(params): Query<ReportQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ReportError> {
    let code = params.code.unwrap_or_default();
    let report = state.reports.generate(&code).await?;
    Ok(download(report))
}

async fn report_by_body(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Response, ReportError> {
    if let Some(kind) = &payload.report_type {
        log::debug!("dashboard requested '{}' report", kind);
    }
    let report = state.reports.generate(payload.code.trim()).await?;
    Ok(download(report))
}

fn download(report: GeneratedReport) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", report.filename);
    // Filenames are sanitized, so only non-ASCII bytes can remain and
    // from_bytes accepts those.
    let disposition = match HeaderValue::from_bytes(disposition.as_bytes()) {
        Ok(value) => value,
        Err(_) => HeaderValue::from_static("attachment"),
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(DOCX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(report.bytes.len())),
        ],
        report.bytes,
    )
        .into_response()
}
