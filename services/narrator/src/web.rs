use crate::config::ApiConfig;
use crate::error::{ErrorResponse, NarratorError, Result};
use crate::metadata_store::{AudioRecord, ImageRecord, MetadataStore, SubmissionSummary};
use crate::pages;
use crate::workflow::{PhotoUpload, UploadWorkflow};
use anyhow::Context;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Multipart field carrying the photo
const FILE_FIELD: &str = "file";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<UploadWorkflow>,
    pub metadata_store: Arc<dyn MetadataStore>,
}

/// Latest record of each kind, ordered independently
#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub image: Option<ImageRecord>,
    pub audio: Option<AudioRecord>,
}

/// Query parameters for the submission list
#[derive(Debug, Deserialize)]
pub struct SubmissionListQuery {
    /// Maximum results
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset for pagination
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// Submission list response
#[derive(Debug, Serialize)]
pub struct SubmissionListResponse {
    pub submissions: Vec<SubmissionSummary>,
    pub has_more: bool,
}

/// Create the HTTP router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let body_limit = state.workflow.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(homepage))
        .route("/results", get(results))
        .route(
            "/upload_photo",
            get(upload_photo)
                .post(upload_photo)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/submissions", get(list_submissions))
        .route("/api/v1/submissions/latest", get(latest_records))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn homepage() -> Html<String> {
    Html(pages::homepage())
}

/// Latest image with the audio of its submission
#[instrument(skip(state))]
async fn results(State(state): State<AppState>) -> Result<Html<String>> {
    let (image, audio) = state
        .metadata_store
        .latest_pair()
        .await?
        .ok_or(NarratorError::NoRecords)?;

    Ok(Html(pages::results(&image, audio.as_ref())))
}

/// Accept a photo from the upload form and narrate it
#[instrument(skip(state, multipart))]
async fn upload_photo(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Redirect> {
    let multipart = multipart.map_err(|_| NarratorError::MissingFile)?;
    let upload = read_photo(multipart, state.workflow.max_upload_bytes()).await?;

    state.workflow.submit(upload).await?;

    Ok(Redirect::to("/results"))
}

/// Pull the photo out of the `file` field, skipping any other fields
async fn read_photo(mut multipart: Multipart, limit: usize) -> Result<PhotoUpload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;

        return Ok(PhotoUpload {
            data: data.to_vec(),
            content_type,
            file_name,
        });
    }

    Err(NarratorError::MissingFile)
}

fn multipart_error(e: axum::extract::multipart::MultipartError, limit: usize) -> NarratorError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        NarratorError::UploadTooLarge { limit }
    } else {
        NarratorError::InvalidUpload(e.body_text())
    }
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "narrator-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.metadata_store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => {
            e.log();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "database": "disconnected"
                })),
            )
        }
    }
}

/// Latest image and latest audio, each by its own timestamp
#[instrument(skip(state))]
async fn latest_records(
    State(state): State<AppState>,
) -> std::result::Result<Json<LatestResponse>, (StatusCode, Json<ErrorResponse>)> {
    let image = state.metadata_store.latest_image().await.map_err(|e| e.to_json())?;
    let audio = state.metadata_store.latest_audio().await.map_err(|e| e.to_json())?;

    if image.is_none() && audio.is_none() {
        return Err(NarratorError::NoRecords.to_json());
    }

    Ok(Json(LatestResponse { image, audio }))
}

/// Recent submissions, newest first
#[instrument(skip(state))]
async fn list_submissions(
    State(state): State<AppState>,
    Query(params): Query<SubmissionListQuery>,
) -> std::result::Result<Json<SubmissionListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let limit = params.limit.clamp(1, 100);
    let offset = params.offset.max(0);

    // Fetch one extra to check has_more
    let mut submissions = state
        .metadata_store
        .recent_submissions(limit + 1, offset)
        .await
        .map_err(|e| e.to_json())?;

    let has_more = submissions.len() > limit as usize;
    if has_more {
        submissions.pop();
    }

    Ok(Json(SubmissionListResponse {
        submissions,
        has_more,
    }))
}

/// Start the HTTP server and serve until `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting narrator HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    Ok(())
}
