use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive};
use axum::response::Sse;
use axum::routing::{get, post};
use axum::{Json, Router};
use resume_ingest::config::ServerConfig;
use resume_ingest::db::{HistoryDetail, HistorySummary};
use resume_ingest::registry::ProgressView;
use resume_ingest::service::HealthReport;
use resume_ingest::{IngestService, SubmissionReceipt, UploadedFile};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

/// Optional caller identity, recorded on tasks and history rows.
const USER_ID_HEADER: &str = "x-user-id";
const MAX_HISTORY_PAGE: u64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestService>,
}

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let resume = Router::new()
        .route("/upload", post(upload_resume))
        .route("/upload-multiple", post(upload_multiple))
        .route("/progress/{task_id}", get(get_progress))
        .route("/progress/{task_id}/events", get(progress_events))
        .route("/history", get(list_history))
        .route("/history/{id}", get(get_history).delete(delete_history));

    Router::new()
        .nest("/resume", resume)
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default = "default_use_vision")]
    use_vision: bool,
}

fn default_use_vision() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    limit: u64,
    #[serde(default)]
    skip: u64,
}

fn default_limit() -> u64 {
    10
}

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Collects every file part of the form. Non-file fields are ignored.
async fn read_files(mut multipart: Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
        files.push(UploadedFile::new(filename, content_type, bytes.to_vec()));
    }
    Ok(files)
}

async fn upload_resume(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let mut files = read_files(multipart).await?;
    let upload = match files.len() {
        0 => return Err(ApiError::BadRequest("Missing file in multipart form".to_string())),
        1 => files.remove(0),
        _ => {
            return Err(ApiError::BadRequest(
                "Only one file may be sent to /resume/upload; use /resume/upload-multiple".to_string(),
            ))
        }
    };

    let user = user_id(&headers);
    let service = Arc::clone(&state.service);
    let receipt = tokio::task::spawn_blocking(move || {
        service.submit_single(upload, params.use_vision, user)
    })
    .await??;
    Ok(Json(receipt))
}

async fn upload_multiple(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let files = read_files(multipart).await?;
    let user = user_id(&headers);
    let service = Arc::clone(&state.service);
    let receipt = tokio::task::spawn_blocking(move || {
        service.submit_batch(files, params.use_vision, user)
    })
    .await??;
    Ok(Json(receipt))
}

async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ProgressView>, ApiError> {
    Ok(Json(state.service.progress(&task_id)?))
}

/// Streams the task's progress view on every change and closes once the
/// task reaches a terminal state.
async fn progress_events(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before the first read so no transition falls in between.
    let mut events = state.service.subscribe();
    let initial = state.service.progress(&task_id)?;

    let (tx, rx) = mpsc::channel::<ProgressView>(16);
    let service = Arc::clone(&state.service);
    tokio::spawn(async move {
        let mut terminal = initial.status.is_terminal();
        if tx.send(initial).await.is_err() || terminal {
            return;
        }
        while !terminal {
            match events.recv().await {
                Ok(event) if event.task_id == task_id => {}
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
            let Ok(view) = service.progress(&task_id) else {
                return;
            };
            terminal = view.status.is_terminal();
            if tx.send(view).await.is_err() {
                return;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|view| {
        let event = match serde_json::to_string(&view) {
            Ok(json) => Event::default().event("progress").data(json),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Ok(event)
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

async fn list_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistorySummary>>, ApiError> {
    let limit = params.limit.min(MAX_HISTORY_PAGE);
    let service = Arc::clone(&state.service);
    let rows = tokio::task::spawn_blocking(move || service.history_list(params.skip, limit)).await??;
    Ok(Json(rows))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<HistoryDetail>, ApiError> {
    let service = Arc::clone(&state.service);
    let detail = tokio::task::spawn_blocking(move || service.history_detail(id)).await??;
    Ok(Json(detail))
}

async fn delete_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || service.history_delete(id)).await??;
    Ok(Json(serde_json::json!({ "message": "Resume deleted successfully" })))
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health())
}
