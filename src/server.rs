//! `axum` HTTP surface (SPEC_FULL.md §6): thin, typed handlers that validate
//! input, delegate to `store`/`job_state`/`maintenance`/`duration`/`video`,
//! and map errors onto status codes explicitly — no blanket 500 converter.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::error::ApiError;
use crate::models::{Job, JobCreate, JobStatus, JobUpdate, OrphanedFile, StreamType, VideoCreate};
use crate::{duration, job_state, maintenance, probe, store, thumbnail, video};

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(e) => {
                warn!(error = %e, "internal error handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub scheduler_running: Arc<AtomicBool>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/test-url", post(test_url))
        .route("/api/jobs/{id}", get(get_job).patch(patch_job).delete(delete_job))
        .route("/api/jobs/{id}/duration-estimate", get(duration_estimate))
        .route("/api/jobs/{id}/maintenance/{action}", post(run_maintenance))
        .route("/api/captures", get(list_captures))
        .route("/api/captures/{id}", get(get_capture).delete(delete_capture))
        .route("/api/captures/{id}/image", get(capture_image))
        .route("/api/captures/{id}/thumbnail", get(capture_thumbnail))
        .route("/api/videos", get(list_videos).post(create_video))
        .route("/api/videos/{id}", get(get_video).delete(delete_video))
        .route("/api/videos/{id}/check", get(check_video))
        .route("/api/videos/{id}/download", get(download_video))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    scheduler: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let scheduler = state.scheduler_running.load(Ordering::SeqCst);
    Json(HealthResponse {
        status: if scheduler { "healthy" } else { "unhealthy" },
        scheduler,
    })
}

// ---------------------------------------------------------------- jobs ----

#[derive(Deserialize)]
struct JobListQuery {
    status: Option<JobStatus>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_jobs(State(state): State<AppState>, Query(q): Query<JobListQuery>) -> Result<Json<Vec<Job>>, ApiError> {
    let jobs = store::list_jobs(&state.pool, q.status, q.limit.unwrap_or(50), q.offset.unwrap_or(0)).await?;
    Ok(Json(jobs))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Job>, ApiError> {
    let job = store::get_job(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))?;
    Ok(Json(job))
}

fn validate_job_create(body: &JobCreate) -> Result<(), ApiError> {
    if body.interval_seconds < 10 {
        return Err(ApiError::Validation("interval_seconds must be >= 10".to_string()));
    }
    if !(body.framerate > 0 && body.framerate <= 120) {
        return Err(ApiError::Validation("framerate must be between 1 and 120".to_string()));
    }
    if let Some(end) = body.end_datetime {
        if end < body.start_datetime + Duration::seconds(body.interval_seconds) {
            return Err(ApiError::Validation(
                format!("end_datetime must be at least {} seconds after start_datetime", body.interval_seconds),
            ));
        }
        if end < Utc::now() {
            return Err(ApiError::Validation("end_datetime must be in the future".to_string()));
        }
    }
    if body.time_window_enabled {
        let start = body
            .time_window_start
            .as_deref()
            .ok_or_else(|| ApiError::Validation("time_window_start is required when the window is enabled".to_string()))?;
        let end = body
            .time_window_end
            .as_deref()
            .ok_or_else(|| ApiError::Validation("time_window_end is required when the window is enabled".to_string()))?;
        crate::time_util::parse_window_time(start)
            .map_err(|e| ApiError::Validation(format!("invalid time_window_start: {e}")))?;
        crate::time_util::parse_window_time(end)
            .map_err(|e| ApiError::Validation(format!("invalid time_window_end: {e}")))?;
    }
    Ok(())
}

async fn create_job(State(state): State<AppState>, Json(body): Json<JobCreate>) -> Result<impl IntoResponse, ApiError> {
    validate_job_create(&body)?;

    let naming_pattern = body
        .naming_pattern
        .clone()
        .unwrap_or_else(|| state.config.default_capture_pattern.clone());

    let new_job = store::NewJob {
        name: &body.name,
        url: &body.url,
        stream_type: body.stream_type,
        start_datetime: body.start_datetime,
        end_datetime: body.end_datetime,
        interval_seconds: body.interval_seconds,
        framerate: body.framerate,
        naming_pattern: &naming_pattern,
        time_window_enabled: body.time_window_enabled,
        time_window_start: body.time_window_start.as_deref(),
        time_window_end: body.time_window_end.as_deref(),
    };
    let job_id = store::insert_job(&state.pool, &new_job).await?;

    let base = body
        .capture_path
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| state.config.default_captures_path.clone());
    let capture_dir = base.join(format!("{job_id}_{}", body.name));

    if let Err(e) = tokio::fs::create_dir_all(&capture_dir).await {
        let _ = store::delete_job(&state.pool, job_id).await;
        return Err(ApiError::Validation(format!(
            "failed to create capture directory {}: {e}",
            capture_dir.display()
        )));
    }
    store::set_capture_path(&state.pool, job_id, &capture_dir.to_string_lossy()).await?;

    let job = store::get_job(&state.pool, job_id)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("job {job_id} vanished immediately after insert")))?;
    let state_calc = job_state::calculate(&job, Utc::now(), None, state.config.tz());
    store::write_schedule(&state.pool, job_id, state_calc.status, state_calc.next_capture).await?;

    let job = store::get_job(&state.pool, job_id)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("job {job_id} vanished after scheduling")))?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn patch_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<JobUpdate>,
) -> Result<Json<Job>, ApiError> {
    let existing = store::get_job(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))?;

    if body.start_datetime.is_some() && existing.capture_count > 0 {
        return Err(ApiError::Validation(
            "start_datetime cannot be changed once captures exist for this job".to_string(),
        ));
    }

    let mut patch = store::JobPatch::new();
    if let Some(v) = body.name {
        patch.push("name", store::PatchValue::Text(v));
    }
    if let Some(v) = body.url {
        patch.push("url", store::PatchValue::Text(v));
    }
    if let Some(v) = body.stream_type {
        patch.push("stream_type", store::PatchValue::StreamType(v));
    }
    if let Some(v) = body.start_datetime {
        patch.push("start_datetime", store::PatchValue::Timestamp(v));
    }
    if let Some(v) = body.end_datetime {
        patch.push("end_datetime", store::PatchValue::OptTimestamp(v));
    }
    if let Some(v) = body.interval_seconds {
        if v < 10 {
            return Err(ApiError::Validation("interval_seconds must be >= 10".to_string()));
        }
        patch.push("interval_seconds", store::PatchValue::Int(v));
    }
    if let Some(v) = body.framerate {
        if !(v > 0 && v <= 120) {
            return Err(ApiError::Validation("framerate must be between 1 and 120".to_string()));
        }
        patch.push("framerate", store::PatchValue::I32(v));
    }
    if let Some(v) = body.status {
        patch.push("status", store::PatchValue::Status(v));
    }
    if let Some(v) = body.naming_pattern {
        patch.push("naming_pattern", store::PatchValue::Text(v));
    }
    if let Some(v) = body.time_window_enabled {
        patch.push("time_window_enabled", store::PatchValue::Bool(v));
    }
    if let Some(v) = body.time_window_start {
        crate::time_util::parse_window_time(&v).map_err(|e| ApiError::Validation(format!("invalid time_window_start: {e}")))?;
        patch.push("time_window_start", store::PatchValue::OptText(Some(v)));
    }
    if let Some(v) = body.time_window_end {
        crate::time_util::parse_window_time(&v).map_err(|e| ApiError::Validation(format!("invalid time_window_end: {e}")))?;
        patch.push("time_window_end", store::PatchValue::OptText(Some(v)));
    }

    if !patch.is_empty() {
        store::apply_job_patch(&state.pool, id, patch).await?;
    }

    let refreshed = store::get_job(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))?;
    let state_calc = job_state::calculate(&refreshed, Utc::now(), refreshed.next_scheduled_capture_at, state.config.tz());
    store::write_schedule(&state.pool, id, state_calc.status, state_calc.next_capture).await?;

    let job = store::get_job(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))?;
    Ok(Json(job))
}

#[derive(Deserialize)]
struct DeleteJobQuery {
    delete_captures: Option<bool>,
}

async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<DeleteJobQuery>,
) -> Result<StatusCode, ApiError> {
    let job = store::get_job(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))?;

    if q.delete_captures.unwrap_or(false) {
        let path = PathBuf::from(&job.capture_path);
        if let Err(e) = tokio::fs::remove_dir_all(&path).await {
            warn!(job_id = id, path = %path.display(), error = %e, "failed to remove capture directory");
        }
    }

    // FK ON DELETE CASCADE removes the job's captures rows regardless of
    // `delete_captures` — that flag only controls whether files on disk go too.
    store::delete_job(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct TestUrlQuery {
    url: String,
    stream_type: Option<StreamType>,
}

async fn test_url(State(state): State<AppState>, Query(q): Query<TestUrlQuery>) -> impl IntoResponse {
    let timeout = std::time::Duration::from_secs(state.config.ffmpeg_timeout_secs);
    let response = probe::test_url(&q.url, q.stream_type, timeout).await;
    Json(response)
}

#[derive(Deserialize)]
struct DurationQuery {
    hours: Option<f64>,
    days: Option<f64>,
}

async fn duration_estimate(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<DurationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let job = store::get_job(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))?;
    Ok(Json(duration::estimate(&job, q.hours, q.days)))
}

#[derive(Deserialize)]
struct CleanupBody {
    #[serde(default)]
    capture_ids: Vec<i64>,
}

#[derive(Deserialize)]
struct ImportBody {
    #[serde(default)]
    orphaned_files: Vec<OrphanedFile>,
}

async fn run_maintenance(
    State(state): State<AppState>,
    Path((id, action)): Path<(i64, String)>,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    match action.as_str() {
        "scan" => {
            let result = maintenance::scan_job_files(&state.pool, id).await?;
            Ok(Json(result).into_response())
        }
        "cleanup" => {
            let body: CleanupBody = if body.is_empty() {
                CleanupBody { capture_ids: Vec::new() }
            } else {
                serde_json::from_slice(&body).map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))?
            };
            let result = maintenance::cleanup_missing_captures(&state.pool, id, &body.capture_ids).await?;
            Ok(Json(result).into_response())
        }
        "import" => {
            let body: ImportBody = if body.is_empty() {
                ImportBody { orphaned_files: Vec::new() }
            } else {
                serde_json::from_slice(&body).map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))?
            };
            let result = maintenance::import_orphaned_files(&state.pool, id, &body.orphaned_files).await?;
            Ok(Json(result).into_response())
        }
        other => Err(ApiError::Validation(format!(
            "unknown maintenance action '{other}', expected scan, cleanup, or import"
        ))),
    }
}

// ------------------------------------------------------------ captures ----

#[derive(Deserialize)]
struct CaptureListQuery {
    job_id: Option<i64>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    sort_order: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_captures(State(state): State<AppState>, Query(q): Query<CaptureListQuery>) -> Result<impl IntoResponse, ApiError> {
    let descending = q.sort_order.as_deref() != Some("asc");
    let captures = store::list_captures(
        &state.pool,
        q.job_id,
        q.start_time,
        q.end_time,
        q.limit.unwrap_or(100),
        q.offset.unwrap_or(0),
        descending,
    )
    .await?;
    Ok(Json(captures))
}

async fn get_capture(State(state): State<AppState>, Path(id): Path<i64>) -> Result<impl IntoResponse, ApiError> {
    let capture = store::get_capture(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("capture {id} not found")))?;
    Ok(Json(capture))
}

async fn delete_capture(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let capture = store::delete_capture(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("capture {id} not found")))?;
    if let Err(e) = thumbnail::delete(std::path::Path::new(&capture.file_path)) {
        warn!(capture_id = id, error = %e, "failed to remove thumbnail for deleted capture");
    }
    if let Err(e) = tokio::fs::remove_file(&capture.file_path).await {
        warn!(capture_id = id, error = %e, "failed to remove capture file from disk");
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn capture_image(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let capture = store::get_capture(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("capture {id} not found")))?;
    let bytes = tokio::fs::read(&capture.file_path)
        .await
        .map_err(|e| ApiError::NotFound(format!("capture file missing on disk: {e}")))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

async fn capture_thumbnail(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let capture = store::get_capture(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("capture {id} not found")))?;
    let thumb_path = thumbnail::thumbnail_path(std::path::Path::new(&capture.file_path));
    let bytes = match tokio::fs::read(&thumb_path).await {
        Ok(bytes) => bytes,
        Err(_) => {
            thumbnail::generate(std::path::Path::new(&capture.file_path))
                .await
                .map_err(|e| ApiError::NotFound(format!("thumbnail unavailable: {e}")))?;
            tokio::fs::read(&thumb_path)
                .await
                .map_err(|e| ApiError::Internal(anyhow::anyhow!("thumbnail generated but unreadable: {e}")))?
        }
    };
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

// -------------------------------------------------------------- videos ----

#[derive(Deserialize)]
struct VideoListQuery {
    job_id: Option<i64>,
    status: Option<crate::models::VideoStatus>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_videos(State(state): State<AppState>, Query(q): Query<VideoListQuery>) -> Result<impl IntoResponse, ApiError> {
    let videos = store::list_videos(&state.pool, q.job_id, q.status, q.limit.unwrap_or(50), q.offset.unwrap_or(0)).await?;
    Ok(Json(videos))
}

async fn get_video(State(state): State<AppState>, Path(id): Path<i64>) -> Result<impl IntoResponse, ApiError> {
    let video = store::get_video(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("video {id} not found")))?;
    Ok(Json(video))
}

async fn create_video(State(state): State<AppState>, Json(body): Json<VideoCreate>) -> Result<impl IntoResponse, ApiError> {
    if body.resolution.split_once('x').is_none_or(|(w, h)| w.parse::<u32>().is_err() || h.parse::<u32>().is_err()) {
        return Err(ApiError::Validation("resolution must match WIDTHxHEIGHT, e.g. 1920x1080".to_string()));
    }
    store::get_job(&state.pool, body.job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {} not found", body.job_id)))?;

    let file_name = format!("{}.mp4", body.name);
    let output_path = body
        .output_path
        .clone()
        .unwrap_or_else(|| state.config.default_videos_path.join(&file_name).to_string_lossy().to_string());

    let video_id = store::insert_video(&state.pool, &body, &output_path).await?;

    tokio::spawn(video::process_video(
        state.pool.clone(),
        video_id,
        body.job_id,
        body.resolution.clone(),
        body.framerate,
        body.quality.clone(),
        body.start_time,
        body.end_time,
        output_path,
    ));

    let video = store::get_video(&state.pool, video_id)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("video {video_id} vanished immediately after insert")))?;
    Ok((StatusCode::ACCEPTED, Json(video)))
}

async fn check_video(State(state): State<AppState>, Path(id): Path<i64>) -> Result<impl IntoResponse, ApiError> {
    let video = store::get_video(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("video {id} not found")))?;
    Ok(Json(video))
}

async fn download_video(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let video = store::get_video(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("video {id} not found")))?;
    if video.status != crate::models::VideoStatus::Completed {
        return Err(ApiError::Validation("video is not finished processing".to_string()));
    }
    let bytes = tokio::fs::read(&video.file_path)
        .await
        .map_err(|e| ApiError::NotFound(format!("video file missing on disk: {e}")))?;
    let disposition = format!("attachment; filename=\"{}.mp4\"", video.name);
    Ok((
        [(header::CONTENT_TYPE, "video/mp4".to_string()), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response())
}

async fn delete_video(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let video = store::delete_video(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("video {id} not found")))?;
    if let Err(e) = tokio::fs::remove_file(&video.file_path).await {
        warn!(video_id = id, error = %e, "failed to remove video file from disk");
    }
    Ok(StatusCode::NO_CONTENT)
}
