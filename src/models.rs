use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Sleeping,
    Completed,
    Disabled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Active => "active",
            JobStatus::Sleeping => "sleeping",
            JobStatus::Completed => "completed",
            JobStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Http,
    Rtsp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Processing,
    Completed,
    Failed,
}

/// Row of the `jobs` table. Runtime fields (`status`, `next_scheduled_capture_at`,
/// `warning_message`, the counters) are owned by the scheduler; everything else
/// is configuration set at creation time or via `PATCH`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub stream_type: StreamType,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub interval_seconds: i64,
    pub framerate: i32,
    pub status: JobStatus,
    pub capture_path: String,
    pub naming_pattern: String,
    pub capture_count: i64,
    pub storage_size: i64,
    pub warning_message: Option<String>,
    pub time_window_enabled: bool,
    pub time_window_start: Option<String>,
    pub time_window_end: Option<String>,
    pub next_scheduled_capture_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Capture {
    pub id: i64,
    pub job_id: i64,
    pub file_path: String,
    pub file_size: i64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProcessedVideo {
    pub id: i64,
    pub job_id: i64,
    pub name: String,
    pub file_path: String,
    pub file_size: i64,
    pub resolution: String,
    pub framerate: i32,
    pub quality: String,
    pub start_capture_id: Option<i64>,
    pub end_capture_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_frames: i64,
    pub duration_seconds: f64,
    pub status: VideoStatus,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct JobCreate {
    pub name: String,
    pub url: String,
    pub stream_type: StreamType,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub interval_seconds: i64,
    pub framerate: i32,
    pub capture_path: Option<String>,
    pub naming_pattern: Option<String>,
    #[serde(default)]
    pub time_window_enabled: bool,
    pub time_window_start: Option<String>,
    pub time_window_end: Option<String>,
}

/// All fields optional; only the columns present are touched (see `store::update_job`).
#[derive(Debug, Default, Deserialize)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub stream_type: Option<StreamType>,
    pub start_datetime: Option<DateTime<Utc>>,
    pub end_datetime: Option<Option<DateTime<Utc>>>,
    pub interval_seconds: Option<i64>,
    pub framerate: Option<i32>,
    pub status: Option<JobStatus>,
    pub naming_pattern: Option<String>,
    pub time_window_enabled: Option<bool>,
    pub time_window_start: Option<String>,
    pub time_window_end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoCreate {
    pub job_id: i64,
    pub name: String,
    pub resolution: String,
    pub framerate: i32,
    pub quality: String,
    pub start_capture_id: Option<i64>,
    pub end_capture_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestUrlResponse {
    pub success: bool,
    pub message: String,
    pub image_data: Option<String>,
    pub image_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DurationEstimate {
    pub captures: i64,
    pub fps: i32,
    pub duration_seconds: f64,
    pub duration_formatted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingCapture {
    pub id: i64,
    pub file_path: String,
    pub file_size: i64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedFile {
    pub file_path: String,
    pub file_size: i64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ScanResult {
    pub job_id: i64,
    pub job_name: String,
    pub total_captures: i64,
    pub missing_files: Vec<MissingCapture>,
    pub missing_count: i64,
    pub orphaned_files: Vec<OrphanedFile>,
    pub orphaned_count: i64,
    pub existing_count: i64,
    pub total_size_recovered: i64,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub deleted_count: i64,
    pub size_recovered: i64,
    pub new_capture_count: i64,
    pub new_storage_size: i64,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub imported_count: i64,
    pub total_size_imported: i64,
    pub new_capture_count: i64,
    pub new_storage_size: i64,
}
