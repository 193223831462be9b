use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::models::{Capture, Job, JobStatus, ProcessedVideo};

const JOB_COLUMNS: &str = "id, name, url, stream_type, start_datetime, end_datetime, interval_seconds,
    framerate, status, capture_path, naming_pattern, capture_count, storage_size, warning_message,
    time_window_enabled, time_window_start, time_window_end, next_scheduled_capture_at, created_at, updated_at";

pub async fn get_job(pool: &SqlitePool, job_id: i64) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
        .bind(job_id)
        .fetch_optional(pool)
        .await
        .context("querying job by id")?;
    Ok(job)
}

pub async fn list_jobs(
    pool: &SqlitePool,
    status: Option<JobStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Job>> {
    let jobs = if let Some(status) = status {
        sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("listing jobs by status")?
    } else {
        sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("listing jobs")?
    };
    Ok(jobs)
}

/// Rows eligible for scheduling consideration: not yet terminal, already started.
/// Mirrors SPEC_FULL.md §4.3 — the scheduler applies C2 to every row this
/// returns and writes back whatever transition results.
pub async fn candidate_jobs_for_scheduling(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Job>> {
    let jobs = sqlx::query_as::<_, Job>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs
         WHERE status IN ('active', 'sleeping')
           AND start_datetime <= ?
           AND (end_datetime IS NULL OR end_datetime >= ? OR next_scheduled_capture_at <= end_datetime)
         ORDER BY id"
    ))
    .bind(now)
    .bind(now)
    .fetch_all(pool)
    .await
    .context("querying candidate jobs for scheduling")?;
    Ok(jobs)
}

pub struct NewJob<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub stream_type: crate::models::StreamType,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub interval_seconds: i64,
    pub framerate: i32,
    pub naming_pattern: &'a str,
    pub time_window_enabled: bool,
    pub time_window_start: Option<&'a str>,
    pub time_window_end: Option<&'a str>,
}

/// Insert a job row with an empty `capture_path` placeholder; the caller
/// fills in the real directory with [`set_capture_path`] once it knows the
/// assigned id (the directory name embeds it, per SPEC_FULL.md §6).
pub async fn insert_job(pool: &SqlitePool, job: &NewJob<'_>) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO jobs (
            name, url, stream_type, start_datetime, end_datetime,
            interval_seconds, framerate, status, capture_path, naming_pattern,
            time_window_enabled, time_window_start, time_window_end,
            created_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, 'sleeping', '', ?, ?, ?, ?, ?, ?)",
    )
    .bind(job.name)
    .bind(job.url)
    .bind(job.stream_type)
    .bind(job.start_datetime)
    .bind(job.end_datetime)
    .bind(job.interval_seconds)
    .bind(job.framerate)
    .bind(job.naming_pattern)
    .bind(job.time_window_enabled)
    .bind(job.time_window_start)
    .bind(job.time_window_end)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("inserting job")?;

    let job_id = result.last_insert_rowid();
    debug!(job_id, name = job.name, "inserted job");
    Ok(job_id)
}

pub async fn set_capture_path(pool: &SqlitePool, job_id: i64, capture_path: &str) -> Result<()> {
    sqlx::query("UPDATE jobs SET capture_path = ? WHERE id = ?")
        .bind(capture_path)
        .bind(job_id)
        .execute(pool)
        .await
        .context("setting job capture_path")?;
    Ok(())
}

pub async fn delete_job(pool: &SqlitePool, job_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(job_id)
        .execute(pool)
        .await
        .context("deleting job")?;
    Ok(())
}

/// Write a `(status, next_scheduled_capture_at)` transition computed by the
/// job state calculator. This is the only path that mutates those two
/// columns (SPEC_FULL.md §4.3).
pub async fn write_schedule(
    pool: &SqlitePool,
    job_id: i64,
    status: JobStatus,
    next_scheduled_capture_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = ?, next_scheduled_capture_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(next_scheduled_capture_at)
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await
    .context("writing job schedule")?;
    Ok(())
}

pub async fn clear_warning(pool: &SqlitePool, job_id: i64) -> Result<()> {
    sqlx::query("UPDATE jobs SET warning_message = NULL WHERE id = ?")
        .bind(job_id)
        .execute(pool)
        .await
        .context("clearing job warning")?;
    Ok(())
}

pub async fn set_warning(pool: &SqlitePool, job_id: i64, message: &str) -> Result<()> {
    sqlx::query("UPDATE jobs SET warning_message = ? WHERE id = ?")
        .bind(message)
        .bind(job_id)
        .execute(pool)
        .await
        .context("setting job warning")?;
    Ok(())
}

/// Record a successful capture: insert the row, bump counters, clear any warning.
pub async fn record_capture(
    pool: &SqlitePool,
    job_id: i64,
    file_path: &str,
    file_size: i64,
    captured_at: DateTime<Utc>,
) -> Result<i64> {
    let mut tx = pool.begin().await.context("beginning capture transaction")?;

    let result = sqlx::query(
        "INSERT INTO captures (job_id, file_path, file_size, captured_at) VALUES (?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(file_path)
    .bind(file_size)
    .bind(captured_at)
    .execute(&mut *tx)
    .await
    .context("inserting capture")?;

    sqlx::query(
        "UPDATE jobs SET capture_count = capture_count + 1, storage_size = storage_size + ?, warning_message = NULL
         WHERE id = ?",
    )
    .bind(file_size)
    .bind(job_id)
    .execute(&mut *tx)
    .await
    .context("updating job capture stats")?;

    tx.commit().await.context("committing capture transaction")?;

    Ok(result.last_insert_rowid())
}

/// Insert a capture row without touching job counters — used by maintenance
/// import, which recomputes stats once after all rows are inserted rather
/// than per-row like [`record_capture`].
pub async fn insert_capture_raw(
    pool: &SqlitePool,
    job_id: i64,
    file_path: &str,
    file_size: i64,
    captured_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO captures (job_id, file_path, file_size, captured_at) VALUES (?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(file_path)
    .bind(file_size)
    .bind(captured_at)
    .execute(pool)
    .await
    .context("inserting capture (maintenance import)")?;
    Ok(result.last_insert_rowid())
}

pub async fn list_captures(
    pool: &SqlitePool,
    job_id: Option<i64>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    limit: i64,
    offset: i64,
    descending: bool,
) -> Result<Vec<Capture>> {
    let order = if descending { "DESC" } else { "ASC" };
    let mut clauses = Vec::new();
    if job_id.is_some() {
        clauses.push("job_id = ?");
    }
    if start_time.is_some() {
        clauses.push("captured_at >= ?");
    }
    if end_time.is_some() {
        clauses.push("captured_at <= ?");
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let query = format!(
        "SELECT id, job_id, file_path, file_size, captured_at FROM captures {where_clause}
         ORDER BY captured_at {order} LIMIT ? OFFSET ?"
    );

    let mut q = sqlx::query_as::<_, Capture>(&query);
    if let Some(id) = job_id {
        q = q.bind(id);
    }
    if let Some(t) = start_time {
        q = q.bind(t);
    }
    if let Some(t) = end_time {
        q = q.bind(t);
    }
    q = q.bind(limit).bind(offset);

    let captures = q.fetch_all(pool).await.context("listing captures")?;
    Ok(captures)
}

pub async fn get_capture(pool: &SqlitePool, capture_id: i64) -> Result<Option<Capture>> {
    let capture = sqlx::query_as::<_, Capture>(
        "SELECT id, job_id, file_path, file_size, captured_at FROM captures WHERE id = ?",
    )
    .bind(capture_id)
    .fetch_optional(pool)
    .await
    .context("querying capture by id")?;
    Ok(capture)
}

pub async fn captures_for_job_between(
    pool: &SqlitePool,
    job_id: i64,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<Capture>> {
    list_captures(pool, Some(job_id), start, end, i64::MAX, 0, false).await
}

pub async fn delete_capture(pool: &SqlitePool, capture_id: i64) -> Result<Option<Capture>> {
    let capture = get_capture(pool, capture_id).await?;
    if capture.is_some() {
        sqlx::query("DELETE FROM captures WHERE id = ?")
            .bind(capture_id)
            .execute(pool)
            .await
            .context("deleting capture")?;
    }
    Ok(capture)
}

pub async fn latest_capture(pool: &SqlitePool, job_id: i64) -> Result<Option<Capture>> {
    let capture = sqlx::query_as::<_, Capture>(
        "SELECT id, job_id, file_path, file_size, captured_at FROM captures
         WHERE job_id = ? ORDER BY captured_at DESC LIMIT 1",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await
    .context("querying latest capture")?;
    Ok(capture)
}

pub async fn capture_count(pool: &SqlitePool, job_id: Option<i64>) -> Result<i64> {
    let count: (i64,) = if let Some(id) = job_id {
        sqlx::query_as("SELECT COUNT(*) FROM captures WHERE job_id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .context("counting captures for job")?
    } else {
        sqlx::query_as("SELECT COUNT(*) FROM captures")
            .fetch_one(pool)
            .await
            .context("counting captures")?
    };
    Ok(count.0)
}

const VIDEO_COLUMNS: &str = "id, job_id, name, file_path, file_size, resolution, framerate, quality,
    start_capture_id, end_capture_id, start_time, end_time, total_frames,
    duration_seconds, status, progress, created_at, completed_at";

pub async fn insert_video(pool: &SqlitePool, video: &crate::models::VideoCreate, file_path: &str) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO processed_videos (
            job_id, name, file_path, file_size, resolution, framerate, quality,
            start_capture_id, end_capture_id, start_time, end_time,
            total_frames, duration_seconds, status, progress, created_at
         ) VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, 0, 0, 'processing', 0, ?)",
    )
    .bind(video.job_id)
    .bind(&video.name)
    .bind(file_path)
    .bind(&video.resolution)
    .bind(video.framerate)
    .bind(&video.quality)
    .bind(video.start_capture_id)
    .bind(video.end_capture_id)
    .bind(video.start_time)
    .bind(video.end_time)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("inserting processed video")?;
    Ok(result.last_insert_rowid())
}

pub async fn get_video(pool: &SqlitePool, video_id: i64) -> Result<Option<ProcessedVideo>> {
    let video = sqlx::query_as::<_, ProcessedVideo>(&format!("SELECT {VIDEO_COLUMNS} FROM processed_videos WHERE id = ?"))
        .bind(video_id)
        .fetch_optional(pool)
        .await
        .context("querying video by id")?;
    Ok(video)
}

pub async fn list_videos(
    pool: &SqlitePool,
    job_id: Option<i64>,
    status: Option<crate::models::VideoStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProcessedVideo>> {
    let mut clauses = Vec::new();
    if job_id.is_some() {
        clauses.push("job_id = ?");
    }
    if status.is_some() {
        clauses.push("status = ?");
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let query = format!(
        "SELECT {VIDEO_COLUMNS} FROM processed_videos {where_clause}
         ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );

    let mut q = sqlx::query_as::<_, ProcessedVideo>(&query);
    if let Some(id) = job_id {
        q = q.bind(id);
    }
    if let Some(s) = status {
        q = q.bind(s);
    }
    q = q.bind(limit).bind(offset);

    let videos = q.fetch_all(pool).await.context("listing videos")?;
    Ok(videos)
}

/// Updates progress alongside the frame/duration counters ffmpeg reports as
/// it runs, mirroring `video_processor._update_progress`'s clamp to 100.
pub async fn update_video_progress(
    pool: &SqlitePool,
    video_id: i64,
    total_frames: i64,
    duration_seconds: f64,
    progress: f64,
) -> Result<()> {
    sqlx::query("UPDATE processed_videos SET total_frames = ?, duration_seconds = ?, progress = ? WHERE id = ?")
        .bind(total_frames)
        .bind(duration_seconds)
        .bind(progress.min(100.0))
        .bind(video_id)
        .execute(pool)
        .await
        .context("updating video progress")?;
    Ok(())
}

pub async fn complete_video(
    pool: &SqlitePool,
    video_id: i64,
    file_size: i64,
    total_frames: i64,
    duration_seconds: f64,
) -> Result<()> {
    sqlx::query(
        "UPDATE processed_videos SET status = 'completed', file_size = ?, total_frames = ?,
         duration_seconds = ?, progress = 100, completed_at = ? WHERE id = ?",
    )
    .bind(file_size)
    .bind(total_frames)
    .bind(duration_seconds)
    .bind(Utc::now())
    .bind(video_id)
    .execute(pool)
    .await
    .context("completing video")?;
    Ok(())
}

pub async fn fail_video(pool: &SqlitePool, video_id: i64) -> Result<()> {
    sqlx::query("UPDATE processed_videos SET status = 'failed' WHERE id = ?")
        .bind(video_id)
        .execute(pool)
        .await
        .context("marking video failed")?;
    Ok(())
}

pub async fn delete_video(pool: &SqlitePool, video_id: i64) -> Result<Option<ProcessedVideo>> {
    let video = get_video(pool, video_id).await?;
    if video.is_some() {
        sqlx::query("DELETE FROM processed_videos WHERE id = ?")
            .bind(video_id)
            .execute(pool)
            .await
            .context("deleting video")?;
    }
    Ok(video)
}

/// Dynamic partial update of a job row. Only fields present in `patch` are
/// touched; mirrors the original's `update_job` column-accumulation pattern.
pub struct JobPatch {
    pub fragments: Vec<String>,
    pub values: Vec<PatchValue>,
}

pub enum PatchValue {
    Text(String),
    OptText(Option<String>),
    Int(i64),
    I32(i32),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    OptTimestamp(Option<DateTime<Utc>>),
    Status(JobStatus),
    StreamType(crate::models::StreamType),
}

impl JobPatch {
    pub fn new() -> Self {
        Self {
            fragments: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, column: &str, value: PatchValue) {
        self.fragments.push(format!("{column} = ?"));
        self.values.push(value);
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl Default for JobPatch {
    fn default() -> Self {
        Self::new()
    }
}

/// All captures for a job, oldest first — used by the maintenance scan to
/// cross-reference DB rows against the filesystem.
pub async fn captures_for_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<Capture>> {
    let captures = sqlx::query_as::<_, Capture>(
        "SELECT id, job_id, file_path, file_size, captured_at FROM captures
         WHERE job_id = ? ORDER BY captured_at",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .context("listing captures for job")?;
    Ok(captures)
}

/// Subset of `ids` that actually belong to `job_id`, used to reject a
/// cleanup request naming captures from another job before deleting anything.
pub async fn captures_by_ids_for_job(pool: &SqlitePool, job_id: i64, ids: &[i64]) -> Result<Vec<Capture>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!(
        "SELECT id, job_id, file_path, file_size, captured_at FROM captures
         WHERE job_id = ? AND id IN ({placeholders})"
    );
    let mut q = sqlx::query_as::<_, Capture>(&query).bind(job_id);
    for id in ids {
        q = q.bind(id);
    }
    let captures = q.fetch_all(pool).await.context("resolving captures by id for job")?;
    Ok(captures)
}

pub async fn delete_captures_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!("DELETE FROM captures WHERE id IN ({placeholders})");
    let mut q = sqlx::query(&query);
    for id in ids {
        q = q.bind(id);
    }
    let result = q.execute(pool).await.context("deleting captures by id")?;
    Ok(result.rows_affected())
}

/// Recomputes `capture_count`/`storage_size` from the `captures` table and
/// writes them back — used after maintenance cleanup/import mutates rows
/// directly rather than through [`record_capture`].
pub async fn recompute_job_stats(pool: &SqlitePool, job_id: i64) -> Result<(i64, i64)> {
    let row: (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(file_size), 0) FROM captures WHERE job_id = ?",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await
    .context("recomputing job capture stats")?;

    sqlx::query("UPDATE jobs SET capture_count = ?, storage_size = ?, updated_at = ? WHERE id = ?")
        .bind(row.0)
        .bind(row.1)
        .bind(Utc::now())
        .bind(job_id)
        .execute(pool)
        .await
        .context("writing recomputed job capture stats")?;

    Ok(row)
}

pub async fn apply_job_patch(pool: &SqlitePool, job_id: i64, mut patch: JobPatch) -> Result<()> {
    if patch.is_empty() {
        return Ok(());
    }

    patch.fragments.push("updated_at = ?".to_string());
    patch.values.push(PatchValue::Timestamp(Utc::now()));

    let query = format!("UPDATE jobs SET {} WHERE id = ?", patch.fragments.join(", "));
    let mut q = sqlx::query(&query);
    for value in patch.values {
        q = match value {
            PatchValue::Text(v) => q.bind(v),
            PatchValue::OptText(v) => q.bind(v),
            PatchValue::Int(v) => q.bind(v),
            PatchValue::I32(v) => q.bind(v),
            PatchValue::Bool(v) => q.bind(v),
            PatchValue::Timestamp(v) => q.bind(v),
            PatchValue::OptTimestamp(v) => q.bind(v),
            PatchValue::Status(v) => q.bind(v),
            PatchValue::StreamType(v) => q.bind(v),
        };
    }
    q = q.bind(job_id);

    q.execute(pool).await.context("applying job patch")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::StreamType;
    use chrono::{Duration, TimeZone};

    fn new_job(start: DateTime<Utc>) -> NewJob<'static> {
        NewJob {
            name: "backyard",
            url: "http://camera.local/frame.jpg",
            stream_type: StreamType::Http,
            start_datetime: start,
            end_datetime: None,
            interval_seconds: 60,
            framerate: 30,
            naming_pattern: "{job_name}_{num:06d}_{timestamp}",
            time_window_enabled: false,
            time_window_start: None,
            time_window_end: None,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_job_round_trips() {
        let pool = test_pool().await;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = insert_job(&pool, &new_job(start)).await.unwrap();

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.name, "backyard");
        assert_eq!(job.status, JobStatus::Sleeping);
        assert_eq!(job.start_datetime, start);
        assert_eq!(job.capture_count, 0);
    }

    #[tokio::test]
    async fn get_job_returns_none_for_missing_id() {
        let pool = test_pool().await;
        assert!(get_job(&pool, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_schedule_updates_status_and_next_capture() {
        let pool = test_pool().await;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = insert_job(&pool, &new_job(start)).await.unwrap();

        let next = start + Duration::seconds(60);
        write_schedule(&pool, id, JobStatus::Active, Some(next)).await.unwrap();

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.next_scheduled_capture_at, Some(next));
    }

    #[tokio::test]
    async fn candidate_jobs_excludes_not_yet_started_and_terminal() {
        let pool = test_pool().await;
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

        let started_id = insert_job(&pool, &new_job(now - Duration::seconds(3600))).await.unwrap();
        write_schedule(&pool, started_id, JobStatus::Active, Some(now + Duration::seconds(60))).await.unwrap();

        let future_id = insert_job(&pool, &new_job(now + Duration::seconds(3600))).await.unwrap();
        write_schedule(&pool, future_id, JobStatus::Sleeping, Some(now + Duration::seconds(3600))).await.unwrap();

        let disabled_id = insert_job(&pool, &new_job(now - Duration::seconds(3600))).await.unwrap();
        write_schedule(&pool, disabled_id, JobStatus::Disabled, None).await.unwrap();

        let candidates = candidate_jobs_for_scheduling(&pool, now).await.unwrap();
        let ids: Vec<i64> = candidates.iter().map(|j| j.id).collect();

        assert!(ids.contains(&started_id));
        assert!(!ids.contains(&future_id));
        assert!(!ids.contains(&disabled_id));
    }

    #[tokio::test]
    async fn record_capture_increments_stats_and_clears_warning() {
        let pool = test_pool().await;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = insert_job(&pool, &new_job(start)).await.unwrap();
        set_warning(&pool, id, "failing").await.unwrap();

        record_capture(&pool, id, "/captures/1_backyard/2025/01/01/12/a.jpg", 1024, start).await.unwrap();

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.capture_count, 1);
        assert_eq!(job.storage_size, 1024);
        assert!(job.warning_message.is_none());

        let captures = captures_for_job(&pool, id).await.unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].file_size, 1024);
    }

    #[tokio::test]
    async fn apply_job_patch_updates_only_named_columns() {
        let pool = test_pool().await;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = insert_job(&pool, &new_job(start)).await.unwrap();

        let mut patch = JobPatch::new();
        patch.push("name", PatchValue::Text("front-yard".to_string()));
        apply_job_patch(&pool, id, patch).await.unwrap();

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.name, "front-yard");
        assert_eq!(job.url, "http://camera.local/frame.jpg");
    }

    #[tokio::test]
    async fn delete_job_cascades_to_captures() {
        let pool = test_pool().await;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = insert_job(&pool, &new_job(start)).await.unwrap();
        record_capture(&pool, id, "/captures/1_backyard/2025/01/01/12/a.jpg", 1024, start).await.unwrap();

        delete_job(&pool, id).await.unwrap();

        assert!(get_job(&pool, id).await.unwrap().is_none());
        assert_eq!(capture_count(&pool, None).await.unwrap(), 0);
    }
}
