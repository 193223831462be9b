//! C4: bounded-concurrency capture execution. `grab_frame` is the shared
//! frame-grabber invocation also used by the stream probe (C6).

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{Datelike, Timelike, Utc};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::models::{Job, StreamType};
use crate::{store, thumbnail};

const CONSECUTIVE_FAILURE_WARNING_THRESHOLD: u32 = 3;

/// Invoke the external frame grabber to pull a single JPEG from `url` into
/// `output_path`. Shared by capture execution and the stream probe.
pub async fn grab_frame(
    url: &str,
    stream_type: StreamType,
    output_path: &Path,
    timeout: Duration,
) -> Result<(), CaptureError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-loglevel").arg("error");
    if stream_type == StreamType::Rtsp {
        cmd.arg("-rtsp_transport").arg("tcp");
    }
    cmd.arg("-i")
        .arg(url)
        .arg("-frames:v")
        .arg("1")
        .arg("-q:v")
        .arg("2")
        .arg("-y")
        .arg(output_path);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(CaptureError::Unexpected(e.to_string())),
        Err(_) => return Err(CaptureError::Timeout(timeout)),
    };

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(url, stderr = %stderr.trim(), "ffmpeg capture failed");
        Err(CaptureError::StreamUnreachable(url.to_string()))
    }
}

/// Substitute `{job_name}`, `{num:06d}`, `{timestamp}` into a naming pattern.
/// Only the zero-padded six-digit form of `{num}` is supported, matching the
/// one pattern the scheduler and HTTP layer actually emit.
pub fn render_filename(pattern: &str, job_name: &str, num: i64, timestamp: &str) -> String {
    pattern
        .replace("{job_name}", job_name)
        .replace("{num:06d}", &format!("{num:06}"))
        .replace("{timestamp}", timestamp)
        + ".jpg"
}

/// Perform one capture for `job`: render the output path, invoke the
/// grabber, and report success/failure to the caller. Does not touch the
/// store directly for job-state transitions — the scheduler computes the
/// next state after this returns (SPEC_FULL.md §4.4).
pub struct CaptureOutcome {
    pub file_path: std::path::PathBuf,
    pub file_size: i64,
}

pub async fn execute_capture(
    job: &Job,
    ffmpeg_timeout: Duration,
) -> Result<CaptureOutcome, CaptureError> {
    let now = Utc::now();
    let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
    let filename = render_filename(&job.naming_pattern, &job.name, job.capture_count + 1, &timestamp);

    let date_dir = Path::new(&job.capture_path)
        .join(now.year().to_string())
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()))
        .join(format!("{:02}", now.hour()));

    tokio::fs::create_dir_all(&date_dir)
        .await
        .map_err(|e| CaptureError::WritePermission(format!("{}: {e}", date_dir.display())))?;

    let output_path = date_dir.join(&filename);

    grab_frame(&job.url, job.stream_type, &output_path, ffmpeg_timeout).await?;

    let metadata = tokio::fs::metadata(&output_path)
        .await
        .map_err(|e| CaptureError::Unexpected(format!("reading captured file metadata: {e}")))?;

    Ok(CaptureOutcome {
        file_path: output_path,
        file_size: metadata.len() as i64,
    })
}

/// Runs one task in the bounded worker pool: capture, persist the result,
/// manage the consecutive-failure counter, and attempt a thumbnail.
/// Thumbnail failures are logged but never treated as capture failures.
pub async fn run_worker_task(
    pool: &sqlx::SqlitePool,
    job: &Job,
    ffmpeg_timeout: Duration,
    failure_counts: &std::sync::Mutex<std::collections::HashMap<i64, u32>>,
) {
    match execute_capture(job, ffmpeg_timeout).await {
        Ok(outcome) => {
            let file_path = outcome.file_path.to_string_lossy().to_string();
            match store::record_capture(pool, job.id, &file_path, outcome.file_size, Utc::now()).await {
                Ok(capture_id) => {
                    info!(job_id = job.id, capture_id, path = %file_path, "capture recorded");
                }
                Err(e) => {
                    error!(job_id = job.id, error = %e, "failed to record capture in store");
                }
            }
            if let Err(e) = thumbnail::generate(&outcome.file_path).await {
                debug!(job_id = job.id, error = %e, "thumbnail generation failed");
            }
            failure_counts.lock().expect("failure_counts mutex poisoned").remove(&job.id);
        }
        Err(e) => {
            warn!(job_id = job.id, error = %e, "capture failed");
            let count = {
                let mut counts = failure_counts.lock().expect("failure_counts mutex poisoned");
                let entry = counts.entry(job.id).or_insert(0);
                *entry += 1;
                *entry
            };
            if count >= CONSECUTIVE_FAILURE_WARNING_THRESHOLD {
                let message = format!("capture failing after {count} consecutive failures: {e}");
                if let Err(store_err) = store::set_warning(pool, job.id, &message).await {
                    error!(job_id = job.id, error = %store_err, "failed to persist warning message");
                }
            } else if let Err(store_err) = store::clear_warning(pool, job.id).await {
                error!(job_id = job.id, error = %store_err, "failed to clear warning message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_renders_all_placeholders() {
        let rendered = render_filename("{job_name}_{num:06d}_{timestamp}", "backyard", 7, "20250101_120000");
        assert_eq!(rendered, "backyard_000007_20250101_120000.jpg");
    }

    #[test]
    fn filename_pads_large_counts() {
        let rendered = render_filename("{num:06d}", "x", 123456, "t");
        assert_eq!(rendered, "123456.jpg");
    }
}
