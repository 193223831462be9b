//! C7 (external collaborator): assembles captured frames into an MP4 via
//! ffmpeg's concat demuxer. Not part of the scheduling core — dispatched as
//! a detached background task from the HTTP layer.

use std::io::Write as _;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::VideoError;
use crate::store;

fn quality_to_crf(quality: &str) -> &'static str {
    match quality {
        "low" => "28",
        "high" => "18",
        "lossless" => "0",
        _ => "23",
    }
}

/// Extracts the frame count out of an ffmpeg progress line such as
/// `frame=  123 fps=25 q=23.0 size=...`.
fn parse_frame_count(line: &str) -> Option<i64> {
    let idx = line.find("frame=")?;
    line[idx + "frame=".len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// Kicked off as a detached `tokio::spawn` by the HTTP layer right after
/// inserting the `processing` row; never awaited by the request handler.
pub async fn process_video(
    pool: sqlx::SqlitePool,
    video_id: i64,
    job_id: i64,
    resolution: String,
    framerate: i32,
    quality: String,
    start_time: Option<chrono::DateTime<chrono::Utc>>,
    end_time: Option<chrono::DateTime<chrono::Utc>>,
    output_path: String,
) {
    info!(video_id, job_id, "starting video processing");

    let result = run(
        &pool,
        video_id,
        job_id,
        &resolution,
        framerate,
        &quality,
        start_time,
        end_time,
        &output_path,
    )
    .await;

    if let Err(e) = result {
        error!(video_id, error = %e, "video processing failed");
        if let Err(store_err) = store::fail_video(&pool, video_id).await {
            error!(video_id, error = %store_err, "failed to mark video as failed");
        }
    }
}

async fn run(
    pool: &sqlx::SqlitePool,
    video_id: i64,
    job_id: i64,
    resolution: &str,
    framerate: i32,
    quality: &str,
    start_time: Option<chrono::DateTime<chrono::Utc>>,
    end_time: Option<chrono::DateTime<chrono::Utc>>,
    output_path: &str,
) -> Result<()> {
    let captures = store::captures_for_job_between(pool, job_id, start_time, end_time).await?;
    if captures.is_empty() {
        return Err(VideoError::NoCaptures.into());
    }
    let total_frames = captures.len() as i64;

    let mut list_file = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .context("creating ffmpeg concat list file")?;
    for capture in &captures {
        writeln!(list_file, "file '{}'", capture.file_path)?;
        writeln!(list_file, "duration {}", 1.0 / framerate as f64)?;
    }
    list_file.flush()?;

    if let Some(parent) = Path::new(output_path).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating video output directory: {}", parent.display()))?;
    }

    let crf = quality_to_crf(quality);
    let mut child = Command::new("ffmpeg")
        .arg("-loglevel")
        .arg("info")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(list_file.path())
        .arg("-vf")
        .arg(format!("scale={resolution}"))
        .arg("-r")
        .arg(framerate.to_string())
        .arg("-c:v")
        .arg("libx264")
        .arg("-crf")
        .arg(crf)
        .arg("-preset")
        .arg("medium")
        .arg("-pix_fmt")
        .arg("yuv420p")
        .arg("-y")
        .arg(output_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("spawning ffmpeg for video assembly")?;

    let stderr = child.stderr.take().expect("piped stderr");
    let mut lines = BufReader::new(stderr).lines();
    let mut last_stderr = String::new();
    let mut last_frame = 0i64;

    while let Some(line) = lines.next_line().await.context("reading ffmpeg stderr")? {
        if let Some(frame) = parse_frame_count(&line) {
            last_frame = frame;
            let progress_pct = (frame as f64 / total_frames as f64 * 100.0).min(100.0);
            tracing::debug!(video_id, frame, progress_pct, "video assembly progress");
            if let Err(e) =
                store::update_video_progress(pool, video_id, frame, frame as f64 / framerate as f64, progress_pct).await
            {
                warn!(video_id, error = %e, "failed to persist video progress");
            }
        }
        last_stderr = line;
    }

    let status = child.wait().await.context("waiting for ffmpeg to exit")?;
    if !status.success() {
        warn!(video_id, last_frame, stderr = %last_stderr, "ffmpeg video assembly failed");
        return Err(VideoError::Ffmpeg(last_stderr.chars().take(200).collect()).into());
    }

    let metadata = tokio::fs::metadata(output_path)
        .await
        .context("reading assembled video metadata")?;
    let duration_seconds = total_frames as f64 / framerate as f64;

    store::complete_video(pool, video_id, metadata.len() as i64, total_frames, duration_seconds).await?;
    info!(video_id, total_frames, "video processing completed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crf_mapping_matches_known_quality_levels() {
        assert_eq!(quality_to_crf("low"), "28");
        assert_eq!(quality_to_crf("medium"), "23");
        assert_eq!(quality_to_crf("high"), "18");
        assert_eq!(quality_to_crf("lossless"), "0");
        assert_eq!(quality_to_crf("garbage"), "23");
    }

    #[test]
    fn frame_count_parses_from_progress_line() {
        assert_eq!(
            parse_frame_count("frame=  123 fps=25 q=23.0 size=    512kB time=00:00:04.92 bitrate= 852.0kbits/s"),
            Some(123)
        );
        assert_eq!(parse_frame_count("frame=1000 fps=0.0 q=-1.0 Lsize=N/A"), Some(1000));
        assert_eq!(parse_frame_count("configuration: --enable-gpl"), None);
    }
}
