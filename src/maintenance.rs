//! Filesystem/DB reconciliation: `scan` finds divergence between the
//! `captures` table and what's actually on disk, `cleanup` drops DB rows for
//! files that have gone missing, `import` adopts files found on disk that
//! the database never recorded. Ported from
//! `original_source/backend/services/maintenance.py`.
//!
//! Deviation from the source: timestamp recovery for orphaned files tries
//! the `YYYYMMDD_HHMMSS` filename pattern, then falls back to file mtime.
//! EXIF extraction is dropped (see DESIGN.md) — captures in this crate are
//! always written by our own `capture` module, which never embeds EXIF.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::MaintenanceError;
use crate::models::{CleanupResult, ImportResult, MissingCapture, OrphanedFile, ScanResult};
use crate::store;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursive, synchronous directory walk — run inside `spawn_blocking` by
/// callers, matching the blocking-work pattern `thumbnail::generate` uses.
fn walk_image_files(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !root.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_image_files(&path, out)?;
        } else if has_image_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Recovers a capture's instant from the `YYYYMMDD_HHMMSS` pattern embedded
/// in its filename (the only naming convention `capture::render_filename`
/// ever produces), falling back to the file's modification time.
fn extract_timestamp(path: &Path) -> DateTime<Utc> {
    if let Some(name) = path.file_name().and_then(|n| n.to_str())
        && let Some(ts) = find_timestamp_token(name)
        && let Ok(naive) = NaiveDateTime::parse_from_str(&ts, "%Y%m%d_%H%M%S")
    {
        return Utc.from_utc_datetime(&naive);
    }

    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Scans `name` for an 8-digit, underscore, 6-digit run (`YYYYMMDD_HHMMSS`).
fn find_timestamp_token(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let is_digit = |b: u8| b.is_ascii_digit();
    for start in 0..bytes.len() {
        if start + 15 > bytes.len() {
            break;
        }
        let window = &bytes[start..start + 15];
        let shape_ok = window[..8].iter().all(|&b| is_digit(b))
            && window[8] == b'_'
            && window[9..15].iter().all(|&b| is_digit(b));
        if shape_ok {
            return Some(String::from_utf8_lossy(window).into_owned());
        }
    }
    None
}

pub async fn scan_job_files(pool: &SqlitePool, job_id: i64) -> Result<ScanResult, MaintenanceError> {
    let job = store::get_job(pool, job_id)
        .await
        .map_err(|_| MaintenanceError::JobNotFound(job_id))?
        .ok_or(MaintenanceError::JobNotFound(job_id))?;

    let captures = store::captures_for_job(pool, job_id)
        .await
        .map_err(|_| MaintenanceError::JobNotFound(job_id))?;

    let mut known_files = std::collections::HashSet::with_capacity(captures.len());
    let mut missing_files = Vec::new();
    let mut existing_count = 0i64;
    let mut total_size_recovered = 0i64;

    for capture in &captures {
        known_files.insert(capture.file_path.clone());
        if tokio::fs::metadata(&capture.file_path).await.is_err() {
            total_size_recovered += capture.file_size;
            missing_files.push(MissingCapture {
                id: capture.id,
                file_path: capture.file_path.clone(),
                file_size: capture.file_size,
                captured_at: capture.captured_at,
            });
        } else {
            existing_count += 1;
        }
    }

    let capture_root = PathBuf::from(&job.capture_path);
    let on_disk = tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        walk_image_files(&capture_root, &mut files)?;
        Ok::<_, std::io::Error>(files)
    })
    .await
    .context("maintenance scan worker panicked")
    .map_err(|_| MaintenanceError::JobNotFound(job_id))?
    .unwrap_or_default();

    let mut orphaned_files = Vec::new();
    for path in on_disk {
        let path_str = path.to_string_lossy().to_string();
        if known_files.contains(&path_str) {
            continue;
        }
        let file_size = std::fs::metadata(&path).map(|m| m.len() as i64).unwrap_or(0);
        let captured_at = extract_timestamp(&path);
        orphaned_files.push(OrphanedFile {
            file_path: path_str,
            file_size,
            captured_at,
        });
    }

    let missing_count = missing_files.len() as i64;
    let orphaned_count = orphaned_files.len() as i64;

    info!(
        job_id,
        existing_count, missing_count, orphaned_count, "maintenance scan complete"
    );

    Ok(ScanResult {
        job_id,
        job_name: job.name,
        total_captures: captures.len() as i64,
        missing_files,
        missing_count,
        orphaned_files,
        orphaned_count,
        existing_count,
        total_size_recovered,
    })
}

pub async fn cleanup_missing_captures(
    pool: &SqlitePool,
    job_id: i64,
    capture_ids: &[i64],
) -> Result<CleanupResult, MaintenanceError> {
    let owned = store::captures_by_ids_for_job(pool, job_id, capture_ids)
        .await
        .map_err(|_| MaintenanceError::CaptureMismatch(job_id))?;

    if owned.len() != capture_ids.len() {
        return Err(MaintenanceError::CaptureMismatch(job_id));
    }

    let size_recovered: i64 = owned.iter().map(|c| c.file_size).sum();
    let deleted_count = store::delete_captures_by_ids(pool, capture_ids)
        .await
        .map_err(|_| MaintenanceError::CaptureMismatch(job_id))? as i64;

    let (new_capture_count, new_storage_size) = store::recompute_job_stats(pool, job_id)
        .await
        .map_err(|_| MaintenanceError::JobNotFound(job_id))?;

    info!(job_id, deleted_count, size_recovered, "maintenance cleanup complete");

    Ok(CleanupResult {
        deleted_count,
        size_recovered,
        new_capture_count,
        new_storage_size,
    })
}

pub async fn import_orphaned_files(
    pool: &SqlitePool,
    job_id: i64,
    files: &[OrphanedFile],
) -> Result<ImportResult, MaintenanceError> {
    store::get_job(pool, job_id)
        .await
        .map_err(|_| MaintenanceError::JobNotFound(job_id))?
        .ok_or(MaintenanceError::JobNotFound(job_id))?;

    let mut imported_count = 0i64;
    let mut total_size_imported = 0i64;

    for file in files {
        if tokio::fs::metadata(&file.file_path).await.is_err() {
            continue;
        }
        if store::insert_capture_raw(pool, job_id, &file.file_path, file.file_size, file.captured_at)
            .await
            .is_ok()
        {
            imported_count += 1;
            total_size_imported += file.file_size;
        }
    }

    let (new_capture_count, new_storage_size) = store::recompute_job_stats(pool, job_id)
        .await
        .map_err(|_| MaintenanceError::JobNotFound(job_id))?;

    info!(job_id, imported_count, total_size_imported, "maintenance import complete");

    Ok(ImportResult {
        imported_count,
        total_size_imported,
        new_capture_count,
        new_storage_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_timestamp_token_in_filename() {
        assert_eq!(
            find_timestamp_token("backyard_000007_20250101_120000.jpg"),
            Some("20250101_120000".to_string())
        );
        assert_eq!(find_timestamp_token("no-timestamp-here.jpg"), None);
    }

    #[test]
    fn rejects_image_extensions_case_insensitively() {
        assert!(has_image_extension(Path::new("a/b.JPG")));
        assert!(has_image_extension(Path::new("a/b.png")));
        assert!(!has_image_extension(Path::new("a/b.txt")));
    }
}
