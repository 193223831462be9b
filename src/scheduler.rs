use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::job_state::{self, JobState};
use crate::models::{Job, JobStatus};
use crate::{capture, store};

/// RAII guard that removes a job ID from the in-flight set on drop.
/// Ensures cleanup even if the capture task panics.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<i64>>>,
    job_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().expect("in_flight mutex poisoned").remove(&self.job_id);
    }
}

/// Recompute `(status, next_capture)` for `job` and, if it differs from the
/// persisted row, write it back. Clears `warning_message` on entering a
/// terminal or sleeping state, per SPEC_FULL.md §4.5 phase 1.
async fn reconcile_job(pool: &SqlitePool, job: &Job, now: chrono::DateTime<Utc>, tz: chrono_tz::Tz) -> JobState {
    let state = job_state::calculate(job, now, job.next_scheduled_capture_at, tz);

    let changed = state.status != job.status || state.next_capture != job.next_scheduled_capture_at;
    if changed {
        if let Err(e) = store::write_schedule(pool, job.id, state.status, state.next_capture).await {
            error!(job_id = job.id, error = %e, "failed to write job schedule transition");
        } else {
            debug!(job_id = job.id, status = %state.status, reason = %state.reason, "job state transition");
        }
    }

    if matches!(state.status, JobStatus::Sleeping | JobStatus::Completed | JobStatus::Disabled)
        && job.warning_message.is_some()
    {
        if let Err(e) = store::clear_warning(pool, job.id).await {
            error!(job_id = job.id, error = %e, "failed to clear warning on state transition");
        }
    }

    state
}

/// Background tick loop: reconciles persisted schedule state against the
/// wall clock, dispatches due captures under a bounded worker pool, and
/// writes back the next schedule on completion (SPEC_FULL.md §4.5).
pub async fn scheduler_loop(pool: SqlitePool, config: Arc<Config>, semaphore: Arc<Semaphore>, cancel: CancellationToken) {
    info!("scheduler started");

    let in_flight: Arc<Mutex<HashSet<i64>>> = Arc::new(Mutex::new(HashSet::new()));
    let failure_counts: Arc<Mutex<std::collections::HashMap<i64, u32>>> = Arc::new(Mutex::new(std::collections::HashMap::new()));
    let tick_interval = Duration::from_secs(config.scheduler_tick_secs);
    let ffmpeg_timeout = Duration::from_secs(config.ffmpeg_timeout_secs);

    let mut first_tick = true;

    loop {
        if !first_tick {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(tick_interval) => {}
            }
        }
        first_tick = false;

        if cancel.is_cancelled() {
            info!("scheduler shutting down");
            return;
        }

        let now = Utc::now();

        let candidates = match store::candidate_jobs_for_scheduling(&pool, now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed to load candidate jobs");
                continue;
            }
        };

        // Phase 1 — status reconciliation.
        let mut reconciled = Vec::with_capacity(candidates.len());
        for job in candidates {
            let state = reconcile_job(&pool, &job, now, config.tz()).await;
            reconciled.push((job, state));
        }

        // Phase 2 — dispatch.
        for (job, state) in reconciled {
            if state.status != JobStatus::Active {
                continue;
            }
            let Some(scheduled_time) = state.next_capture else {
                continue;
            };
            if scheduled_time > now {
                continue;
            }

            {
                let mut guard = in_flight.lock().expect("in_flight mutex poisoned");
                if guard.contains(&job.id) {
                    continue;
                }
                if job_state::should_execute(&job, scheduled_time, config.tz()).is_err() {
                    continue;
                }
                guard.insert(job.id);
            }

            let pool = pool.clone();
            let semaphore = semaphore.clone();
            let in_flight = in_flight.clone();
            let failure_counts = failure_counts.clone();
            let job_id = job.id;
            let tz = config.tz();

            tokio::spawn(async move {
                let _guard = InFlightGuard { set: in_flight, job_id };

                let _permit = match semaphore.acquire().await {
                    Ok(p) => p,
                    Err(_) => return,
                };

                capture::run_worker_task(&pool, &job, ffmpeg_timeout, &failure_counts).await;

                // Phase 3 — completion: compute and persist the following schedule.
                match store::get_job(&pool, job_id).await {
                    Ok(Some(refreshed)) => {
                        let state = job_state::calculate(&refreshed, Utc::now(), None, tz);
                        if let Err(e) = store::write_schedule(&pool, job_id, state.status, state.next_capture).await {
                            error!(job_id, error = %e, "failed to persist post-capture schedule");
                        }
                    }
                    Ok(None) => {
                        warn!(job_id, "job deleted while capture was in flight");
                    }
                    Err(e) => {
                        error!(job_id, error = %e, "failed to reload job after capture");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::StreamType;
    use chrono::{Duration, TimeZone};

    fn new_job(start: chrono::DateTime<Utc>) -> store::NewJob<'static> {
        store::NewJob {
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
    async fn reconcile_writes_back_initial_schedule() {
        let pool = test_pool().await;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = store::insert_job(&pool, &new_job(start)).await.unwrap();
        let job = store::get_job(&pool, id).await.unwrap().unwrap();

        let now = start + Duration::seconds(30);
        let state = reconcile_job(&pool, &job, now, chrono_tz::UTC).await;

        assert_eq!(state.status, JobStatus::Active);
        assert_eq!(state.next_capture, Some(start + Duration::seconds(60)));

        let refreshed = store::get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, JobStatus::Active);
        assert_eq!(refreshed.next_scheduled_capture_at, state.next_capture);
    }

    #[tokio::test]
    async fn reconcile_clears_warning_on_entering_sleeping() {
        let pool = test_pool().await;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = store::insert_job(&pool, &new_job(start)).await.unwrap();
        store::set_warning(&pool, id, "three strikes").await.unwrap();

        let mut job = store::get_job(&pool, id).await.unwrap().unwrap();
        job.warning_message = Some("three strikes".to_string());
        // Not yet started relative to `now` forces a sleeping transition.
        let before_start = start - Duration::seconds(10);

        reconcile_job(&pool, &job, before_start, chrono_tz::UTC).await;

        let refreshed = store::get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, JobStatus::Sleeping);
        assert!(refreshed.warning_message.is_none());
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_within_grace_period() {
        let pool = test_pool().await;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = store::insert_job(&pool, &new_job(start)).await.unwrap();
        let pending = start + Duration::seconds(60);
        store::write_schedule(&pool, id, JobStatus::Active, Some(pending)).await.unwrap();

        let job = store::get_job(&pool, id).await.unwrap().unwrap();
        let now = pending + Duration::seconds(30);

        let first = reconcile_job(&pool, &job, now, chrono_tz::UTC).await;
        let job_after = store::get_job(&pool, id).await.unwrap().unwrap();
        let second = reconcile_job(&pool, &job_after, now, chrono_tz::UTC).await;

        assert_eq!(first.next_capture, second.next_capture);
        assert_eq!(first.next_capture, Some(pending));
    }
}
