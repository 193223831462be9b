//! Pure job-state calculation. No I/O, no clock reads: every function here
//! takes `reference_time` explicitly so it can be driven deterministically
//! from tests and from the scheduler tick alike.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::models::{Job, JobStatus};
use crate::time_util::{parse_window_time, resolve_local_datetime, time_in_window, to_local};

/// Grid slot calculation: `start + N * interval` for the smallest `N` whose
/// slot is still in the future relative to `reference_time`. Returns `None`
/// once the job has no more slots before `end_datetime`.
pub fn next_capture_on_grid(job: &Job, reference_time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let interval = Duration::seconds(job.interval_seconds);

    if reference_time < job.start_datetime {
        return Some(job.start_datetime);
    }

    let elapsed = reference_time - job.start_datetime;
    let mut intervals_passed = elapsed.num_seconds() / job.interval_seconds;
    let mut next = job.start_datetime + interval * ((intervals_passed + 1) as i32);

    while next <= reference_time {
        intervals_passed += 1;
        next = job.start_datetime + interval * ((intervals_passed + 1) as i32);
    }

    if let Some(end) = job.end_datetime {
        if next > end {
            return None;
        }
    }

    Some(next)
}

/// Project `instant` into `tz`'s wall-clock time for window comparisons.
/// Per SPEC_FULL.md's resolved open question, windows are evaluated in the
/// configured timezone's local clock, not a fixed UTC offset, so a window
/// like "08:00-20:00" keeps meaning 8am-8pm local across DST transitions.
fn local_time(instant: DateTime<Utc>, tz: Tz) -> chrono::NaiveTime {
    to_local(instant, tz).time()
}

fn local_date(instant: DateTime<Utc>, tz: Tz) -> chrono::NaiveDate {
    to_local(instant, tz).date_naive()
}

/// Resolve `date` at local wall-clock `time` in `tz` back to a UTC instant.
/// Returns `None` if a DST spring-forward gap erases that wall-clock time on
/// that date — the window search then simply tries the next day.
fn local_instant(tz: Tz, date: chrono::NaiveDate, time: chrono::NaiveTime) -> Option<DateTime<Utc>> {
    resolve_local_datetime(tz, date, time)
}

/// When the daily window will next open relative to `reference_time`,
/// expressed as a UTC instant. Window boundaries are resolved against the
/// wall-clock calendar date of `tz`, so the search walks local days rather
/// than UTC days.
fn next_window_start(
    reference_time: DateTime<Utc>,
    tz: Tz,
    start: chrono::NaiveTime,
    end: chrono::NaiveTime,
) -> DateTime<Utc> {
    let current = local_time(reference_time, tz);
    let today = local_date(reference_time, tz);

    let resolve = |date: chrono::NaiveDate| -> DateTime<Utc> {
        // Walk forward a few days if the wall-clock time is erased by a
        // DST gap on this particular date.
        for offset in 0..7 {
            if let Some(dt) = local_instant(tz, date + Duration::days(offset), start) {
                return dt;
            }
        }
        // Unreachable in practice (no real zone has week-long gaps); fall
        // back to a UTC-anchored instant rather than panicking.
        DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(start), Utc)
    };

    if time_in_window(current, start, end) {
        return resolve(today + Duration::days(1));
    }

    if start <= end {
        if current < start {
            resolve(today)
        } else {
            resolve(today + Duration::days(1))
        }
    } else {
        // Crosses midnight: not being in the window here always means
        // `current < start` (time_in_window's out-of-window region for a
        // wraparound window is exactly `end < current < start`), so the
        // window's next opening is always later today, never a past day.
        resolve(today)
    }
}

const MAX_WINDOW_SEARCH_DAYS: i64 = 30;
const MAX_SLOTS_PER_DAY: usize = 1000;

/// Find the earliest grid slot at or after `window_start` that falls inside
/// the daily window, searching local days one at a time up to
/// `MAX_WINDOW_SEARCH_DAYS`.
fn next_capture_in_window(
    job: &Job,
    window_start: DateTime<Utc>,
    tz: Tz,
    start: chrono::NaiveTime,
    end: chrono::NaiveTime,
) -> Option<DateTime<Utc>> {
    let day = local_date(window_start, tz);

    for day_offset in 0..MAX_WINDOW_SEARCH_DAYS {
        let search_day = day + Duration::days(day_offset);

        let Some(day_window_start) = local_instant(tz, search_day, start) else {
            continue; // DST gap erased this window's opening; try the next day.
        };

        if let Some(end_dt) = job.end_datetime {
            if day_window_start > end_dt {
                return None;
            }
        }

        let end_day = if end < start { search_day + Duration::days(1) } else { search_day };
        let window_end_time = match local_instant(tz, end_day, end) {
            Some(dt) => dt,
            None => continue,
        };

        let mut search_time = day_window_start - Duration::seconds(1);

        for _ in 0..MAX_SLOTS_PER_DAY {
            let candidate = match next_capture_on_grid(job, search_time) {
                Some(c) => c,
                None => return None,
            };

            if candidate > window_end_time {
                break;
            }

            if time_in_window(local_time(candidate, tz), start, end) {
                return Some(candidate);
            }

            search_time = candidate;
        }
    }

    None
}

/// Result of [`calculate`]: the job's status, its next capture instant (if
/// any), and a short human-readable reason for logging.
pub struct JobState {
    pub status: JobStatus,
    pub next_capture: Option<DateTime<Utc>>,
    pub reason: String,
}

/// The single source of truth for job state transitions. Implements
/// SPEC_FULL.md §4.2 exactly: disabled short-circuit, not-yet-started,
/// pending-capture preservation with grace period, grid computation, and
/// window-aware rescheduling.
pub fn calculate(
    job: &Job,
    reference_time: DateTime<Utc>,
    pending_capture: Option<DateTime<Utc>>,
    tz: Tz,
) -> JobState {
    if job.status == JobStatus::Disabled {
        return JobState {
            status: JobStatus::Disabled,
            next_capture: None,
            reason: "manually disabled".to_string(),
        };
    }

    if reference_time < job.start_datetime {
        return JobState {
            status: JobStatus::Sleeping,
            next_capture: Some(job.start_datetime),
            reason: format!("not started, begins at {}", job.start_datetime.to_rfc3339()),
        };
    }

    let window = if job.time_window_enabled {
        match (&job.time_window_start, &job.time_window_end) {
            (Some(s), Some(e)) => Some((
                parse_window_time(s).expect("persisted window_start is validated on write"),
                parse_window_time(e).expect("persisted window_end is validated on write"),
            )),
            _ => None,
        }
    } else {
        None
    };

    if let Some(pending) = pending_capture {
        let grace = Duration::seconds(job.interval_seconds * 2);
        if pending > reference_time - grace {
            let preserved = match window {
                Some((start, end)) => {
                    let current_in = time_in_window(local_time(reference_time, tz), start, end);
                    let pending_in = time_in_window(local_time(pending, tz), start, end);
                    current_in && pending_in
                }
                None => true,
            };
            if preserved {
                return JobState {
                    status: JobStatus::Active,
                    next_capture: Some(pending),
                    reason: format!("pending capture at {}", pending.to_rfc3339()),
                };
            }
        }
    }

    let next = match next_capture_on_grid(job, reference_time) {
        Some(n) => n,
        None => {
            return JobState {
                status: JobStatus::Completed,
                next_capture: None,
                reason: "no more captures scheduled".to_string(),
            };
        }
    };

    let Some((start, end)) = window else {
        return JobState {
            status: JobStatus::Active,
            next_capture: Some(next),
            reason: format!("active, next capture at {}", next.to_rfc3339()),
        };
    };

    let current_in = time_in_window(local_time(reference_time, tz), start, end);
    let next_in = time_in_window(local_time(next, tz), start, end);

    if current_in && next_in {
        return JobState {
            status: JobStatus::Active,
            next_capture: Some(next),
            reason: format!("active, next capture at {}", next.to_rfc3339()),
        };
    }

    let opening = next_window_start(reference_time, tz, start, end);
    match next_capture_in_window(job, opening, tz, start, end) {
        Some(slot) => JobState {
            status: JobStatus::Sleeping,
            next_capture: Some(slot),
            reason: format!("outside time window, next capture at {}", slot.to_rfc3339()),
        },
        None => JobState {
            status: JobStatus::Completed,
            next_capture: None,
            reason: "job ends before next window".to_string(),
        },
    }
}

/// Validates a scheduled instant is still eligible to fire, called by the
/// scheduler's dispatch phase right before handing a job to the executor.
pub fn should_execute(job: &Job, scheduled_time: DateTime<Utc>, tz: Tz) -> Result<(), &'static str> {
    if scheduled_time < job.start_datetime {
        return Err("scheduled before job start");
    }
    if let Some(end) = job.end_datetime {
        if scheduled_time > end {
            return Err("scheduled after job end");
        }
    }
    if job.time_window_enabled {
        if let (Some(s), Some(e)) = (&job.time_window_start, &job.time_window_end) {
            let start = parse_window_time(s).map_err(|_| "invalid window_start")?;
            let end = parse_window_time(e).map_err(|_| "invalid window_end")?;
            if !time_in_window(local_time(scheduled_time, tz), start, end) {
                return Err("scheduled time was outside time window");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::UTC;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    fn base_job() -> Job {
        Job {
            id: 1,
            name: "test".to_string(),
            url: "http://example.com/frame.jpg".to_string(),
            stream_type: crate::models::StreamType::Http,
            start_datetime: dt(2025, 1, 1, 12, 0, 0),
            end_datetime: None,
            interval_seconds: 60,
            framerate: 30,
            status: JobStatus::Active,
            capture_path: "/captures/1_test".to_string(),
            naming_pattern: "{job_name}_{num:06d}_{timestamp}".to_string(),
            capture_count: 0,
            storage_size: 0,
            warning_message: None,
            time_window_enabled: false,
            time_window_start: None,
            time_window_end: None,
            next_scheduled_capture_at: None,
            created_at: dt(2025, 1, 1, 0, 0, 0),
            updated_at: dt(2025, 1, 1, 0, 0, 0),
        }
    }

    #[test]
    fn s1_basic_cadence() {
        let job = base_job();
        let state = calculate(&job, dt(2025, 1, 1, 12, 0, 30), None, UTC);
        assert_eq!(state.status, JobStatus::Active);
        assert_eq!(state.next_capture, Some(dt(2025, 1, 1, 12, 1, 0)));
    }

    #[test]
    fn s2_window_inside_day() {
        let mut job = base_job();
        job.start_datetime = dt(2025, 1, 1, 7, 59, 30);
        job.time_window_enabled = true;
        job.time_window_start = Some("08:00".to_string());
        job.time_window_end = Some("20:00".to_string());

        let state = calculate(&job, dt(2025, 1, 1, 7, 59, 45), None, UTC);
        assert_eq!(state.status, JobStatus::Sleeping);
        assert_eq!(state.next_capture, Some(dt(2025, 1, 1, 8, 0, 0)));

        let state2 = calculate(&job, dt(2025, 1, 1, 8, 0, 15), None, UTC);
        assert_eq!(state2.status, JobStatus::Active);
        assert_eq!(state2.next_capture, Some(dt(2025, 1, 1, 8, 0, 30)));
    }

    #[test]
    fn s3_window_crossing_midnight() {
        let mut job = base_job();
        job.start_datetime = dt(2025, 1, 1, 21, 30, 0);
        job.interval_seconds = 600;
        job.time_window_enabled = true;
        job.time_window_start = Some("22:00".to_string());
        job.time_window_end = Some("02:00".to_string());

        let state = calculate(&job, dt(2025, 1, 2, 1, 50, 0), None, UTC);
        assert_eq!(state.status, JobStatus::Active);
        assert_eq!(state.next_capture, Some(dt(2025, 1, 2, 2, 0, 0)));

        let state2 = calculate(&job, dt(2025, 1, 2, 2, 30, 0), None, UTC);
        assert_eq!(state2.status, JobStatus::Sleeping);
        assert_eq!(state2.next_capture, Some(dt(2025, 1, 2, 22, 0, 0)));
    }

    #[test]
    fn s4_pending_preservation_across_tick() {
        let job = base_job();
        let pending = dt(2025, 1, 1, 12, 1, 0);

        let state = calculate(&job, dt(2025, 1, 1, 12, 1, 30), Some(pending), UTC);
        assert_eq!(state.status, JobStatus::Active);
        assert_eq!(state.next_capture, Some(pending));

        let state2 = calculate(&job, dt(2025, 1, 1, 12, 3, 30), Some(pending), UTC);
        assert_eq!(state2.next_capture, Some(dt(2025, 1, 1, 12, 4, 0)));
    }

    #[test]
    fn s5_end_date_terminates() {
        let mut job = base_job();
        job.end_datetime = Some(dt(2025, 1, 1, 12, 5, 0));

        let state = calculate(&job, dt(2025, 1, 1, 12, 5, 0), None, UTC);
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.next_capture, None);
    }

    #[test]
    fn disabled_stays_disabled() {
        let mut job = base_job();
        job.status = JobStatus::Disabled;
        let state = calculate(&job, dt(2025, 1, 1, 12, 30, 0), None, UTC);
        assert_eq!(state.status, JobStatus::Disabled);
        assert_eq!(state.next_capture, None);
    }

    #[test]
    fn not_started_returns_sleeping() {
        let job = base_job();
        let state = calculate(&job, dt(2024, 12, 31, 0, 0, 0), None, UTC);
        assert_eq!(state.status, JobStatus::Sleeping);
        assert_eq!(state.next_capture, Some(job.start_datetime));
    }

    #[test]
    fn grid_alignment_holds() {
        let job = base_job();
        for offset in [0, 15, 59, 61, 121] {
            let ref_time = job.start_datetime + Duration::seconds(offset);
            let next = next_capture_on_grid(&job, ref_time).unwrap();
            let elapsed = (next - job.start_datetime).num_seconds();
            assert_eq!(elapsed % job.interval_seconds, 0);
            assert!(next > ref_time);
        }
    }

    #[test]
    fn should_execute_rejects_outside_window() {
        let mut job = base_job();
        job.time_window_enabled = true;
        job.time_window_start = Some("08:00".to_string());
        job.time_window_end = Some("20:00".to_string());
        let scheduled = dt(2025, 1, 1, 21, 0, 0);
        assert!(should_execute(&job, scheduled, UTC).is_err());
    }

    #[test]
    fn should_execute_rejects_before_start() {
        let job = base_job();
        let scheduled = job.start_datetime - Duration::seconds(1);
        assert!(should_execute(&job, scheduled, UTC).is_err());
    }

    #[test]
    fn should_execute_rejects_after_end() {
        let mut job = base_job();
        job.end_datetime = Some(dt(2025, 1, 1, 13, 0, 0));
        let scheduled = dt(2025, 1, 1, 13, 0, 1);
        assert!(should_execute(&job, scheduled, UTC).is_err());
    }
}
