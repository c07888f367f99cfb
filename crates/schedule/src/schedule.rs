//! Validation and next-run computation for each schedule type.

use {
    chrono::{DateTime, Datelike, Days, NaiveDateTime, TimeDelta, TimeZone},
    chrono_tz::Tz,
};

use crate::{
    error::{Context, Error, Result},
    types::{ScheduleTask, ScheduleType},
};

const MINUTE_MS: u64 = 60_000;

/// Check that a task carries the fields its type needs.
pub fn validate(task: &ScheduleTask) -> Result<()> {
    if task.id.trim().is_empty() {
        return Err(Error::validation("id must not be empty"));
    }
    // Ids name the run history file on disk.
    if task.id.contains(['/', '\\']) || task.id.contains("..") {
        return Err(Error::validation(format!("invalid task id '{}'", task.id)));
    }
    match task.schedule_type {
        ScheduleType::Once | ScheduleType::Daily | ScheduleType::Weekly => {
            if task.run_at.is_none() {
                return Err(Error::validation(format!(
                    "{} schedule requires runAt",
                    type_name(task.schedule_type)
                )));
            }
        },
        ScheduleType::Interval => match task.interval_minutes {
            Some(minutes) if minutes > 0 => {},
            _ => {
                return Err(Error::validation(
                    "interval schedule requires intervalMinutes > 0",
                ));
            },
        },
    }
    resolve_timezone(task.timezone.as_deref())?;
    Ok(())
}

/// First due time for a freshly created or re-enabled task.
///
/// One-shots keep their `runAt` even when it is already past, so they come
/// due immediately. Recurring tasks never start in the past.
pub fn initial_run(task: &ScheduleTask, now_ms: u64) -> Result<Option<u64>> {
    match task.schedule_type {
        ScheduleType::Once => Ok(task.run_at),
        ScheduleType::Daily | ScheduleType::Weekly => next_occurrence(task, now_ms, true),
        ScheduleType::Interval => {
            let every = interval_ms(task)?;
            Ok(Some(match task.run_at {
                Some(at) if at >= now_ms => at,
                _ => now_ms.saturating_add(every),
            }))
        },
    }
}

/// Due time following a run that finished at `finished_ms`. `None` means the
/// schedule has nothing left to run.
pub fn next_run_after(task: &ScheduleTask, finished_ms: u64) -> Result<Option<u64>> {
    match task.schedule_type {
        ScheduleType::Once => Ok(None),
        ScheduleType::Daily | ScheduleType::Weekly => next_occurrence(task, finished_ms, false),
        ScheduleType::Interval => Ok(Some(finished_ms.saturating_add(interval_ms(task)?))),
    }
}

pub fn resolve_timezone(name: Option<&str>) -> Result<Tz> {
    match name.map(str::trim) {
        None | Some("") => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| Error::unknown_timezone(name)),
    }
}

fn type_name(schedule_type: ScheduleType) -> &'static str {
    match schedule_type {
        ScheduleType::Once => "once",
        ScheduleType::Daily => "daily",
        ScheduleType::Weekly => "weekly",
        ScheduleType::Interval => "interval",
    }
}

fn interval_ms(task: &ScheduleTask) -> Result<u64> {
    match task.interval_minutes {
        Some(minutes) if minutes > 0 => Ok(minutes.saturating_mul(MINUTE_MS)),
        _ => Err(Error::validation(
            "interval schedule requires intervalMinutes > 0",
        )),
    }
}

/// Next daily/weekly slot at or after (`inclusive`) or strictly after
/// `from_ms`, keeping `runAt`'s wall-clock time in the task's zone.
fn next_occurrence(task: &ScheduleTask, from_ms: u64, inclusive: bool) -> Result<Option<u64>> {
    let anchor_ms = task
        .run_at
        .with_context(|| format!("{} schedule requires runAt", type_name(task.schedule_type)))?;
    let accepts = |ms: u64| ms > from_ms || (inclusive && ms == from_ms);
    if accepts(anchor_ms) {
        return Ok(Some(anchor_ms));
    }

    let tz = resolve_timezone(task.timezone.as_deref())?;
    let anchor = to_local(anchor_ms, &tz)?;
    let time = anchor.time();
    let weekday = anchor.weekday();
    let start = to_local(from_ms, &tz)?.date_naive();

    for offset in 0..=8 {
        let Some(date) = start.checked_add_days(Days::new(offset)) else {
            break;
        };
        if task.schedule_type == ScheduleType::Weekly && date.weekday() != weekday {
            continue;
        }
        let Some(slot) = resolve_local(&tz, date.and_time(time)) else {
            continue;
        };
        let slot_ms = u64::try_from(slot.timestamp_millis()).unwrap_or(0);
        if accepts(slot_ms) {
            return Ok(Some(slot_ms));
        }
    }
    Ok(None)
}

fn to_local(ms: u64, tz: &Tz) -> Result<DateTime<Tz>> {
    let utc = DateTime::from_timestamp_millis(ms as i64)
        .with_context(|| format!("timestamp out of range: {ms}"))?;
    Ok(utc.with_timezone(tz))
}

/// Map a wall-clock time to an instant. Repeated times take the earlier
/// instant; times skipped by a DST jump move forward by an hour.
fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        let shifted = naive.checked_add_signed(TimeDelta::hours(1))?;
        tz.from_local_datetime(&shifted).earliest()
    })
}
