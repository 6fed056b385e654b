use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};

use crate::domain::models::{Frequency, ReminderKind, ReminderSchedule};

/// Used when a recurring medication carries no reminder times at all.
pub const DEFAULT_REMINDER_TIME: &str = "08:00";

pub fn parse_reminder_time(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let Some((hours_text, minutes_text)) = trimmed.split_once(':') else {
        return Err(format!("reminder time must be HH:MM, got: {value}"));
    };

    let hours = hours_text
        .parse::<u32>()
        .map_err(|_| format!("invalid hour in reminder time: {value}"))?;
    let minutes = minutes_text
        .parse::<u32>()
        .map_err(|_| format!("invalid minute in reminder time: {value}"))?;

    if hours > 23 {
        return Err(format!("hour must be between 0 and 23: {value}"));
    }
    if minutes > 59 {
        return Err(format!("minute must be between 0 and 59: {value}"));
    }
    Ok((hours, minutes))
}

/// The calendar day of `date_ms` at `hours:minutes:00`.
pub fn compose_date_and_time(date_ms: u64, hours: u32, minutes: u32) -> Result<u64, String> {
    let composed = to_datetime(date_ms)?
        .with_hour(hours)
        .and_then(|value| value.with_minute(minutes))
        .and_then(|value| value.with_second(0))
        .and_then(|value| value.with_nanosecond(0))
        .ok_or_else(|| "failed to compose reminder instant".to_owned())?;
    datetime_to_ms(composed)
}

pub fn is_same_calendar_day(a_ms: u64, b_ms: u64) -> bool {
    match (to_datetime(a_ms), to_datetime(b_ms)) {
        (Ok(a), Ok(b)) => a.date_naive() == b.date_naive(),
        _ => false,
    }
}

/// Computes the next fire instant for a medication schedule, or `None` when
/// nothing should be armed (a past one-time reminder, or an exhausted
/// recurring range). The result is always strictly after `now_ms` and never
/// after the schedule's end date.
pub fn next_fire_ms(
    schedule: &ReminderSchedule,
    last_notified_at_ms: Option<u64>,
    now_ms: u64,
) -> Result<Option<u64>, String> {
    match schedule.kind {
        ReminderKind::OneTime => {
            let date_ms = schedule
                .reminder_date_ms
                .ok_or_else(|| "one-time medication requires reminderDateMs".to_owned())?;
            let time = schedule
                .reminder_time
                .as_deref()
                .ok_or_else(|| "one-time medication requires reminderTime".to_owned())?;
            let (hours, minutes) = parse_reminder_time(time)?;
            let instant = compose_date_and_time(date_ms, hours, minutes)?;
            Ok((instant > now_ms).then_some(instant))
        }
        ReminderKind::Recurring => {
            let start_ms = schedule
                .start_date_ms
                .ok_or_else(|| "recurring medication requires startDateMs".to_owned())?;
            let end_ms = schedule
                .end_date_ms
                .ok_or_else(|| "recurring medication requires endDateMs".to_owned())?;
            let frequency = schedule
                .frequency
                .ok_or_else(|| "recurring medication requires frequency".to_owned())?;

            if end_ms < now_ms {
                return Ok(None);
            }

            let reminder_time = schedule
                .reminder_times
                .first()
                .map(String::as_str)
                .unwrap_or(DEFAULT_REMINDER_TIME);
            let (hours, minutes) = parse_reminder_time(reminder_time)?;

            let base_ms = start_ms.max(last_notified_at_ms.unwrap_or(now_ms));
            let mut candidate = to_datetime(compose_date_and_time(base_ms, hours, minutes)?)?;

            if datetime_to_ms(candidate)? <= now_ms {
                candidate += ChronoDuration::days(1);
            }

            if frequency == Frequency::Weekly {
                let target = schedule
                    .day_of_week
                    .ok_or_else(|| "weekly medication requires dayOfWeek".to_owned())?;
                // Forward-or-stay: 0 days when the candidate already sits on
                // the target weekday, at most 6 otherwise.
                let current = candidate.weekday().num_days_from_sunday();
                let days_ahead = (target.number_from_sunday() + 7 - current) % 7;
                candidate += ChronoDuration::days(i64::from(days_ahead));
            }

            let candidate_ms = datetime_to_ms(candidate)?;
            if candidate_ms > end_ms {
                Ok(None)
            } else {
                Ok(Some(candidate_ms))
            }
        }
    }
}

fn to_datetime(ms: u64) -> Result<DateTime<Utc>, String> {
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(ms).unwrap_or(i64::MAX))
        .ok_or_else(|| "timestamp out of range".to_owned())
}

fn datetime_to_ms(value: DateTime<Utc>) -> Result<u64, String> {
    u64::try_from(value.timestamp_millis())
        .map_err(|_| "instant precedes the unix epoch".to_owned())
}
