use crate::error::SchedulerError;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

/// A parsed schedule: a fixed interval (`"5 minutes"`) or a cron expression.
pub(crate) enum JobSchedule {
    Every(Duration),
    Cron(Box<Schedule>),
}

pub(crate) fn parse_schedule(expression: &str) -> Result<JobSchedule, SchedulerError> {
    if let Some(interval) = parse_interval(expression)? {
        return Ok(JobSchedule::Every(interval));
    }

    let normalized = normalize_cron_expression(expression)?;
    let schedule = Schedule::from_str(&normalized).map_err(|error| invalid(expression, error))?;
    Ok(JobSchedule::Cron(Box::new(schedule)))
}

/// Checks that `expression` parses and yields a next run from now.
pub fn validate_schedule(expression: &str) -> Result<(), SchedulerError> {
    next_run_for(expression, Utc::now()).map(|_| ())
}

pub(crate) fn next_run_for(
    expression: &str,
    from: DateTime<Utc>,
) -> Result<DateTime<Utc>, SchedulerError> {
    match parse_schedule(expression)? {
        JobSchedule::Every(interval) => from
            .checked_add_signed(interval)
            .ok_or_else(|| invalid(expression, "next run is out of range")),
        JobSchedule::Cron(schedule) => schedule
            .after(&from)
            .next()
            .ok_or_else(|| invalid(expression, "no future occurrence")),
    }
}

/// `"<n> <unit>"`, optionally prefixed with `every`. Returns `Ok(None)` when
/// the expression is not interval-shaped so the caller can try cron.
fn parse_interval(expression: &str) -> Result<Option<Duration>, SchedulerError> {
    let mut tokens: Vec<&str> = expression.split_whitespace().collect();
    if tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("every")) {
        tokens.remove(0);
    }
    let [count, unit] = tokens.as_slice() else {
        return Ok(None);
    };
    let Ok(count) = count.parse::<i64>() else {
        return Ok(None);
    };
    if count <= 0 {
        return Err(invalid(expression, "interval must be positive"));
    }

    let unit_secs: i64 = match unit.to_ascii_lowercase().trim_end_matches('s') {
        "second" | "sec" => 1,
        "minute" | "min" => 60,
        "hour" | "hr" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        other => return Err(invalid(expression, format!("unknown unit {other:?}"))),
    };

    count
        .checked_mul(unit_secs)
        .and_then(Duration::try_seconds)
        .map(Some)
        .ok_or_else(|| invalid(expression, "interval too large"))
}

fn normalize_cron_expression(expression: &str) -> Result<String, SchedulerError> {
    let expression = expression.trim();
    let field_count = expression.split_whitespace().count();

    match field_count {
        // standard crontab syntax: minute hour day month weekday
        5 => Ok(format!("0 {expression}")),
        // crate-native syntax includes seconds (+ optional year)
        6 | 7 => Ok(expression.to_string()),
        _ => Err(invalid(
            expression,
            format!("expected an interval or 5, 6, or 7 cron fields, got {field_count}"),
        )),
    }
}

#[allow(clippy::needless_pass_by_value)]
fn invalid(expression: &str, reason: impl ToString) -> SchedulerError {
    SchedulerError::InvalidSchedule {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}
