//! Schedule-time parsing
//!
//! Accepts absolute times ("2026-09-01 15:00", interpreted in local time),
//! relative durations ("2h", "30m"), and natural language ("tomorrow 3pm").

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};

use crate::error::{QcastError, Result};

const ABSOLUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Parse a schedule string into a UTC timestamp
///
/// # Errors
///
/// Returns `InvalidInput` if no supported format matches.
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(QcastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(dt) = parse_absolute(input) {
        return Ok(dt);
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(QcastError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

/// Reject times that are not strictly in the future.
///
/// Enforced at schedule time only; a pending post whose time has since
/// passed is simply due.
pub fn ensure_future(scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if scheduled_at <= now {
        return Err(QcastError::InvalidInput(format!(
            "Scheduled time {} is not in the future",
            scheduled_at.to_rfc3339()
        )));
    }
    Ok(())
}

/// "YYYY-MM-DD HH:MM" in local time
fn parse_absolute(input: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(input, ABSOLUTE_FORMAT)
        .map_err(|e| QcastError::InvalidInput(format!("Invalid absolute time: {}", e)))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            QcastError::InvalidInput(format!("Ambiguous local time: {}", input))
        })
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| QcastError::InvalidInput(format!("Could not parse duration: {}", e)))?;
    Duration::try_seconds(std_duration.as_secs() as i64)
        .ok_or_else(|| QcastError::InvalidInput("Duration out of range".to_string()))
}

fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| QcastError::InvalidInput(format!("Could not parse time: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_minutes() {
        let scheduled = parse_schedule("30m").unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!((29..=31).contains(&diff), "Expected ~30 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_duration_hours() {
        let scheduled = parse_schedule("2h").unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!((119..=121).contains(&diff), "Expected ~120 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_absolute_format() {
        let scheduled = parse_schedule("2030-06-15 14:30").unwrap();
        let local = scheduled.with_timezone(&Local);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2030-06-15 14:30");
    }

    #[test]
    fn test_parse_tomorrow() {
        let scheduled = parse_schedule("tomorrow").unwrap();
        let diff = (scheduled - Utc::now()).num_hours();
        assert!((20..=28).contains(&diff), "Expected ~24 hours, got {}", diff);
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(parse_schedule("").is_err());
        assert!(parse_schedule("   ").is_err());
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(parse_schedule("whenever you feel like it").is_err());
    }

    #[test]
    fn test_ensure_future_accepts_future() {
        let now = Utc::now();
        assert!(ensure_future(now + Duration::minutes(5), now).is_ok());
    }

    #[test]
    fn test_ensure_future_rejects_past_and_present() {
        let now = Utc::now();
        assert!(ensure_future(now, now).is_err());
        assert!(ensure_future(now - Duration::seconds(1), now).is_err());
    }

    #[test]
    fn test_ensure_future_error_is_invalid_input() {
        let now = Utc::now();
        let err = ensure_future(now, now).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
