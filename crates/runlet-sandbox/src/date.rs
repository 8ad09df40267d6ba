//! Date helpers exposed to sandbox code as `utils.date`.
//!
//! Interprets human-entered dates against the caller's time zone and
//! normalizes them to UTC for consistent downstream querying. Accepted
//! forms: RFC 3339, a handful of explicit calendar formats, and the
//! relative words `now`, `today`, `tomorrow`, `yesterday` with an
//! optional `at HH:MM` suffix.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Calendar formats tried in order for explicit date input.
const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a single human-entered date in the given time zone.
///
/// Returns `None` when the input is empty or unparseable.
pub fn parse_date(input: &str, tz_name: &str) -> Option<DateTime<Utc>> {
    parse_date_at(input, tz_name, Utc::now())
}

/// [`parse_date`] with an explicit reference instant, for tests.
pub fn parse_date_at(input: &str, tz_name: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz: Tz = tz_name.parse().unwrap_or(Tz::UTC);
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input, format) {
            return local_to_utc(&tz, naive);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return local_to_utc(&tz, date.and_hms_opt(0, 0, 0)?);
        }
    }

    parse_relative(input, &tz, now)
}

/// Parse a start/end pair and adjust both to UTC.
///
/// If the end is not after the start, the end becomes the last instant of
/// the start's UTC day (original behavior for single-day ranges).
pub fn parse_start_and_end(
    start_input: &str,
    end_input: &str,
    tz_name: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    parse_start_and_end_at(start_input, end_input, tz_name, Utc::now())
}

/// [`parse_start_and_end`] with an explicit reference instant, for tests.
pub fn parse_start_and_end_at(
    start_input: &str,
    end_input: &str,
    tz_name: &str,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    if start_input.trim().is_empty() || end_input.trim().is_empty() {
        return Err("Start and end inputs must be provided.".to_string());
    }

    let start = parse_date_at(start_input, tz_name, now);
    let end = parse_date_at(end_input, tz_name, now);

    let (start, mut end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err("Invalid date input. Please check your start and end inputs.".to_string())
        }
    };

    if end <= start {
        end = Utc
            .with_ymd_and_hms(start.year(), start.month(), start.day(), 23, 59, 59)
            .single()
            .ok_or_else(|| "Invalid date input. Please check your start and end inputs.".to_string())?
            + Duration::milliseconds(999);
    }

    Ok((start, end))
}

/// Relative words, optionally followed by `at HH:MM`.
fn parse_relative(input: &str, tz: &Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = input.to_ascii_lowercase();
    if lower == "now" {
        return Some(now);
    }

    let (word, time) = match lower.split_once(" at ") {
        Some((word, rest)) => (
            word.trim(),
            Some(NaiveTime::parse_from_str(rest.trim(), "%H:%M").ok()?),
        ),
        None => (lower.as_str(), None),
    };

    let local_today = now.with_timezone(tz).date_naive();
    let date = match word {
        "today" => local_today,
        "tomorrow" => local_today.succ_opt()?,
        "yesterday" => local_today.pred_opt()?,
        _ => return None,
    };

    let naive = date.and_time(time.unwrap_or(NaiveTime::MIN));
    local_to_utc(tz, naive)
}

/// Resolve a naive local timestamp in `tz`, tolerating DST gaps by taking
/// the earliest valid instant.
fn local_to_utc(tz: &Tz, naive: chrono::NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
