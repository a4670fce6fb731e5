//! Date and Time Parsing
//!
//! Strict parsers for the two user-supplied time formats: `dd.mm.yyyy` due
//! dates typed into `/add`, and `HH:MM` trigger times from the config file.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::{NotifierError, Result};

/// Parse a `day.month.year` date
///
/// Exactly three dot-separated groups of ASCII digits forming a valid
/// Gregorian date. Anything else fails with [`NotifierError::InvalidDateFormat`].
///
/// # Errors
///
/// Returns [`NotifierError::InvalidDateFormat`] on any malformed input.
pub fn parse_due_date(input: &str) -> Result<NaiveDate> {
    let invalid = || NotifierError::InvalidDateFormat(input.to_string());

    let parts: Vec<&str> = input.split('.').collect();
    let [day, month, year] = parts.as_slice() else {
        return Err(invalid());
    };

    let day: u32 = parse_digits(day).ok_or_else(invalid)?;
    let month: u32 = parse_digits(month).ok_or_else(invalid)?;
    let year: i32 = parse_digits(year).ok_or_else(invalid)?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Parse an `HH:MM` trigger time (24-hour clock)
///
/// # Errors
///
/// Returns [`NotifierError::InvalidTriggerTime`] on any malformed input.
pub fn parse_trigger_time(input: &str) -> Result<NaiveTime> {
    let invalid = || NotifierError::InvalidTriggerTime(input.to_string());

    let (hour, minute) = input.split_once(':').ok_or_else(invalid)?;
    if hour.len() != 2 || minute.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = parse_digits(hour).ok_or_else(invalid)?;
    let minute: u32 = parse_digits(minute).ok_or_else(invalid)?;

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Render a date the way users type it
#[must_use]
pub fn format_due_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Serialize a due date in the board service's date-time form
///
/// The card is due at midnight UTC on the given date.
#[must_use]
pub fn due_timestamp(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

/// Parse a board service timestamp (RFC 3339)
#[must_use]
pub fn parse_board_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a non-empty run of ASCII digits
fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
