//! Journal date keys (`YYYYMMDD` integers) and calendar arithmetic.

use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::error::{BridgeError, Result};

/// Date for a `YYYYMMDD` key.
pub fn parse_date_key(key: u32) -> Result<NaiveDate> {
    let year = (key / 10_000) as i32;
    let month = (key / 100) % 100;
    let day = key % 100;
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| BridgeError::InvalidInput(format!("{} is not a valid YYYYMMDD date", key)))
}

pub fn to_date_key(date: NaiveDate) -> u32 {
    date.year() as u32 * 10_000 + date.month() * 100 + date.day()
}

/// Shift a date key by `days` (negative goes backwards).
pub fn add_days(key: u32, days: i64) -> Result<u32> {
    let date = parse_date_key(key)?;
    date.checked_add_signed(Duration::days(days))
        .map(to_date_key)
        .ok_or_else(|| BridgeError::InvalidInput(format!("{} + {} days is out of range", key, days)))
}

/// Today's key in local time.
pub fn today_key() -> u32 {
    to_date_key(Local::now().date_naive())
}

/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, `today`, `yesterday` and `tomorrow`.
pub fn parse_date_input(input: &str) -> Result<u32> {
    let trimmed = input.trim();
    match trimmed.to_lowercase().as_str() {
        "today" => return Ok(today_key()),
        "yesterday" => return add_days(today_key(), -1),
        "tomorrow" => return add_days(today_key(), 1),
        _ => {}
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(to_date_key(date));
    }
    if trimmed.len() == 8 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        let key: u32 = trimmed
            .parse()
            .map_err(|_| BridgeError::InvalidInput(format!("invalid date: {}", input)))?;
        parse_date_key(key)?;
        return Ok(key);
    }
    Err(BridgeError::InvalidInput(format!(
        "invalid date '{}', expected YYYY-MM-DD or YYYYMMDD",
        input
    )))
}

/// `YYYY-MM-DD` rendering of a key.
pub fn format_date_key(key: u32) -> Result<String> {
    Ok(parse_date_key(key)?.format("%Y-%m-%d").to_string())
}

/// Default Logseq journal title, e.g. `Nov 30th, 2025`.
pub fn journal_title(key: u32) -> Result<String> {
    let date = parse_date_key(key)?;
    let day = date.day();
    let suffix = match (day % 10, day % 100) {
        (1, n) if n != 11 => "st",
        (2, n) if n != 12 => "nd",
        (3, n) if n != 13 => "rd",
        _ => "th",
    };
    Ok(format!("{} {}{}, {}", date.format("%b"), day, suffix, date.year()))
}
