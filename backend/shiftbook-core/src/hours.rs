// src/hours.rs
use chrono::{DateTime, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// --- Constants ---

/// `HH:MM` on a 24-hour clock; the hour may be a single digit.
static TIME_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]?[0-9]|2[0-3]):[0-5][0-9]$").expect("time format pattern is valid")
});

const MINUTES_PER_DAY: i64 = 24 * 60;
const HOURS_DECIMAL_PLACES: u32 = 2;

pub const NO_VALID_DAYS: &str = "no valid days provided";

// --- Data Structures ---

/// One day of a weekly schedule as submitted by the employee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEntry {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_rest_day: bool,
    /// Declared by the caller, never derived from start/end.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub overtime_hours: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Result of running the hours calculation over a week of entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursSummary {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hours: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_overtime_hours: Decimal,
    pub errors: Option<Vec<String>>,
}

impl HoursSummary {
    fn rejected(message: &str) -> Self {
        Self {
            total_hours: Decimal::ZERO,
            total_overtime_hours: Decimal::ZERO,
            errors: Some(vec![message.to_string()]),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_none()
    }
}

/// Why a single entry could not be counted. Rendered as `Day <n>: <message>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("invalid time format")]
    InvalidTimeFormat,
    #[error("more than 24 hours in a day")]
    MoreThanOneDay,
    #[error("invalid date '{0}'")]
    InvalidDate(String),
    #[error("invalid time '{0}'")]
    InvalidTime(String),
    #[error("overtime total out of range")]
    OvertimeOutOfRange,
}

// --- Calculation ---

/// Computes worked hours and declared overtime for a week of day entries.
///
/// Entries are independent of each other: a failing entry contributes nothing
/// and is reported, and processing moves on to the next one. Rest days and
/// working days without both times are skipped without an error.
pub fn compute_totals(days: &[DayEntry]) -> HoursSummary {
    if days.is_empty() {
        return HoursSummary::rejected(NO_VALID_DAYS);
    }

    let mut total_minutes: i64 = 0;
    let mut total_overtime = Decimal::ZERO;
    let mut errors = Vec::new();

    for (index, day) in days.iter().enumerate() {
        let day_number = index + 1;
        match worked_time(day) {
            Ok(Some((minutes, overtime))) => match total_overtime.checked_add(overtime) {
                Some(sum) => {
                    total_minutes += minutes;
                    total_overtime = sum;
                }
                None => errors.push(format!(
                    "Day {}: {}",
                    day_number,
                    EntryError::OvertimeOutOfRange
                )),
            },
            Ok(None) => debug!("Day {}: not counted (rest day or missing times)", day_number),
            Err(e) => errors.push(format!("Day {}: {}", day_number, e)),
        }
    }

    HoursSummary {
        total_hours: minutes_to_hours(total_minutes),
        total_overtime_hours: total_overtime,
        errors: if errors.is_empty() { None } else { Some(errors) },
    }
}

/// Worked minutes and declared overtime of one entry, `None` if it does not count.
fn worked_time(day: &DayEntry) -> Result<Option<(i64, Decimal)>, EntryError> {
    if day.is_rest_day {
        return Ok(None);
    }

    let (start, end) = match (present(&day.start_time), present(&day.end_time)) {
        (Some(start), Some(end)) => (start, end),
        _ => return Ok(None),
    };

    if !is_valid_time_format(start) || !is_valid_time_format(end) {
        return Err(EntryError::InvalidTimeFormat);
    }

    if let Some(date) = present(&day.date) {
        parse_entry_date(date)?;
    }

    let start = parse_time_of_day(start)?;
    let end = parse_time_of_day(end)?;

    // Both times sit on the same reference day; a negative span crosses midnight.
    let mut minutes = (end - start).num_minutes();
    if minutes < 0 {
        minutes += MINUTES_PER_DAY;
    }
    if minutes > MINUTES_PER_DAY {
        return Err(EntryError::MoreThanOneDay);
    }

    Ok(Some((minutes, day.overtime_hours.unwrap_or(Decimal::ZERO))))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub fn is_valid_time_format(value: &str) -> bool {
    TIME_FORMAT.is_match(value)
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime, EntryError> {
    let invalid = || EntryError::InvalidTime(value.to_string());
    let (hours, minutes) = value.split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (browsers send the latter).
pub fn parse_entry_date(value: &str) -> Result<NaiveDate, EntryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map_err(|_| EntryError::InvalidDate(value.to_string()))
}

/// Converts whole minutes to hours, rounded half away from zero to 2 places.
pub fn minutes_to_hours(minutes: i64) -> Decimal {
    (Decimal::from(minutes) / Decimal::from(60))
        .round_dp_with_strategy(HOURS_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

// Builders used by tests across the crate
#[cfg(test)]
impl DayEntry {
    pub fn shift(start: &str, end: &str) -> Self {
        DayEntry {
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
            ..Default::default()
        }
    }

    pub fn rest() -> Self {
        DayEntry {
            is_rest_day: true,
            ..Default::default()
        }
    }

    pub fn overtime(mut self, hours: Decimal) -> Self {
        self.overtime_hours = Some(hours);
        self
    }

    pub fn on(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }

    pub fn notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}
