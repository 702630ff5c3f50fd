// src/schedule.rs
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hours::{compute_totals, DayEntry, HoursSummary};
use crate::store::{ScheduleStore, StoreError, UserStore};

// --- Constants ---

pub const MAX_DAYS_PER_WEEK: usize = 7;
pub const MAX_NOTES_CHARS: usize = 200;
pub const DEFAULT_MIN_YEAR: i32 = 2020;
pub const DEFAULT_MAX_YEAR: i32 = 2100;

// --- Data Structures ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Draft => "draft",
            ScheduleStatus::Submitted => "submitted",
            ScheduleStatus::Approved => "approved",
            ScheduleStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ScheduleStatus::Draft),
            "submitted" => Ok(ScheduleStatus::Submitted),
            "approved" => Ok(ScheduleStatus::Approved),
            "rejected" => Ok(ScheduleStatus::Rejected),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// One employee's schedule for one ISO week. Totals are always derived from `days`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSchedule {
    pub id: Uuid,
    pub owner_id: String,
    pub iso_week: u32,
    pub year: i32,
    pub days: Vec<DayEntry>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hours: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_overtime_hours: Decimal,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeekSchedule {
    fn apply_totals(&mut self, summary: &HoursSummary) {
        self.total_hours = summary.total_hours;
        self.total_overtime_hours = summary.total_overtime_hours;
    }
}

/// Accepted range of schedule years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRules {
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for ScheduleRules {
    fn default() -> Self {
        Self {
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
        }
    }
}

// --- Errors ---

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("A schedule for week {iso_week} of {year} already exists")]
    Duplicate { iso_week: u32, year: i32 },

    #[error("Schedule not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

// --- Service ---

pub struct ScheduleService {
    schedules: Arc<dyn ScheduleStore>,
    users: Arc<dyn UserStore>,
    rules: ScheduleRules,
}

impl ScheduleService {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        users: Arc<dyn UserStore>,
        rules: ScheduleRules,
    ) -> Self {
        Self {
            schedules,
            users,
            rules,
        }
    }

    pub async fn create_schedule(
        &self,
        owner_id: &str,
        iso_week: u32,
        year: i32,
        days: Vec<DayEntry>,
    ) -> Result<WeekSchedule, ScheduleError> {
        info!(
            "Creating schedule for {} (week {} of {}, {} days)",
            owner_id,
            iso_week,
            year,
            days.len()
        );
        self.validate_week(iso_week, year)?;

        if self
            .schedules
            .find_schedule_for_week(owner_id, iso_week, year)
            .await?
            .is_some()
        {
            warn!(
                "Schedule for week {} of {} already exists for {}",
                iso_week, year, owner_id
            );
            return Err(ScheduleError::Duplicate { iso_week, year });
        }

        let summary = prepare_days(&days)?;
        let now = Utc::now();
        let mut schedule = WeekSchedule {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            iso_week,
            year,
            days,
            total_hours: Decimal::ZERO,
            total_overtime_hours: Decimal::ZERO,
            status: ScheduleStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        schedule.apply_totals(&summary);

        match self.schedules.insert_schedule(&schedule).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(detail)) => {
                // Lost a race with a concurrent create for the same week
                warn!("Insert rejected by unique constraint: {}", detail);
                return Err(ScheduleError::Duplicate { iso_week, year });
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.users.set_current_schedule(owner_id, schedule.id).await {
            warn!(
                "Schedule {} created but current schedule of {} was not updated: {}",
                schedule.id, owner_id, e
            );
        }

        info!(
            "Created schedule {} with {} hours ({} overtime)",
            schedule.id, schedule.total_hours, schedule.total_overtime_hours
        );
        Ok(schedule)
    }

    /// Replaces the days of an owned schedule. Week and year never change.
    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        owner_id: &str,
        days: Vec<DayEntry>,
    ) -> Result<WeekSchedule, ScheduleError> {
        info!("Updating schedule {} for {}", schedule_id, owner_id);
        let mut schedule = self
            .schedules
            .find_owned_schedule(schedule_id, owner_id)
            .await?
            .ok_or(ScheduleError::NotFound)?;

        let summary = prepare_days(&days)?;
        schedule.days = days;
        schedule.apply_totals(&summary);
        schedule.updated_at = Utc::now();

        self.save(schedule).await
    }

    /// Re-derives stored totals from stored days. Not scoped to an owner.
    pub async fn recalculate(&self, schedule_id: Uuid) -> Result<WeekSchedule, ScheduleError> {
        info!("Recalculating schedule {}", schedule_id);
        let schedule = self
            .schedules
            .find_schedule(schedule_id)
            .await?
            .ok_or(ScheduleError::NotFound)?;
        self.recompute(schedule).await
    }

    pub async fn recalculate_owned(
        &self,
        schedule_id: Uuid,
        owner_id: &str,
    ) -> Result<WeekSchedule, ScheduleError> {
        info!("Recalculating schedule {} for {}", schedule_id, owner_id);
        let schedule = self
            .schedules
            .find_owned_schedule(schedule_id, owner_id)
            .await?
            .ok_or(ScheduleError::NotFound)?;
        self.recompute(schedule).await
    }

    pub async fn delete_schedule(
        &self,
        schedule_id: Uuid,
        owner_id: &str,
    ) -> Result<(), ScheduleError> {
        info!("Deleting schedule {} for {}", schedule_id, owner_id);
        if !self
            .schedules
            .delete_owned_schedule(schedule_id, owner_id)
            .await?
        {
            return Err(ScheduleError::NotFound);
        }

        match self.users.clear_current_schedule(owner_id, schedule_id).await {
            Ok(true) => debug!("Cleared current schedule of {}", owner_id),
            Ok(false) => debug!("Current schedule of {} pointed elsewhere", owner_id),
            Err(e) => warn!(
                "Schedule {} deleted but current schedule of {} was not cleared: {}",
                schedule_id, owner_id, e
            ),
        }
        Ok(())
    }

    pub async fn get_schedule(
        &self,
        schedule_id: Uuid,
        owner_id: &str,
    ) -> Result<WeekSchedule, ScheduleError> {
        self.schedules
            .find_owned_schedule(schedule_id, owner_id)
            .await?
            .ok_or(ScheduleError::NotFound)
    }

    pub async fn list_schedules(&self, owner_id: &str) -> Result<Vec<WeekSchedule>, ScheduleError> {
        let schedules = self.schedules.list_schedules(owner_id).await?;
        debug!("Found {} schedules for {}", schedules.len(), owner_id);
        Ok(schedules)
    }

    pub async fn set_status(
        &self,
        schedule_id: Uuid,
        owner_id: &str,
        status: ScheduleStatus,
    ) -> Result<WeekSchedule, ScheduleError> {
        info!("Setting schedule {} to {}", schedule_id, status);
        let mut schedule = self
            .schedules
            .find_owned_schedule(schedule_id, owner_id)
            .await?
            .ok_or(ScheduleError::NotFound)?;

        schedule.status = status;
        schedule.updated_at = Utc::now();
        self.save(schedule).await
    }

    /// Computes totals without storing anything. Problems come back in `errors`.
    pub fn preview(&self, days: &[DayEntry]) -> HoursSummary {
        debug!("Previewing {} days", days.len());
        check_days(days)
    }

    /// Checks the week number and year against the configured rules and the ISO calendar.
    pub fn validate_week(&self, iso_week: u32, year: i32) -> Result<(), ScheduleError> {
        let mut errors = Vec::new();
        if !(1..=53).contains(&iso_week) {
            errors.push(format!(
                "isoWeek must be between 1 and 53 (53 only in years with 53 ISO weeks), got {}",
                iso_week
            ));
        }
        if year < self.rules.min_year || year > self.rules.max_year {
            errors.push(format!(
                "year must be between {} and {}, got {}",
                self.rules.min_year, self.rules.max_year, year
            ));
        }
        if errors.is_empty() && NaiveDate::from_isoywd_opt(year, iso_week, Weekday::Mon).is_none()
        {
            // Dec 28 always falls in the last ISO week of its year
            let weeks = NaiveDate::from_ymd_opt(year, 12, 28).map_or(52, |d| d.iso_week().week());
            errors.push(format!(
                "isoWeek {} does not exist in {}, which has only {} ISO weeks",
                iso_week, year, weeks
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScheduleError::Validation(errors))
        }
    }

    async fn recompute(&self, mut schedule: WeekSchedule) -> Result<WeekSchedule, ScheduleError> {
        let summary = prepare_days(&schedule.days)?;
        schedule.apply_totals(&summary);
        schedule.updated_at = Utc::now();
        self.save(schedule).await
    }

    async fn save(&self, schedule: WeekSchedule) -> Result<WeekSchedule, ScheduleError> {
        // The row may have been deleted between the read and this write
        if !self.schedules.update_schedule(&schedule).await? {
            return Err(ScheduleError::NotFound);
        }
        Ok(schedule)
    }
}

/// The single gate every write goes through: field checks, then the hours calculation.
pub fn prepare_days(days: &[DayEntry]) -> Result<HoursSummary, ScheduleError> {
    let mut summary = check_days(days);
    match summary.errors.take() {
        None => Ok(summary),
        Some(errors) => {
            debug!("Rejected days: {:?}", errors);
            Err(ScheduleError::Validation(errors))
        }
    }
}

/// Field errors first, then calculation errors, each group in day order.
pub fn check_days(days: &[DayEntry]) -> HoursSummary {
    let field_errors = validate_fields(days);
    let mut summary = compute_totals(days);
    if !field_errors.is_empty() {
        let mut errors = field_errors;
        errors.extend(summary.errors.take().unwrap_or_default());
        summary.errors = Some(errors);
    }
    summary
}

fn validate_fields(days: &[DayEntry]) -> Vec<String> {
    let mut errors = Vec::new();
    if days.len() > MAX_DAYS_PER_WEEK {
        errors.push(format!(
            "a week holds at most {} days, got {}",
            MAX_DAYS_PER_WEEK,
            days.len()
        ));
    }

    for (index, day) in days.iter().enumerate() {
        if let Some(notes) = &day.notes {
            if notes.chars().count() > MAX_NOTES_CHARS {
                errors.push(format!(
                    "Day {}: notes must be at most {} characters",
                    index + 1,
                    MAX_NOTES_CHARS
                ));
            }
        }
        if let Some(overtime) = day.overtime_hours {
            if overtime.is_sign_negative() && !overtime.is_zero() {
                errors.push(format!("Day {}: overtime hours must not be negative", index + 1));
            }
        }
    }
    errors
}
