// src/store.rs
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::User;
use crate::hours::DayEntry;
use crate::schedule::{ScheduleStatus, WeekSchedule};

// --- Errors ---

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Failed to encode record: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation(db.message().to_string())
        }
        _ => StoreError::Database(e),
    }
}

// --- Traits ---

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert_schedule(&self, schedule: &WeekSchedule) -> Result<(), StoreError>;

    /// Overwrites days, totals and status. Returns false if no owned row matched.
    async fn update_schedule(&self, schedule: &WeekSchedule) -> Result<bool, StoreError>;

    async fn find_schedule(&self, id: Uuid) -> Result<Option<WeekSchedule>, StoreError>;

    async fn find_owned_schedule(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<WeekSchedule>, StoreError>;

    async fn find_schedule_for_week(
        &self,
        owner_id: &str,
        iso_week: u32,
        year: i32,
    ) -> Result<Option<WeekSchedule>, StoreError>;

    /// Newest week first.
    async fn list_schedules(&self, owner_id: &str) -> Result<Vec<WeekSchedule>, StoreError>;

    async fn delete_owned_schedule(&self, id: Uuid, owner_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn upsert_user(&self, id: &str, email: &str) -> Result<User, StoreError>;

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn set_current_schedule(&self, user_id: &str, schedule_id: Uuid)
        -> Result<(), StoreError>;

    /// Clears the cached reference only if it still points at `schedule_id`.
    async fn clear_current_schedule(
        &self,
        user_id: &str,
        schedule_id: Uuid,
    ) -> Result<bool, StoreError>;
}

// --- Rows ---

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: String,
    owner_id: String,
    iso_week: i64,
    year: i64,
    days: String,
    total_hours: String,
    total_overtime_hours: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for WeekSchedule {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: row.id.clone(),
            reason,
        };

        let id = Uuid::parse_str(&row.id).map_err(|e| corrupt(format!("id: {}", e)))?;
        let iso_week =
            u32::try_from(row.iso_week).map_err(|e| corrupt(format!("iso_week: {}", e)))?;
        let year = i32::try_from(row.year).map_err(|e| corrupt(format!("year: {}", e)))?;
        let days: Vec<DayEntry> =
            serde_json::from_str(&row.days).map_err(|e| corrupt(format!("days: {}", e)))?;
        let total_hours = Decimal::from_str(&row.total_hours)
            .map_err(|e| corrupt(format!("total_hours: {}", e)))?;
        let total_overtime_hours = Decimal::from_str(&row.total_overtime_hours)
            .map_err(|e| corrupt(format!("total_overtime_hours: {}", e)))?;
        let status = ScheduleStatus::from_str(&row.status).map_err(corrupt)?;

        Ok(WeekSchedule {
            id,
            owner_id: row.owner_id,
            iso_week,
            year,
            days,
            total_hours,
            total_overtime_hours,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    email: String,
    current_schedule_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let current_schedule_id = row
            .current_schedule_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| StoreError::Corrupt {
                id: row.id.clone(),
                reason: format!("current_schedule_id: {}", e),
            })?;

        Ok(User {
            id: row.id,
            email: row.email,
            current_schedule_id,
            created_at: row.created_at,
        })
    }
}

// --- SQLite implementation ---

/// Both stores backed by a single SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `database_url` and runs migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Opening database {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// A private in-memory database. One connection, kept alive for the pool's lifetime.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Migrations applied");
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for SqliteStore {
    async fn insert_schedule(&self, schedule: &WeekSchedule) -> Result<(), StoreError> {
        let days = serde_json::to_string(&schedule.days)?;

        sqlx::query(
            "INSERT INTO week_schedules \
             (id, owner_id, iso_week, year, days, total_hours, total_overtime_hours, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(schedule.id.to_string())
        .bind(&schedule.owner_id)
        .bind(i64::from(schedule.iso_week))
        .bind(i64::from(schedule.year))
        .bind(days)
        .bind(schedule.total_hours.to_string())
        .bind(schedule.total_overtime_hours.to_string())
        .bind(schedule.status.as_str())
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn update_schedule(&self, schedule: &WeekSchedule) -> Result<bool, StoreError> {
        let days = serde_json::to_string(&schedule.days)?;

        let result = sqlx::query(
            "UPDATE week_schedules \
             SET days = ?1, total_hours = ?2, total_overtime_hours = ?3, status = ?4, updated_at = ?5 \
             WHERE id = ?6 AND owner_id = ?7",
        )
        .bind(days)
        .bind(schedule.total_hours.to_string())
        .bind(schedule.total_overtime_hours.to_string())
        .bind(schedule.status.as_str())
        .bind(schedule.updated_at)
        .bind(schedule.id.to_string())
        .bind(&schedule.owner_id)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_schedule(&self, id: Uuid) -> Result<Option<WeekSchedule>, StoreError> {
        sqlx::query_as::<_, ScheduleRow>("SELECT * FROM week_schedules WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(WeekSchedule::try_from)
            .transpose()
    }

    async fn find_owned_schedule(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<WeekSchedule>, StoreError> {
        sqlx::query_as::<_, ScheduleRow>(
            "SELECT * FROM week_schedules WHERE id = ?1 AND owner_id = ?2",
        )
        .bind(id.to_string())
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .map(WeekSchedule::try_from)
        .transpose()
    }

    async fn find_schedule_for_week(
        &self,
        owner_id: &str,
        iso_week: u32,
        year: i32,
    ) -> Result<Option<WeekSchedule>, StoreError> {
        sqlx::query_as::<_, ScheduleRow>(
            "SELECT * FROM week_schedules WHERE owner_id = ?1 AND iso_week = ?2 AND year = ?3",
        )
        .bind(owner_id)
        .bind(i64::from(iso_week))
        .bind(i64::from(year))
        .fetch_optional(&self.pool)
        .await?
        .map(WeekSchedule::try_from)
        .transpose()
    }

    async fn list_schedules(&self, owner_id: &str) -> Result<Vec<WeekSchedule>, StoreError> {
        sqlx::query_as::<_, ScheduleRow>(
            "SELECT * FROM week_schedules WHERE owner_id = ?1 ORDER BY year DESC, iso_week DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(WeekSchedule::try_from)
        .collect()
    }

    async fn delete_owned_schedule(&self, id: Uuid, owner_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM week_schedules WHERE id = ?1 AND owner_id = ?2")
            .bind(id.to_string())
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn upsert_user(&self, id: &str, email: &str) -> Result<User, StoreError> {
        sqlx::query(
            "INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET email = excluded.email",
        )
        .bind(id)
        .bind(email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.find_user(id).await?.ok_or_else(|| StoreError::Corrupt {
            id: id.to_string(),
            reason: "user row missing right after upsert".to_string(),
        })
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn set_current_schedule(
        &self,
        user_id: &str,
        schedule_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET current_schedule_id = ?1 WHERE id = ?2")
            .bind(schedule_id.to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_current_schedule(
        &self,
        user_id: &str,
        schedule_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET current_schedule_id = NULL WHERE id = ?1 AND current_schedule_id = ?2",
        )
        .bind(user_id)
        .bind(schedule_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
