use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use drillbot_core::domain::entitlement::extended_expiry;
use drillbot_core::domain::user::{Mode, UserId, UserRecord};

use super::{parse_optional_timestamp, parse_timestamp, EntitlementStore, RepositoryError};
use crate::DbPool;

pub struct SqlEntitlementStore {
    pool: DbPool,
}

impl SqlEntitlementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EntitlementStore for SqlEntitlementStore {
    async fn get_or_create(
        &self,
        id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, mode, premium_until, created_at, updated_at)
             VALUES (?, ?, NULL, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id.0)
        .bind(Mode::default().as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, mode, premium_until, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id.0)
        .fetch_one(&self.pool)
        .await?;

        user_from_row(row)
    }

    async fn find(&self, id: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, mode, premium_until, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn grant(
        &self,
        id: UserId,
        now: DateTime<Utc>,
        period_days: u32,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT premium_until FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;

        let premium_until = match existing {
            Some(row) => {
                parse_optional_timestamp("premium_until", row.try_get("premium_until")?)?
            }
            None => {
                sqlx::query(
                    "INSERT INTO users (id, mode, premium_until, created_at, updated_at)
                     VALUES (?, ?, NULL, ?, ?)",
                )
                .bind(id.0)
                .bind(Mode::default().as_str())
                .bind(now.to_rfc3339())
                .bind(now.to_rfc3339())
                .execute(&mut *tx)
                .await?;
                None
            }
        };

        let new_expiry = extended_expiry(premium_until, now, period_days);

        sqlx::query("UPDATE users SET premium_until = ?, updated_at = ? WHERE id = ?")
            .bind(new_expiry.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(new_expiry)
    }

    async fn set_mode(
        &self,
        id: UserId,
        mode: Mode,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, mode, premium_until, created_at, updated_at)
             VALUES (?, ?, NULL, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                mode = excluded.mode,
                updated_at = excluded.updated_at",
        )
        .bind(id.0)
        .bind(mode.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn user_count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users").fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn active_premium_count(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM users
             WHERE premium_until IS NOT NULL AND premium_until > ?",
        )
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }
}

fn user_from_row(row: SqliteRow) -> Result<UserRecord, RepositoryError> {
    let mode_raw = row.try_get::<String, _>("mode")?;
    let mode = Mode::parse(&mode_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown user mode `{mode_raw}`")))?;

    Ok(UserRecord {
        id: UserId(row.try_get("id")?),
        mode,
        premium_until: parse_optional_timestamp("premium_until", row.try_get("premium_until")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
