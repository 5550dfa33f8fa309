use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use drillbot_core::domain::user::UserId;

use super::{parse_u32, QuotaLedger, RepositoryError};
use crate::DbPool;

/// Aggregate meter readings for one calendar day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub total_uses: u64,
    pub active_users: u64,
}

pub struct SqlQuotaLedger {
    pool: DbPool,
}

impl SqlQuotaLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuotaLedger for SqlQuotaLedger {
    async fn used_on(&self, id: UserId, day: NaiveDate) -> Result<u32, RepositoryError> {
        let row = sqlx::query("SELECT count FROM usage WHERE user_id = ? AND day = ?")
            .bind(id.0)
            .bind(day.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => parse_u32("count", row.try_get("count")?),
            None => Ok(0),
        }
    }

    async fn record_use(
        &self,
        id: UserId,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO usage (user_id, day, count, updated_at)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(user_id, day) DO UPDATE SET
                count = count + 1,
                updated_at = excluded.updated_at",
        )
        .bind(id.0)
        .bind(day.to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT count FROM usage WHERE user_id = ? AND day = ?")
            .bind(id.0)
            .bind(day.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let count = parse_u32("count", row.try_get("count")?)?;

        tx.commit().await?;
        Ok(count)
    }

    async fn totals_on(&self, day: NaiveDate) -> Result<UsageTotals, RepositoryError> {
        let row = sqlx::query(
            "SELECT IFNULL(SUM(count), 0) AS total_uses, COUNT(*) AS active_users
             FROM usage
             WHERE day = ?",
        )
        .bind(day.to_string())
        .fetch_one(&self.pool)
        .await?;

        let total_uses: i64 = row.try_get("total_uses")?;
        let active_users: i64 = row.try_get("active_users")?;

        Ok(UsageTotals {
            total_uses: total_uses.max(0) as u64,
            active_users: active_users.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use drillbot_core::domain::user::UserId;

    use super::{SqlQuotaLedger, UsageTotals};
    use crate::migrations;
    use crate::repositories::{EntitlementStore, QuotaLedger, SqlEntitlementStore};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn register_user(pool: &DbPool, id: UserId, now: DateTime<Utc>) {
        SqlEntitlementStore::new(pool.clone())
            .get_or_create(id, now)
            .await
            .expect("register user");
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn day(value: &str) -> NaiveDate {
        value.parse().expect("valid date")
    }

    #[tokio::test]
    async fn record_use_creates_then_increments() {
        let pool = setup_pool().await;
        let now = parse_ts("2025-03-10T12:00:00Z");
        register_user(&pool, UserId(1), now).await;

        let ledger = SqlQuotaLedger::new(pool.clone());
        let today = day("2025-03-10");

        assert_eq!(ledger.used_on(UserId(1), today).await.expect("fresh meter"), 0);
        assert_eq!(ledger.record_use(UserId(1), today, now).await.expect("first use"), 1);
        assert_eq!(ledger.record_use(UserId(1), today, now).await.expect("second use"), 2);
        assert_eq!(ledger.used_on(UserId(1), today).await.expect("read meter"), 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn day_rollover_leaves_the_prior_day_immutable() {
        let pool = setup_pool().await;
        let now = parse_ts("2025-03-10T12:00:00Z");
        register_user(&pool, UserId(1), now).await;

        let ledger = SqlQuotaLedger::new(pool.clone());
        let monday = day("2025-03-10");
        let tuesday = day("2025-03-11");

        ledger.record_use(UserId(1), monday, now).await.expect("monday use");
        ledger.record_use(UserId(1), tuesday, now).await.expect("tuesday use");
        ledger.record_use(UserId(1), tuesday, now).await.expect("tuesday again");

        assert_eq!(ledger.used_on(UserId(1), monday).await.expect("monday meter"), 1);
        assert_eq!(ledger.used_on(UserId(1), tuesday).await.expect("tuesday meter"), 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn totals_aggregate_across_users_for_one_day() {
        let pool = setup_pool().await;
        let now = parse_ts("2025-03-10T12:00:00Z");
        register_user(&pool, UserId(1), now).await;
        register_user(&pool, UserId(2), now).await;

        let ledger = SqlQuotaLedger::new(pool.clone());
        let today = day("2025-03-10");

        ledger.record_use(UserId(1), today, now).await.expect("use");
        ledger.record_use(UserId(1), today, now).await.expect("use");
        ledger.record_use(UserId(2), today, now).await.expect("use");

        let totals = ledger.totals_on(today).await.expect("totals");
        assert_eq!(totals, UsageTotals { total_uses: 3, active_users: 2 });

        let empty = ledger.totals_on(day("2025-03-11")).await.expect("empty totals");
        assert_eq!(empty, UsageTotals::default());

        pool.close().await;
    }
}
