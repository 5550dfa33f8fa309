use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use drillbot_core::domain::conversation::ChatMessage;
use drillbot_core::domain::user::{Mode, UserId, UserRecord};

pub mod entitlements;
pub mod history;
pub mod memory;
pub mod usage;

pub use entitlements::SqlEntitlementStore;
pub use history::SqlHistoryStore;
pub use memory::{InMemoryEntitlementStore, InMemoryHistoryStore, InMemoryQuotaLedger};
pub use usage::{SqlQuotaLedger, UsageTotals};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable per-user entitlement state: the stored tier toggle and the premium
/// expiry. Rows are created implicitly on first reference and never deleted.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn get_or_create(
        &self,
        id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, RepositoryError>;

    async fn find(&self, id: UserId) -> Result<Option<UserRecord>, RepositoryError>;

    /// Extends the premium expiry by `period_days` and returns the new
    /// expiry. A still-valid expiry is stacked on; a lapsed or absent one
    /// restarts from `now`. Creates the user row when missing.
    async fn grant(
        &self,
        id: UserId,
        now: DateTime<Utc>,
        period_days: u32,
    ) -> Result<DateTime<Utc>, RepositoryError>;

    async fn set_mode(
        &self,
        id: UserId,
        mode: Mode,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn user_count(&self) -> Result<u64, RepositoryError>;

    async fn active_premium_count(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Per-user, per-day counters of metered completions. `day` always comes from
/// the engine clock in the reference time zone, never from callers.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    async fn used_on(&self, id: UserId, day: NaiveDate) -> Result<u32, RepositoryError>;

    /// Atomic increment with create-if-absent semantics. Returns the count
    /// after the increment.
    async fn record_use(
        &self,
        id: UserId,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    /// Aggregate metered usage across all users on `day`.
    async fn totals_on(&self, day: NaiveDate) -> Result<UsageTotals, RepositoryError>;
}

/// Optional durable copy of a user's dialogue window. The context service is
/// the only writer; the stored shape is the exact committed message list.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent `limit` dialogue messages, oldest first.
    async fn load_recent(
        &self,
        id: UserId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// Appends one committed exchange and prunes the user's rows down to the
    /// `keep` most recent, mirroring the in-memory window cap.
    async fn append_exchange(
        &self,
        id: UserId,
        prompt: &str,
        reply: &str,
        now: DateTime<Utc>,
        keep: usize,
    ) -> Result<(), RepositoryError>;

    async fn clear(&self, id: UserId) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}
