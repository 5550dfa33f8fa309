use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use drillbot_core::domain::conversation::{ChatMessage, Role};
use drillbot_core::domain::entitlement::{extended_expiry, is_active};
use drillbot_core::domain::user::{Mode, UserId, UserRecord};

use super::{EntitlementStore, HistoryStore, QuotaLedger, RepositoryError, UsageTotals};

#[derive(Default)]
pub struct InMemoryEntitlementStore {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

#[async_trait::async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get_or_create(
        &self,
        id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(users.entry(id).or_insert_with(|| UserRecord::new(id, now)).clone())
    }

    async fn find(&self, id: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn grant(
        &self,
        id: UserId,
        now: DateTime<Utc>,
        period_days: u32,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let mut users = self.users.write().await;
        let record = users.entry(id).or_insert_with(|| UserRecord::new(id, now));
        let new_expiry = extended_expiry(record.premium_until, now, period_days);
        record.premium_until = Some(new_expiry);
        record.updated_at = now;
        Ok(new_expiry)
    }

    async fn set_mode(
        &self,
        id: UserId,
        mode: Mode,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let record = users.entry(id).or_insert_with(|| UserRecord::new(id, now));
        record.mode = mode;
        record.updated_at = now;
        Ok(())
    }

    async fn user_count(&self) -> Result<u64, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.len() as u64)
    }

    async fn active_premium_count(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().filter(|record| is_active(record.premium_until, now)).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryQuotaLedger {
    counters: RwLock<HashMap<(UserId, NaiveDate), u32>>,
}

#[async_trait::async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn used_on(&self, id: UserId, day: NaiveDate) -> Result<u32, RepositoryError> {
        let counters = self.counters.read().await;
        Ok(counters.get(&(id, day)).copied().unwrap_or(0))
    }

    async fn record_use(
        &self,
        id: UserId,
        day: NaiveDate,
        _now: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let mut counters = self.counters.write().await;
        let count = counters.entry((id, day)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn totals_on(&self, day: NaiveDate) -> Result<UsageTotals, RepositoryError> {
        let counters = self.counters.read().await;
        let mut totals = UsageTotals::default();
        for ((_, counter_day), count) in counters.iter() {
            if *counter_day == day {
                totals.total_uses += u64::from(*count);
                totals.active_users += 1;
            }
        }
        Ok(totals)
    }
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    messages: RwLock<HashMap<UserId, Vec<ChatMessage>>>,
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load_recent(
        &self,
        id: UserId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let stored = messages.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        let skip = stored.len().saturating_sub(limit);
        Ok(stored[skip..].to_vec())
    }

    async fn append_exchange(
        &self,
        id: UserId,
        prompt: &str,
        reply: &str,
        _now: DateTime<Utc>,
        keep: usize,
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        let stored = messages.entry(id).or_default();
        stored.push(ChatMessage { role: Role::User, content: prompt.to_string() });
        stored.push(ChatMessage { role: Role::Assistant, content: reply.to_string() });
        if stored.len() > keep {
            stored.drain(..stored.len() - keep);
        }
        Ok(())
    }

    async fn clear(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.remove(&id);
        Ok(())
    }
}
