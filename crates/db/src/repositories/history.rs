use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use drillbot_core::domain::conversation::{ChatMessage, Role};
use drillbot_core::domain::user::UserId;

use super::{HistoryStore, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryStore {
    pool: DbPool,
}

impl SqlHistoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HistoryStore for SqlHistoryStore {
    async fn load_recent(
        &self,
        id: UserId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, content FROM conversation_messages
             WHERE user_id = ?
             ORDER BY seq DESC
             LIMIT ?",
        )
        .bind(id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages =
            rows.into_iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn append_exchange(
        &self,
        id: UserId,
        prompt: &str,
        reply: &str,
        now: DateTime<Utc>,
        keep: usize,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (role, content) in [(Role::User, prompt), (Role::Assistant, reply)] {
            sqlx::query(
                "INSERT INTO conversation_messages (user_id, role, content, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id.0)
            .bind(role.as_str())
            .bind(content)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "DELETE FROM conversation_messages
             WHERE user_id = ? AND seq NOT IN (
                SELECT seq FROM conversation_messages
                WHERE user_id = ?
                ORDER BY seq DESC
                LIMIT ?)",
        )
        .bind(id.0)
        .bind(id.0)
        .bind(keep as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM conversation_messages WHERE user_id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn message_from_row(row: SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role_raw}`")))?;

    Ok(ChatMessage { role, content: row.try_get("content")? })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use drillbot_core::domain::conversation::ChatMessage;
    use drillbot_core::domain::user::UserId;

    use super::SqlHistoryStore;
    use crate::migrations;
    use crate::repositories::{EntitlementStore, HistoryStore, SqlEntitlementStore};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    async fn register_user(pool: &DbPool, id: UserId, now: DateTime<Utc>) {
        SqlEntitlementStore::new(pool.clone())
            .get_or_create(id, now)
            .await
            .expect("register user");
    }

    #[tokio::test]
    async fn exchanges_round_trip_oldest_first() {
        let pool = setup_pool().await;
        let now = parse_ts("2025-03-10T12:00:00Z");
        register_user(&pool, UserId(1), now).await;

        let store = SqlHistoryStore::new(pool.clone());
        store.append_exchange(UserId(1), "q0", "a0", now, 10).await.expect("first exchange");
        store.append_exchange(UserId(1), "q1", "a1", now, 10).await.expect("second exchange");

        let loaded = store.load_recent(UserId(1), 10).await.expect("load");
        assert_eq!(
            loaded,
            vec![
                ChatMessage::user("q0"),
                ChatMessage::assistant("a0"),
                ChatMessage::user("q1"),
                ChatMessage::assistant("a1"),
            ]
        );

        let windowed = store.load_recent(UserId(1), 2).await.expect("windowed load");
        assert_eq!(windowed, vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")]);

        pool.close().await;
    }

    #[tokio::test]
    async fn append_prunes_to_the_retention_cap() {
        let pool = setup_pool().await;
        let now = parse_ts("2025-03-10T12:00:00Z");
        register_user(&pool, UserId(1), now).await;

        let store = SqlHistoryStore::new(pool.clone());
        for n in 0..4 {
            store
                .append_exchange(UserId(1), &format!("q{n}"), &format!("a{n}"), now, 4)
                .await
                .expect("exchange");
        }

        let loaded = store.load_recent(UserId(1), 10).await.expect("load");
        assert_eq!(
            loaded,
            vec![
                ChatMessage::user("q2"),
                ChatMessage::assistant("a2"),
                ChatMessage::user("q3"),
                ChatMessage::assistant("a3"),
            ]
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn clear_wipes_only_the_requested_user() {
        let pool = setup_pool().await;
        let now = parse_ts("2025-03-10T12:00:00Z");
        register_user(&pool, UserId(1), now).await;
        register_user(&pool, UserId(2), now).await;

        let store = SqlHistoryStore::new(pool.clone());
        store.append_exchange(UserId(1), "q", "a", now, 10).await.expect("user 1 exchange");
        store.append_exchange(UserId(2), "q", "a", now, 10).await.expect("user 2 exchange");

        store.clear(UserId(1)).await.expect("clear user 1");

        assert!(store.load_recent(UserId(1), 10).await.expect("user 1 empty").is_empty());
        assert_eq!(store.load_recent(UserId(2), 10).await.expect("user 2 intact").len(), 2);

        pool.close().await;
    }
}
