use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use drillbot_core::{ChatMessage, ConversationBuffer, UserId};
use drillbot_db::{HistoryStore, RepositoryError};

/// Per-user dialogue windows behind one service. Windows live in memory and
/// seed lazily; with a store attached, the first touch restores the persisted
/// tail and every committed exchange is written through.
pub struct ContextService {
    system_prompt: String,
    max_turns: usize,
    store: Option<Arc<dyn HistoryStore>>,
    buffers: RwLock<HashMap<UserId, ConversationBuffer>>,
}

impl ContextService {
    pub fn new(
        system_prompt: impl Into<String>,
        max_turns: usize,
        store: Option<Arc<dyn HistoryStore>>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_turns,
            store,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Request payload for `prompt`: the user's window plus the prompt as a
    /// trailing message. Seeds the window on first touch; commits nothing.
    pub async fn assemble(
        &self,
        user: UserId,
        prompt: &str,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut buffers = self.buffers.write().await;
        let buffer = self.seeded(&mut buffers, user).await?;
        Ok(buffer.assemble(prompt))
    }

    /// Commits one completed exchange to the window and, when a store is
    /// attached, writes it through with the same cap the window trims to.
    pub async fn commit_exchange(
        &self,
        user: UserId,
        prompt: &str,
        reply: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut buffers = self.buffers.write().await;
        let buffer = self.seeded(&mut buffers, user).await?;
        buffer.commit_exchange(prompt, reply);

        if let Some(store) = &self.store {
            store.append_exchange(user, prompt, reply, now, self.max_turns).await?;
        }
        Ok(())
    }

    /// Drops the user's window and any persisted rows. The next message
    /// reseeds from the configured persona alone.
    pub async fn reset(&self, user: UserId) -> Result<(), RepositoryError> {
        self.buffers.write().await.remove(&user);
        if let Some(store) = &self.store {
            store.clear(user).await?;
        }
        Ok(())
    }

    async fn seeded<'a>(
        &self,
        buffers: &'a mut HashMap<UserId, ConversationBuffer>,
        user: UserId,
    ) -> Result<&'a mut ConversationBuffer, RepositoryError> {
        match buffers.entry(user) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let dialogue = match &self.store {
                    Some(store) => store.load_recent(user, self.max_turns).await?,
                    None => Vec::new(),
                };
                Ok(entry.insert(ConversationBuffer::with_dialogue(
                    &self.system_prompt,
                    self.max_turns,
                    dialogue,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};

    use drillbot_core::{ChatMessage, UserId};
    use drillbot_db::{HistoryStore, InMemoryHistoryStore};

    use super::ContextService;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-10T12:00:00Z")
            .expect("valid rfc3339")
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn first_touch_seeds_the_persona_alone() {
        let service = ContextService::new("coach", 10, None);

        let payload = service.assemble(UserId(1), "day one").await.expect("assemble");

        assert_eq!(
            payload,
            vec![ChatMessage::system("coach"), ChatMessage::user("day one")]
        );
    }

    #[tokio::test]
    async fn committed_exchanges_carry_into_the_next_payload() {
        let service = ContextService::new("coach", 10, None);
        service.commit_exchange(UserId(1), "q0", "a0", now()).await.expect("commit");

        let payload = service.assemble(UserId(1), "q1").await.expect("assemble");

        assert_eq!(payload.len(), 4);
        assert_eq!(payload[1], ChatMessage::user("q0"));
        assert_eq!(payload[2], ChatMessage::assistant("a0"));
        assert_eq!(payload[3], ChatMessage::user("q1"));
    }

    #[tokio::test]
    async fn users_do_not_share_windows() {
        let service = ContextService::new("coach", 10, None);
        service.commit_exchange(UserId(1), "mine", "yours", now()).await.expect("commit");

        let payload = service.assemble(UserId(2), "hello").await.expect("assemble");

        assert_eq!(payload.len(), 2);
    }

    #[tokio::test]
    async fn reset_drops_the_window_and_the_stored_rows() {
        let store = Arc::new(InMemoryHistoryStore::default());
        let service = ContextService::new("coach", 10, Some(store.clone()));
        service.commit_exchange(UserId(1), "q0", "a0", now()).await.expect("commit");

        service.reset(UserId(1)).await.expect("reset");

        let payload = service.assemble(UserId(1), "fresh start").await.expect("assemble");
        assert_eq!(payload.len(), 2);
        assert!(store.load_recent(UserId(1), 10).await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn attached_store_restores_the_window_after_a_restart() {
        let store = Arc::new(InMemoryHistoryStore::default());
        let before = ContextService::new("coach", 10, Some(store.clone()));
        before.commit_exchange(UserId(1), "q0", "a0", now()).await.expect("commit");
        before.commit_exchange(UserId(1), "q1", "a1", now()).await.expect("commit");
        drop(before);

        let after = ContextService::new("coach", 10, Some(store));
        let payload = after.assemble(UserId(1), "q2").await.expect("assemble");

        assert_eq!(payload.len(), 6);
        assert_eq!(payload[0], ChatMessage::system("coach"));
        assert_eq!(payload[3], ChatMessage::user("q1"));
        assert_eq!(payload[5], ChatMessage::user("q2"));
    }

    #[tokio::test]
    async fn write_through_prunes_to_the_window_cap() {
        let store = Arc::new(InMemoryHistoryStore::default());
        let service = ContextService::new("coach", 4, Some(store.clone()));
        for n in 0..3 {
            service
                .commit_exchange(UserId(1), &format!("q{n}"), &format!("a{n}"), now())
                .await
                .expect("commit");
        }

        let stored = store.load_recent(UserId(1), 10).await.expect("load");

        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0], ChatMessage::user("q1"));
    }
}
