use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::keyboards::OutgoingMessage;
use crate::updates::{ActionKind, UpdateEnvelope};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionContext {
    pub correlation_id: String,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// The handler produced one reply for the runner to deliver.
    Replied(OutgoingMessage),
    /// The handler did its own Bot API calls (or none were needed).
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionHandlerError {
    #[error("command handler failure: {0}")]
    Command(String),
    #[error("chat handler failure: {0}")]
    Chat(String),
    #[error("callback handler failure: {0}")]
    Callback(String),
    #[error("payment handler failure: {0}")]
    Payment(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] ActionHandlerError),
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action_kind(&self) -> ActionKind;
    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &ActionContext,
    ) -> Result<HandlerResult, ActionHandlerError>;
}

#[derive(Default)]
pub struct UpdateDispatcher {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl UpdateDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: ActionHandler + 'static,
    {
        self.handlers.insert(handler.action_kind(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &ActionContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.action.kind()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{
        ActionContext, ActionHandler, ActionHandlerError, HandlerResult, UpdateDispatcher,
    };
    use crate::keyboards::OutgoingMessage;
    use crate::updates::{ActionKind, ChatPrompt, UpdateEnvelope, UserAction};

    struct EchoChatHandler;

    #[async_trait]
    impl ActionHandler for EchoChatHandler {
        fn action_kind(&self) -> ActionKind {
            ActionKind::Chat
        }

        async fn handle(
            &self,
            envelope: &UpdateEnvelope,
            _ctx: &ActionContext,
        ) -> Result<HandlerResult, ActionHandlerError> {
            let UserAction::Chat(prompt) = &envelope.action else {
                return Ok(HandlerResult::Ignored);
            };
            Ok(HandlerResult::Replied(OutgoingMessage::text(
                prompt.chat_id,
                prompt.text.clone(),
            )))
        }
    }

    fn chat_envelope(update_id: i64, text: &str) -> UpdateEnvelope {
        UpdateEnvelope {
            update_id,
            action: UserAction::Chat(ChatPrompt {
                chat_id: 3,
                user_id: 3,
                text: text.to_owned(),
            }),
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_to_registered_handler() {
        let mut dispatcher = UpdateDispatcher::new();
        dispatcher.register(EchoChatHandler);

        let result = dispatcher
            .dispatch(&chat_envelope(1, "drop and give me twenty"), &ActionContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Replied(message) = result else {
            panic!("expected a reply");
        };
        assert_eq!(message.text, "drop and give me twenty");
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = UpdateDispatcher::new();

        let result = dispatcher
            .dispatch(&chat_envelope(2, "hello"), &ActionContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn registering_twice_for_a_kind_keeps_one_handler() {
        let mut dispatcher = UpdateDispatcher::new();
        dispatcher.register(EchoChatHandler);
        dispatcher.register(EchoChatHandler);

        assert_eq!(dispatcher.handler_count(), 1);
    }
}
