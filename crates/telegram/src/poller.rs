use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiEnvelope, BotApi, NoopBotApi, TELEGRAM_API_BASE};
use crate::dispatch::{ActionContext, HandlerResult, UpdateDispatcher};
use crate::updates::{classify_update, Update};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("update fetch failed: {0}")]
    Fetch(String),
    #[error("update decode failed: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of update batches. `Ok(None)` means the stream is closed and the
/// runner should stop; an empty batch just means the long poll timed out.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn fetch_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<Option<Vec<Update>>, TransportError>;
}

#[derive(Default)]
pub struct NoopUpdateTransport;

#[async_trait]
impl UpdateTransport for NoopUpdateTransport {
    async fn fetch_updates(
        &self,
        _offset: Option<i64>,
    ) -> Result<Option<Vec<Update>>, TransportError> {
        Ok(None)
    }
}

const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

/// `getUpdates` long poll over HTTPS. Never returns `Ok(None)`; shutdown
/// is the caller's concern.
pub struct HttpUpdateTransport {
    client: Client,
    base_url: String,
    token: SecretString,
    poll_timeout_secs: u64,
}

impl HttpUpdateTransport {
    pub fn new(token: SecretString) -> Self {
        Self::with_base_url(token, TELEGRAM_API_BASE)
    }

    pub fn with_base_url(token: SecretString, base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into(), token, poll_timeout_secs: 25 }
    }

    pub fn poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[async_trait]
impl UpdateTransport for HttpUpdateTransport {
    async fn fetch_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<Option<Vec<Update>>, TransportError> {
        let url = format!("{}/bot{}/getUpdates", self.base_url, self.token.expose_secret());
        let response = self
            .client
            .post(&url)
            // Give the server-side long poll room to answer before the
            // client-side timeout fires.
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .json(&GetUpdates {
                offset,
                timeout: self.poll_timeout_secs,
                allowed_updates: ALLOWED_UPDATES,
            })
            .send()
            .await
            .map_err(|error| TransportError::Fetch(error.to_string()))?;

        let status = response.status();
        let body =
            response.text().await.map_err(|error| TransportError::Fetch(error.to_string()))?;
        let envelope: ApiEnvelope<Vec<Update>> = serde_json::from_str(&body)
            .map_err(|error| TransportError::Decode(format!("status {status}: {error}")))?;

        if !envelope.ok {
            return Err(TransportError::Fetch(format!(
                "getUpdates rejected ({}): {}",
                envelope.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                envelope.description.unwrap_or_else(|| "no description".to_owned()),
            )));
        }

        Ok(Some(envelope.result.unwrap_or_default()))
    }
}

pub struct PollRunner {
    transport: Arc<dyn UpdateTransport>,
    api: Arc<dyn BotApi>,
    dispatcher: UpdateDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl Default for PollRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopUpdateTransport),
            api: Arc::new(NoopBotApi),
            dispatcher: UpdateDispatcher::default(),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl PollRunner {
    pub fn new(
        transport: Arc<dyn UpdateTransport>,
        api: Arc<dyn BotApi>,
        dispatcher: UpdateDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, api, dispatcher, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        // The confirmed-updates offset survives reconnects so a flaky
        // network never replays already-handled messages.
        let mut offset = None;

        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.poll_and_pump(attempt, &mut offset).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "telegram long poll failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "long-poll retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn poll_and_pump(
        &self,
        attempt: u32,
        offset: &mut Option<i64>,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening telegram long-poll session");

        loop {
            let Some(batch) = self.transport.fetch_updates(*offset).await? else {
                info!(attempt, "telegram update stream closed");
                return Ok(());
            };

            for update in batch {
                let confirmed = update.update_id + 1;
                *offset =
                    Some(offset.map_or(confirmed, |current| current.max(confirmed)));

                let envelope = classify_update(update);
                info!(
                    event_name = "ingress.telegram.update_received",
                    update_id = envelope.update_id,
                    kind = ?envelope.action.kind(),
                    user_id = ?envelope.action.user_id(),
                    "received telegram update"
                );

                let context =
                    ActionContext { correlation_id: format!("update-{}", envelope.update_id) };
                match self.dispatcher.dispatch(&envelope, &context).await {
                    Ok(HandlerResult::Replied(message)) => {
                        if let Err(error) = self.api.send_message(&message).await {
                            warn!(
                                event_name = "egress.telegram.reply_sent",
                                update_id = envelope.update_id,
                                chat_id = message.chat_id,
                                error = %error,
                                "failed to deliver reply"
                            );
                        } else {
                            debug!(
                                event_name = "egress.telegram.reply_sent",
                                update_id = envelope.update_id,
                                chat_id = message.chat_id,
                                "delivered reply"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(
                            update_id = envelope.update_id,
                            error = %error,
                            "action dispatch failed; continuing poll loop"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{
        PollRunner, ReconnectPolicy, TransportError, Update, UpdateTransport,
    };
    use crate::api::{ApiError, BotApi};
    use crate::dispatch::{
        ActionContext, ActionHandler, ActionHandlerError, HandlerResult, UpdateDispatcher,
    };
    use crate::keyboards::OutgoingMessage;
    use crate::updates::{ActionKind, Chat, Message, UpdateEnvelope, User, UserAction};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        fetch_results: VecDeque<Result<Option<Vec<Update>>, TransportError>>,
        offsets_seen: Vec<Option<i64>>,
    }

    impl ScriptedTransport {
        fn with_script(fetch_results: Vec<Result<Option<Vec<Update>>, TransportError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    fetch_results: fetch_results.into(),
                    offsets_seen: Vec::new(),
                }),
            }
        }

        async fn fetch_attempts(&self) -> usize {
            self.state.lock().await.offsets_seen.len()
        }

        async fn offsets_seen(&self) -> Vec<Option<i64>> {
            self.state.lock().await.offsets_seen.clone()
        }
    }

    #[async_trait]
    impl UpdateTransport for ScriptedTransport {
        async fn fetch_updates(
            &self,
            offset: Option<i64>,
        ) -> Result<Option<Vec<Update>>, TransportError> {
            let mut state = self.state.lock().await;
            state.offsets_seen.push(offset);
            state.fetch_results.pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct RecordingBotApi {
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    impl RecordingBotApi {
        async fn sent_texts(&self) -> Vec<String> {
            self.sent.lock().await.iter().map(|message| message.text.clone()).collect()
        }
    }

    #[async_trait]
    impl BotApi for RecordingBotApi {
        async fn send_message(&self, message: &OutgoingMessage) -> Result<i64, ApiError> {
            self.sent.lock().await.push(message.clone());
            Ok(1)
        }

        async fn edit_message_text(
            &self,
            _chat_id: i64,
            _message_id: i64,
            _text: &str,
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn answer_callback(
            &self,
            _callback_id: &str,
            _text: Option<&str>,
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn send_typing(&self, _chat_id: i64) -> Result<(), ApiError> {
            Ok(())
        }
    }

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
                format!("echo: {}", prompt.text),
            )))
        }
    }

    fn chat_update(update_id: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: update_id,
                from: Some(User {
                    id: 7,
                    is_bot: false,
                    first_name: "Lena".to_owned(),
                    username: None,
                }),
                chat: Chat { id: 7 },
                text: Some(text.to_owned()),
                successful_payment: None,
            }),
            callback_query: None,
        }
    }

    fn echo_dispatcher() -> UpdateDispatcher {
        let mut dispatcher = UpdateDispatcher::new();
        dispatcher.register(EchoChatHandler);
        dispatcher
    }

    #[tokio::test]
    async fn reconnects_after_initial_fetch_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Err(TransportError::Fetch("network down".to_owned())),
            Ok(Some(vec![chat_update(1, "situps done")])),
            Ok(None),
        ]));
        let api = Arc::new(RecordingBotApi::default());

        let runner = PollRunner::new(
            transport.clone(),
            api.clone(),
            echo_dispatcher(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.fetch_attempts().await, 3);
        assert_eq!(api.sent_texts().await, vec!["echo: situps done"]);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Err(TransportError::Fetch("fail-1".to_owned())),
            Err(TransportError::Fetch("fail-2".to_owned())),
            Err(TransportError::Fetch("fail-3".to_owned())),
        ]));

        let runner = PollRunner::new(
            transport.clone(),
            Arc::new(RecordingBotApi::default()),
            UpdateDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.fetch_attempts().await, 3);
    }

    #[tokio::test]
    async fn offset_advances_past_every_update_in_a_batch() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(Some(vec![chat_update(7, "a"), chat_update(9, "b")])),
            Ok(None),
        ]));

        let runner = PollRunner::new(
            transport.clone(),
            Arc::new(RecordingBotApi::default()),
            UpdateDispatcher::default(),
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");
        assert_eq!(transport.offsets_seen().await, vec![None, Some(10)]);
    }

    #[tokio::test]
    async fn offset_survives_a_reconnect() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(Some(vec![chat_update(5, "pushups")])),
            Err(TransportError::Fetch("hiccup".to_owned())),
            Ok(None),
        ]));

        let runner = PollRunner::new(
            transport.clone(),
            Arc::new(RecordingBotApi::default()),
            UpdateDispatcher::default(),
            ReconnectPolicy { max_retries: 1, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");
        assert_eq!(transport.offsets_seen().await, vec![None, Some(6), Some(6)]);
    }

    #[tokio::test]
    async fn dispatch_failures_do_not_stop_the_loop() {
        struct FailingHandler;

        #[async_trait]
        impl ActionHandler for FailingHandler {
            fn action_kind(&self) -> ActionKind {
                ActionKind::Chat
            }

            async fn handle(
                &self,
                _envelope: &UpdateEnvelope,
                _ctx: &ActionContext,
            ) -> Result<HandlerResult, ActionHandlerError> {
                Err(ActionHandlerError::Chat("boom".to_owned()))
            }
        }

        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(Some(vec![chat_update(1, "a"), chat_update(2, "b")])),
            Ok(None),
        ]));

        let mut dispatcher = UpdateDispatcher::new();
        dispatcher.register(FailingHandler);

        let runner = PollRunner::new(
            transport.clone(),
            Arc::new(RecordingBotApi::default()),
            dispatcher,
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");
        assert_eq!(transport.offsets_seen().await, vec![None, Some(3)]);
    }
}
