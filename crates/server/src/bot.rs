//! Telegram action handlers - the conversational surface of the bot.
//!
//! Each inbound action kind gets one handler; all of them are thin shells
//! around `ChatEngine` calls plus the reply copy. The only state that lives
//! here is the pending-prompt stash backing the tier chooser.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use drillbot_agent::engine::{ChatEngine, UsageSummary};
use drillbot_core::config::AppConfig;
use drillbot_core::{EngineError, Mode, UserId};
use drillbot_telegram::api::BotApi;
use drillbot_telegram::dispatch::{
    ActionContext, ActionHandler, ActionHandlerError, HandlerResult, UpdateDispatcher,
};
use drillbot_telegram::keyboards::{
    mode_toggle_keyboard, premium_keyboard, tier_chooser_keyboard, CallbackData, OutgoingMessage,
};
use drillbot_telegram::updates::{ActionKind, UpdateEnvelope, UserAction};

/// Wires every handler drillbot serves into one dispatcher. The chat and
/// callback handlers share the pending-prompt stash; nothing else is shared
/// beyond the engine itself.
pub fn dispatcher(
    engine: Arc<ChatEngine>,
    api: Arc<dyn BotApi>,
    config: &AppConfig,
) -> UpdateDispatcher {
    let pending = Arc::new(PendingPrompts::default());

    let mut dispatcher = UpdateDispatcher::new();
    dispatcher.register(ChatHandler::new(
        engine.clone(),
        api.clone(),
        pending.clone(),
        config.history.tier_chooser,
    ));
    dispatcher.register(CallbackHandler::new(engine.clone(), api, pending));
    dispatcher.register(CommandHandler::new(engine.clone()));
    dispatcher.register(PaymentHandler::new(engine));
    dispatcher
}

/// Prompt parked while its tier chooser is on screen, keyed by user. Each
/// stash mints a fresh token; pressing a button with any other token is a
/// stale press and must not release anything.
#[derive(Default)]
pub struct PendingPrompts {
    entries: Mutex<HashMap<UserId, PendingPrompt>>,
}

struct PendingPrompt {
    token: String,
    text: String,
}

impl PendingPrompts {
    /// Parks `text` and returns the token its chooser buttons will carry.
    /// A newer prompt replaces the parked one; the old token dies with it.
    pub async fn stash(&self, user: UserId, text: String) -> String {
        let token = Uuid::new_v4().to_string();
        let mut entries = self.entries.lock().await;
        entries.insert(user, PendingPrompt { token: token.clone(), text });
        token
    }

    /// Releases the parked prompt if `token` still names it. Stale and
    /// replayed tokens leave the stash untouched.
    pub async fn take(&self, user: UserId, token: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(&user) {
            Some(parked) if parked.token == token => {
                entries.remove(&user).map(|parked| parked.text)
            }
            _ => None,
        }
    }
}

/// Plain text messages. With the chooser enabled the prompt is admitted and
/// parked; otherwise it runs straight through on the stored mode.
pub struct ChatHandler {
    engine: Arc<ChatEngine>,
    api: Arc<dyn BotApi>,
    pending: Arc<PendingPrompts>,
    chooser_enabled: bool,
}

impl ChatHandler {
    pub fn new(
        engine: Arc<ChatEngine>,
        api: Arc<dyn BotApi>,
        pending: Arc<PendingPrompts>,
        chooser_enabled: bool,
    ) -> Self {
        Self { engine, api, pending, chooser_enabled }
    }
}

#[async_trait]
impl ActionHandler for ChatHandler {
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
        let user = UserId(prompt.user_id);

        if !self.chooser_enabled {
            send_typing(self.api.as_ref(), prompt.chat_id).await;
            let result = self.engine.respond(user, &prompt.text).await;
            return Ok(engine_reply(prompt.chat_id, result));
        }

        // The rate guard rules on the prompt as it arrives; the chooser
        // only delays the completion, never the admission.
        if let Err(error) = self.engine.admit_attempt(user).await {
            return Ok(engine_reply(prompt.chat_id, Err(error)));
        }
        let summary = match self.engine.usage_summary(user).await {
            Ok(summary) => summary,
            Err(error) => return Ok(engine_reply(prompt.chat_id, Err(error))),
        };

        let token = self.pending.stash(user, prompt.text.clone()).await;
        debug!(event_name = "bot.prompt_parked", user_id = %user, "prompt parked for chooser");
        Ok(HandlerResult::Replied(
            OutgoingMessage::text(prompt.chat_id, chooser_text(&summary))
                .keyboard(tier_chooser_keyboard(&token, summary.mode)),
        ))
    }
}

/// Inline button presses: tier picks, mode toggles, and the premium guide.
pub struct CallbackHandler {
    engine: Arc<ChatEngine>,
    api: Arc<dyn BotApi>,
    pending: Arc<PendingPrompts>,
}

impl CallbackHandler {
    pub fn new(
        engine: Arc<ChatEngine>,
        api: Arc<dyn BotApi>,
        pending: Arc<PendingPrompts>,
    ) -> Self {
        Self { engine, api, pending }
    }

    async fn ack(&self, callback_id: &str, text: Option<&str>) {
        if let Err(error) = self.api.answer_callback(callback_id, text).await {
            debug!(event_name = "bot.callback_ack_failed", error = %error);
        }
    }
}

#[async_trait]
impl ActionHandler for CallbackHandler {
    fn action_kind(&self) -> ActionKind {
        ActionKind::Callback
    }

    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        _ctx: &ActionContext,
    ) -> Result<HandlerResult, ActionHandlerError> {
        let UserAction::Callback(press) = &envelope.action else {
            return Ok(HandlerResult::Ignored);
        };
        let user = UserId(press.user_id);

        let Some(data) = CallbackData::decode(&press.data) else {
            warn!(event_name = "bot.callback_undecodable", user_id = %user, data = %press.data);
            self.ack(&press.callback_id, None).await;
            return Ok(HandlerResult::Ignored);
        };

        match data {
            CallbackData::TierChoice { tier, token } => {
                let Some(prompt) = self.pending.take(user, &token).await else {
                    self.ack(&press.callback_id, Some("⚠️ That prompt expired. Send a new one."))
                        .await;
                    return Ok(HandlerResult::Processed);
                };

                self.ack(&press.callback_id, None).await;
                if let Some(message_id) = press.message_id {
                    let note = match tier {
                        Mode::Basic => "⚡ Basic coach on it...",
                        Mode::Enhanced => "🧠 Enhanced coach on it...",
                    };
                    if let Err(error) =
                        self.api.edit_message_text(press.chat_id, message_id, note).await
                    {
                        debug!(event_name = "bot.chooser_edit_failed", user_id = %user, error = %error);
                    }
                }
                send_typing(self.api.as_ref(), press.chat_id).await;

                let result = self.engine.respond_admitted(user, &prompt, tier).await;
                Ok(engine_reply(press.chat_id, result))
            }
            CallbackData::SetMode(mode) => match self.engine.set_mode(user, mode).await {
                Ok(mode) => {
                    self.ack(&press.callback_id, None).await;
                    let text = format!("Mode set: {}.", mode_label(mode));
                    if let Some(message_id) = press.message_id {
                        if self.api.edit_message_text(press.chat_id, message_id, &text).await.is_ok()
                        {
                            return Ok(HandlerResult::Processed);
                        }
                    }
                    Ok(HandlerResult::Replied(OutgoingMessage::text(press.chat_id, text)))
                }
                Err(error) => Ok(engine_reply(press.chat_id, Err(error))),
            },
            CallbackData::PremiumGuide => {
                self.ack(&press.callback_id, None).await;
                Ok(HandlerResult::Replied(OutgoingMessage::text(
                    press.chat_id,
                    premium_guide(user),
                )))
            }
        }
    }
}

/// Slash commands. Everything here reads engine state; only `/mode` via its
/// keyboard and `/reset` mutate anything.
pub struct CommandHandler {
    engine: Arc<ChatEngine>,
}

impl CommandHandler {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ActionHandler for CommandHandler {
    fn action_kind(&self) -> ActionKind {
        ActionKind::Command
    }

    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        _ctx: &ActionContext,
    ) -> Result<HandlerResult, ActionHandlerError> {
        let UserAction::Command(command) = &envelope.action else {
            return Ok(HandlerResult::Ignored);
        };
        let user = UserId(command.user_id);
        let chat_id = command.chat_id;

        let reply = match command.name.as_str() {
            "start" => OutgoingMessage::text(chat_id, welcome_text(&command.first_name)),
            "help" => OutgoingMessage::text(chat_id, HELP_TEXT),
            "stats" => match self.engine.usage_summary(user).await {
                Ok(summary) => OutgoingMessage::text(chat_id, stats_text(&summary)),
                Err(error) => return Ok(engine_reply(chat_id, Err(error))),
            },
            "premium" => match self.engine.usage_summary(user).await {
                Ok(summary) => {
                    let message = OutgoingMessage::text(chat_id, premium_text(&summary));
                    if summary.entitled {
                        message
                    } else {
                        message.keyboard(premium_keyboard())
                    }
                }
                Err(error) => return Ok(engine_reply(chat_id, Err(error))),
            },
            "mode" => match self.engine.current_mode(user).await {
                Ok(mode) => OutgoingMessage::text(
                    chat_id,
                    format!("Current coach: {}.", mode_label(mode)),
                )
                .keyboard(mode_toggle_keyboard(mode)),
                Err(error) => return Ok(engine_reply(chat_id, Err(error))),
            },
            "reset" => match self.engine.reset_context(user).await {
                Ok(()) => {
                    OutgoingMessage::text(chat_id, "🧹 Context wiped. Fresh start, soldier.")
                }
                Err(error) => return Ok(engine_reply(chat_id, Err(error))),
            },
            other => {
                debug!(event_name = "bot.unknown_command", user_id = %user, command = other);
                OutgoingMessage::text(chat_id, "No such drill. /help lists what I've got.")
            }
        };

        Ok(HandlerResult::Replied(reply))
    }
}

/// Transport-level payment confirmations become premium grants.
pub struct PaymentHandler {
    engine: Arc<ChatEngine>,
}

impl PaymentHandler {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ActionHandler for PaymentHandler {
    fn action_kind(&self) -> ActionKind {
        ActionKind::Payment
    }

    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        _ctx: &ActionContext,
    ) -> Result<HandlerResult, ActionHandlerError> {
        let UserAction::Payment(payment) = &envelope.action else {
            return Ok(HandlerResult::Ignored);
        };
        let user = UserId(payment.user_id);

        match self.engine.grant_premium(user).await {
            Ok(expiry) => Ok(HandlerResult::Replied(OutgoingMessage::text(
                payment.chat_id,
                format!(
                    "🎖 Premium active until {}.\nEnhanced answers are unmetered now. Move.",
                    format_expiry(expiry)
                ),
            ))),
            Err(error) => Ok(engine_reply(payment.chat_id, Err(error))),
        }
    }
}

fn engine_reply(chat_id: i64, result: Result<String, EngineError>) -> HandlerResult {
    let text = match result {
        Ok(text) => text,
        Err(error) => error.user_message(),
    };
    HandlerResult::Replied(OutgoingMessage::text(chat_id, text))
}

async fn send_typing(api: &dyn BotApi, chat_id: i64) {
    if let Err(error) = api.send_typing(chat_id).await {
        debug!(event_name = "bot.typing_failed", chat_id, error = %error);
    }
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Basic => "⚡ basic",
        Mode::Enhanced => "🧠 enhanced",
    }
}

fn format_expiry(expiry: DateTime<Utc>) -> String {
    expiry.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn enhanced_status(summary: &UsageSummary) -> String {
    if summary.entitled {
        return "✅ unmetered for you".to_owned();
    }
    match summary.enhanced_limit {
        Some(limit) => format!("{}/{limit} used today", summary.used_today),
        None => "✅ unmetered".to_owned(),
    }
}

fn chooser_text(summary: &UsageSummary) -> String {
    format!(
        "Pick a coach for this one:\n\n\
         🧠 Enhanced - {}\n\
         ⚡ Basic - unmetered\n\n\
         💎 /premium - unmetered enhanced answers",
        enhanced_status(summary)
    )
}

fn welcome_text(first_name: &str) -> String {
    let name = if first_name.trim().is_empty() { "soldier" } else { first_name.trim() };
    format!(
        "⚡ Listen up, {name}.\n\n\
         I'm not your friend and I won't coddle you. I'm here to hand you a \
         concrete plan and make you execute it.\n\n\
         Two coaches on staff:\n\
         🧠 Enhanced - the strong one, daily limit applies\n\
         ⚡ Basic - simpler, unmetered\n\n\
         💎 /premium - unmetered enhanced answers\n\
         /help - what I can do\n\n\
         Now talk. What's the problem?"
    )
}

const HELP_TEXT: &str = "💪 WHAT I DO:\n\n\
    ✅ Concrete plans with numbers, not sympathy\n\
    ✅ Remember what you promised and check on it\n\
    ✅ Call it straight\n\n\
    COACHES:\n\
    🧠 Enhanced - strong model, daily limit\n\
    ⚡ Basic - simpler, unmetered\n\n\
    COMMANDS:\n\
    /start - from the top\n\
    /mode - switch your stored coach\n\
    /stats - your numbers\n\
    /premium - unmetered enhanced answers\n\
    /reset - wipe the conversation\n\n\
    Enough reading. Act.";

fn stats_text(summary: &UsageSummary) -> String {
    let premium = match summary.premium_until {
        Some(expiry) => format!("until {}", format_expiry(expiry)),
        None => "none".to_owned(),
    };
    format!(
        "📊 Your numbers:\n\
         • Coach: {}\n\
         • Enhanced: {}\n\
         • Premium: {premium}\n\
         • Soldiers enrolled: {}",
        mode_label(summary.mode),
        enhanced_status(summary),
        summary.total_users,
    )
}

fn premium_text(summary: &UsageSummary) -> String {
    match summary.premium_until {
        Some(expiry) => format!(
            "💎 Premium active\n\n\
             ✅ Enhanced answers unmetered\n\
             📅 Until: {}",
            format_expiry(expiry)
        ),
        None => format!(
            "💎 Drillbot Premium\n\n\
             🧠 Unmetered enhanced answers\n\
             ⏰ 30 days per grant\n\n\
             📊 Right now: {}",
            enhanced_status(summary)
        ),
    }
}

fn premium_guide(user: UserId) -> String {
    format!(
        "💎 Premium is switched on by the operator.\n\
         Pass them your ID {user} and ask for a grant; /premium shows \
         where you stand."
    )
}
