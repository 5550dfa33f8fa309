use serde::Deserialize;

/// Raw `getUpdates` result entry. Only the update families drillbot
/// subscribes to are modeled; everything else classifies as unsupported.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub successful_payment: Option<SuccessfulPayment>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SuccessfulPayment {
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    #[serde(default)]
    pub telegram_payment_charge_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateEnvelope {
    pub update_id: i64,
    pub action: UserAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserAction {
    Command(CommandInvocation),
    Chat(ChatPrompt),
    Callback(CallbackPress),
    Payment(PaymentCompleted),
    Unsupported { kind: String },
}

impl UserAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Command(_) => ActionKind::Command,
            Self::Chat(_) => ActionKind::Chat,
            Self::Callback(_) => ActionKind::Callback,
            Self::Payment(_) => ActionKind::Payment,
            Self::Unsupported { .. } => ActionKind::Unsupported,
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::Command(command) => Some(command.user_id),
            Self::Chat(prompt) => Some(prompt.user_id),
            Self::Callback(press) => Some(press.user_id),
            Self::Payment(payment) => Some(payment.user_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Command,
    Chat,
    Callback,
    Payment,
    Unsupported,
}

/// A `/verb args` message. The verb is lowercased and any `@BotName`
/// suffix is stripped so group-chat invocations route the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub chat_id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub name: String,
    pub args: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatPrompt {
    pub chat_id: i64,
    pub user_id: i64,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackPress {
    pub callback_id: String,
    pub chat_id: i64,
    pub user_id: i64,
    pub message_id: Option<i64>,
    pub data: String,
}

/// Transport-level payment confirmation. The engine treats this as a grant
/// trigger; how the payment happened is outside drillbot's scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentCompleted {
    pub chat_id: i64,
    pub user_id: i64,
    pub payload: String,
    pub currency: String,
    pub total_amount: i64,
}

pub fn classify_update(update: Update) -> UpdateEnvelope {
    let action = classify_action(update.message, update.callback_query);
    UpdateEnvelope { update_id: update.update_id, action }
}

fn classify_action(
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
) -> UserAction {
    if let Some(callback) = callback_query {
        let Some(data) = callback.data else {
            return UserAction::Unsupported { kind: "callback_query".to_owned() };
        };
        return UserAction::Callback(CallbackPress {
            callback_id: callback.id,
            chat_id: callback
                .message
                .as_ref()
                .map(|message| message.chat.id)
                .unwrap_or(callback.from.id),
            user_id: callback.from.id,
            message_id: callback.message.map(|message| message.message_id),
            data,
        });
    }

    let Some(message) = message else {
        return UserAction::Unsupported { kind: "update".to_owned() };
    };
    let Some(sender) = message.from else {
        return UserAction::Unsupported { kind: "message".to_owned() };
    };

    if let Some(payment) = message.successful_payment {
        return UserAction::Payment(PaymentCompleted {
            chat_id: message.chat.id,
            user_id: sender.id,
            payload: payment.invoice_payload,
            currency: payment.currency,
            total_amount: payment.total_amount,
        });
    }

    let Some(text) = message.text else {
        return UserAction::Unsupported { kind: "message".to_owned() };
    };

    if let Some((name, args)) = parse_command(&text) {
        return UserAction::Command(CommandInvocation {
            chat_id: message.chat.id,
            user_id: sender.id,
            first_name: sender.first_name,
            name,
            args,
        });
    }

    UserAction::Chat(ChatPrompt { chat_id: message.chat.id, user_id: sender.id, text })
}

fn parse_command(text: &str) -> Option<(String, String)> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let name = verb.split('@').next().unwrap_or_default().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }

    let args = parts.collect::<Vec<_>>().join(" ");
    Some((name, args))
}

#[cfg(test)]
mod tests {
    use super::{classify_update, Chat, Message, Update, User, UserAction};

    fn text_update(update_id: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: 10,
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

    #[test]
    fn classifies_plain_text_as_chat_prompt() {
        let envelope = classify_update(text_update(1, "ran 5k this morning"));

        assert_eq!(envelope.update_id, 1);
        let UserAction::Chat(prompt) = envelope.action else {
            panic!("expected chat prompt");
        };
        assert_eq!(prompt.user_id, 7);
        assert_eq!(prompt.text, "ran 5k this morning");
    }

    #[test]
    fn classifies_commands_with_mention_and_args() {
        let envelope = classify_update(text_update(2, "/Grant@DrillSergeantBot 42 30"));

        let UserAction::Command(command) = envelope.action else {
            panic!("expected command");
        };
        assert_eq!(command.name, "grant");
        assert_eq!(command.args, "42 30");
    }

    #[test]
    fn bare_slash_stays_a_chat_prompt() {
        let envelope = classify_update(text_update(3, "/"));
        assert!(matches!(envelope.action, UserAction::Chat(_)));
    }

    #[test]
    fn classifies_callback_presses_with_payload() {
        let update = Update {
            update_id: 4,
            message: None,
            callback_query: Some(super::CallbackQuery {
                id: "cb-1".to_owned(),
                from: User {
                    id: 9,
                    is_bot: false,
                    first_name: "Igor".to_owned(),
                    username: Some("igor".to_owned()),
                },
                message: Some(Message {
                    message_id: 55,
                    from: None,
                    chat: Chat { id: 9 },
                    text: Some("Pick a model:".to_owned()),
                    successful_payment: None,
                }),
                data: Some("mode:enhanced".to_owned()),
            }),
        };

        let UserAction::Callback(press) = classify_update(update).action else {
            panic!("expected callback press");
        };
        assert_eq!(press.callback_id, "cb-1");
        assert_eq!(press.message_id, Some(55));
        assert_eq!(press.data, "mode:enhanced");
    }

    #[test]
    fn classifies_successful_payment() {
        let update = Update {
            update_id: 5,
            message: Some(Message {
                message_id: 60,
                from: Some(User {
                    id: 12,
                    is_bot: false,
                    first_name: "Olya".to_owned(),
                    username: None,
                }),
                chat: Chat { id: 12 },
                text: None,
                successful_payment: Some(super::SuccessfulPayment {
                    currency: "XTR".to_owned(),
                    total_amount: 100,
                    invoice_payload: "premium-30d".to_owned(),
                    telegram_payment_charge_id: Some("ch-1".to_owned()),
                }),
            }),
            callback_query: None,
        };

        let UserAction::Payment(payment) = classify_update(update).action else {
            panic!("expected payment");
        };
        assert_eq!(payment.payload, "premium-30d");
        assert_eq!(payment.currency, "XTR");
    }

    #[test]
    fn updates_without_payload_classify_as_unsupported() {
        let update = Update {
            update_id: 7,
            message: None,
            callback_query: None,
        };

        assert!(matches!(classify_update(update).action, UserAction::Unsupported { .. }));
    }

    #[test]
    fn decodes_getupdates_wire_shape() {
        let raw = r#"{
            "update_id": 813,
            "message": {
                "message_id": 21,
                "from": {"id": 501, "is_bot": false, "first_name": "Max", "username": "maxx"},
                "chat": {"id": 501, "type": "private"},
                "text": "/start"
            }
        }"#;

        let update: Update = serde_json::from_str(raw).expect("update should decode");
        let UserAction::Command(command) = classify_update(update).action else {
            panic!("expected command");
        };
        assert_eq!(command.name, "start");
        assert_eq!(command.first_name, "Max");
    }
}
