use serde::Serialize;

use drillbot_core::Mode;

/// Telegram rejects callback payloads longer than 64 bytes.
pub const CALLBACK_DATA_MAX_BYTES: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: &CallbackData) -> Self {
        Self { text: label.into(), callback_data: Some(data.encode()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self { inline_keyboard: vec![buttons] }
    }

    pub fn rows(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { inline_keyboard: rows }
    }
}

/// Outbound `sendMessage` payload. Serializes straight into the Bot API
/// request body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboard>,
}

impl OutgoingMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self { chat_id, text: text.into(), reply_markup: None }
    }

    pub fn keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.reply_markup = Some(keyboard);
        self
    }
}

/// Typed inline-button payloads. Encoded as short `prefix:...` strings so
/// a press round-trips through Telegram without server-side state beyond
/// the chooser token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackData {
    /// Tier chooser press for a pending prompt. The token ties the press
    /// back to the prompt it was offered for; presses carrying a token
    /// that is no longer current are stale.
    TierChoice { tier: Mode, token: String },
    /// Direct mode switch from the `/mode` keyboard.
    SetMode(Mode),
    /// "How do I get premium" press from the `/premium` keyboard.
    PremiumGuide,
}

impl CallbackData {
    pub fn encode(&self) -> String {
        match self {
            Self::TierChoice { tier, token } => format!("pick:{}:{token}", tier.as_str()),
            Self::SetMode(mode) => format!("mode:{}", mode.as_str()),
            Self::PremiumGuide => "premium:guide".to_owned(),
        }
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        match parts.next()? {
            "pick" => {
                let tier = Mode::parse(parts.next()?)?;
                let token = parts.next()?;
                if token.is_empty() {
                    return None;
                }
                Some(Self::TierChoice { tier, token: token.to_owned() })
            }
            "mode" => {
                let mode = Mode::parse(parts.next()?)?;
                if parts.next().is_some() {
                    return None;
                }
                Some(Self::SetMode(mode))
            }
            "premium" => {
                if parts.next()? != "guide" || parts.next().is_some() {
                    return None;
                }
                Some(Self::PremiumGuide)
            }
            _ => None,
        }
    }
}

/// Per-message tier chooser. The user's stored tier is ticked so a plain
/// confirmation press is always available.
pub fn tier_chooser_keyboard(token: &str, stored: Mode) -> InlineKeyboard {
    InlineKeyboard::single_row(vec![
        InlineButton::callback(
            tier_label("⚡ Basic model", stored == Mode::Basic),
            &CallbackData::TierChoice { tier: Mode::Basic, token: token.to_owned() },
        ),
        InlineButton::callback(
            tier_label("🧠 Enhanced model", stored == Mode::Enhanced),
            &CallbackData::TierChoice { tier: Mode::Enhanced, token: token.to_owned() },
        ),
    ])
}

fn tier_label(base: &str, stored: bool) -> String {
    if stored {
        format!("{base} ✓")
    } else {
        base.to_owned()
    }
}

/// Single toggle button for `/mode`, labeled with the tier a press switches
/// the stored mode to.
pub fn mode_toggle_keyboard(current: Mode) -> InlineKeyboard {
    let target = current.toggled();
    let label = match target {
        Mode::Basic => "⚡ Switch to basic",
        Mode::Enhanced => "🧠 Switch to enhanced",
    };
    InlineKeyboard::single_row(vec![InlineButton::callback(label, &CallbackData::SetMode(target))])
}

pub fn premium_keyboard() -> InlineKeyboard {
    InlineKeyboard::single_row(vec![InlineButton::callback(
        "⭐ Get premium",
        &CallbackData::PremiumGuide,
    )])
}
