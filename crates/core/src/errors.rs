use thiserror::Error;

/// Outcomes of one chat request that end without a committed exchange. Each
/// variant carries operator detail in its display form; `user_message` is the
/// copy the bot sends back instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("message rejected by the rate guard")]
    SpamRejected,
    #[error("daily quota exhausted ({used}/{limit})")]
    QuotaExhausted { used: u32, limit: u32 },
    #[error("completion backend unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("completion budget spent with no visible text")]
    EmptyCompletion,
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn user_message(&self) -> String {
        match self {
            Self::SpamRejected => "🚫 Too many messages. Wait a minute, speedy.".to_string(),
            Self::QuotaExhausted { limit, .. } => format!(
                "⛔ Daily limit reached ({limit} enhanced requests). \
                 Grab /premium or switch to the basic coach."
            ),
            Self::EmptyCompletion => {
                "🤔 That prompt ate the whole reply budget before any text came out. \
                 Shorten it and try again."
                    .to_string()
            }
            Self::UpstreamUnavailable(_) | Self::Persistence(_) => {
                "❌ Something broke. Try again in a minute.".to_string()
            }
        }
    }

    /// Stable label for structured logs and the CLI envelope.
    pub fn class(&self) -> &'static str {
        match self {
            Self::SpamRejected => "spam",
            Self::QuotaExhausted { .. } => "quota",
            Self::UpstreamUnavailable(_) => "upstream",
            Self::EmptyCompletion => "empty_completion",
            Self::Persistence(_) => "persistence",
        }
    }
}
