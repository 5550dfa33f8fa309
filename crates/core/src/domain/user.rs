use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram account identifier, as delivered in updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion tier a request runs on. `Basic` maps to the cheap unmetered
/// model, `Enhanced` to the strong model that burns daily quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Basic,
    Enhanced,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Enhanced => "enhanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "enhanced" => Some(Self::Enhanced),
            _ => None,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Self::Basic => Self::Enhanced,
            Self::Enhanced => Self::Basic,
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::Basic
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub mode: Mode,
    pub premium_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self { id, mode: Mode::default(), premium_until: None, created_at: now, updated_at: now }
    }
}
