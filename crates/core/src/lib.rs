pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AccessConfig, AppConfig, CompletionConfig, ConfigError, ConfigOverrides, DatabaseConfig,
    HistoryConfig, LoadOptions, LogFormat, LoggingConfig, ServerConfig, TelegramConfig,
    TierConfig, TiersConfig,
};
pub use domain::access::{decide, AccessDecision, AccessRequest, AdmitBasis, BlockReason};
pub use domain::conversation::{ChatMessage, ConversationBuffer, Role, DEFAULT_SYSTEM_PROMPT};
pub use domain::entitlement::{extended_expiry, is_active};
pub use domain::ratelimit::SpamGuard;
pub use domain::user::{Mode, UserId, UserRecord};
pub use errors::EngineError;
