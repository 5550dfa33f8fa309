use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::conversation::DEFAULT_SYSTEM_PROMPT;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub completion: CompletionConfig,
    pub tiers: TiersConfig,
    pub access: AccessConfig,
    pub history: HistoryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TiersConfig {
    pub basic: TierConfig,
    pub enhanced: TierConfig,
}

/// One completion tier. A tier without `daily_limit` is unmetered: requests
/// on it never touch the usage ledger.
#[derive(Clone, Debug)]
pub struct TierConfig {
    pub model: String,
    pub daily_limit: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct AccessConfig {
    pub privileged_ids: Vec<i64>,
    pub spam_limit: u32,
    pub spam_window_secs: u64,
    pub premium_period_days: u32,
    pub timezone: String,
}

#[derive(Clone, Debug)]
pub struct HistoryConfig {
    pub max_turns: usize,
    pub persist: bool,
    pub system_prompt: String,
    pub tier_chooser: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub completion_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://drillbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
            },
            completion: CompletionConfig {
                api_key: String::new().into(),
                base_url: "https://api.openai.com/v1".to_string(),
                temperature: 0.9,
                max_output_tokens: 800,
                request_timeout_secs: 60,
            },
            tiers: TiersConfig {
                basic: TierConfig { model: "gpt-4o-mini".to_string(), daily_limit: None },
                enhanced: TierConfig { model: "gpt-5.1".to_string(), daily_limit: Some(3) },
            },
            access: AccessConfig {
                privileged_ids: Vec::new(),
                spam_limit: 5,
                spam_window_secs: 60,
                premium_period_days: 30,
                timezone: "Europe/Moscow".to_string(),
            },
            history: HistoryConfig {
                max_turns: 10,
                persist: false,
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                tier_chooser: true,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("drillbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(bot_token_value) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token_value);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(completion) = patch.completion {
            if let Some(api_key_value) = completion.api_key {
                self.completion.api_key = secret_value(api_key_value);
            }
            if let Some(base_url) = completion.base_url {
                self.completion.base_url = base_url;
            }
            if let Some(temperature) = completion.temperature {
                self.completion.temperature = temperature;
            }
            if let Some(max_output_tokens) = completion.max_output_tokens {
                self.completion.max_output_tokens = max_output_tokens;
            }
            if let Some(request_timeout_secs) = completion.request_timeout_secs {
                self.completion.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(tiers) = patch.tiers {
            if let Some(basic) = tiers.basic {
                apply_tier_patch(&mut self.tiers.basic, basic);
            }
            if let Some(enhanced) = tiers.enhanced {
                apply_tier_patch(&mut self.tiers.enhanced, enhanced);
            }
        }

        if let Some(access) = patch.access {
            if let Some(privileged_ids) = access.privileged_ids {
                self.access.privileged_ids = privileged_ids;
            }
            if let Some(spam_limit) = access.spam_limit {
                self.access.spam_limit = spam_limit;
            }
            if let Some(spam_window_secs) = access.spam_window_secs {
                self.access.spam_window_secs = spam_window_secs;
            }
            if let Some(premium_period_days) = access.premium_period_days {
                self.access.premium_period_days = premium_period_days;
            }
            if let Some(timezone) = access.timezone {
                self.access.timezone = timezone;
            }
        }

        if let Some(history) = patch.history {
            if let Some(max_turns) = history.max_turns {
                self.history.max_turns = max_turns;
            }
            if let Some(persist) = history.persist {
                self.history.persist = persist;
            }
            if let Some(system_prompt) = history.system_prompt {
                self.history.system_prompt = system_prompt;
            }
            if let Some(tier_chooser) = history.tier_chooser {
                self.history.tier_chooser = tier_chooser;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DRILLBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DRILLBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("DRILLBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DRILLBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DRILLBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DRILLBOT_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("DRILLBOT_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("DRILLBOT_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("DRILLBOT_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DRILLBOT_COMPLETION_API_KEY") {
            self.completion.api_key = secret_value(value);
        }
        if let Some(value) = read_env("DRILLBOT_COMPLETION_BASE_URL") {
            self.completion.base_url = value;
        }
        if let Some(value) = read_env("DRILLBOT_COMPLETION_TEMPERATURE") {
            self.completion.temperature = parse_f32("DRILLBOT_COMPLETION_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("DRILLBOT_COMPLETION_MAX_OUTPUT_TOKENS") {
            self.completion.max_output_tokens =
                parse_u32("DRILLBOT_COMPLETION_MAX_OUTPUT_TOKENS", &value)?;
        }
        if let Some(value) = read_env("DRILLBOT_COMPLETION_REQUEST_TIMEOUT_SECS") {
            self.completion.request_timeout_secs =
                parse_u64("DRILLBOT_COMPLETION_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DRILLBOT_TIERS_BASIC_MODEL") {
            self.tiers.basic.model = value;
        }
        if let Some(value) = read_env("DRILLBOT_TIERS_BASIC_DAILY_LIMIT") {
            self.tiers.basic.daily_limit =
                Some(parse_u32("DRILLBOT_TIERS_BASIC_DAILY_LIMIT", &value)?);
        }
        if let Some(value) = read_env("DRILLBOT_TIERS_ENHANCED_MODEL") {
            self.tiers.enhanced.model = value;
        }
        if let Some(value) = read_env("DRILLBOT_TIERS_ENHANCED_DAILY_LIMIT") {
            self.tiers.enhanced.daily_limit =
                Some(parse_u32("DRILLBOT_TIERS_ENHANCED_DAILY_LIMIT", &value)?);
        }

        if let Some(value) = read_env("DRILLBOT_ACCESS_PRIVILEGED_IDS") {
            self.access.privileged_ids = parse_id_list("DRILLBOT_ACCESS_PRIVILEGED_IDS", &value)?;
        }
        if let Some(value) = read_env("DRILLBOT_ACCESS_SPAM_LIMIT") {
            self.access.spam_limit = parse_u32("DRILLBOT_ACCESS_SPAM_LIMIT", &value)?;
        }
        if let Some(value) = read_env("DRILLBOT_ACCESS_SPAM_WINDOW_SECS") {
            self.access.spam_window_secs = parse_u64("DRILLBOT_ACCESS_SPAM_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("DRILLBOT_ACCESS_PREMIUM_PERIOD_DAYS") {
            self.access.premium_period_days =
                parse_u32("DRILLBOT_ACCESS_PREMIUM_PERIOD_DAYS", &value)?;
        }
        if let Some(value) = read_env("DRILLBOT_ACCESS_TIMEZONE") {
            self.access.timezone = value;
        }

        if let Some(value) = read_env("DRILLBOT_HISTORY_MAX_TURNS") {
            self.history.max_turns =
                parse_u32("DRILLBOT_HISTORY_MAX_TURNS", &value)? as usize;
        }
        if let Some(value) = read_env("DRILLBOT_HISTORY_PERSIST") {
            self.history.persist = parse_bool("DRILLBOT_HISTORY_PERSIST", &value)?;
        }
        if let Some(value) = read_env("DRILLBOT_HISTORY_SYSTEM_PROMPT") {
            self.history.system_prompt = value;
        }
        if let Some(value) = read_env("DRILLBOT_HISTORY_TIER_CHOOSER") {
            self.history.tier_chooser = parse_bool("DRILLBOT_HISTORY_TIER_CHOOSER", &value)?;
        }

        if let Some(value) = read_env("DRILLBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DRILLBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("DRILLBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("DRILLBOT_LOGGING_LEVEL").or_else(|| read_env("DRILLBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DRILLBOT_LOGGING_FORMAT").or_else(|| read_env("DRILLBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(telegram_bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(telegram_bot_token);
        }
        if let Some(completion_api_key) = overrides.completion_api_key {
            self.completion.api_key = secret_value(completion_api_key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_telegram(&self.telegram)?;
        validate_completion(&self.completion)?;
        validate_tiers(&self.tiers)?;
        validate_access(&self.access)?;
        validate_history(&self.history)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// The reference time zone used for quota day boundaries. Validation
    /// guarantees the stored name parses, so this never fails after `load`.
    pub fn reference_timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        parse_timezone(&self.access.timezone)
    }
}

fn apply_tier_patch(tier: &mut TierConfig, patch: TierPatch) {
    if let Some(model) = patch.model {
        tier.model = model;
    }
    if let Some(daily_limit) = patch.daily_limit {
        tier.daily_limit = Some(daily_limit);
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("drillbot.toml"), PathBuf::from("config/drillbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn parse_timezone(name: &str) -> Result<chrono_tz::Tz, ConfigError> {
    name.trim().parse::<chrono_tz::Tz>().map_err(|_| {
        ConfigError::Validation(format!(
            "access.timezone `{name}` is not a recognized IANA time zone name"
        ))
    })
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let bot_token = telegram.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Get it from @BotFather".to_string(),
        ));
    }
    if !bot_token.contains(':') {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot-id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    let base_url = telegram.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "telegram.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if telegram.poll_timeout_secs == 0 || telegram.poll_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_completion(completion: &CompletionConfig) -> Result<(), ConfigError> {
    if completion.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("completion.api_key is required".to_string()));
    }

    let base_url = completion.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "completion.base_url must start with http:// or https://".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&completion.temperature) {
        return Err(ConfigError::Validation(
            "completion.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if completion.max_output_tokens == 0 {
        return Err(ConfigError::Validation(
            "completion.max_output_tokens must be greater than zero".to_string(),
        ));
    }

    if completion.request_timeout_secs == 0 || completion.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "completion.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_tiers(tiers: &TiersConfig) -> Result<(), ConfigError> {
    if tiers.basic.model.trim().is_empty() {
        return Err(ConfigError::Validation("tiers.basic.model must not be empty".to_string()));
    }
    if tiers.enhanced.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "tiers.enhanced.model must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_access(access: &AccessConfig) -> Result<(), ConfigError> {
    if access.spam_limit == 0 {
        return Err(ConfigError::Validation(
            "access.spam_limit must be greater than zero".to_string(),
        ));
    }

    if access.spam_window_secs == 0 || access.spam_window_secs > 3600 {
        return Err(ConfigError::Validation(
            "access.spam_window_secs must be in range 1..=3600".to_string(),
        ));
    }

    if access.premium_period_days == 0 {
        return Err(ConfigError::Validation(
            "access.premium_period_days must be greater than zero".to_string(),
        ));
    }

    parse_timezone(&access.timezone)?;

    Ok(())
}

fn validate_history(history: &HistoryConfig) -> Result<(), ConfigError> {
    if history.max_turns == 0 || history.max_turns > 200 {
        return Err(ConfigError::Validation(
            "history.max_turns must be in range 1..=200".to_string(),
        ));
    }

    if history.system_prompt.trim().is_empty() {
        return Err(ConfigError::Validation(
            "history.system_prompt must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_id_list(key: &str, value: &str) -> Result<Vec<i64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    telegram: Option<TelegramPatch>,
    completion: Option<CompletionPatch>,
    tiers: Option<TiersPatch>,
    access: Option<AccessPatch>,
    history: Option<HistoryPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TiersPatch {
    basic: Option<TierPatch>,
    enhanced: Option<TierPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TierPatch {
    model: Option<String>,
    daily_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AccessPatch {
    privileged_ids: Option<Vec<i64>>,
    spam_limit: Option<u32>,
    spam_window_secs: Option<u64>,
    premium_period_days: Option<u32>,
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryPatch {
    max_turns: Option<usize>,
    persist: Option<bool>,
    system_prompt: Option<String>,
    tier_chooser: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
