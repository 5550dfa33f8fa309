use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use drillbot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "DRILLBOT_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "DRILLBOT_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "DRILLBOT_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "telegram.bot_token",
        &redact_bot_token(config.telegram.bot_token.expose_secret()),
        source("telegram.bot_token", "DRILLBOT_TELEGRAM_BOT_TOKEN"),
    ));
    lines.push(render_line(
        "telegram.api_base_url",
        &config.telegram.api_base_url,
        source("telegram.api_base_url", "DRILLBOT_TELEGRAM_API_BASE_URL"),
    ));
    lines.push(render_line(
        "telegram.poll_timeout_secs",
        &config.telegram.poll_timeout_secs.to_string(),
        source("telegram.poll_timeout_secs", "DRILLBOT_TELEGRAM_POLL_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "completion.api_key",
        &redact_api_key(config.completion.api_key.expose_secret()),
        source("completion.api_key", "DRILLBOT_COMPLETION_API_KEY"),
    ));
    lines.push(render_line(
        "completion.base_url",
        &config.completion.base_url,
        source("completion.base_url", "DRILLBOT_COMPLETION_BASE_URL"),
    ));
    lines.push(render_line(
        "completion.temperature",
        &config.completion.temperature.to_string(),
        source("completion.temperature", "DRILLBOT_COMPLETION_TEMPERATURE"),
    ));
    lines.push(render_line(
        "completion.max_output_tokens",
        &config.completion.max_output_tokens.to_string(),
        source("completion.max_output_tokens", "DRILLBOT_COMPLETION_MAX_OUTPUT_TOKENS"),
    ));
    lines.push(render_line(
        "completion.request_timeout_secs",
        &config.completion.request_timeout_secs.to_string(),
        source("completion.request_timeout_secs", "DRILLBOT_COMPLETION_REQUEST_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "tiers.basic.model",
        &config.tiers.basic.model,
        source("tiers.basic.model", "DRILLBOT_TIERS_BASIC_MODEL"),
    ));
    lines.push(render_line(
        "tiers.basic.daily_limit",
        &render_limit(config.tiers.basic.daily_limit),
        source("tiers.basic.daily_limit", "DRILLBOT_TIERS_BASIC_DAILY_LIMIT"),
    ));
    lines.push(render_line(
        "tiers.enhanced.model",
        &config.tiers.enhanced.model,
        source("tiers.enhanced.model", "DRILLBOT_TIERS_ENHANCED_MODEL"),
    ));
    lines.push(render_line(
        "tiers.enhanced.daily_limit",
        &render_limit(config.tiers.enhanced.daily_limit),
        source("tiers.enhanced.daily_limit", "DRILLBOT_TIERS_ENHANCED_DAILY_LIMIT"),
    ));

    lines.push(render_line(
        "access.privileged_ids",
        &render_id_list(&config.access.privileged_ids),
        source("access.privileged_ids", "DRILLBOT_ACCESS_PRIVILEGED_IDS"),
    ));
    lines.push(render_line(
        "access.spam_limit",
        &config.access.spam_limit.to_string(),
        source("access.spam_limit", "DRILLBOT_ACCESS_SPAM_LIMIT"),
    ));
    lines.push(render_line(
        "access.spam_window_secs",
        &config.access.spam_window_secs.to_string(),
        source("access.spam_window_secs", "DRILLBOT_ACCESS_SPAM_WINDOW_SECS"),
    ));
    lines.push(render_line(
        "access.premium_period_days",
        &config.access.premium_period_days.to_string(),
        source("access.premium_period_days", "DRILLBOT_ACCESS_PREMIUM_PERIOD_DAYS"),
    ));
    lines.push(render_line(
        "access.timezone",
        &config.access.timezone,
        source("access.timezone", "DRILLBOT_ACCESS_TIMEZONE"),
    ));

    lines.push(render_line(
        "history.max_turns",
        &config.history.max_turns.to_string(),
        source("history.max_turns", "DRILLBOT_HISTORY_MAX_TURNS"),
    ));
    lines.push(render_line(
        "history.persist",
        &config.history.persist.to_string(),
        source("history.persist", "DRILLBOT_HISTORY_PERSIST"),
    ));
    lines.push(render_line(
        "history.system_prompt",
        &format!("<{} chars>", config.history.system_prompt.chars().count()),
        source("history.system_prompt", "DRILLBOT_HISTORY_SYSTEM_PROMPT"),
    ));
    lines.push(render_line(
        "history.tier_chooser",
        &config.history.tier_chooser.to_string(),
        source("history.tier_chooser", "DRILLBOT_HISTORY_TIER_CHOOSER"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "DRILLBOT_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", "DRILLBOT_SERVER_HEALTH_CHECK_PORT"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "DRILLBOT_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "DRILLBOT_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("drillbot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/drillbot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn render_limit(limit: Option<u32>) -> String {
    match limit {
        Some(value) => value.to_string(),
        None => "<unmetered>".to_string(),
    }
}

fn render_id_list(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "<none>".to_string();
    }
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

fn redact_bot_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}

fn redact_api_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
