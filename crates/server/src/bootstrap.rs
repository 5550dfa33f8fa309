use std::sync::Arc;

use drillbot_agent::completion::OpenAiCompletionClient;
use drillbot_agent::engine::{ChatEngine, EnginePolicy};
use drillbot_core::config::{AppConfig, ConfigError, LoadOptions};
use drillbot_core::SystemClock;
use drillbot_db::{
    connect_with_settings, migrations, DbPool, HistoryStore, SqlEntitlementStore, SqlHistoryStore,
    SqlQuotaLedger,
};
use drillbot_telegram::api::HttpBotApi;
use drillbot_telegram::poller::{HttpUpdateTransport, PollRunner, ReconnectPolicy};
use thiserror::Error;
use tracing::info;

use crate::bot;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<ChatEngine>,
    pub runner: PollRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    // Validation already proved the zone name parses.
    let timezone = config.reference_timezone()?;
    let clock = Arc::new(SystemClock::new(timezone));
    let entitlements = Arc::new(SqlEntitlementStore::new(db_pool.clone()));
    let ledger = Arc::new(SqlQuotaLedger::new(db_pool.clone()));
    let history: Option<Arc<dyn HistoryStore>> = if config.history.persist {
        Some(Arc::new(SqlHistoryStore::new(db_pool.clone())))
    } else {
        None
    };
    let completion = Arc::new(OpenAiCompletionClient::new(&config.completion));

    let engine = Arc::new(ChatEngine::new(
        EnginePolicy::from_config(&config),
        clock,
        entitlements,
        ledger,
        history,
        completion,
    ));

    let api = Arc::new(HttpBotApi::with_base_url(
        config.telegram.bot_token.clone(),
        config.telegram.api_base_url.clone(),
    ));
    let transport = Arc::new(
        HttpUpdateTransport::with_base_url(
            config.telegram.bot_token.clone(),
            config.telegram.api_base_url.clone(),
        )
        .poll_timeout(config.telegram.poll_timeout_secs),
    );
    let dispatcher = bot::dispatcher(engine.clone(), api.clone(), &config);
    let runner = PollRunner::new(transport, api, dispatcher, ReconnectPolicy::default());
    info!(
        event_name = "system.bootstrap.telegram_wired",
        correlation_id = "bootstrap",
        history_persisted = config.history.persist,
        "telegram poller and action handlers wired"
    );

    Ok(Application { config, db_pool, engine, runner })
}

#[cfg(test)]
mod tests {
    use drillbot_core::config::{ConfigOverrides, LoadOptions};
    use drillbot_core::{Mode, UserId};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_on_a_malformed_bot_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                telegram_bot_token: Some("token-without-a-colon".to_string()),
                completion_api_key: Some("sk-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("telegram.bot_token"));
    }

    #[tokio::test]
    async fn integration_smoke_covers_startup_schema_and_the_engine_data_path() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('users', 'usage', 'conversation_messages')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected foundation tables to be available after bootstrap");
        assert_eq!(table_count, 3, "bootstrap should expose the baseline chat-path tables");

        // The summary path registers the user through the SQL stores, which
        // proves the engine is wired to the same pool the migrations ran on.
        let summary = app
            .engine
            .usage_summary(UserId(42))
            .await
            .expect("summary should work against a fresh database");
        assert_eq!(summary.mode, Mode::Basic);
        assert_eq!(summary.used_today, 0);
        assert_eq!(summary.total_users, 1);

        app.db_pool.close().await;
    }

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                telegram_bot_token: Some("12345:test-secret".to_string()),
                completion_api_key: Some("sk-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }
}
