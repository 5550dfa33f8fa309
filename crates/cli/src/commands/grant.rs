use chrono::Utc;

use crate::commands::CommandResult;
use drillbot_core::config::{AppConfig, LoadOptions};
use drillbot_core::domain::user::UserId;
use drillbot_db::{connect_with_settings, migrations, EntitlementStore, SqlEntitlementStore};

pub fn run(user: i64, days: u32) -> CommandResult {
    if days == 0 {
        return CommandResult::failure(
            "grant",
            "invalid_argument",
            "days must be at least 1",
            2,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "grant",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "grant",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let store = SqlEntitlementStore::new(pool.clone());
        let expiry = store
            .grant(UserId(user), Utc::now(), days)
            .await
            .map_err(|error| ("grant_execution", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(expiry)
    });

    match result {
        Ok(expiry) => CommandResult::success(
            "grant",
            format!("user {user} premium active until {}", expiry.format("%Y-%m-%d %H:%M UTC")),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("grant", error_class, message, exit_code)
        }
    }
}
