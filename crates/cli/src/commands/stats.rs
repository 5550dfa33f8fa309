use crate::commands::CommandResult;
use drillbot_core::clock::{Clock, SystemClock};
use drillbot_core::config::{AppConfig, LoadOptions};
use drillbot_db::{connect_with_settings, migrations, EntitlementStore, QuotaLedger};
use drillbot_db::{SqlEntitlementStore, SqlQuotaLedger};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "stats",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let timezone = match config.reference_timezone() {
        Ok(timezone) => timezone,
        Err(error) => {
            return CommandResult::failure(
                "stats",
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
                "stats",
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
        let ledger = SqlQuotaLedger::new(pool.clone());
        let clock = SystemClock::new(timezone);

        let users = store
            .user_count()
            .await
            .map_err(|error| ("stats_query", error.to_string(), 6u8))?;
        let premium = store
            .active_premium_count(clock.now())
            .await
            .map_err(|error| ("stats_query", error.to_string(), 6u8))?;
        let today = clock.today();
        let totals = ledger
            .totals_on(today)
            .await
            .map_err(|error| ("stats_query", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>((users, premium, today, totals))
    });

    match result {
        Ok((users, premium, today, totals)) => CommandResult::success(
            "stats",
            format!(
                "users: {users}, active premium: {premium}, {today}: {} metered uses by {} users",
                totals.total_uses, totals.active_users
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("stats", error_class, message, exit_code)
        }
    }
}
