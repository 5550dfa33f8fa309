pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "drillbot",
    about = "Drillbot operator CLI",
    long_about = "Operate drillbot migrations, config inspection, readiness checks, usage stats, and premium grants.",
    after_help = "Examples:\n  drillbot doctor --json\n  drillbot config\n  drillbot stats\n  drillbot grant --user 42 --days 30"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, token readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Report user population, active premium count, and today's metered usage")]
    Stats,
    #[command(about = "Grant premium days to a user, stacking on any active entitlement")]
    Grant {
        #[arg(long, help = "Telegram user id receiving the grant")]
        user: i64,
        #[arg(long, help = "Number of premium days to add")]
        days: u32,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Stats => commands::stats::run(),
        Command::Grant { user, days } => commands::grant::run(user, days),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
