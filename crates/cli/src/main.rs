use std::process::ExitCode;

fn main() -> ExitCode {
    drillbot_cli::run()
}
