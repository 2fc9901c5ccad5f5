pub mod check_cmd;
pub mod run_cmd;

use clap::Parser;
use clap::Subcommand;
use tracing_subscriber::EnvFilter;

use crate::check_cmd::CheckCli;
use crate::run_cmd::RunCli;

/// Exit status for a run that was interrupted or timed out.
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "runpad", version, about = "Run small interactive programs on an isolated worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a program, answering its input requests from stdin.
    Run(RunCli),
    /// Report whether this host supports blocking input.
    Check(CheckCli),
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Run(run) => run_cmd::run(run).await,
        Command::Check(check) => check_cmd::run(check),
    }
}

/// Logs go to stderr so program output on stdout stays clean. `RUST_LOG`
/// overrides the default `warn` level.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
