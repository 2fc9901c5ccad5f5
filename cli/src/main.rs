use clap::Parser;
use runpad_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    runpad_cli::init_tracing();
    let code = runpad_cli::dispatch(cli).await?;
    // A worker may still be parked on input; do not wait for runtime shutdown.
    std::process::exit(code);
}
