use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use runpad_core::ChannelSink;
use runpad_core::ConfigOverrides;
use runpad_core::DisplayEvent;
use runpad_core::HostCapabilities;
use runpad_core::InterpreterFactory;
use runpad_core::MiniScriptFactory;
use runpad_core::RunpadConfig;
use runpad_core::SessionController;
use runpad_core::find_runpad_home;
use serde::Serialize;

#[derive(Debug, Parser)]
pub struct CheckCli {
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    status: &'static str,
    blocking_input_available: bool,
    capabilities: HostCapabilities,
    interpreter: String,
    runpad_home: PathBuf,
    config: RunpadConfig,
}

pub fn run(cli: CheckCli) -> Result<i32> {
    let runpad_home = find_runpad_home().context("failed to resolve RUNPAD_HOME")?;
    let config = RunpadConfig::load_from_home(&runpad_home, ConfigOverrides::default())?;
    let factory = Arc::new(MiniScriptFactory);
    let (sink, mut events) = ChannelSink::new();
    let controller = SessionController::new(config.clone(), factory.clone(), Arc::new(sink));

    let report = CheckReport {
        status: controller.status_label(),
        blocking_input_available: controller.blocking_input_available(),
        capabilities: controller.capabilities(),
        interpreter: factory.name().to_string(),
        runpad_home,
        config,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        while let Ok(event) = events.try_recv() {
            if let DisplayEvent::Notice(notice) = event {
                println!("{notice}");
            }
        }
        println!("status: {}", report.status);
        println!("threads: {}", yes_no(report.capabilities.threads));
        println!("atomic wait: {}", yes_no(report.capabilities.atomic_wait));
        println!("interpreter: {}", report.interpreter);
        println!("runpad home: {}", report.runpad_home.display());
    }

    Ok(if report.blocking_input_available { 0 } else { 1 })
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
