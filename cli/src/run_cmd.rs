use std::io::IsTerminal;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::ValueEnum;
use runpad_core::ChannelSink;
use runpad_core::ConfigOverrides;
use runpad_core::DisplayEvent;
use runpad_core::MiniScriptFactory;
use runpad_core::OverflowPolicy;
use runpad_core::Phase;
use runpad_core::RunpadConfig;
use runpad_core::SessionController;
use runpad_core::find_runpad_home;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use tracing::warn;

use crate::EXIT_CANCELLED;

/// Stand-in deadline when no timeout was requested.
const NO_DEADLINE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Parser)]
pub struct RunCli {
    /// Program file to run.
    #[arg(value_name = "FILE", required_unless_present = "code", conflicts_with = "code")]
    pub file: Option<PathBuf>,

    /// Program text to run instead of a file.
    #[arg(long, value_name = "TEXT")]
    pub code: Option<String>,

    /// Cancel the run after this many milliseconds.
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Size of the input control block, header included.
    #[arg(long = "block-bytes", value_name = "BYTES")]
    pub block_bytes: Option<usize>,

    /// What to do with an input line that does not fit the control block.
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowArg>,

    /// Do not echo submitted input lines.
    #[arg(long = "no-echo", default_value_t = false)]
    pub no_echo: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OverflowArg {
    Reject,
    Truncate,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(value: OverflowArg) -> Self {
        match value {
            OverflowArg::Reject => OverflowPolicy::Reject,
            OverflowArg::Truncate => OverflowPolicy::Truncate,
        }
    }
}

impl RunCli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            control_block_bytes: self.block_bytes,
            overflow_policy: self.overflow.map(Into::into),
            echo_input: self.no_echo.then_some(false),
            ..Default::default()
        }
    }

    fn source(&self) -> Result<String> {
        match (&self.file, &self.code) {
            (_, Some(code)) => Ok(code.clone()),
            (Some(path), None) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            (None, None) => anyhow::bail!("either FILE or --code is required"),
        }
    }
}

pub async fn run(cli: RunCli) -> Result<i32> {
    let source = cli.source()?;
    let runpad_home = find_runpad_home().context("failed to resolve RUNPAD_HOME")?;
    let config = RunpadConfig::load_from_home(&runpad_home, cli.overrides())?;

    let (sink, mut events) = ChannelSink::new();
    let controller = SessionController::new(config, Arc::new(MiniScriptFactory), Arc::new(sink));
    let mut phases = controller.subscribe_phase();

    let mut console = Console {
        echo_inputs: !std::io::stdin().is_terminal(),
        awaiting_input: false,
    };

    if let Err(err) = controller.start(&source) {
        console.drain(&mut events)?;
        eprintln!("error: {err}");
        return Ok(1);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut deadline_armed = cli.timeout_ms.is_some();
    let deadline = tokio::time::sleep(cli.timeout_ms.map_or(NO_DEADLINE, Duration::from_millis));
    tokio::pin!(deadline);
    // One listener for the whole run, re-armed after each delivery.
    let mut interrupt_armed = true;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        if !phases.borrow_and_update().is_active() {
            break;
        }
        tokio::select! {
            Some(event) = events.recv() => console.render(event)?,
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            line = stdin.next_line(), if stdin_open && console.awaiting_input => match line {
                Ok(Some(line)) => match controller.submit_input(&line) {
                    Ok(_) => console.awaiting_input = false,
                    Err(err) => eprintln!("> {err}"),
                },
                Ok(None) => {
                    stdin_open = false;
                    eprintln!("> stdin closed while the program was waiting for input.");
                    controller.cancel();
                }
                Err(err) => {
                    stdin_open = false;
                    eprintln!("> failed to read stdin: {err}");
                    controller.cancel();
                }
            },
            received = &mut interrupt, if interrupt_armed => match received {
                Ok(()) => {
                    debug!("interrupt received");
                    interrupt.set(tokio::signal::ctrl_c());
                    controller.cancel();
                }
                Err(err) => {
                    interrupt_armed = false;
                    warn!(error = %err, "failed to listen for interrupts");
                }
            },
            _ = &mut deadline, if deadline_armed => {
                deadline_armed = false;
                eprintln!("> Timed out.");
                controller.cancel();
            }
        }
    }

    console.drain(&mut events)?;
    let phase = controller.phase();
    debug!(%phase, delivered = controller.delivered(), "run finished");
    Ok(exit_code(phase))
}

fn exit_code(phase: Phase) -> i32 {
    match phase {
        Phase::Completed => 0,
        Phase::Cancelled => EXIT_CANCELLED,
        Phase::Idle | Phase::Running | Phase::AwaitingInput | Phase::Errored => 1,
    }
}

struct Console {
    /// Repeat submitted lines on stdout when they were not typed at a terminal.
    echo_inputs: bool,
    awaiting_input: bool,
}

impl Console {
    fn render(&mut self, event: DisplayEvent) -> Result<()> {
        match event {
            DisplayEvent::Output(text) => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            DisplayEvent::InputRequested => self.awaiting_input = true,
            DisplayEvent::InputEcho(line) => {
                if self.echo_inputs {
                    let mut stdout = std::io::stdout().lock();
                    writeln!(stdout, "{line}")?;
                    stdout.flush()?;
                }
            }
            DisplayEvent::Notice(notice) => eprintln!("{notice}"),
            // Scrollback is left alone.
            DisplayEvent::Clear => {}
        }
        Ok(())
    }

    fn drain(&mut self, events: &mut UnboundedReceiver<DisplayEvent>) -> Result<()> {
        while let Ok(event) = events.try_recv() {
            self.render(event)?;
        }
        Ok(())
    }
}
