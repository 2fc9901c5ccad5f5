use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use runpad_core::DisplayEvent;
use runpad_core::DisplaySink;
use runpad_core::ExecError;
use runpad_core::Interpreter;
use runpad_core::InterpreterFactory;
use runpad_core::Notice;
use runpad_core::Phase;
use runpad_core::RunpadConfig;
use runpad_core::RuntimeError;
use runpad_core::RuntimeIo;
use runpad_core::SessionController;
use tokio::sync::Notify;
use tokio::sync::watch;

pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Display sink that keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DisplayEvent>>,
    changed: Notify,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().clone()
    }

    /// Output fragments in delivery order.
    pub fn outputs(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                DisplayEvent::Output(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn output_text(&self) -> String {
        self.outputs().concat()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                DisplayEvent::Notice(notice) => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &DisplayEvent) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| *event == wanted)
            .count()
    }

    /// Waits until `predicate` holds for the recorded events.
    pub async fn wait_until<F>(&self, predicate: F)
    where
        F: Fn(&[DisplayEvent]) -> bool,
    {
        tokio::time::timeout(DEFAULT_WAIT, async {
            loop {
                let notified = self.changed.notified();
                if predicate(&self.events.lock()) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("sink condition not reached in time");
    }
}

impl DisplaySink for RecordingSink {
    fn deliver(&self, event: DisplayEvent) {
        self.events.lock().push(event);
        self.changed.notify_waiters();
    }
}

/// Waits until the published phase satisfies `predicate`.
pub async fn wait_for_phase<F>(phases: &mut watch::Receiver<Phase>, predicate: F) -> Phase
where
    F: FnMut(&Phase) -> bool,
{
    let phase = tokio::time::timeout(DEFAULT_WAIT, phases.wait_for(predicate))
        .await
        .expect("phase not reached in time")
        .expect("phase sender dropped");
    *phase
}

pub async fn settle(controller: &SessionController) -> Phase {
    tokio::time::timeout(DEFAULT_WAIT, controller.wait_for_settle())
        .await
        .expect("run did not settle in time")
}

/// Polls until the controller reports exactly `expected` live worker threads.
pub async fn wait_for_live_workers(controller: &SessionController, expected: usize) {
    tokio::time::timeout(DEFAULT_WAIT, async {
        while controller.live_workers() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker threads did not exit in time");
}

pub fn controller_with(
    config: RunpadConfig,
    factory: Arc<dyn InterpreterFactory>,
) -> (SessionController, Arc<RecordingSink>) {
    let sink = RecordingSink::new();
    let controller = SessionController::new(config, factory, sink.clone());
    (controller, sink)
}

/// One scripted action of a [`ScriptedInterpreter`].
#[derive(Debug, Clone)]
pub enum Step {
    Output(String),
    /// Reads a line and writes it back prefixed with `echo:`.
    EchoLine,
    /// Reads into a buffer of the given size and writes back what arrived.
    ReadChunk(usize),
    Fail(RuntimeError),
    Panic(String),
    /// Loops on `checkpoint` until the session is torn down.
    Spin,
}

/// Interpreter that ignores its source and replays fixed steps.
pub struct ScriptedInterpreter {
    steps: Vec<Step>,
}

impl Interpreter for ScriptedInterpreter {
    fn run(&mut self, _source: &str, io: &mut dyn RuntimeIo) -> Result<(), ExecError> {
        for step in &self.steps {
            io.checkpoint()?;
            match step {
                Step::Output(text) => io.write_output(text)?,
                Step::EchoLine => {
                    let line = io.read_line()?.unwrap_or_default();
                    io.write_output(&format!("echo:{line}"))?;
                }
                Step::ReadChunk(size) => {
                    let mut buf = vec![0u8; *size];
                    let n = io.read_input(&mut buf)?;
                    io.write_output(&String::from_utf8_lossy(&buf[..n]))?;
                }
                Step::Fail(err) => return Err(err.clone().into()),
                Step::Panic(message) => panic!("{message}"),
                Step::Spin => loop {
                    io.checkpoint()?;
                    std::thread::yield_now();
                },
            }
        }
        Ok(())
    }
}

pub struct ScriptedFactory {
    steps: Vec<Step>,
}

impl ScriptedFactory {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self { steps })
    }
}

impl InterpreterFactory for ScriptedFactory {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create(&self) -> Box<dyn Interpreter> {
        Box::new(ScriptedInterpreter {
            steps: self.steps.clone(),
        })
    }
}
