//! One run of one program on one worker thread.
//!
//! The worker talks to the controller over an unbounded channel that a
//! router task drains. Every transition of the session state, and every
//! event the router forwards to the relay, happens under the session lock,
//! so once [`ExecutionSession::terminate`] has returned nothing the worker
//! still emits can reach the display.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::control_block::ControlBlock;
use crate::error::Result;
use crate::error::RunpadError;
use crate::input_protocol::InputReader;
use crate::input_protocol::InputWriter;
use crate::input_protocol::OverflowPolicy;
use crate::interpreter::ExecError;
use crate::interpreter::InterpreterFactory;
use crate::interpreter::RuntimeIo;
use crate::interpreter::Terminated;
use crate::phase::Phase;
use crate::relay::Notice;
use crate::relay::OutputRelay;
use crate::session_id::SessionId;

const WORKER_EXIT_NOTICE: &str = "Worker exited unexpectedly before finishing.";

/// Worker to controller traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerMessage {
    Output(String),
    InputRequested,
    Done,
}

/// Everything a session needs besides the shared controller plumbing.
pub(crate) struct SessionParams {
    pub id: SessionId,
    pub source: String,
    pub factory: Arc<dyn InterpreterFactory>,
    pub block_bytes: usize,
    pub overflow_policy: OverflowPolicy,
    pub echo_input: bool,
    pub worker_stack_bytes: Option<usize>,
}

#[derive(Debug)]
struct SessionState {
    phase: Phase,
    input_pending: bool,
}

struct SessionShared {
    id: SessionId,
    state: Mutex<SessionState>,
    phase_tx: Arc<watch::Sender<Phase>>,
    relay: OutputRelay,
}

impl SessionShared {
    fn set_phase(&self, state: &mut SessionState, phase: Phase) {
        if state.phase == phase {
            return;
        }
        debug!(session_id = %self.id, from = %state.phase, to = %phase, "phase change");
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Applies one worker message. Returns `false` once the session has
    /// settled and the router should stop.
    fn route(&self, message: WorkerMessage) -> bool {
        let mut state = self.state.lock();
        if state.phase.is_terminal() {
            trace!(session_id = %self.id, ?message, "discarding message from settled session");
            return false;
        }
        match message {
            WorkerMessage::Output(text) => {
                self.set_phase(&mut state, Phase::Running);
                self.relay.output(text);
                true
            }
            WorkerMessage::InputRequested => {
                state.input_pending = true;
                self.set_phase(&mut state, Phase::AwaitingInput);
                self.relay.input_requested();
                true
            }
            WorkerMessage::Done => {
                state.input_pending = false;
                self.set_phase(&mut state, Phase::Completed);
                false
            }
        }
    }

    /// The worker dropped its sender without reporting completion.
    fn worker_vanished(&self) {
        let mut state = self.state.lock();
        if state.phase.is_terminal() {
            return;
        }
        warn!(session_id = %self.id, "worker exited without reporting completion");
        state.input_pending = false;
        // Notice first: observers of the terminal phase drain the sink.
        self.relay.notice(Notice::error(WORKER_EXIT_NOTICE));
        self.set_phase(&mut state, Phase::Cancelled);
    }
}

pub(crate) struct ExecutionSession {
    shared: Arc<SessionShared>,
    block: Arc<ControlBlock>,
    writer: InputWriter,
    echo_input: bool,
    router: JoinHandle<()>,
}

impl ExecutionSession {
    /// Publishes `Running`, then starts the worker thread and its router task.
    pub(crate) fn spawn(
        params: SessionParams,
        runtime: &Handle,
        relay: OutputRelay,
        phase_tx: Arc<watch::Sender<Phase>>,
        live_workers: Arc<AtomicUsize>,
    ) -> Result<Self> {
        let SessionParams {
            id,
            source,
            factory,
            block_bytes,
            overflow_policy,
            echo_input,
            worker_stack_bytes,
        } = params;

        let block = Arc::new(ControlBlock::new(block_bytes)?);
        let writer = InputWriter::new(Arc::clone(&block), overflow_policy);
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(SessionShared {
            id,
            state: Mutex::new(SessionState {
                phase: Phase::Idle,
                input_pending: false,
            }),
            phase_tx,
            relay,
        });
        {
            let mut state = shared.state.lock();
            shared.set_phase(&mut state, Phase::Running);
        }

        let io = WorkerIo {
            tx,
            reader: InputReader::new(Arc::clone(&block)),
        };
        let interpreter = factory.name().to_string();
        let guard = LiveWorkerGuard::new(live_workers);
        let mut builder = thread::Builder::new().name(format!("runpad-worker-{id}"));
        if let Some(stack) = worker_stack_bytes {
            builder = builder.stack_size(stack);
        }
        let spawned = builder.spawn(move || {
            let _guard = guard;
            run_worker(id, &source, factory.as_ref(), io);
        });

        if let Err(err) = spawned {
            warn!(session_id = %id, error = %err, "failed to spawn worker thread");
            block.terminate();
            let mut state = shared.state.lock();
            shared.set_phase(&mut state, Phase::Errored);
            return Err(RunpadError::worker_spawn(err));
        }

        // Anything the worker sent so far is buffered in the channel.
        let router = runtime.spawn(route_messages(rx, Arc::clone(&shared)));
        debug!(session_id = %id, %interpreter, "session started");
        Ok(Self {
            shared,
            block,
            writer,
            echo_input,
            router,
        })
    }

    pub(crate) fn id(&self) -> SessionId {
        self.shared.id
    }

    pub(crate) fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.phase().is_terminal()
    }

    /// Fulfils the outstanding input request.
    pub(crate) fn submit_input(&self, line: &str) -> Result<usize> {
        let mut state = self.shared.state.lock();
        if state.phase.is_terminal() {
            return Err(RunpadError::SessionEnded);
        }
        if !state.input_pending {
            return Err(RunpadError::NoPendingInput);
        }
        let staged = self.writer.submit(line)?;
        state.input_pending = false;
        if self.echo_input {
            self.shared.relay.echo(line);
        }
        Ok(staged)
    }

    /// Tears the session down. Returns `false` when it had already settled.
    pub(crate) fn terminate(&self) -> bool {
        let cancelled = {
            let mut state = self.shared.state.lock();
            if state.phase.is_terminal() {
                false
            } else {
                state.input_pending = false;
                self.shared.set_phase(&mut state, Phase::Cancelled);
                true
            }
        };
        self.block.terminate();
        self.router.abort();
        if cancelled {
            debug!(session_id = %self.shared.id, "session cancelled");
        }
        cancelled
    }
}

impl Drop for ExecutionSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

async fn route_messages(mut rx: mpsc::UnboundedReceiver<WorkerMessage>, shared: Arc<SessionShared>) {
    while let Some(message) = rx.recv().await {
        if !shared.route(message) {
            return;
        }
    }
    shared.worker_vanished();
}

fn run_worker(id: SessionId, source: &str, factory: &dyn InterpreterFactory, mut io: WorkerIo) {
    let mut interpreter = factory.create();
    let outcome = match interpreter.run(source, &mut io) {
        Ok(()) => io.send(WorkerMessage::Done),
        Err(ExecError::Runtime(err)) => io
            .send(WorkerMessage::Output(format!("{err}\n")))
            .and_then(|()| io.send(WorkerMessage::Done)),
        Err(ExecError::Terminated(terminated)) => Err(terminated),
    };
    if outcome.is_err() {
        debug!(session_id = %id, "worker unwound after termination");
    }
}

/// The worker's view of the host.
struct WorkerIo {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    reader: InputReader,
}

impl WorkerIo {
    fn send(&self, message: WorkerMessage) -> std::result::Result<(), Terminated> {
        send(&self.tx, message)
    }
}

fn send(
    tx: &mpsc::UnboundedSender<WorkerMessage>,
    message: WorkerMessage,
) -> std::result::Result<(), Terminated> {
    tx.send(message).map_err(|_| Terminated)
}

impl RuntimeIo for WorkerIo {
    fn write_output(&mut self, text: &str) -> std::result::Result<(), Terminated> {
        self.checkpoint()?;
        if text.is_empty() {
            return Ok(());
        }
        self.send(WorkerMessage::Output(text.to_string()))
    }

    fn read_input(&mut self, buf: &mut [u8]) -> std::result::Result<usize, Terminated> {
        let tx = &self.tx;
        self.reader
            .read_into(buf, || send(tx, WorkerMessage::InputRequested))
    }

    fn checkpoint(&self) -> std::result::Result<(), Terminated> {
        if self.reader.is_terminated() || self.tx.is_closed() {
            return Err(Terminated);
        }
        Ok(())
    }
}

/// Counts a worker thread from spawn until its closure is dropped, which
/// also covers a failed spawn and a panicking runtime.
struct LiveWorkerGuard(Arc<AtomicUsize>);

impl LiveWorkerGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveWorkerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
