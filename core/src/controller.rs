//! Owner of at most one live [`ExecutionSession`].

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use crate::capability::HostCapabilities;
use crate::config::RunpadConfig;
use crate::error::Result;
use crate::error::RunpadError;
use crate::interpreter::InterpreterFactory;
use crate::phase::Phase;
use crate::relay::DisplaySink;
use crate::relay::Notice;
use crate::relay::OutputRelay;
use crate::session::ExecutionSession;
use crate::session::SessionParams;
use crate::session_id::SessionId;

pub const READY_NOTICE: &str = "Environment isolated. Ready to execute.";
pub const STOPPED_NOTICE: &str = "Execution Stopped.";
pub const BLOCKED_LABEL: &str = "SECURITY BLOCKED";

pub struct SessionController {
    config: RunpadConfig,
    factory: Arc<dyn InterpreterFactory>,
    capabilities: HostCapabilities,
    relay: OutputRelay,
    phase_tx: Arc<watch::Sender<Phase>>,
    live_workers: Arc<AtomicUsize>,
    next_id: AtomicU32,
    active: Mutex<Option<ExecutionSession>>,
}

impl SessionController {
    pub fn new(
        config: RunpadConfig,
        factory: Arc<dyn InterpreterFactory>,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        Self::with_capabilities(config, factory, sink, HostCapabilities::detect())
    }

    /// Like [`SessionController::new`] with an explicit capability report
    /// instead of probing the host.
    pub fn with_capabilities(
        config: RunpadConfig,
        factory: Arc<dyn InterpreterFactory>,
        sink: Arc<dyn DisplaySink>,
        capabilities: HostCapabilities,
    ) -> Self {
        let relay = OutputRelay::new(sink);
        match capabilities.missing() {
            None => relay.notice(Notice::success(READY_NOTICE)),
            Some(missing) => relay.notice(Notice::error(format!(
                "Blocking input unavailable: {missing} not detected."
            ))),
        }
        info!(
            interpreter = factory.name(),
            threads = capabilities.threads,
            atomic_wait = capabilities.atomic_wait,
            "session controller ready"
        );
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            config,
            factory,
            capabilities,
            relay,
            phase_tx: Arc::new(phase_tx),
            live_workers: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU32::new(1),
            active: Mutex::new(None),
        }
    }

    /// Starts `source` in a fresh session, tearing down any previous one.
    /// Must be called from within a tokio runtime. Fails with
    /// [`RunpadError::InvalidConfig`] without side effects when the
    /// configuration does not validate.
    pub fn start(&self, source: &str) -> Result<SessionId> {
        if let Some(missing) = self.capabilities.missing() {
            self.relay.notice(Notice::error(format!(
                "Cannot run: blocking input requires {missing}."
            )));
            return Err(RunpadError::CapabilityUnavailable { missing });
        }
        let runtime = Handle::try_current().map_err(|_| RunpadError::NoRuntime)?;
        // Refuse before the previous run or the console is touched.
        self.config.validate()?;

        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            let was_live = previous.terminate();
            debug!(session_id = %previous.id(), was_live, "replacing previous run");
        }
        if self.config.clear_on_start {
            self.relay.clear();
        }

        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = ExecutionSession::spawn(
            SessionParams {
                id,
                source: source.to_string(),
                factory: Arc::clone(&self.factory),
                block_bytes: self.config.control_block_bytes,
                overflow_policy: self.config.overflow_policy,
                echo_input: self.config.echo_input,
                worker_stack_bytes: self.config.worker_stack_bytes,
            },
            &runtime,
            self.relay.clone(),
            Arc::clone(&self.phase_tx),
            Arc::clone(&self.live_workers),
        )?;
        *active = Some(session);
        Ok(id)
    }

    /// Stops the live run. Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock();
        let Some(session) = active.as_ref() else {
            return false;
        };
        if !session.terminate() {
            return false;
        }
        self.relay.notice(Notice::error(STOPPED_NOTICE));
        true
    }

    /// Answers the pending input request with `line`. Returns the number of
    /// bytes staged, terminator included.
    pub fn submit_input(&self, line: &str) -> Result<usize> {
        let active = self.active.lock();
        match active.as_ref() {
            Some(session) => session.submit_input(line),
            None => Err(RunpadError::NoPendingInput),
        }
    }

    pub fn clear_console(&self) {
        self.relay.clear();
    }

    pub fn phase(&self) -> Phase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// Resolves once no run is live and returns the phase it settled in.
    pub async fn wait_for_settle(&self) -> Phase {
        let mut rx = self.phase_tx.subscribe();
        if let Ok(phase) = rx.wait_for(|phase| !phase.is_active()).await {
            return *phase;
        }
        self.phase()
    }

    /// Id of the run that is still live, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        self.active
            .lock()
            .as_ref()
            .filter(|session| session.is_live())
            .map(ExecutionSession::id)
    }

    /// Worker threads that have not exited yet, including ones that were
    /// cancelled and are still unwinding.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub fn blocking_input_available(&self) -> bool {
        self.capabilities.blocking_input_available()
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    pub fn config(&self) -> &RunpadConfig {
        &self.config
    }

    /// Output fragments relayed to the sink so far.
    pub fn delivered(&self) -> u64 {
        self.relay.delivered()
    }

    pub fn status_label(&self) -> &'static str {
        if self.capabilities.missing().is_some() {
            return BLOCKED_LABEL;
        }
        self.phase().status_label()
    }
}
