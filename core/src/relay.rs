use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Diagnostic line shown alongside program output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "> {}", self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    /// A fragment of program output.
    Output(String),
    /// The program is parked waiting for one line of input.
    InputRequested,
    /// A submitted line, shown where the input affordance was.
    InputEcho(String),
    Notice(Notice),
    /// Console contents should be discarded.
    Clear,
}

/// Where console traffic ends up. Implementations must not block.
pub trait DisplaySink: Send + Sync {
    fn deliver(&self, event: DisplayEvent);
}

/// Sink that forwards every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn deliver(&self, event: DisplayEvent) {
        // The UI may already be gone; nothing left to render into.
        let _ = self.tx.send(event);
    }
}

/// Ordered path from a session to the display sink.
#[derive(Clone)]
pub struct OutputRelay {
    sink: Arc<dyn DisplaySink>,
    delivered: Arc<AtomicU64>,
}

impl OutputRelay {
    pub fn new(sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            sink,
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn output(&self, text: String) {
        if text.is_empty() {
            return;
        }
        trace!(bytes = text.len(), "relaying output fragment");
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.sink.deliver(DisplayEvent::Output(text));
    }

    pub fn input_requested(&self) {
        self.sink.deliver(DisplayEvent::InputRequested);
    }

    pub fn echo(&self, line: &str) {
        let line = line.strip_suffix('\n').unwrap_or(line);
        self.sink.deliver(DisplayEvent::InputEcho(line.to_string()));
    }

    pub fn notice(&self, notice: Notice) {
        self.sink.deliver(DisplayEvent::Notice(notice));
    }

    pub fn clear(&self) {
        self.sink.deliver(DisplayEvent::Clear);
    }

    /// Output fragments delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for OutputRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRelay")
            .field("delivered", &self.delivered())
            .finish_non_exhaustive()
    }
}
