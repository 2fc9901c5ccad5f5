//! Boundary between a session's worker thread and the program runtime.

use std::fmt;

use thiserror::Error;

/// The worker's execution context has been torn down. Runtimes propagate it
/// out of `run` as fast as possible; nothing they emit afterwards is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution context terminated")]
pub struct Terminated;

/// An error raised by the interpreted program itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: String,
    pub message: String,
    pub line: Option<usize>,
}

impl RuntimeError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "{}: {}", self.kind, self.message)?;
        }
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("{0}")]
    Runtime(RuntimeError),
    #[error(transparent)]
    Terminated(#[from] Terminated),
}

impl From<RuntimeError> for ExecError {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}

/// Host services a runtime calls back into while it executes.
pub trait RuntimeIo {
    /// Emits an output chunk. Never blocks.
    fn write_output(&mut self, text: &str) -> Result<(), Terminated>;

    /// Blocks until the user supplies input and copies it into `buf`.
    /// Returns the number of bytes written.
    fn read_input(&mut self, buf: &mut [u8]) -> Result<usize, Terminated>;

    /// Liveness check runtimes call between units of work.
    fn checkpoint(&self) -> Result<(), Terminated>;

    /// Reads one line, terminator included. `None` when the input yields no
    /// bytes at all.
    fn read_line(&mut self) -> Result<Option<String>, Terminated> {
        let mut line = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read_input(&mut buf)?;
            if n == 0 {
                break;
            }
            line.extend_from_slice(&buf[..n]);
            if line.ends_with(b"\n") {
                break;
            }
        }
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

pub trait Interpreter: Send {
    fn run(&mut self, source: &str, io: &mut dyn RuntimeIo) -> Result<(), ExecError>;
}

/// Builds one interpreter per run, on the worker thread.
pub trait InterpreterFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self) -> Box<dyn Interpreter>;
}
