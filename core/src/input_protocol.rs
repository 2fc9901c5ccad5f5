//! Request / fulfil / resume handshake over a [`ControlBlock`].
//!
//! The worker half ([`InputReader`]) announces a read, parks on the block's
//! flag until the controller half ([`InputWriter`]) stages a line, then copies
//! the line out and hands the flag back. Only one line is ever in flight.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::trace;
use tracing::warn;

use crate::control_block::ControlBlock;
use crate::control_block::ReadyFlag;
use crate::error::Result;
use crate::error::RunpadError;
use crate::interpreter::Terminated;

/// What to do with a submitted line that does not fit the staging area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    Reject,
    Truncate,
}

/// Controller side of the handshake.
#[derive(Debug, Clone)]
pub struct InputWriter {
    block: Arc<ControlBlock>,
    policy: OverflowPolicy,
}

impl InputWriter {
    pub fn new(block: Arc<ControlBlock>, policy: OverflowPolicy) -> Self {
        Self { block, policy }
    }

    /// Encodes `line` as UTF-8 with a trailing `\n`, applying the overflow
    /// policy against the block capacity. One trailing `\n` is accepted and
    /// any other `\n` is rejected, so a payload always holds exactly one line.
    pub fn encode_line(&self, line: &str) -> Result<Vec<u8>> {
        encode_line(line, self.block.capacity(), self.policy)
    }

    /// Stages one line and wakes the worker. Returns the staged byte count.
    pub fn submit(&self, line: &str) -> Result<usize> {
        let payload = self.encode_line(line)?;
        let mut region = self.block.lock();
        if region.is_terminated() {
            return Err(RunpadError::SessionEnded);
        }
        if region.flag() == ReadyFlag::Full {
            return Err(RunpadError::InputAlreadyStaged);
        }
        region.stage(&payload);
        region.set_flag(ReadyFlag::Full);
        drop(region);
        self.block.notify();
        trace!(bytes = payload.len(), "staged input line");
        Ok(payload.len())
    }
}

pub(crate) fn encode_line(line: &str, capacity: usize, policy: OverflowPolicy) -> Result<Vec<u8>> {
    let body = line.strip_suffix('\n').unwrap_or(line);
    if let Some(offset) = body.find('\n') {
        return Err(RunpadError::MultilineInput { offset });
    }
    let len = body.len() + 1;
    if len <= capacity {
        let mut payload = Vec::with_capacity(len);
        payload.extend_from_slice(body.as_bytes());
        payload.push(b'\n');
        return Ok(payload);
    }
    match policy {
        OverflowPolicy::Reject => Err(RunpadError::PayloadOverflow { len, capacity }),
        OverflowPolicy::Truncate => {
            let mut cut = capacity.saturating_sub(1);
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            warn!(
                original = len,
                kept = cut + 1,
                "input line truncated to fit the staging buffer"
            );
            let mut payload = Vec::with_capacity(cut + 1);
            payload.extend_from_slice(&body.as_bytes()[..cut]);
            payload.push(b'\n');
            Ok(payload)
        }
    }
}

/// Worker side of the handshake.
#[derive(Debug)]
pub struct InputReader {
    block: Arc<ControlBlock>,
    leftover: Vec<u8>,
}

impl InputReader {
    pub fn new(block: Arc<ControlBlock>) -> Self {
        Self {
            block,
            leftover: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.block.is_terminated()
    }

    /// Fills `buf` with the next input bytes.
    ///
    /// Bytes left over from a line that did not fit a previous `buf` are
    /// served first without a new request. Otherwise `announce` is called
    /// (the "input requested" notification) and the thread parks until the
    /// controller stages a line.
    pub fn read_into<F>(
        &mut self,
        buf: &mut [u8],
        announce: F,
    ) -> std::result::Result<usize, Terminated>
    where
        F: FnOnce() -> std::result::Result<(), Terminated>,
    {
        if self.leftover.is_empty() {
            announce()?;
            self.leftover = self.wait_for_line()?;
        }
        let n = buf.len().min(self.leftover.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }

    /// Blocks until a line is staged, takes it, and resets the flag.
    pub fn wait_for_line(&self) -> std::result::Result<Vec<u8>, Terminated> {
        let mut region = self.block.wait_full();
        if region.is_terminated() {
            return Err(Terminated);
        }
        let line = region.staged().to_vec();
        region.set_flag(ReadyFlag::Empty);
        trace!(bytes = line.len(), "consumed input line");
        Ok(line)
    }
}
