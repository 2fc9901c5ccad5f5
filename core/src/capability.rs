//! Host capability probing for the blocking-input handshake.
//!
//! The worker blocks a real thread while it waits for input, so the host must
//! be able to run a second thread and park it on a shared wait/notify
//! primitive. Native targets always can; `wasm32` only when built with the
//! `atomics` target feature.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostCapabilities {
    /// Worker threads that share memory with the controller.
    pub threads: bool,
    /// A wait/notify primitive able to park a thread until signalled.
    pub atomic_wait: bool,
}

impl HostCapabilities {
    pub fn detect() -> Self {
        let supported = cfg!(any(not(target_family = "wasm"), target_feature = "atomics"));
        Self {
            threads: supported,
            atomic_wait: supported,
        }
    }

    pub fn full() -> Self {
        Self {
            threads: true,
            atomic_wait: true,
        }
    }

    pub fn none() -> Self {
        Self {
            threads: false,
            atomic_wait: false,
        }
    }

    pub fn blocking_input_available(self) -> bool {
        self.missing().is_none()
    }

    pub fn missing(self) -> Option<MissingCapability> {
        match (self.threads, self.atomic_wait) {
            (true, true) => None,
            (false, true) => Some(MissingCapability::Threads),
            (true, false) => Some(MissingCapability::AtomicWait),
            (false, false) => Some(MissingCapability::ThreadsAndAtomicWait),
        }
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCapability {
    Threads,
    AtomicWait,
    ThreadsAndAtomicWait,
}

impl fmt::Display for MissingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threads => write!(f, "shared-memory worker threads"),
            Self::AtomicWait => write!(f, "atomic wait/notify"),
            Self::ThreadsAndAtomicWait => {
                write!(f, "shared-memory worker threads and atomic wait/notify")
            }
        }
    }
}
