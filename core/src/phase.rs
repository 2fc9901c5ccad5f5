use std::fmt;

use serde::Serialize;

/// Lifecycle of the current run as seen by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    AwaitingInput,
    Completed,
    Cancelled,
    Errored,
}

impl Phase {
    /// A worker is (or may still be) executing on behalf of this phase.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Running | Phase::AwaitingInput)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Cancelled | Phase::Errored)
    }

    /// Text for the status line.
    pub fn status_label(self) -> &'static str {
        match self {
            Phase::Idle | Phase::Completed => "Engine Ready",
            Phase::Running => "Running...",
            Phase::AwaitingInput => "Waiting for input",
            Phase::Cancelled => "Interrupted",
            Phase::Errored => "Engine Error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Running => write!(f, "running"),
            Phase::AwaitingInput => write!(f, "awaiting_input"),
            Phase::Completed => write!(f, "completed"),
            Phase::Cancelled => write!(f, "cancelled"),
            Phase::Errored => write!(f, "errored"),
        }
    }
}
