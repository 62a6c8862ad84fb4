//! Job status machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub enum JobStatus {
    /// Job is registered but its execution task has not been spawned.
    Submitted,
    /// Job is producing work once per tick.
    Running,
    /// Job's task is alive but idle until resumed or stopped.
    Halted,
    /// Job's task has exited. Terminal.
    Stopped,
}

impl JobStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Submitted, Running)
                | (Running, Halted)
                | (Running, Stopped)
                | (Halted, Running)
                | (Halted, Stopped)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "Submitted",
            Self::Running => "Running",
            Self::Halted => "Halted",
            Self::Stopped => "Stopped",
        };
        write!(f, "{s}")
    }
}

/// A lifecycle operation requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Halt,
    Resume,
    Stop,
    Clean,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Halt => "halt",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Clean => "clean",
        };
        write!(f, "{s}")
    }
}

/// A status transition event.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StateTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Cap on the transition history kept in each snapshot.
pub const MAX_TRANSITIONS: usize = 50;
