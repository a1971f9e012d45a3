//! Run states and the end-of-run report.

use crate::error::ResourceError;
use crate::lifecycle::StartOutcome;
use std::fmt;
use std::time::Instant;

/// `Pending → Starting → Ready → Stopped`, with `Starting → Failed` and
/// `Ready → Failed`. `Failed` is terminal for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Pending,
    Starting,
    Ready,
    Failed,
    Stopped,
}

impl RunState {
    /// Startup is over for this resource, one way or the other.
    pub fn is_settled(self) -> bool {
        matches!(self, RunState::Ready | RunState::Failed | RunState::Stopped)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Pending => "pending",
            RunState::Starting => "starting",
            RunState::Ready => "ready",
            RunState::Failed => "failed",
            RunState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub name: String,
    pub state: RunState,
    pub outcome: Option<StartOutcome>,
    pub cause: Option<ResourceError>,
    pub starting_at: Option<Instant>,
    pub ready_at: Option<Instant>,
}

/// Every resource's terminal state, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new(entries: Vec<ReportEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn state_of(&self, name: &str) -> Option<RunState> {
        self.get(name).map(|e| e.state)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.state == RunState::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.state == RunState::Ready)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One line per failed resource with its cause.
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.failed() {
            match &entry.cause {
                Some(cause) => writeln!(f, "{}: {}", entry.name, cause)?,
                None => writeln!(f, "{}: failed", entry.name)?,
            }
        }
        Ok(())
    }
}
