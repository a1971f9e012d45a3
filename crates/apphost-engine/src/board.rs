//! Per-resource run state.
//!
//! Each resource has its own `watch` channel. The scheduler is the only
//! writer; start tasks subscribe to the resources whose outputs they consume,
//! and nothing ever locks the board as a whole.

use crate::error::ResourceError;
use crate::handler::Outputs;
use crate::lifecycle::StartOutcome;
use crate::report::{ReportEntry, RunReport, RunState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: RunState,
    pub outcome: Option<StartOutcome>,
    pub outputs: Arc<Outputs>,
    pub cause: Option<ResourceError>,
    pub starting_at: Option<Instant>,
    pub ready_at: Option<Instant>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: RunState::Pending,
            outcome: None,
            outputs: Arc::new(Outputs::new()),
            cause: None,
            starting_at: None,
            ready_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Transition {
    Starting,
    Ready {
        outcome: StartOutcome,
        outputs: Outputs,
    },
    Failed(ResourceError),
    Stopped,
}

pub struct StateBoard {
    order: Vec<String>,
    slots: HashMap<String, watch::Sender<Snapshot>>,
}

impl StateBoard {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut order = Vec::new();
        let mut slots = HashMap::new();
        for name in names {
            order.push(name.to_string());
            slots.insert(name.to_string(), watch::Sender::new(Snapshot::default()));
        }
        Self { order, slots }
    }

    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<Snapshot>> {
        self.slots.get(name).map(watch::Sender::subscribe)
    }

    pub fn snapshot(&self, name: &str) -> Option<Snapshot> {
        self.slots.get(name).map(|slot| slot.borrow().clone())
    }

    pub fn state(&self, name: &str) -> Option<RunState> {
        self.slots.get(name).map(|slot| slot.borrow().state)
    }

    /// Names currently in `state`, in declaration order.
    pub fn in_state(&self, state: RunState) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.state(name) == Some(state))
            .cloned()
            .collect()
    }

    pub fn all_settled(&self) -> bool {
        self.slots.values().all(|slot| slot.borrow().state.is_settled())
    }

    /// Apply a transition if the state machine allows it. Returns whether it
    /// was applied; anything else is logged and ignored.
    pub fn transition(&self, name: &str, transition: Transition) -> bool {
        let Some(slot) = self.slots.get(name) else {
            warn!(resource = name, "Transition for unknown resource");
            return false;
        };

        let mut rejected_from = None;
        let applied = slot.send_if_modified(|snapshot| {
            let allowed = matches!(
                (snapshot.state, &transition),
                (RunState::Pending, Transition::Starting)
                    | (RunState::Starting, Transition::Ready { .. })
                    | (
                        RunState::Pending | RunState::Starting | RunState::Ready,
                        Transition::Failed(_)
                    )
                    | (RunState::Ready, Transition::Stopped)
            );
            if !allowed {
                rejected_from = Some(snapshot.state);
                return false;
            }
            match &transition {
                Transition::Starting => {
                    snapshot.state = RunState::Starting;
                    snapshot.starting_at = Some(Instant::now());
                }
                Transition::Ready { outcome, outputs } => {
                    snapshot.state = RunState::Ready;
                    snapshot.outcome = Some(*outcome);
                    snapshot.outputs = Arc::new(outputs.clone());
                    snapshot.ready_at = Some(Instant::now());
                }
                Transition::Failed(cause) => {
                    snapshot.state = RunState::Failed;
                    snapshot.cause = Some(cause.clone());
                }
                Transition::Stopped => snapshot.state = RunState::Stopped,
            }
            true
        });

        match (&transition, rejected_from) {
            (_, Some(from)) => {
                warn!(resource = name, state = %from, ?transition, "Transition rejected");
            }
            (Transition::Failed(cause), None) => {
                warn!(resource = name, state = %RunState::Failed, error = %cause, "Resource failed");
            }
            (Transition::Ready { outcome, .. }, None) => {
                info!(resource = name, state = %RunState::Ready, ?outcome, "Resource ready");
            }
            (Transition::Starting, None) => info!(resource = name, state = %RunState::Starting, "Starting"),
            (Transition::Stopped, None) => info!(resource = name, state = %RunState::Stopped, "Stopped"),
        }
        applied
    }

    /// Outputs of `name` once it is ready.
    ///
    /// Suspends while `name` is pending or starting. A dependency that fails
    /// or stops instead yields `DependencyFailed`.
    pub async fn wait_ready(&self, name: &str) -> Result<Arc<Outputs>, ResourceError> {
        let mut rx = self.subscribe(name).ok_or_else(|| ResourceError::DependencyFailed {
            dependency: name.to_string(),
        })?;
        loop {
            {
                let snapshot = rx.borrow_and_update();
                match snapshot.state {
                    RunState::Ready => return Ok(snapshot.outputs.clone()),
                    RunState::Failed | RunState::Stopped => {
                        return Err(ResourceError::DependencyFailed {
                            dependency: name.to_string(),
                        })
                    }
                    RunState::Pending | RunState::Starting => {}
                }
            }
            rx.changed().await.map_err(|_| ResourceError::Cancelled)?;
        }
    }

    pub fn report(&self) -> RunReport {
        let entries = self
            .order
            .iter()
            .filter_map(|name| {
                let snapshot = self.snapshot(name)?;
                Some(ReportEntry {
                    name: name.clone(),
                    state: snapshot.state,
                    outcome: snapshot.outcome,
                    cause: snapshot.cause,
                    starting_at: snapshot.starting_at,
                    ready_at: snapshot.ready_at,
                })
            })
            .collect();
        RunReport::new(entries)
    }
}
