//! # Orchestrator / Scheduler
//!
//! Drives every resource from `Pending` to `Ready` or to a terminal failure.
//!
//! ## Architecture
//!
//! One central loop owns run state. It launches a tokio task per resource as
//! soon as all of that resource's `WaitFor` dependencies are `Ready`, and the
//! tasks report back over an mpsc channel:
//!
//! ```text
//!             launch (spawn)
//!   RunLoop ─────────────────────▶ start task (one per resource)
//!      ▲                               │ resolve config, lifecycle.start,
//!      │                               │ readiness polling, outputs
//!      │      TaskEvent::Ready/Failed  ▼
//!      └──────────────────────────  monitor task (awaits the start task)
//! ```
//!
//! The monitor turns a panicking handler into a `Failed` event, so every
//! launched resource settles.
//!
//! State lives on the [`StateBoard`], one `watch` channel per resource. Start
//! tasks only read it: a `{ resource, output }` value suspends on the
//! dependency's channel until it is `Ready`.
//!
//! ## Failure handling
//!
//! A failed resource fails all of its transitive dependents: pending ones are
//! never started, starting ones are cancelled and their handler is asked to
//! stop. Independent branches keep going unless the run uses
//! [`FailurePolicy::AbortAll`]. When the run does not reach all-ready, the
//! report is captured and every delegated `Session` resource is torn down
//! before [`RunError`] is returned.

use crate::board::{StateBoard, Transition};
use crate::error::{BuildError, HandlerError, ResourceError, RunError, TeardownError};
use crate::graph::DependencyGraph;
use crate::handler::{HandlerRegistry, Outputs, Readiness, StartSpec};
use crate::lifecycle::{LifecycleManager, StartOutcome};
use crate::parameter::ResolvedValue;
use crate::prober::{ReadinessPolicy, ReadinessProber};
use crate::registry::Registry;
use crate::report::{RunReport, RunState};
use crate::resolver::ParameterResolver;
use crate::resource::{ConfigValue, Lifetime, Resource};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn, Instrument};

/// What happens to the rest of the run when one resource fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Only the failed resource's dependents are failed.
    #[default]
    ContinueIndependent,
    /// The first failure cancels everything still pending or starting.
    AbortAll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSettings {
    /// Defaults for resources without their own readiness overrides.
    pub readiness: ReadinessPolicy,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug)]
enum TaskEvent {
    Ready {
        name: String,
        outcome: StartOutcome,
        outputs: Outputs,
    },
    Failed {
        name: String,
        cause: ResourceError,
    },
}

/// Everything a run and its start tasks share. Read-only except the board.
struct Shared {
    registry: Registry,
    graph: DependencyGraph,
    lifecycle: LifecycleManager,
    resolver: ParameterResolver,
    settings: RunSettings,
    board: StateBoard,
}

/// A validated, not yet started orchestration.
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Build the graph and bind handlers. Fails before anything starts.
    pub fn new(
        registry: Registry,
        handlers: &HandlerRegistry,
        resolver: ParameterResolver,
        settings: RunSettings,
    ) -> Result<Self, BuildError> {
        let graph = DependencyGraph::build(&registry)?;
        let lifecycle = LifecycleManager::new(&registry, handlers)?;
        let board = StateBoard::new(graph.names());
        Ok(Self {
            shared: Arc::new(Shared {
                registry,
                graph,
                lifecycle,
                resolver,
                settings,
                board,
            }),
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.shared.graph
    }

    pub async fn run(self) -> Result<RunHandle, RunError> {
        self.run_until(future::pending()).await
    }

    /// Run until every resource has settled, or `abort` completes first.
    #[instrument(skip_all, fields(resources = self.shared.graph.len()))]
    pub async fn run_until(
        self,
        abort: impl Future<Output = ()> + Send,
    ) -> Result<RunHandle, RunError> {
        let (events_tx, events_rx) = mpsc::channel(self.shared.graph.len().max(1));
        let mut run = RunLoop {
            shared: self.shared.clone(),
            tasks: HashMap::new(),
            unmet: HashMap::new(),
            events_tx,
        };
        run.drive(events_rx, abort).await;

        let report = self.shared.board.report();
        if report.is_success() {
            info!(resources = report.len(), "All resources ready");
            return Ok(RunHandle {
                shared: self.shared,
            });
        }

        warn!(failed = report.failed().count(), "Run failed, tearing down");
        for (name, e) in teardown(&self.shared).await {
            warn!(resource = %name, error = %e, "Teardown failed");
        }
        Err(RunError { report })
    }
}

struct StartTask {
    bring_up: AbortHandle,
    monitor: JoinHandle<()>,
}

struct RunLoop {
    shared: Arc<Shared>,
    tasks: HashMap<String, StartTask>,
    /// Remaining `WaitFor` dependencies per pending resource.
    unmet: HashMap<String, usize>,
    events_tx: mpsc::Sender<TaskEvent>,
}

impl RunLoop {
    async fn drive(&mut self, mut events: mpsc::Receiver<TaskEvent>, abort: impl Future<Output = ()>) {
        let order: Vec<String> = self
            .shared
            .graph
            .topological_order()
            .into_iter()
            .map(str::to_string)
            .collect();
        for name in &order {
            let waiting = self.shared.graph.wait_for(name).len();
            self.unmet.insert(name.clone(), waiting);
        }
        for name in &order {
            if self.unmet.get(name) == Some(&0) {
                self.launch(name);
            }
        }

        tokio::pin!(abort);
        let mut aborted = false;
        while !self.shared.board.all_settled() {
            tokio::select! {
                Some(event) = events.recv() => self.handle(event).await,
                _ = &mut abort, if !aborted => {
                    aborted = true;
                    warn!("Run aborted");
                    self.cancel_unsettled(ResourceError::Cancelled).await;
                }
                else => break,
            }
        }
    }

    fn launch(&mut self, name: &str) {
        if !self.shared.board.transition(name, Transition::Starting) {
            return;
        }
        let shared = self.shared.clone();
        let owned = name.to_string();
        let span = tracing::info_span!("start", resource = name);
        let start = tokio::spawn(async move { bring_up(&shared, &owned).await }.instrument(span));
        let abort = start.abort_handle();

        let events = self.events_tx.clone();
        let owned = name.to_string();
        let monitor = tokio::spawn(async move {
            let event = match start.await {
                Ok(Ok((outcome, outputs))) => TaskEvent::Ready {
                    name: owned,
                    outcome,
                    outputs,
                },
                Ok(Err(cause)) => TaskEvent::Failed { name: owned, cause },
                Err(e) if e.is_panic() => {
                    let reason = panic_reason(e);
                    warn!(resource = %owned, %reason, "Start task panicked");
                    TaskEvent::Failed {
                        name: owned,
                        cause: ResourceError::ResourceFailed(reason),
                    }
                }
                // Cancelled by the run loop, which already settled it.
                Err(_) => return,
            };
            let _ = events.send(event).await;
        });
        self.tasks.insert(
            name.to_string(),
            StartTask {
                bring_up: abort,
                monitor,
            },
        );
    }

    async fn handle(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Ready {
                name,
                outcome,
                outputs,
            } => {
                self.tasks.remove(&name);
                if !self
                    .shared
                    .board
                    .transition(&name, Transition::Ready { outcome, outputs })
                {
                    return;
                }
                let unblocked: Vec<String> = self
                    .shared
                    .graph
                    .dependents(&name)
                    .into_iter()
                    .filter(|dependent| self.shared.graph.wait_for(dependent).contains(&name.as_str()))
                    .map(str::to_string)
                    .collect();
                for dependent in unblocked {
                    let remaining = self.unmet.entry(dependent.clone()).or_insert(0);
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 && self.shared.board.state(&dependent) == Some(RunState::Pending) {
                        self.launch(&dependent);
                    }
                }
            }
            TaskEvent::Failed { name, cause } => {
                self.tasks.remove(&name);
                self.fail(&name, cause).await;
            }
        }
    }

    /// Mark `name` failed and propagate to everything that depends on it.
    async fn fail(&mut self, name: &str, cause: ResourceError) {
        if !self.shared.board.transition(name, Transition::Failed(cause)) {
            return;
        }
        stop_delegated(&self.shared, name).await;

        let dependents: Vec<String> = self
            .shared
            .graph
            .transitive_dependents(name)
            .into_iter()
            .map(str::to_string)
            .collect();
        for dependent in dependents {
            self.cancel(
                &dependent,
                ResourceError::DependencyFailed {
                    dependency: name.to_string(),
                },
            )
            .await;
        }

        if self.shared.settings.failure_policy == FailurePolicy::AbortAll {
            self.cancel_unsettled(ResourceError::Cancelled).await;
        }
    }

    async fn cancel_unsettled(&mut self, cause: ResourceError) {
        let mut unsettled = self.shared.board.in_state(RunState::Pending);
        unsettled.extend(self.shared.board.in_state(RunState::Starting));
        for name in unsettled {
            self.cancel(&name, cause.clone()).await;
        }
    }

    async fn cancel(&mut self, name: &str, cause: ResourceError) {
        match self.shared.board.state(name) {
            Some(RunState::Starting) => {
                if let Some(task) = self.tasks.remove(name) {
                    task.bring_up.abort();
                    let _ = task.monitor.await;
                }
                if self.shared.board.transition(name, Transition::Failed(cause)) {
                    stop_delegated(&self.shared, name).await;
                }
            }
            Some(RunState::Pending | RunState::Ready) => {
                self.shared.board.transition(name, Transition::Failed(cause));
            }
            _ => {}
        }
    }
}

fn panic_reason(e: JoinError) -> String {
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match message {
        Some(message) => format!("handler panicked: {message}"),
        None => "handler panicked".to_string(),
    }
}

/// Resolve `name`'s start spec, start it and collect its outputs.
async fn bring_up(shared: &Shared, name: &str) -> Result<(StartOutcome, Outputs), ResourceError> {
    let resource = shared
        .registry
        .get(name)
        .map_err(|e| ResourceError::ResourceFailed(e.to_string()))?;
    let spec = resolve_spec(shared, resource).await?;
    let policy = shared.settings.readiness.with_overrides(&resource.readiness);
    let outcome = shared.lifecycle.start(spec, policy).await?;
    let outputs = shared.lifecycle.outputs(name).await?;
    Ok((outcome, outputs))
}

async fn resolve_spec(shared: &Shared, resource: &Resource) -> Result<StartSpec, ResourceError> {
    let mut config = BTreeMap::new();
    for (key, value) in &resource.config {
        config.insert(key.clone(), resolve_value(shared, value).await?);
    }
    let mut args = Vec::with_capacity(resource.args.len());
    for value in &resource.args {
        args.push(resolve_value(shared, value).await?);
    }
    let mut env = BTreeMap::new();
    for (key, value) in &resource.env {
        env.insert(key.clone(), resolve_value(shared, value).await?);
    }
    debug!(resource = %resource.name, "Configuration resolved");

    Ok(StartSpec {
        name: resource.name.clone(),
        kind: resource.kind.clone(),
        lifetime: shared.registry.lifetime_of(&resource.name),
        config,
        args,
        env,
        volumes: resource.volumes.clone(),
        endpoints: resource.endpoints.clone(),
    })
}

async fn resolve_value(shared: &Shared, value: &ConfigValue) -> Result<ResolvedValue, ResourceError> {
    match value {
        ConfigValue::Literal(literal) => Ok(ResolvedValue::new(literal.as_str(), false)),
        ConfigValue::Parameter(name) => shared.resolver.resolve(name).await,
        ConfigValue::Output { resource, output } => {
            let outputs = shared.board.wait_ready(resource).await?;
            outputs
                .get(output)
                .cloned()
                .ok_or_else(|| ResourceError::UnresolvedOutput {
                    resource: resource.clone(),
                    output: output.clone(),
                })
        }
    }
}

async fn stop_delegated(shared: &Shared, name: &str) {
    if let Err(e) = shared.lifecycle.stop(name).await {
        warn!(resource = name, error = %e, "Stop after failure failed");
    }
}

/// Stop every delegated `Session` resource in reverse start order.
async fn teardown(shared: &Shared) -> Vec<(String, HandlerError)> {
    let mut failures = Vec::new();
    for name in shared.graph.topological_order().into_iter().rev() {
        if shared.registry.lifetime_of(name) != Lifetime::Session {
            continue;
        }
        match shared.lifecycle.stop(name).await {
            Ok(true) => {
                if shared.board.state(name) == Some(RunState::Ready) {
                    shared.board.transition(name, Transition::Stopped);
                }
            }
            Ok(false) => {}
            Err(e) => failures.push((name.to_string(), e)),
        }
    }
    failures
}

/// A run in which every resource reached `Ready`.
pub struct RunHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("report", &self.report())
            .finish()
    }
}

impl RunHandle {
    pub fn report(&self) -> RunReport {
        self.shared.board.report()
    }

    pub fn board(&self) -> &StateBoard {
        &self.shared.board
    }

    pub fn outputs(&self, name: &str) -> Option<Arc<Outputs>> {
        self.shared.board.snapshot(name).map(|snapshot| snapshot.outputs)
    }

    /// Keep probing ready resources. Returns once one of them has failed,
    /// after failing everything that depends on it.
    pub async fn supervise(&self, interval: Duration) -> RunError {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for name in self.shared.board.in_state(RunState::Ready) {
                let (Some(handler), Some(spec)) = (
                    self.shared.lifecycle.handler(&name),
                    self.shared.lifecycle.started_spec(&name),
                ) else {
                    continue;
                };
                if let Readiness::Failed(reason) = ReadinessProber::probe(handler, &spec).await {
                    self.crashed(&name, reason);
                    return RunError {
                        report: self.report(),
                    };
                }
            }
        }
    }

    fn crashed(&self, name: &str, reason: String) {
        let board = &self.shared.board;
        if !board.transition(name, Transition::Failed(ResourceError::ResourceFailed(reason))) {
            return;
        }
        for dependent in self.shared.graph.transitive_dependents(name) {
            board.transition(
                dependent,
                Transition::Failed(ResourceError::DependencyFailed {
                    dependency: name.to_string(),
                }),
            );
        }
    }

    /// Stop `Session` resources this run started, newest first. `Persistent`
    /// resources keep running for the next run to attach to.
    #[instrument(skip_all)]
    pub async fn shutdown(self) -> Result<RunReport, TeardownError> {
        info!("Shutting down");
        let failures = teardown(&self.shared).await;
        if failures.is_empty() {
            Ok(self.shared.board.report())
        } else {
            Err(TeardownError { failures })
        }
    }
}
